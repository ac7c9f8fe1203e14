// crates/sift/src/registry.rs
//! Mapping registry: the attribute/relation graph reachable from one root
//! resource type, precomputed once and shared read-only.

use crate::schema::{fold, Metamodel};
use crate::{Error, Result};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// An internal (joinable) relation as seen by the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationTarget {
    /// Canonical relation name.
    pub name: String,
    /// Canonical name of the target class.
    pub target: String,
    pub collection: bool,
}

#[derive(Debug, Clone)]
struct ClassMapping {
    name: String,
    /// folded name → canonical name
    attributes: HashMap<String, String>,
    relations: HashMap<String, RelationTarget>,
    external: HashSet<String>,
    id_field: String,
}

#[derive(Debug, Clone)]
pub struct MappingRegistry {
    root: String,
    classes: HashMap<String, ClassMapping>,
    external: HashSet<String>,
}

impl MappingRegistry {
    /// Walk the relation graph from `root`. Each class is visited once, so
    /// cyclic graphs terminate.
    pub fn build<M: Metamodel + ?Sized>(schema: &M, root: &str) -> Result<Self> {
        let root_entity = schema
            .entity(root)
            .ok_or_else(|| Error::UnknownClass(root.to_string()))?;

        let mut classes = HashMap::new();
        let mut external = HashSet::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue = VecDeque::from([root_entity.name.clone()]);

        while let Some(class) = queue.pop_front() {
            if !visited.insert(fold(&class)) {
                continue;
            }
            let entity = schema
                .entity(&class)
                .ok_or_else(|| Error::UnknownClass(class.clone()))?;

            let mut mapping = ClassMapping {
                name: entity.name.clone(),
                attributes: entity
                    .attributes()
                    .iter()
                    .map(|a| (fold(&a.name), a.name.clone()))
                    .collect(),
                relations: HashMap::new(),
                external: HashSet::new(),
                id_field: entity.id.clone(),
            };

            for rel in entity.relations() {
                if rel.external {
                    mapping.external.insert(fold(&rel.name));
                    external.insert(fold(&rel.name));
                    continue;
                }
                let target = schema
                    .entity(&rel.target)
                    .ok_or_else(|| Error::UnknownClass(rel.target.clone()))?;
                mapping.relations.insert(
                    fold(&rel.name),
                    RelationTarget {
                        name: rel.name.clone(),
                        target: target.name.clone(),
                        collection: rel.collection,
                    },
                );
                if !visited.contains(&fold(&target.name)) {
                    queue.push_back(target.name.clone());
                }
            }

            classes.insert(fold(&class), mapping);
        }

        debug!(
            root = %root_entity.name,
            classes = classes.len(),
            "mapping registry built"
        );

        Ok(Self {
            root: root_entity.name.clone(),
            classes,
            external,
        })
    }

    /// Canonical name of the root class.
    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn contains_class(&self, class: &str) -> bool {
        self.classes.contains_key(&fold(class))
    }

    pub fn is_mappable_relation(&self, class: &str, name: &str) -> bool {
        self.relation(class, name).is_some()
    }

    /// `(target class, is_collection)` of an internal relation.
    pub fn resolve_relation_target(&self, class: &str, name: &str) -> Option<(&str, bool)> {
        self.relation(class, name)
            .map(|r| (r.target.as_str(), r.collection))
    }

    pub fn relation(&self, class: &str, name: &str) -> Option<&RelationTarget> {
        self.class(class)?.relations.get(&fold(name))
    }

    /// True if any reachable class declares `name` as an external relation.
    pub fn is_external_relation(&self, name: &str) -> bool {
        self.external.contains(&fold(name))
    }

    pub fn identifier_field(&self, class: &str) -> Option<&str> {
        self.class(class).map(|c| c.id_field.as_str())
    }

    /// Canonical name of a scalar attribute.
    pub fn attribute(&self, class: &str, name: &str) -> Option<&str> {
        self.class(class)?
            .attributes
            .get(&fold(name))
            .map(String::as_str)
    }

    /// Verified relation paths for eager fetching.
    ///
    /// Each include path is walked from `root_class`; the walk stops at the
    /// first segment that is not an internal relation and only the verified
    /// prefix is kept. Paths with no verified prefix are dropped.
    pub fn extract_relationships<S: AsRef<str>>(
        &self,
        include_paths: &[S],
        root_class: &str,
    ) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        for path in include_paths {
            let path = path.as_ref();
            let mut class = root_class.to_string();
            let mut verified: Vec<&str> = Vec::new();
            for segment in path.split('.') {
                match self.relation(&class, segment) {
                    Some(rel) => {
                        verified.push(&rel.name);
                        class = rel.target.clone();
                    }
                    None => {
                        debug!(include = path, segment, "dropping unresolved include segment");
                        break;
                    }
                }
            }
            if !verified.is_empty() {
                out.insert(verified.join("."));
            }
        }
        out
    }

    fn class(&self, class: &str) -> Option<&ClassMapping> {
        self.classes.get(&fold(class))
    }

    /// Canonical class name as registered.
    pub fn class_name(&self, class: &str) -> Option<&str> {
        self.class(class).map(|c| c.name.as_str())
    }
}

type Slot = Arc<Mutex<Option<Arc<MappingRegistry>>>>;

/// Build-once cache of registries keyed by root resource type.
///
/// Each root type has its own slot; concurrent callers asking for the same
/// type wait on that slot, so a registry is built at most once at a time.
pub struct RegistryCache<M: Metamodel> {
    schema: Arc<M>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl<M: Metamodel> RegistryCache<M> {
    pub fn new(schema: Arc<M>) -> Self {
        Self {
            schema,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &Arc<M> {
        &self.schema
    }

    pub fn get(&self, root: &str) -> Result<Arc<MappingRegistry>> {
        let slot = {
            let mut slots = self.slots.lock();
            slots.entry(fold(root)).or_default().clone()
        };

        let mut guard = slot.lock();
        if let Some(registry) = guard.as_ref() {
            return Ok(registry.clone());
        }
        match MappingRegistry::build(self.schema.as_ref(), root) {
            Ok(registry) => {
                let registry = Arc::new(registry);
                *guard = Some(registry.clone());
                Ok(registry)
            }
            Err(err) => {
                // Failed roots keep no slot.
                let mut slots = self.slots.lock();
                if slots.get(&fold(root)).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                    slots.remove(&fold(root));
                }
                Err(err)
            }
        }
    }

    /// Number of root types holding a slot.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::fixtures;
    use crate::schema::{AttrType, Attribute, EntityType, Relation, Schema};
    use std::thread;

    fn registry() -> MappingRegistry {
        MappingRegistry::build(&fixtures::blog(), "Article").expect("registry builds")
    }

    // ─────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn build_visits_every_reachable_class_once_despite_cycles() {
        let reg = registry();
        assert_eq!(reg.root(), "Article");
        for class in ["Article", "Person", "Company", "Comment"] {
            assert!(reg.contains_class(class), "missing {class}");
        }
        // License is only reachable through an external relation.
        assert!(!reg.contains_class("License"));
    }

    #[test]
    fn build_from_unknown_root_fails() {
        let err = MappingRegistry::build(&fixtures::blog(), "Nope").unwrap_err();
        assert!(matches!(err, Error::UnknownClass(name) if name == "Nope"));
    }

    #[test]
    fn unreachable_classes_are_not_registered() {
        let schema = Schema::new(vec![
            EntityType::new("A", "a", "id").attribute_def(Attribute::new("id", AttrType::Integer)),
            EntityType::new("B", "b", "id")
                .attribute_def(Attribute::new("id", AttrType::Integer))
                .relation_def(Relation::to_one("a", "A", "a_id", "id")),
        ])
        .expect("schema");
        let reg = MappingRegistry::build(&schema, "A").expect("registry");
        assert!(reg.contains_class("A"));
        assert!(!reg.contains_class("B"));
    }

    // ─────────────────────────────────────────────────────────────
    // Lookups
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn relation_lookups_are_case_insensitive() {
        let reg = registry();
        assert!(reg.is_mappable_relation("article", "AUTHOR"));
        assert_eq!(reg.resolve_relation_target("Article", "author"), Some(("Person", false)));
        assert_eq!(
            reg.resolve_relation_target("ARTICLE", "Comments"),
            Some(("Comment", true))
        );
        assert_eq!(reg.resolve_relation_target("Article", "title"), None);
        assert!(!reg.is_mappable_relation("Article", "license"));
    }

    #[test]
    fn external_relations_are_known_but_not_mappable() {
        let reg = registry();
        assert!(reg.is_external_relation("License"));
        assert!(!reg.is_external_relation("author"));
    }

    #[test]
    fn identifier_and_attribute_lookup() {
        let reg = registry();
        assert_eq!(reg.identifier_field("person"), Some("id"));
        assert_eq!(reg.attribute("Article", "TITLE"), Some("title"));
        assert_eq!(reg.attribute("Article", "author"), None);
        assert_eq!(reg.identifier_field("Unknown"), None);
    }

    // ─────────────────────────────────────────────────────────────
    // extract_relationships
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn extract_relationships_keeps_verified_prefixes() {
        let reg = registry();
        let got = reg.extract_relationships(
            &[
                "author.name",
                "AUTHOR.employer.staff",
                "comments.article.author",
                "license",
                "bogus.author",
            ],
            "Article",
        );
        let want: BTreeSet<String> = [
            "author",
            "author.employer.staff",
            "comments.article.author",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(got, want);
    }

    #[test]
    fn extract_relationships_of_nothing_is_empty() {
        let reg = registry();
        let none: [&str; 0] = [];
        assert!(reg.extract_relationships(&none, "Article").is_empty());
    }

    // ─────────────────────────────────────────────────────────────
    // RegistryCache
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn cache_returns_the_same_registry_for_a_root() {
        let cache = RegistryCache::new(Arc::new(fixtures::blog()));
        let a = cache.get("Article").expect("first build");
        let b = cache.get("article").expect("cached");
        assert!(Arc::ptr_eq(&a, &b));

        let p = cache.get("Person").expect("person registry");
        assert_eq!(p.root(), "Person");
        assert!(!Arc::ptr_eq(&a, &p));
    }

    #[test]
    fn cache_is_shared_across_threads() {
        let cache = Arc::new(RegistryCache::new(Arc::new(fixtures::blog())));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                thread::spawn(move || cache.get("Article").expect("registry"))
            })
            .collect();
        let regs: Vec<Arc<MappingRegistry>> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();
        for r in &regs[1..] {
            assert!(Arc::ptr_eq(&regs[0], r));
        }
    }

    #[test]
    fn cache_does_not_memoize_failures() {
        let cache = RegistryCache::new(Arc::new(fixtures::blog()));
        assert!(cache.get("Missing").is_err());
        assert!(cache.get("Missing").is_err());
    }

    #[test]
    fn failed_roots_leave_no_slot_behind() {
        let cache = RegistryCache::new(Arc::new(fixtures::blog()));
        for name in ["Missing", "Gone", "missing"] {
            assert!(cache.get(name).is_err());
        }
        assert!(cache.is_empty());

        cache.get("Article").expect("registry");
        assert!(cache.get("Nope").is_err());
        assert_eq!(cache.len(), 1);
    }
}
