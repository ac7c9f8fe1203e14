// crates/sift/src/schema.rs
//! Storage-side description of resource types.
//!
//! The schema is owned by the storage layer; this crate only reads it. It is
//! usually loaded from TOML:
//!
//! ```toml
//! [[entity]]
//! name = "Article"
//! table = "articles"
//! id = "id"
//! attributes = [
//!   { name = "id", type = "integer" },
//!   { name = "title", type = "text" },
//!   { name = "meta", type = "json", structured = true },
//! ]
//! relations = [
//!   { name = "author", target = "Person", local = "author_id", foreign = "id" },
//!   { name = "comments", target = "Comment", collection = true, local = "id", foreign = "article_id" },
//! ]
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

/// Storage type of a scalar attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttrType {
    Text,
    Integer,
    Float,
    Boolean,
    Uuid,
    Timestamp,
    Json,
}

impl AttrType {
    pub fn is_textual(self) -> bool {
        matches!(self, AttrType::Text | AttrType::Uuid)
    }
}

impl fmt::Display for AttrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AttrType::Text => "text",
            AttrType::Integer => "integer",
            AttrType::Float => "float",
            AttrType::Boolean => "boolean",
            AttrType::Uuid => "uuid",
            AttrType::Timestamp => "timestamp",
            AttrType::Json => "json",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    /// Storage column; defaults to `name`.
    #[serde(default)]
    pub column: Option<String>,
    #[serde(rename = "type")]
    pub ty: AttrType,
    /// The column holds a keyed document queried by sub-key path.
    #[serde(default)]
    pub structured: bool,
}

impl Attribute {
    pub fn new(name: impl Into<String>, ty: AttrType) -> Self {
        Self {
            name: name.into(),
            column: None,
            ty,
            structured: false,
        }
    }

    pub fn structured(mut self) -> Self {
        self.structured = true;
        self
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn column(&self) -> &str {
        self.column.as_deref().unwrap_or(&self.name)
    }
}

/// A relation from one entity type to another.
///
/// `local`/`foreign` name the join columns: `parent.local = target.foreign`.
/// External relations point at resources owned elsewhere and are never joined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Relation {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub collection: bool,
    #[serde(default)]
    pub external: bool,
    #[serde(default)]
    pub local: String,
    #[serde(default)]
    pub foreign: String,
}

impl Relation {
    pub fn to_one(
        name: impl Into<String>,
        target: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            collection: false,
            external: false,
            local: local.into(),
            foreign: foreign.into(),
        }
    }

    pub fn to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        local: impl Into<String>,
        foreign: impl Into<String>,
    ) -> Self {
        Self {
            collection: true,
            ..Self::to_one(name, target, local, foreign)
        }
    }

    pub fn external(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            external: true,
            ..Self::to_one(name, target, "", "")
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityType {
    pub name: String,
    pub table: String,
    /// Identifier field (an attribute name).
    pub id: String,
    #[serde(default)]
    attributes: Vec<Attribute>,
    #[serde(default)]
    relations: Vec<Relation>,
    #[serde(skip)]
    attr_index: HashMap<String, usize>,
    #[serde(skip)]
    rel_index: HashMap<String, usize>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, table: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            id: id.into(),
            attributes: Vec::new(),
            relations: Vec::new(),
            attr_index: HashMap::new(),
            rel_index: HashMap::new(),
        }
    }

    pub fn attribute_def(mut self, attribute: Attribute) -> Self {
        self.attributes.push(attribute);
        self.reindex();
        self
    }

    pub fn relation_def(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self.reindex();
        self
    }

    /// Case-insensitive attribute lookup.
    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attr_index
            .get(&fold(name))
            .and_then(|&i| self.attributes.get(i))
    }

    /// Case-insensitive relation lookup.
    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.rel_index
            .get(&fold(name))
            .and_then(|&i| self.relations.get(i))
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    pub fn relations(&self) -> &[Relation] {
        &self.relations
    }

    pub fn id_attribute(&self) -> Option<&Attribute> {
        self.attribute(&self.id)
    }

    fn reindex(&mut self) {
        self.attr_index = self
            .attributes
            .iter()
            .enumerate()
            .map(|(i, a)| (fold(&a.name), i))
            .collect();
        self.rel_index = self
            .relations
            .iter()
            .enumerate()
            .map(|(i, r)| (fold(&r.name), i))
            .collect();
    }
}

/// Port to the storage layer's metamodel.
pub trait Metamodel: Send + Sync {
    /// Case-insensitive lookup of an entity type by name.
    fn entity(&self, name: &str) -> Option<&EntityType>;
}

/// In-memory metamodel, typically deserialized from a TOML schema file.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    entities: Vec<EntityType>,
    index: HashMap<String, usize>,
}

#[derive(Deserialize)]
struct SchemaFile {
    #[serde(default, rename = "entity")]
    entities: Vec<EntityType>,
}

impl Schema {
    pub fn new(entities: Vec<EntityType>) -> Result<Self> {
        let mut index = HashMap::with_capacity(entities.len());
        let mut entities = entities;
        for (i, entity) in entities.iter_mut().enumerate() {
            entity.reindex();
            if index.insert(fold(&entity.name), i).is_some() {
                return Err(Error::schema(format!(
                    "duplicate entity type `{}`",
                    entity.name
                )));
            }
        }
        let schema = Self { entities, index };
        schema.validate()?;
        Ok(schema)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(text)?;
        Self::new(file.entities)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn entities(&self) -> &[EntityType] {
        &self.entities
    }

    /// Every relation target must exist and every identifier must name an
    /// attribute.
    fn validate(&self) -> Result<()> {
        for entity in &self.entities {
            if entity.id_attribute().is_none() {
                return Err(Error::schema(format!(
                    "identifier `{}` of `{}` is not an attribute",
                    entity.id, entity.name
                )));
            }
            for rel in entity.relations() {
                if self.entity(&rel.target).is_none() {
                    return Err(Error::schema(format!(
                        "relation `{}.{}` targets unknown type `{}`",
                        entity.name, rel.name, rel.target
                    )));
                }
                if !rel.external && (rel.local.is_empty() || rel.foreign.is_empty()) {
                    return Err(Error::schema(format!(
                        "relation `{}.{}` needs `local` and `foreign` join columns",
                        entity.name, rel.name
                    )));
                }
            }
        }
        Ok(())
    }
}

impl Metamodel for Schema {
    fn entity(&self, name: &str) -> Option<&EntityType> {
        self.index.get(&fold(name)).map(|&i| &self.entities[i])
    }
}

/// Case-folding used for every name lookup.
pub(crate) fn fold(name: &str) -> String {
    name.to_lowercase()
}
