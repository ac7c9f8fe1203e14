// crates/sift/src/memory/mod.rs
//! The same filter/sort/page semantics as the relational compiler, evaluated
//! directly against JSON records.

mod accessor;
mod comparator;
mod predicate;

pub use accessor::PathAccessor;
pub use comparator::Comparator;
pub use predicate::Predicate;

use crate::ast::{Conjunction, FilterComponent, FilterExpression, Operator, QueryComponent};
use crate::page::Page;
use crate::parser::NULL_LITERAL;
use crate::registry::MappingRegistry;
use crate::relational::{DefaultValueParser, ValueParser};
use crate::schema::{EntityType, Metamodel};
use crate::settings::Settings;
use crate::{Error, Result};
use comparator::SortKey;
use predicate::{like_regex, Node, Test};
use serde_json::Value as Json;
use tracing::{debug, warn};

pub struct MemoryCompiler<'a> {
    schema: &'a dyn Metamodel,
    registry: &'a MappingRegistry,
    root: &'a EntityType,
    values: &'a dyn ValueParser,
    settings: Settings,
    case_sensitive: bool,
}

impl<'a> MemoryCompiler<'a> {
    pub fn new(
        schema: &'a dyn Metamodel,
        registry: &'a MappingRegistry,
        settings: Settings,
    ) -> Result<Self> {
        let root = schema
            .entity(registry.root())
            .ok_or_else(|| Error::UnknownClass(registry.root().to_string()))?;
        Ok(Self {
            schema,
            registry,
            root,
            values: &DefaultValueParser,
            case_sensitive: settings.sort.case_sensitive,
            settings,
        })
    }

    pub fn case_sensitive(mut self, yes: bool) -> Self {
        self.case_sensitive = yes;
        self
    }

    /// Coerce EQ/NEQ values with `values` instead of [`DefaultValueParser`].
    /// Use the parser the relational side uses so both select alike.
    pub fn value_parser(mut self, values: &'a dyn ValueParser) -> Self {
        self.values = values;
        self
    }

    pub fn compile_filter(&self, filter: Option<&FilterComponent>) -> Result<Predicate<'a>> {
        let root = match filter {
            Some(node) => self.node(node)?,
            None => Node::Always,
        };
        Ok(Predicate::new(root, self.values))
    }

    pub fn compile_sort<S: AsRef<str>>(&self, sorts: &[S]) -> Result<Comparator> {
        let keys = sorts
            .iter()
            .map(|key| {
                let key = key.as_ref();
                let (path, descending) = match key.strip_prefix('-') {
                    Some(rest) => (rest, true),
                    None => (key, false),
                };
                let accessor = self
                    .accessor(path)?
                    .ok_or_else(|| Error::unknown_attribute(self.root.name.clone(), path))?;
                if accessor.crosses_collection() {
                    return Err(Error::unsortable(self.root.name.clone(), path));
                }
                let fold_case = !self.case_sensitive && accessor.ty().is_textual();
                Ok(SortKey {
                    accessor,
                    descending,
                    fold_case,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Comparator::new(keys))
    }

    /// Filter, sort and page `records` as the query asks.
    pub fn execute<'r>(&self, query: &QueryComponent, records: &'r [Json]) -> Result<Vec<&'r Json>> {
        let predicate = self.compile_filter(query.filters())?;
        let comparator = self.compile_sort(query.sorts())?;
        let page = Page::resolve(query.page_offset(), query.page_limit(), &self.settings.paging);

        let mut selected = predicate.select(records)?;
        comparator.sort(&mut selected)?;
        Ok(page.slice(&selected).to_vec())
    }

    fn accessor(&self, path: &str) -> Result<Option<PathAccessor>> {
        PathAccessor::compile(self.schema, self.registry, self.root, path)
    }

    fn node(&self, node: &FilterComponent) -> Result<Node> {
        let group = match node {
            FilterComponent::Expression(e) => return self.leaf(e),
            FilterComponent::Group(g) => g,
        };
        let children = group
            .children()
            .iter()
            .map(|c| self.node(c))
            .collect::<Result<Vec<_>>>()?;

        Ok(match group.conjunction() {
            Conjunction::And => {
                let children: Vec<Node> = children
                    .into_iter()
                    .filter(|c| !matches!(c, Node::Always))
                    .collect();
                if children.is_empty() {
                    Node::Always
                } else {
                    Node::All(children)
                }
            }
            Conjunction::Or if children.is_empty() => Node::Never,
            Conjunction::Or if children.iter().any(|c| matches!(c, Node::Always)) => Node::Always,
            Conjunction::Or => Node::Any(children),
        })
    }

    fn leaf(&self, e: &FilterExpression) -> Result<Node> {
        let value = e.value().filter(|v| *v != NULL_LITERAL);
        let op = e.operator();

        let supported = match value {
            None => matches!(op, Operator::Eq | Operator::Like | Operator::Neq),
            Some(_) => matches!(
                op,
                Operator::Eq | Operator::Neq | Operator::Like | Operator::Ilike
            ),
        };
        if !supported {
            warn!(
                attribute = e.attribute(),
                operator = %op,
                null = value.is_none(),
                "dropping filter with unsupported operator"
            );
            return Ok(Node::Always);
        }

        let Some(accessor) = self.accessor(e.attribute())? else {
            debug!(
                class = %self.root.name,
                attribute = e.attribute(),
                "filter attribute does not resolve, no restriction"
            );
            return Ok(Node::Always);
        };

        let test = match (value, op) {
            (None, Operator::Neq) => Test::NotNull,
            (None, _) => Test::IsNull,
            (Some(raw), Operator::Like) => Test::Matches(like_regex(raw, false)?),
            (Some(raw), Operator::Ilike) => Test::Matches(like_regex(raw, true)?),
            (Some(raw), _) => match self.values.parse(raw, accessor.ty()) {
                Ok(want) if *op == Operator::Neq => Test::Neq(want),
                Ok(want) => Test::Eq(want),
                Err(err) => {
                    warn!(
                        attribute = e.attribute(),
                        value = raw,
                        error = %err,
                        "filter value does not coerce"
                    );
                    if *op == Operator::Neq {
                        Test::NotNull
                    } else {
                        return Ok(Node::Never);
                    }
                }
            },
        };
        Ok(Node::Leaf(accessor, test))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::schema::fixtures;
    use serde_json::json;

    fn records() -> Vec<Json> {
        vec![
            json!({ "id": 1, "title": "alpha", "views": 10,
                    "author": { "id": 1, "name": "Ann", "employer": { "id": 1, "name": "Acme" } },
                    "comments": [ { "id": 1, "body": "great" }, { "id": 2, "body": "meh" } ],
                    "meta": { "seo": { "title": "Home" } } }),
            json!({ "id": 2, "title": "Beta", "views": 5,
                    "author": { "id": 2, "name": "Bob", "employer": null },
                    "comments": [],
                    "meta": "{\"seo\": {\"title\": \"About\"}}" }),
            json!({ "id": 3, "title": null, "views": 7, "author": null,
                    "comments": [ { "id": 3, "body": "great" } ] }),
            json!({ "id": 4, "title": "gamma", "views": null,
                    "author": { "id": 1, "name": "Ann", "employer": { "id": 1, "name": "Acme" } } }),
        ]
    }

    fn ids(query: &str) -> Vec<i64> {
        ids_with(query, true)
    }

    fn ids_with(query: &str, case_sensitive: bool) -> Vec<i64> {
        let schema = fixtures::blog();
        let registry = MappingRegistry::build(&schema, "Article").expect("registry");
        let compiler = MemoryCompiler::new(&schema, &registry, Settings::default())
            .expect("compiler")
            .case_sensitive(case_sensitive);
        let q = parse(query).expect("query parses");
        let data = records();
        compiler
            .execute(&q, &data)
            .expect("execute")
            .into_iter()
            .map(|r| r["id"].as_i64().expect("id"))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────
    // Filters
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn null_policy_matches_relational_semantics() {
        assert_eq!(ids("filter[title]=null"), vec![3]);
        assert_eq!(ids("filter[title][NEQ]=null"), vec![1, 2, 4]);
        assert_eq!(ids("filter[title][LIKE]=null"), vec![3]);
        assert_eq!(ids("filter[title][GT]=null"), vec![1, 2, 3, 4]);
    }

    #[test]
    fn eq_and_neq_compare_typed_values() {
        assert_eq!(ids("filter[views]=10"), vec![1]);
        assert_eq!(ids("filter[views]=010"), vec![1]);
        assert_eq!(ids("filter[views]= 10"), vec![1]);
        assert_eq!(ids("filter[title]=alpha"), vec![1]);
        assert_eq!(ids("filter[title]= alpha"), Vec::<i64>::new());
        // nulls are not "different from" a value
        assert_eq!(ids("filter[views][NEQ]=10"), vec![2, 3]);
        assert_eq!(ids("filter[views][NEQ]=010"), vec![2, 3]);
    }

    #[test]
    fn uncoercible_values_restrict_like_the_relational_side() {
        assert_eq!(ids("filter[views]=ten"), Vec::<i64>::new());
        assert_eq!(ids("filter[views][NEQ]=ten"), vec![1, 2, 3]);
        // the OR keeps its other branch
        assert_eq!(ids("filter[views]=ten,5"), vec![2]);
    }

    #[test]
    fn custom_value_parser_coerces_both_sides() {
        let mut values = crate::relational::MockValueParser::new();
        values
            .expect_parse()
            .returning(|raw, _| Ok(sea_query::Value::from(raw.trim().to_lowercase())));

        let schema = fixtures::blog();
        let registry = MappingRegistry::build(&schema, "Article").expect("registry");
        let compiler = MemoryCompiler::new(&schema, &registry, Settings::default())
            .expect("compiler")
            .value_parser(&values);
        let q = parse("filter[title]=BETA").expect("query parses");
        let data = records();
        let got: Vec<i64> = compiler
            .execute(&q, &data)
            .expect("execute")
            .into_iter()
            .map(|r| r["id"].as_i64().expect("id"))
            .collect();
        assert_eq!(got, vec![2]);
    }

    #[test]
    fn like_and_ilike() {
        assert_eq!(ids("filter[title][LIKE]=%a"), vec![1, 2, 4]);
        assert_eq!(ids("filter[title][LIKE]=b%"), Vec::<i64>::new());
        assert_eq!(ids("filter[title][ILIKE]=b%"), vec![2]);
        assert_eq!(ids(r"filter[title][LIKE]=alph\_"), Vec::<i64>::new());
        assert_eq!(ids(r"filter[title][LIKE]=alph_"), vec![1]);
    }

    #[test]
    fn unsupported_operators_and_unknown_paths_do_not_restrict() {
        assert_eq!(ids("filter[views][GT]=6"), vec![1, 2, 3, 4]);
        assert_eq!(ids("filter[nope]=x"), vec![1, 2, 3, 4]);
        // dropped child widens the OR
        assert_eq!(ids("filter[views]=10&filter[nope]=x,y"), vec![1]);
    }

    #[test]
    fn relation_paths_match_any_element() {
        assert_eq!(ids("filter[author.name]=Ann"), vec![1, 4]);
        assert_eq!(ids("filter[comments.body]=great"), vec![1, 3]);
        assert_eq!(ids("filter[author.employer.name]=null"), vec![2, 3]);
        assert_eq!(ids("filter[comments.body]=null"), vec![2, 4]);
        assert_eq!(ids("filter[author]=2"), vec![2]);
    }

    #[test]
    fn structured_keys_match_objects_and_encoded_text() {
        assert_eq!(ids("filter[meta.seo.title]=Home"), vec![1]);
        assert_eq!(ids("filter[meta.seo.title]=About"), vec![2]);
        assert_eq!(ids("filter[meta.seo.title]=null"), vec![3, 4]);
    }

    #[test]
    fn multiple_values_or_and_clauses_and() {
        assert_eq!(ids("filter[title]=alpha,gamma"), vec![1, 4]);
        assert_eq!(ids("filter[title]=alpha,gamma&filter[views]=10"), vec![1]);
    }

    // ─────────────────────────────────────────────────────────────
    // Sorting
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn nulls_sort_last_in_both_directions() {
        assert_eq!(ids("sort=views"), vec![2, 3, 1, 4]);
        assert_eq!(ids("sort=-views"), vec![1, 3, 2, 4]);
        assert_eq!(ids("sort=title"), vec![2, 1, 4, 3]);
        assert_eq!(ids("sort=-title"), vec![4, 1, 2, 3]);
    }

    #[test]
    fn case_insensitive_sort_folds_text() {
        assert_eq!(ids_with("sort=title", false), vec![1, 2, 4, 3]);
    }

    #[test]
    fn sort_keys_chain() {
        assert_eq!(ids("sort=author.name,-id"), vec![4, 1, 2, 3]);
    }

    #[test]
    fn unknown_sort_key_is_an_error() {
        let schema = fixtures::blog();
        let registry = MappingRegistry::build(&schema, "Article").expect("registry");
        let compiler = MemoryCompiler::new(&schema, &registry, Settings::default()).expect("compiler");
        let err = compiler.compile_sort(&["-missing"]).unwrap_err();
        assert!(matches!(err, Error::UnknownAttribute { ref path, .. } if path == "missing"));
    }

    #[test]
    fn sort_through_a_collection_is_rejected() {
        let schema = fixtures::blog();
        let registry = MappingRegistry::build(&schema, "Article").expect("registry");
        let compiler = MemoryCompiler::new(&schema, &registry, Settings::default()).expect("compiler");
        let err = compiler.compile_sort(&["comments.body"]).unwrap_err();
        assert!(matches!(err, Error::Unsortable { ref path, .. } if path == "comments.body"));
        assert!(compiler.compile_sort(&["author.employer.name"]).is_ok());
    }

    #[test]
    fn comparator_compares_pairs() {
        let schema = fixtures::blog();
        let registry = MappingRegistry::build(&schema, "Article").expect("registry");
        let compiler = MemoryCompiler::new(&schema, &registry, Settings::default()).expect("compiler");
        let cmp = compiler.compile_sort(&["views"]).expect("comparator");
        let data = records();
        assert_eq!(
            cmp.compare(&data[1], &data[0]).expect("compare"),
            std::cmp::Ordering::Less
        );
        assert_eq!(
            cmp.compare(&data[3], &data[0]).expect("compare"),
            std::cmp::Ordering::Greater
        );
    }

    // ─────────────────────────────────────────────────────────────
    // Paging
    // ─────────────────────────────────────────────────────────────

    #[test]
    fn paging_slices_after_sorting() {
        assert_eq!(ids("sort=id&page[offset]=1&page[limit]=2"), vec![2, 3]);
        assert_eq!(ids("sort=id&page[offset]=10"), Vec::<i64>::new());
        assert_eq!(ids("sort=id&page[limit]=0"), vec![1, 2, 3, 4]);
    }

    #[test]
    fn malformed_structured_value_fails_evaluation() {
        let schema = fixtures::blog();
        let registry = MappingRegistry::build(&schema, "Article").expect("registry");
        let compiler = MemoryCompiler::new(&schema, &registry, Settings::default()).expect("compiler");
        let q = parse("filter[meta.seo]=x").expect("parse");
        let data = vec![json!({ "id": 1, "meta": "{broken" })];
        let err = compiler.execute(&q, &data).unwrap_err();
        assert!(matches!(err, Error::MalformedStructured { .. }));
    }
}
