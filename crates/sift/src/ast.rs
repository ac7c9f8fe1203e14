// crates/sift/src/ast.rs

use serde::{Serialize, Serializer};
use std::fmt;

/// Comparison operator carried by a [`FilterExpression`].
///
/// Tokens the language does not know are kept as `Unsupported` so that a
/// caller can decide whether to reject them (see `external::reject_unsupported`)
/// or let the compilers drop them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub enum Operator {
    #[default]
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Like,
    Ilike,
    Unsupported(String),
}

impl Operator {
    /// Map a textual token (case-insensitive) to an operator.
    pub fn from_token(token: &str) -> Self {
        match token.to_ascii_uppercase().as_str() {
            "EQ" => Operator::Eq,
            "NEQ" => Operator::Neq,
            "LT" => Operator::Lt,
            "LE" => Operator::Le,
            "GT" => Operator::Gt,
            "GE" => Operator::Ge,
            "LIKE" => Operator::Like,
            "ILIKE" => Operator::Ilike,
            _ => Operator::Unsupported(token.to_string()),
        }
    }

    pub fn token(&self) -> &str {
        match self {
            Operator::Eq => "EQ",
            Operator::Neq => "NEQ",
            Operator::Lt => "LT",
            Operator::Le => "LE",
            Operator::Gt => "GT",
            Operator::Ge => "GE",
            Operator::Like => "LIKE",
            Operator::Ilike => "ILIKE",
            Operator::Unsupported(t) => t,
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Operator::Unsupported(_))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl Serialize for Operator {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.token())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Conjunction {
    And,
    Or,
}

impl fmt::Display for Conjunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Conjunction::And => f.write_str("AND"),
            Conjunction::Or => f.write_str("OR"),
        }
    }
}

/// Leaf of the filter tree: `<attribute> <operator> <value>`.
///
/// `value == None` is an explicit null comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterExpression {
    attribute: String,
    operator: Operator,
    value: Option<String>,
}

impl FilterExpression {
    pub fn new(attribute: impl Into<String>, operator: Operator, value: Option<String>) -> Self {
        Self {
            attribute: attribute.into(),
            operator,
            value,
        }
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }
}

/// Inner node of the filter tree. Never holds exactly one child when built
/// through [`FilterComponent::group`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterGroup {
    conjunction: Conjunction,
    children: Vec<FilterComponent>,
}

impl FilterGroup {
    pub fn conjunction(&self) -> Conjunction {
        self.conjunction
    }

    pub fn children(&self) -> &[FilterComponent] {
        &self.children
    }
}

/// Filter tree:
/// - Expression(attr op value)
/// - Group(AND|OR, [...])
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FilterComponent {
    Expression(FilterExpression),
    Group(FilterGroup),
}

impl FilterComponent {
    /// Expression comparing `attribute` against a concrete value.
    pub fn expr(attribute: impl Into<String>, operator: Operator, value: impl Into<String>) -> Self {
        FilterComponent::Expression(FilterExpression::new(
            attribute,
            operator,
            Some(value.into()),
        ))
    }

    /// Expression comparing `attribute` against null.
    pub fn null_check(attribute: impl Into<String>, operator: Operator) -> Self {
        FilterComponent::Expression(FilterExpression::new(attribute, operator, None))
    }

    /// Build a group, collapsing a single child into itself.
    pub fn group(conjunction: Conjunction, mut children: Vec<FilterComponent>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        FilterComponent::Group(FilterGroup {
            conjunction,
            children,
        })
    }

    pub fn and(children: Vec<FilterComponent>) -> Self {
        Self::group(Conjunction::And, children)
    }

    pub fn or(children: Vec<FilterComponent>) -> Self {
        Self::group(Conjunction::Or, children)
    }

    pub fn as_expression(&self) -> Option<&FilterExpression> {
        match self {
            FilterComponent::Expression(e) => Some(e),
            FilterComponent::Group(_) => None,
        }
    }

    pub fn as_group(&self) -> Option<&FilterGroup> {
        match self {
            FilterComponent::Group(g) => Some(g),
            FilterComponent::Expression(_) => None,
        }
    }

    /// All leaf expressions, depth-first in child order.
    pub fn expressions(&self) -> Vec<&FilterExpression> {
        let mut out = Vec::new();
        collect_expressions(self, &mut out);
        out
    }
}

fn collect_expressions<'a>(node: &'a FilterComponent, out: &mut Vec<&'a FilterExpression>) {
    match node {
        FilterComponent::Expression(e) => out.push(e),
        FilterComponent::Group(g) => {
            for child in &g.children {
                collect_expressions(child, out);
            }
        }
    }
}

impl From<FilterExpression> for FilterComponent {
    fn from(e: FilterExpression) -> Self {
        FilterComponent::Expression(e)
    }
}

impl fmt::Display for FilterComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterComponent::Expression(e) => match &e.value {
                Some(v) => write!(f, "{} {} {:?}", e.attribute, e.operator, v),
                None => write!(f, "{} {} null", e.attribute, e.operator),
            },
            FilterComponent::Group(g) => {
                write!(f, "{}(", g.conjunction)?;
                for (i, child) in g.children.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{child}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Everything a query string carries: filters, includes, sorts and paging.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueryComponent {
    filters: Option<FilterComponent>,
    includes: Vec<String>,
    sorts: Vec<String>,
    page_offset: Option<i64>,
    page_limit: Option<i64>,
}

impl QueryComponent {
    pub fn new(
        filters: Option<FilterComponent>,
        includes: Vec<String>,
        sorts: Vec<String>,
        page_offset: Option<i64>,
        page_limit: Option<i64>,
    ) -> Self {
        Self {
            filters,
            includes,
            sorts,
            page_offset,
            page_limit,
        }
    }

    pub fn filters(&self) -> Option<&FilterComponent> {
        self.filters.as_ref()
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn sorts(&self) -> &[String] {
        &self.sorts
    }

    pub fn page_offset(&self) -> Option<i64> {
        self.page_offset
    }

    pub fn page_limit(&self) -> Option<i64> {
        self.page_limit
    }

    /// Same query with its filter tree replaced.
    pub fn with_filters(self, filters: Option<FilterComponent>) -> Self {
        Self { filters, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, to_value};

    // ─────────────────────────────────────────────────────────────────────
    // Operator tokens
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn operator_tokens_are_case_insensitive() {
        assert_eq!(Operator::from_token("eq"), Operator::Eq);
        assert_eq!(Operator::from_token("Neq"), Operator::Neq);
        assert_eq!(Operator::from_token("ILIKE"), Operator::Ilike);
        assert_eq!(Operator::from_token("ge").token(), "GE");
    }

    #[test]
    fn unknown_operator_token_becomes_unsupported_marker() {
        let op = Operator::from_token("BETWEEN");
        assert_eq!(op, Operator::Unsupported("BETWEEN".to_string()));
        assert!(!op.is_supported());
        assert_eq!(op.to_string(), "BETWEEN");
    }

    // ─────────────────────────────────────────────────────────────────────
    // Group construction
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn single_child_group_collapses_to_child() {
        let leaf = FilterComponent::expr("name", Operator::Eq, "a");
        let g = FilterComponent::or(vec![leaf.clone()]);
        assert_eq!(g, leaf);
        assert!(g.as_group().is_none());
    }

    #[test]
    fn multi_child_group_keeps_order_and_conjunction() {
        let g = FilterComponent::and(vec![
            FilterComponent::expr("a", Operator::Eq, "1"),
            FilterComponent::null_check("b", Operator::Neq),
        ]);
        let group = g.as_group().expect("expected a group");
        assert_eq!(group.conjunction(), Conjunction::And);
        assert_eq!(group.children().len(), 2);
        assert_eq!(
            group.children()[0].as_expression().map(|e| e.attribute()),
            Some("a")
        );
        assert_eq!(
            group.children()[1].as_expression().and_then(|e| e.value()),
            None
        );
    }

    #[test]
    fn expressions_are_listed_depth_first() {
        let tree = FilterComponent::and(vec![
            FilterComponent::expr("a", Operator::Eq, "1"),
            FilterComponent::or(vec![
                FilterComponent::expr("b", Operator::Eq, "2"),
                FilterComponent::expr("c", Operator::Eq, "3"),
            ]),
        ]);
        let attrs: Vec<&str> = tree.expressions().iter().map(|e| e.attribute()).collect();
        assert_eq!(attrs, vec!["a", "b", "c"]);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Display & serde
    // ─────────────────────────────────────────────────────────────────────

    #[test]
    fn display_renders_nested_tree() {
        let tree = FilterComponent::and(vec![
            FilterComponent::expr("name", Operator::Eq, "2"),
            FilterComponent::or(vec![
                FilterComponent::expr("position", Operator::Neq, "manager"),
                FilterComponent::null_check("position", Operator::Eq),
            ]),
        ]);
        assert_eq!(
            tree.to_string(),
            r#"AND(name EQ "2", OR(position NEQ "manager", position EQ null))"#
        );
    }

    #[test]
    fn serializes_with_kind_tag_and_operator_token() {
        let tree = FilterComponent::or(vec![
            FilterComponent::expr("a", Operator::Like, "x%"),
            FilterComponent::null_check("b", Operator::Eq),
        ]);
        let v = to_value(&tree).expect("serialize FilterComponent");
        assert_eq!(
            v,
            json!({
                "kind": "group",
                "conjunction": "OR",
                "children": [
                    { "kind": "expression", "attribute": "a", "operator": "LIKE", "value": "x%" },
                    { "kind": "expression", "attribute": "b", "operator": "EQ", "value": null }
                ]
            })
        );
    }

    #[test]
    fn query_component_default_is_empty() {
        let q = QueryComponent::default();
        assert!(q.filters().is_none());
        assert!(q.includes().is_empty());
        assert!(q.sorts().is_empty());
        assert_eq!(q.page_offset(), None);
        assert_eq!(q.page_limit(), None);
    }

    #[test]
    fn with_filters_replaces_only_the_tree() {
        let q = QueryComponent::new(None, vec!["author".into()], vec!["-name".into()], Some(1), Some(2));
        let q2 = q.with_filters(Some(FilterComponent::expr("a", Operator::Eq, "1")));
        assert!(q2.filters().is_some());
        assert_eq!(q2.includes(), ["author".to_string()]);
        assert_eq!(q2.sorts(), ["-name".to_string()]);
        assert_eq!(q2.page_offset(), Some(1));
        assert_eq!(q2.page_limit(), Some(2));
    }
}
