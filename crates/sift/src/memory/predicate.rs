// crates/sift/src/memory/predicate.rs

use super::accessor::{text_of, PathAccessor};
use crate::relational::{DefaultValueParser, ValueParser};
use crate::schema::AttrType;
use crate::{Error, Result};
use regex::Regex;
use sea_query::Value;
use serde_json::Value as Json;
use std::fmt;

#[derive(Debug, Clone)]
pub(crate) enum Test {
    IsNull,
    NotNull,
    /// Typed filter value, compared with the record value coerced the same way.
    Eq(Value),
    Neq(Value),
    Matches(Regex),
}

#[derive(Debug, Clone)]
pub(crate) enum Node {
    /// No restriction.
    Always,
    Never,
    All(Vec<Node>),
    Any(Vec<Node>),
    Leaf(PathAccessor, Test),
}

/// Compiled boolean test over JSON records.
#[derive(Clone)]
pub struct Predicate<'p> {
    root: Node,
    values: &'p dyn ValueParser,
}

impl fmt::Debug for Predicate<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl<'p> Predicate<'p> {
    pub(crate) fn new(root: Node, values: &'p dyn ValueParser) -> Self {
        Self { root, values }
    }

    /// Predicate that accepts every record.
    pub fn always() -> Predicate<'static> {
        Predicate::new(Node::Always, &DefaultValueParser)
    }

    pub fn is_unrestricted(&self) -> bool {
        matches!(self.root, Node::Always)
    }

    pub fn test(&self, record: &Json) -> Result<bool> {
        self.eval(&self.root, record)
    }

    /// Records that pass, in input order.
    pub fn select<'r>(&self, records: &'r [Json]) -> Result<Vec<&'r Json>> {
        let mut out = Vec::new();
        for record in records {
            if self.test(record)? {
                out.push(record);
            }
        }
        Ok(out)
    }

    fn eval(&self, node: &Node, record: &Json) -> Result<bool> {
        match node {
            Node::Always => Ok(true),
            Node::Never => Ok(false),
            Node::All(children) => {
                for child in children {
                    if !self.eval(child, record)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Node::Any(children) => {
                for child in children {
                    if self.eval(child, record)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            // Any reached value satisfying the test is enough.
            Node::Leaf(accessor, test) => {
                let ty = accessor.ty();
                let values = accessor.values(record)?;
                Ok(values.iter().any(|v| match (test, v) {
                    (Test::IsNull, v) => v.is_none(),
                    (Test::NotNull, v) => v.is_some(),
                    (_, None) => false,
                    (Test::Eq(want), Some(v)) => self.stored(v, ty).as_ref() == Some(want),
                    (Test::Neq(want), Some(v)) => self.stored(v, ty).as_ref() != Some(want),
                    (Test::Matches(re), Some(v)) => re.is_match(&text_of(v)),
                }))
            }
        }
    }

    /// A record value as the storage column would hold it; `None` when it
    /// does not fit the column type.
    fn stored(&self, value: &Json, ty: AttrType) -> Option<Value> {
        self.values.parse(&text_of(value), ty).ok()
    }
}

/// Translate a LIKE pattern into an anchored regex: `%` is any run, `_` any
/// single character, `\` escapes the next character.
pub(crate) fn like_regex(pattern: &str, fold_case: bool) -> Result<Regex> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str(if fold_case { "(?is)^" } else { "(?s)^" });
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        match c {
            '%' => re.push_str(".*"),
            '_' => re.push('.'),
            '\\' => match chars.next() {
                Some(escaped) => re.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4]))),
                None => re.push_str(r"\\"),
            },
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re).map_err(|e| Error::invalid_filter(format!("pattern `{pattern}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_wildcards_translate() {
        let re = like_regex("He%o_", false).expect("regex");
        assert!(re.is_match("Hello!"));
        assert!(re.is_match("Heo!"));
        assert!(!re.is_match("hello!"));
        assert!(!re.is_match("Hello"));
    }

    #[test]
    fn like_escapes_and_regex_metacharacters_are_literal() {
        let re = like_regex(r"100\%.(x)", false).expect("regex");
        assert!(re.is_match("100%.(x)"));
        assert!(!re.is_match("100abc.(x)"));
        assert!(!re.is_match("100%a(x)"));
    }

    #[test]
    fn ilike_folds_case() {
        let re = like_regex("hello%", true).expect("regex");
        assert!(re.is_match("HeLLo world"));
    }

    #[test]
    fn always_and_never_nodes() {
        let record = serde_json::json!({});
        assert!(Predicate::always().test(&record).expect("eval"));
        let never = Predicate::new(Node::Never, &DefaultValueParser);
        assert!(!never.test(&record).expect("eval"));
        let all = Predicate::new(Node::All(vec![]), &DefaultValueParser);
        assert!(all.test(&record).expect("eval"));
        let any = Predicate::new(Node::Any(vec![]), &DefaultValueParser);
        assert!(!any.test(&record).expect("eval"));
    }
}
