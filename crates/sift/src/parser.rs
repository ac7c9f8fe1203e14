// crates/sift/src/parser.rs
//! Query-string parser.
//!
//! Grammar (clauses separated by `&`):
//!
//! ```text
//! filter[<dotted-attr>][<OP>]=<v1>[,<v2>,...]
//! include=<dotted-path>[,<dotted-path>,...]
//! sort=<[-]attr>[,<[-]attr>,...]
//! page[offset]=<non-negative integer>
//! page[limit]=<positive integer>
//! ```
//!
//! The parser makes a single pass over the clauses and assembles the
//! immutable [`QueryComponent`] directly.

use crate::ast::{FilterComponent, FilterExpression, Operator, QueryComponent};
use crate::{Error, Result};
use regex::Regex;
use std::sync::LazyLock;

static FILTER_KEY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^filter\[(?P<attr>[^\[\]]*)\](?:\[(?P<op>[^\[\]]*)\])?$").unwrap()
});

static DOTTED_PATH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z_][A-Za-z0-9_]*)*$").unwrap());

static OPERATOR_TOKEN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z]+$").unwrap());

static INTEGER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[0-9]+$").unwrap());

/// Literal value that stands for an explicit null comparison.
pub const NULL_LITERAL: &str = "null";

/// Parse raw query text into a [`QueryComponent`].
///
/// An empty string yields an empty component. Any grammar mismatch is
/// reported as [`Error::Syntax`] with the byte offset of the offending token.
pub fn parse(text: &str) -> Result<QueryComponent> {
    if text.is_empty() {
        return Ok(QueryComponent::default());
    }

    let mut filters: Vec<FilterComponent> = Vec::new();
    let mut includes: Vec<String> = Vec::new();
    let mut sorts: Vec<String> = Vec::new();
    let mut page_offset: Option<i64> = None;
    let mut page_limit: Option<i64> = None;

    let mut offset = 0usize;
    for clause in text.split('&') {
        let start = offset;
        offset += clause.len() + 1;

        if clause.is_empty() {
            return Err(Error::syntax(start, "empty clause"));
        }
        let (key, raw_values) = clause
            .split_once('=')
            .ok_or_else(|| Error::syntax(start, format!("expected `=` in clause `{clause}`")))?;
        let values_at = start + key.len() + 1;

        match key {
            "include" => {
                for (at, path) in split_values(raw_values, values_at)? {
                    includes.push(dotted_path(path, at)?.to_string());
                }
            }
            "sort" => {
                for (at, key) in split_values(raw_values, values_at)? {
                    let path = key.strip_prefix('-').unwrap_or(key);
                    let path_at = at + (key.len() - path.len());
                    dotted_path(path, path_at)?;
                    sorts.push(key.to_string());
                }
            }
            "page[offset]" => page_offset = Some(integer(raw_values, values_at)?),
            "page[limit]" => page_limit = Some(integer(raw_values, values_at)?),
            _ => filters.push(filter_clause(key, raw_values, start, values_at)?),
        }
    }

    let filters = match filters.len() {
        0 => None,
        _ => Some(FilterComponent::and(filters)),
    };

    Ok(QueryComponent::new(
        filters,
        includes,
        sorts,
        page_offset,
        page_limit,
    ))
}

/// One `filter[..][..]=..` clause: a single expression, or an OR over the
/// comma-separated values.
fn filter_clause(
    key: &str,
    raw_values: &str,
    key_at: usize,
    values_at: usize,
) -> Result<FilterComponent> {
    let caps = FILTER_KEY
        .captures(key)
        .ok_or_else(|| Error::syntax(key_at, format!("unrecognized clause `{key}`")))?;

    // "filter[" is 7 bytes
    let attr_at = key_at + 7;
    let attribute = dotted_path(&caps["attr"], attr_at)?;

    let operator = match caps.name("op") {
        None => Operator::Eq,
        Some(op) => {
            if !OPERATOR_TOKEN.is_match(op.as_str()) {
                return Err(Error::syntax(
                    key_at + op.start(),
                    format!("invalid operator token `{}`", op.as_str()),
                ));
            }
            Operator::from_token(op.as_str())
        }
    };

    let children = split_values(raw_values, values_at)?
        .into_iter()
        .map(|(_, v)| {
            let value = (v != NULL_LITERAL).then(|| v.to_string());
            FilterComponent::from(FilterExpression::new(attribute, operator.clone(), value))
        })
        .collect();

    Ok(FilterComponent::or(children))
}

/// Split a comma-separated value list, keeping the byte offset of each item.
fn split_values(raw: &str, at: usize) -> Result<Vec<(usize, &str)>> {
    let mut out = Vec::new();
    let mut pos = at;
    for item in raw.split(',') {
        if item.is_empty() {
            return Err(Error::syntax(pos, "empty value"));
        }
        out.push((pos, item));
        pos += item.len() + 1;
    }
    Ok(out)
}

fn dotted_path(path: &str, at: usize) -> Result<&str> {
    if DOTTED_PATH.is_match(path) {
        Ok(path)
    } else {
        Err(Error::syntax(at, format!("invalid attribute path `{path}`")))
    }
}

fn integer(raw: &str, at: usize) -> Result<i64> {
    if !INTEGER.is_match(raw) {
        return Err(Error::syntax(at, format!("expected an integer, got `{raw}`")));
    }
    raw.parse::<i64>()
        .map_err(|e| Error::syntax(at, format!("integer `{raw}` out of range: {e}")))
}
