// crates/sift/src/external.rs
//! Mongo-style JSON filter documents → filter trees.
//!
//! ```json
//! { "title": "Home", "views": { "$ne": null }, "$or": [ { "author.name": "Ann" } ] }
//! ```

use crate::ast::{FilterComponent, FilterExpression, Operator, QueryComponent};
use crate::{Error, Result};
use serde_json::Value as Json;

/// Parse a filter document. An empty document yields `None`.
pub fn parse_filter(json: &Json) -> Result<Option<FilterComponent>> {
    let map = json
        .as_object()
        .ok_or_else(|| Error::invalid_filter("top-level filter must be an object"))?;

    let mut filters = Vec::with_capacity(map.len());
    for (key, value) in map {
        match key.as_str() {
            "$and" => filters.push(FilterComponent::and(parse_list("$and", value)?)),
            "$or" => filters.push(FilterComponent::or(parse_list("$or", value)?)),
            k if k.starts_with('$') => return Err(Error::UnsupportedOperator(k.to_string())),
            field => filters.push(parse_field(field, value)?),
        }
    }

    Ok(match filters.len() {
        0 => None,
        _ => Some(FilterComponent::and(filters)),
    })
}

/// `$and`/`$or` take an array of filter documents. An empty document
/// matches everything and becomes an empty AND.
fn parse_list(op: &str, value: &Json) -> Result<Vec<FilterComponent>> {
    let items = value
        .as_array()
        .ok_or_else(|| Error::invalid_filter(format!("{op} value must be an array")))?;
    items
        .iter()
        .map(|item| Ok(parse_filter(item)?.unwrap_or_else(|| FilterComponent::and(Vec::new()))))
        .collect()
}

fn parse_field(path: &str, value: &Json) -> Result<FilterComponent> {
    // { field: scalar } → Eq
    let Some(ops) = value.as_object() else {
        return Ok(leaf(path, Operator::Eq, scalar(path, value)?));
    };
    if ops.is_empty() {
        return Err(Error::invalid_filter(format!(
            "empty operator object for field {path}"
        )));
    }

    let mut parts = Vec::with_capacity(ops.len());
    for (op, arg) in ops {
        parts.push(parse_op(path, op, arg)?);
    }
    Ok(FilterComponent::and(parts))
}

fn parse_op(path: &str, op: &str, arg: &Json) -> Result<FilterComponent> {
    let simple = match op {
        "$eq" => Operator::Eq,
        "$ne" => Operator::Neq,
        "$lt" => Operator::Lt,
        "$lte" => Operator::Le,
        "$gt" => Operator::Gt,
        "$gte" => Operator::Ge,
        "$like" => Operator::Like,
        "$ilike" => Operator::Ilike,
        "$in" | "$nin" => {
            let items = arg
                .as_array()
                .ok_or_else(|| Error::invalid_filter(format!("{op} expects an array")))?;
            let is_in = op == "$in";
            let operator = if is_in { Operator::Eq } else { Operator::Neq };
            let children = items
                .iter()
                .map(|v| Ok(leaf(path, operator.clone(), scalar(path, v)?)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(if is_in {
                FilterComponent::or(children)
            } else {
                FilterComponent::and(children)
            });
        }
        "$exists" => {
            let exists = arg
                .as_bool()
                .ok_or_else(|| Error::invalid_filter("$exists expects a boolean"))?;
            let operator = if exists { Operator::Neq } else { Operator::Eq };
            return Ok(FilterComponent::null_check(path, operator));
        }
        other => return Err(Error::UnsupportedOperator(other.to_string())),
    };
    Ok(leaf(path, simple, scalar(path, arg)?))
}

fn leaf(path: &str, operator: Operator, value: Option<String>) -> FilterComponent {
    FilterComponent::from(FilterExpression::new(path, operator, value))
}

/// Scalar argument as filter text; JSON null is a null comparison.
fn scalar(path: &str, value: &Json) -> Result<Option<String>> {
    match value {
        Json::Null => Ok(None),
        Json::String(s) => Ok(Some(s.clone())),
        Json::Bool(_) | Json::Number(_) => Ok(Some(value.to_string())),
        _ => Err(Error::invalid_filter(format!(
            "value for {path} must be a scalar"
        ))),
    }
}

/// Fail on any operator the compilers do not understand.
pub fn reject_unsupported(tree: &FilterComponent) -> Result<()> {
    match tree
        .expressions()
        .into_iter()
        .find(|e| !e.operator().is_supported())
    {
        Some(e) => Err(Error::UnsupportedOperator(e.operator().to_string())),
        None => Ok(()),
    }
}

/// Filter document plus find options into a query:
///
/// ```json
/// { "sort": { "title": 1, "views": -1 }, "limit": 10, "skip": 5 }
/// ```
pub fn parse_query(filter: &Json, options: &Json) -> Result<QueryComponent> {
    let filters = parse_filter(filter)?;
    let Some(opts) = options.as_object() else {
        return Ok(QueryComponent::default().with_filters(filters));
    };

    let mut sorts = Vec::new();
    if let Some(sort) = opts.get("sort") {
        let sort = sort
            .as_object()
            .ok_or_else(|| Error::invalid_filter("sort must be an object"))?;
        for (field, dir) in sort {
            match dir.as_i64() {
                Some(1) => sorts.push(field.clone()),
                Some(-1) => sorts.push(format!("-{field}")),
                _ => {
                    return Err(Error::invalid_filter(format!(
                        "sort direction for {field} must be 1 or -1"
                    )))
                }
            }
        }
    }

    let int = |name: &str| -> Result<Option<i64>> {
        match opts.get(name) {
            None | Some(Json::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| Error::invalid_filter(format!("{name} must be an integer"))),
        }
    };

    Ok(QueryComponent::new(
        filters,
        Vec::new(),
        sorts,
        int("skip")?,
        int("limit")?,
    ))
}
