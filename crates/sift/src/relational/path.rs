// crates/sift/src/relational/path.rs
//! Dotted attribute paths → column expressions plus the LEFT JOINs they need.

use crate::registry::MappingRegistry;
use crate::schema::{AttrType, EntityType, Metamodel};
use crate::{Error, Result};
use sea_query::{Alias, BinOper, Expr, SimpleExpr};

/// One LEFT JOIN introduced by a relation segment.
///
/// Rendered as `LEFT JOIN <table> AS <alias> ON <parent>.<local> = <alias>.<foreign>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub table: String,
    /// Relation path from the root, segments joined with `__`.
    pub alias: String,
    pub parent: String,
    pub local: String,
    pub foreign: String,
    pub collection: bool,
}

/// Joins in first-use order, deduplicated by alias.
#[derive(Debug, Clone, Default)]
pub(crate) struct JoinSet {
    joins: Vec<Join>,
}

impl JoinSet {
    pub fn add(&mut self, join: Join) {
        if !self.joins.iter().any(|j| j.alias == join.alias) {
            self.joins.push(join);
        }
    }

    pub fn extend(&mut self, other: JoinSet) {
        for join in other.joins {
            self.add(join);
        }
    }

    pub fn crosses_collection(&self) -> bool {
        self.joins.iter().any(|j| j.collection)
    }

    pub fn into_vec(self) -> Vec<Join> {
        self.joins
    }
}

/// Comparison target of a resolved path.
#[derive(Debug, Clone)]
pub(crate) struct Target {
    pub expr: SimpleExpr,
    pub ty: AttrType,
}

pub(crate) struct PathResolver<'a> {
    schema: &'a dyn Metamodel,
    registry: &'a MappingRegistry,
    root: &'a EntityType,
}

impl<'a> PathResolver<'a> {
    pub fn new(schema: &'a dyn Metamodel, registry: &'a MappingRegistry) -> Result<Self> {
        let root = schema
            .entity(registry.root())
            .ok_or_else(|| Error::UnknownClass(registry.root().to_string()))?;
        Ok(Self {
            schema,
            registry,
            root,
        })
    }

    pub fn root(&self) -> &'a EntityType {
        self.root
    }

    /// Resolve `path` from the root. Joins are only added to `joins` when the
    /// whole path resolves; `Ok(None)` means the path names nothing mappable.
    pub fn resolve(&self, path: &str, joins: &mut JoinSet) -> Result<Option<Target>> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut entity = self.root;
        let mut alias = self.root.table.clone();
        let mut prefix: Vec<&str> = Vec::new();
        let mut pending = JoinSet::default();

        for (i, segment) in segments.iter().enumerate() {
            let rest = &segments[i + 1..];

            if let Some(attr) = entity.attribute(segment) {
                let column: SimpleExpr =
                    Expr::col((Alias::new(alias.as_str()), Alias::new(attr.column()))).into();
                let target = if rest.is_empty() {
                    Target {
                        expr: column,
                        ty: attr.ty,
                    }
                } else if attr.structured {
                    Target {
                        expr: json_extract(column, rest, path)?,
                        ty: AttrType::Text,
                    }
                } else {
                    return Ok(None);
                };
                joins.extend(pending);
                return Ok(Some(target));
            }

            let Some(rel) = self.registry.relation(&entity.name, segment) else {
                return Ok(None);
            };
            let (Some(def), Some(next)) = (
                entity.relation(segment),
                self.schema.entity(&rel.target),
            ) else {
                return Ok(None);
            };

            prefix.push(rel.name.as_str());
            let next_alias = prefix.join("__");
            pending.add(Join {
                table: next.table.clone(),
                alias: next_alias.clone(),
                parent: alias,
                local: def.local.clone(),
                foreign: def.foreign.clone(),
                collection: rel.collection,
            });
            entity = next;
            alias = next_alias;
        }

        // Path ended on a relation: compare the related identifier.
        let Some(id) = entity.id_attribute() else {
            return Ok(None);
        };
        joins.extend(pending);
        Ok(Some(Target {
            expr: Expr::col((Alias::new(alias.as_str()), Alias::new(id.column()))).into(),
            ty: id.ty,
        }))
    }
}

/// `(col -> 'k1') ->> 'k2'`: intermediate keys yield documents, the last one
/// yields text. Both operators exist in PostgreSQL and SQLite.
fn json_extract(column: SimpleExpr, keys: &[&str], path: &str) -> Result<SimpleExpr> {
    let mut expr = column;
    for (i, key) in keys.iter().enumerate() {
        if key.is_empty() {
            return Err(Error::malformed(path, "empty key segment"));
        }
        let op = if i + 1 == keys.len() { "->>" } else { "->" };
        expr = SimpleExpr::Binary(
            Box::new(expr),
            BinOper::Custom(op),
            Box::new(Expr::val(key.to_string()).into()),
        );
    }
    Ok(expr)
}
