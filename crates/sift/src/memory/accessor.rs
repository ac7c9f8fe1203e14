// crates/sift/src/memory/accessor.rs
//! Dotted paths compiled once into steps over a JSON record.

use crate::registry::MappingRegistry;
use crate::schema::{AttrType, EntityType, Metamodel};
use crate::{Error, Result};
use serde_json::Value as Json;
use smallvec::SmallVec;
use std::borrow::Cow;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    /// Follow a relation field; arrays fan out.
    Relation(String),
    Field(String),
    /// Key inside a structured document. The first key of a path may find
    /// the document still encoded as a JSON string.
    Key { key: String, decode: bool },
}

/// A resolved path: canonical field names, relation fan-out and structured
/// key lookups, in record order.
#[derive(Debug, Clone)]
pub struct PathAccessor {
    path: String,
    steps: SmallVec<[Step; 4]>,
    ty: AttrType,
    many: bool,
}

impl PathAccessor {
    /// `Ok(None)` when the path names nothing mappable from `root`.
    pub(crate) fn compile(
        schema: &dyn Metamodel,
        registry: &MappingRegistry,
        root: &EntityType,
        path: &str,
    ) -> Result<Option<Self>> {
        let segments: Vec<&str> = path.split('.').collect();
        let mut steps: SmallVec<[Step; 4]> = SmallVec::new();
        let mut entity = root;
        let mut many = false;

        for (i, segment) in segments.iter().enumerate() {
            let rest = &segments[i + 1..];

            if let Some(attr) = entity.attribute(segment) {
                steps.push(Step::Field(attr.name.clone()));
                if rest.is_empty() {
                    return Ok(Some(Self::new(path, steps, attr.ty, many)));
                }
                if !attr.structured {
                    return Ok(None);
                }
                for (k, key) in rest.iter().enumerate() {
                    if key.is_empty() {
                        return Err(Error::malformed(path, "empty key segment"));
                    }
                    steps.push(Step::Key {
                        key: key.to_string(),
                        decode: k == 0,
                    });
                }
                return Ok(Some(Self::new(path, steps, AttrType::Text, many)));
            }

            let Some(rel) = registry.relation(&entity.name, segment) else {
                return Ok(None);
            };
            let Some(next) = schema.entity(&rel.target) else {
                return Ok(None);
            };
            steps.push(Step::Relation(rel.name.clone()));
            many |= rel.collection;
            entity = next;
        }

        let Some(id) = entity.id_attribute() else {
            return Ok(None);
        };
        steps.push(Step::Field(id.name.clone()));
        Ok(Some(Self::new(path, steps, id.ty, many)))
    }

    fn new(path: &str, steps: SmallVec<[Step; 4]>, ty: AttrType, many: bool) -> Self {
        Self {
            path: path.to_string(),
            steps,
            ty,
            many,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Type of the resolved value; structured key lookups are text.
    pub fn ty(&self) -> AttrType {
        self.ty
    }

    /// The path follows a to-many relation and may reach several values.
    pub fn crosses_collection(&self) -> bool {
        self.many
    }

    /// Every value the path reaches in `record`, never empty.
    ///
    /// A missing field, a JSON null, a null relation and an empty collection
    /// all contribute a single `None`, like the row of a LEFT JOIN.
    pub fn values<'r>(&self, record: &'r Json) -> Result<Vec<Option<Cow<'r, Json>>>> {
        let mut frontier: Vec<Option<Cow<'r, Json>>> = vec![Some(Cow::Borrowed(record))];

        for step in &self.steps {
            let mut next = Vec::with_capacity(frontier.len());
            for item in frontier {
                let Some(item) = item else {
                    next.push(None);
                    continue;
                };
                match step {
                    Step::Relation(name) => match field(item, name) {
                        Some(Cow::Borrowed(Json::Array(items))) => fan_out(items, &mut next),
                        Some(Cow::Owned(Json::Array(items))) => {
                            if items.is_empty() {
                                next.push(None);
                            }
                            next.extend(items.into_iter().map(non_null).map(|v| v.map(Cow::Owned)));
                        }
                        other => next.push(other),
                    },
                    Step::Field(name) => next.push(field(item, name)),
                    Step::Key { key, decode } => {
                        let doc = if *decode { self.decode(item)? } else { item };
                        next.push(field(doc, key));
                    }
                }
            }
            frontier = next;
        }
        Ok(frontier)
    }

    /// A structured column may hold its document as JSON text.
    fn decode<'r>(&self, value: Cow<'r, Json>) -> Result<Cow<'r, Json>> {
        match value.as_ref() {
            Json::String(text) => serde_json::from_str::<Json>(text)
                .map(Cow::Owned)
                .map_err(|e| Error::malformed(&self.path, e.to_string())),
            _ => Ok(value),
        }
    }
}

fn fan_out<'r>(items: &'r [Json], out: &mut Vec<Option<Cow<'r, Json>>>) {
    if items.is_empty() {
        out.push(None);
        return;
    }
    out.extend(items.iter().map(|v| match v {
        Json::Null => None,
        v => Some(Cow::Borrowed(v)),
    }));
}

fn non_null(v: Json) -> Option<Json> {
    match v {
        Json::Null => None,
        v => Some(v),
    }
}

/// Object member lookup; null, missing and non-object parents are `None`.
fn field<'r>(value: Cow<'r, Json>, name: &str) -> Option<Cow<'r, Json>> {
    let child = match value {
        Cow::Borrowed(v) => v.get(name).map(Cow::Borrowed),
        Cow::Owned(Json::Object(mut map)) => map.remove(name).map(Cow::Owned),
        Cow::Owned(_) => None,
    };
    child.filter(|v| !v.is_null())
}

/// String form used for comparisons: strings as-is, everything else as JSON
/// text.
pub fn text_of(value: &Json) -> Cow<'_, str> {
    match value {
        Json::String(s) => Cow::Borrowed(s.as_str()),
        other => Cow::Owned(other.to_string()),
    }
}
