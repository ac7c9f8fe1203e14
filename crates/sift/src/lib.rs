pub mod ast;
pub mod external;
pub mod memory;
pub mod mutate;
pub mod page;
pub mod parser;
pub mod registry;
pub mod relational;
pub mod schema;
pub mod settings;

pub use ast::{Conjunction, FilterComponent, FilterExpression, FilterGroup, Operator, QueryComponent};
pub use memory::{Comparator, MemoryCompiler, PathAccessor, Predicate};
pub use mutate::{mutate, restrict};
pub use page::Page;
pub use parser::parse;
pub use registry::{MappingRegistry, RegistryCache};
pub use relational::{DefaultValueParser, Join, RelationalCompiler, RelationalQuery, ValueParser};
pub use schema::{AttrType, Attribute, EntityType, Metamodel, Relation, Schema};
pub use settings::{PageSettings, Settings, SortSettings};

use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("syntax error at offset {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("unknown attribute `{path}` on `{class}`")]
    UnknownAttribute { class: String, path: String },

    /// A sort key with more than one value per record.
    #[error("sort key `{path}` on `{class}` crosses a to-many relation")]
    Unsortable { class: String, path: String },

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// A structured column value (or the key path into it) could not be
    /// interpreted as a keyed document.
    #[error("malformed structured value at `{path}`: {reason}")]
    MalformedStructured { path: String, reason: String },

    #[error("unknown resource type: {0}")]
    UnknownClass(String),

    #[error("invalid {ty} value `{raw}`")]
    InvalidValue { raw: String, ty: AttrType },

    #[error("invalid filter: {0}")]
    InvalidFilter(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    #[inline]
    pub fn syntax(offset: usize, msg: impl Into<String>) -> Self {
        Error::Syntax {
            offset,
            message: msg.into(),
        }
    }

    #[inline]
    pub fn unknown_attribute(class: impl Into<String>, path: impl Into<String>) -> Self {
        Error::UnknownAttribute {
            class: class.into(),
            path: path.into(),
        }
    }

    #[inline]
    pub fn unsortable(class: impl Into<String>, path: impl Into<String>) -> Self {
        Error::Unsortable {
            class: class.into(),
            path: path.into(),
        }
    }

    #[inline]
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::MalformedStructured {
            path: path.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        Error::InvalidFilter(msg.into())
    }

    #[inline]
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }
}
