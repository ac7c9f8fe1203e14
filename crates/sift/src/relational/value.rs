// crates/sift/src/relational/value.rs

use crate::schema::AttrType;
use crate::{Error, Result};
use sea_query::Value;

/// Coerces a raw filter value into a typed bind value for the storage column.
///
/// The null literal is handled by the compiler and never reaches a parser.
#[cfg_attr(test, mockall::automock)]
pub trait ValueParser: Send + Sync {
    fn parse(&self, raw: &str, ty: AttrType) -> Result<Value>;
}

/// Parser used when the caller does not bring its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultValueParser;

impl ValueParser for DefaultValueParser {
    fn parse(&self, raw: &str, ty: AttrType) -> Result<Value> {
        let invalid = || Error::InvalidValue {
            raw: raw.to_string(),
            ty,
        };
        let value = match ty {
            AttrType::Text | AttrType::Json => Value::from(raw.to_string()),
            AttrType::Integer => Value::from(raw.trim().parse::<i64>().map_err(|_| invalid())?),
            AttrType::Float => Value::from(raw.trim().parse::<f64>().map_err(|_| invalid())?),
            AttrType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" => Value::from(true),
                "false" => Value::from(false),
                _ => return Err(invalid()),
            },
            // Validated, then bound as text exactly as given.
            AttrType::Uuid => {
                uuid::Uuid::parse_str(raw.trim()).map_err(|_| invalid())?;
                Value::from(raw.to_string())
            }
            AttrType::Timestamp => {
                parse_timestamp(raw.trim()).ok_or_else(invalid)?;
                Value::from(raw.to_string())
            }
        };
        Ok(value)
    }
}

fn parse_timestamp(raw: &str) -> Option<chrono::NaiveDateTime> {
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Some(dt);
    }
    chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}
