// crates/sift/src/settings.rs

use crate::Result;
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_LIMIT: u64 = 20;
pub const MAX_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PageSettings {
    /// Page size used when none (or an out-of-range one) is requested.
    pub default_limit: u64,
    pub max_limit: u64,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SortSettings {
    /// When false, textual sort keys are compared case-folded.
    pub case_sensitive: bool,
}

impl Default for SortSettings {
    fn default() -> Self {
        Self {
            case_sensitive: true,
        }
    }
}

/// Compiler settings, usually read from `settings.toml`:
///
/// ```toml
/// [paging]
/// default_limit = 20
/// max_limit = 100
///
/// [sort]
/// case_sensitive = false
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub paging: PageSettings,
    pub sort: SortSettings,
}

impl Settings {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}
