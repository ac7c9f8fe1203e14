// crates/sift/src/page.rs

use crate::settings::PageSettings;
use serde::Serialize;

/// Resolved pagination window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

impl Page {
    /// Apply the defaulting rules to a requested offset/limit:
    ///
    /// - offset missing or `<= 0` → 0
    /// - limit missing or `<= 0` → default limit
    /// - limit above the maximum → default limit (not clamped to the maximum)
    pub fn resolve(offset: Option<i64>, limit: Option<i64>, settings: &PageSettings) -> Self {
        let offset = match offset {
            Some(o) if o > 0 => o as u64,
            _ => 0,
        };
        let limit = match limit {
            Some(l) if l > 0 && (l as u64) <= settings.max_limit => l as u64,
            _ => settings.default_limit,
        };
        Self { offset, limit }
    }

    /// The slice of `items` this page covers.
    pub fn slice<'a, T>(&self, items: &'a [T]) -> &'a [T] {
        let start = usize::try_from(self.offset)
            .unwrap_or(usize::MAX)
            .min(items.len());
        let len = usize::try_from(self.limit).unwrap_or(usize::MAX);
        let end = start.saturating_add(len).min(items.len());
        &items[start..end]
    }
}
