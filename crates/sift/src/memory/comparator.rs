// crates/sift/src/memory/comparator.rs

use super::accessor::PathAccessor;
use crate::Result;
use serde_json::Value as Json;
use std::cmp::Ordering;

#[derive(Debug, Clone)]
pub(crate) struct SortKey {
    pub accessor: PathAccessor,
    pub descending: bool,
    pub fold_case: bool,
}

/// Sort value extracted from a record. Nulls are handled outside `Ord`.
#[derive(Debug, Clone, PartialEq)]
enum Key {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Key {
    fn rank(&self) -> u8 {
        match self {
            Key::Bool(_) => 0,
            Key::Number(_) => 1,
            Key::Text(_) => 2,
        }
    }

    fn compare(&self, other: &Key) -> Ordering {
        match (self, other) {
            (Key::Bool(a), Key::Bool(b)) => a.cmp(b),
            (Key::Number(a), Key::Number(b)) => a.total_cmp(b),
            (Key::Text(a), Key::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

/// Chained record ordering over one or more sort keys.
///
/// Nulls sort last for every key, whatever its direction.
#[derive(Debug, Clone, Default)]
pub struct Comparator {
    keys: Vec<SortKey>,
}

impl Comparator {
    pub(crate) fn new(keys: Vec<SortKey>) -> Self {
        Self { keys }
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn compare(&self, a: &Json, b: &Json) -> Result<Ordering> {
        Ok(self.compare_keys(&self.extract(a)?, &self.extract(b)?))
    }

    /// Stable sort; every record's keys are extracted once.
    pub fn sort<'r>(&self, records: &mut Vec<&'r Json>) -> Result<()> {
        if self.keys.is_empty() {
            return Ok(());
        }
        let mut keyed = records
            .iter()
            .map(|r| Ok((self.extract(r)?, *r)))
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| self.compare_keys(a, b));
        *records = keyed.into_iter().map(|(_, r)| r).collect();
        Ok(())
    }

    fn extract(&self, record: &Json) -> Result<Vec<Option<Key>>> {
        self.keys
            .iter()
            .map(|k| {
                // Sort paths are single-valued; take the first non-null.
                let values = k.accessor.values(record)?;
                Ok(values
                    .into_iter()
                    .flatten()
                    .find_map(|v| key_of(&v, k.fold_case)))
            })
            .collect()
    }

    fn compare_keys(&self, a: &[Option<Key>], b: &[Option<Key>]) -> Ordering {
        for (i, key) in self.keys.iter().enumerate() {
            let ord = match (&a[i], &b[i]) {
                (None, None) => Ordering::Equal,
                (None, Some(_)) => Ordering::Greater,
                (Some(_), None) => Ordering::Less,
                (Some(x), Some(y)) if key.descending => y.compare(x),
                (Some(x), Some(y)) => x.compare(y),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

fn key_of(value: &Json, fold_case: bool) -> Option<Key> {
    match value {
        Json::Null => None,
        Json::Bool(b) => Some(Key::Bool(*b)),
        Json::Number(n) => n.as_f64().map(Key::Number),
        Json::String(s) if fold_case => Some(Key::Text(s.to_lowercase())),
        Json::String(s) => Some(Key::Text(s.clone())),
        other => Some(Key::Text(other.to_string())),
    }
}
