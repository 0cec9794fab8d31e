//! Column resolution: maps whatever headers the user's file carries onto the
//! canonical field keys via the alias table in [`crate::layout`].

use std::collections::BTreeMap;

use crate::error::{ConversionError, Result};
use crate::layout::{FieldKey, COLUMN_ALIASES};
use crate::types::{CanonicalRecord, RawRecord};

/// Resolved mapping from canonical key to input column index.
#[derive(Debug, Clone)]
pub struct SchemaMap {
    columns: BTreeMap<FieldKey, usize>,
}

impl SchemaMap {
    /// Resolves every canonical key against the input headers.
    ///
    /// All 21 keys are required: a file that cannot satisfy the full layout
    /// fails here, before any row is processed, with the complete list of
    /// unresolvable fields.
    pub fn resolve(headers: &[String]) -> Result<Self> {
        let normalized: Vec<String> = headers
            .iter()
            .map(|h| h.trim().to_lowercase())
            .collect();

        let mut columns = BTreeMap::new();
        let mut missing = Vec::new();

        for entry in COLUMN_ALIASES {
            let found = entry.aliases.iter().find_map(|alias| {
                normalized.iter().position(|header| header == alias)
            });
            match found {
                Some(index) => {
                    columns.insert(entry.key, index);
                }
                None => missing.push(entry.key.as_str().to_string()),
            }
        }

        if missing.is_empty() {
            Ok(Self { columns })
        } else {
            Err(ConversionError::Schema { missing })
        }
    }

    pub fn column_of(&self, key: FieldKey) -> Option<usize> {
        self.columns.get(&key).copied()
    }

    /// Re-keys a raw row by canonical field. Cells past the end of a short
    /// row simply come out blank.
    pub fn canonicalize(&self, record: &RawRecord) -> CanonicalRecord {
        let mut canonical = CanonicalRecord::default();
        for (key, index) in &self.columns {
            let value = record
                .cells
                .get(*index)
                .map(|(_, value)| value.clone())
                .unwrap_or_default();
            canonical.insert(*key, value);
        }
        canonical
    }
}
