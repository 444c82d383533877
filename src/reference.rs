//! Reference set of known group identifiers.
//!
//! Identifiers listed here are allowed traffic and never classified.

use std::collections::BTreeSet;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::capture::parse_hex_u32;
use crate::error::LoadError;
use crate::ingest::{load_rows, TableRow};

/// Deduplicated, immutable set of reference identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupIdentifierSet {
    ids: BTreeSet<u32>,
}

impl GroupIdentifierSet {
    pub fn contains(&self, id: u32) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Iterates in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = u32> + '_ {
        self.ids.iter().copied()
    }
}

impl FromIterator<u32> for GroupIdentifierSet {
    fn from_iter<I: IntoIterator<Item = u32>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Loads the reference set from every row of the spreadsheet at `path`.
pub fn load_reference(path: &Path, member: &str) -> Result<GroupIdentifierSet, LoadError> {
    info!(path = %path.display(), "Loading reference identifiers");

    let rows = load_rows(path, member)?;
    let set = reference_from_rows(&rows)?;

    if set.is_empty() {
        warn!(path = %path.display(), "Reference set is empty, no identifier is excluded");
    } else {
        info!(identifiers = set.len(), "Reference set loaded");
    }
    Ok(set)
}

/// Builds the set from table rows; rows without a paragraph are skipped.
pub fn reference_from_rows(rows: &[TableRow]) -> Result<GroupIdentifierSet, LoadError> {
    let mut ids = BTreeSet::new();

    for row in rows {
        let Some(text) = row.first_text.as_deref() else {
            continue;
        };
        let id = parse_hex_u32(text).map_err(|reason| LoadError::format(row.position, text, reason))?;
        if !ids.insert(id) {
            debug!(row = row.position, id, "Duplicate reference identifier");
        }
    }

    Ok(GroupIdentifierSet { ids })
}
