//! Record store boundary.
//!
//! The scheduling core only ever needs three operations from persistence:
//! upsert by id, delete by id, and list a whole collection. All filtering
//! happens client-side after `list_all`.

use std::fmt;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::Result;

/// Named collections the core reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    ShiftTemplates,
    ShiftCategories,
    ShiftAssignments,
    Timetables,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::ShiftTemplates,
        Collection::ShiftCategories,
        Collection::ShiftAssignments,
        Collection::Timetables,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::ShiftTemplates => "shift_templates",
            Collection::ShiftCategories => "shift_categories",
            Collection::ShiftAssignments => "shift_assignments",
            Collection::Timetables => "timetables",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures reported by a [`RecordStore`] backend.
///
/// Schema drift (a collection or column the backend does not have) carries
/// the statement an operator can run to repair it.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Collection `{collection}` does not exist in the store")]
    MissingTable { collection: Collection, patch: String },

    #[error("Collection `{collection}` has no column `{column}`")]
    MissingColumn {
        collection: Collection,
        column: String,
        patch: String,
    },

    #[error("Store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Corrective statement for known schema-drift failures.
    pub fn schema_patch(&self) -> Option<&str> {
        match self {
            StoreError::MissingTable { patch, .. } | StoreError::MissingColumn { patch, .. } => {
                Some(patch)
            }
            StoreError::Backend(_) => None,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Generic key-identified record store.
///
/// Upserts are idempotent by id and overwrite the previous body (last write
/// wins). `list_all` must return records in insertion order; resolvers rely
/// on that order when several records match.
pub trait RecordStore: Send + Sync {
    fn upsert(&self, collection: Collection, id: &str, body: &serde_json::Value) -> StoreResult<()>;

    /// Returns `true` when a record was removed.
    fn delete(&self, collection: Collection, id: &str) -> StoreResult<bool>;

    fn list_all(&self, collection: Collection) -> StoreResult<Vec<serde_json::Value>>;
}

/// A typed record living in exactly one collection.
pub trait Record: Serialize + DeserializeOwned {
    const COLLECTION: Collection;

    fn record_id(&self) -> &str;
}

/// Serialize and upsert a typed record.
pub fn put<R: Record>(store: &dyn RecordStore, record: &R) -> Result<()> {
    let body = serde_json::to_value(record)?;
    store.upsert(R::COLLECTION, record.record_id(), &body)?;
    Ok(())
}

/// Delete a typed record by id.
pub fn remove<R: Record>(store: &dyn RecordStore, id: &str) -> Result<bool> {
    Ok(store.delete(R::COLLECTION, id)?)
}

/// List and decode every record of a collection.
///
/// Rows that no longer decode (hand-edited or written by an older schema)
/// are skipped with a warning rather than failing the whole listing.
pub fn load_all<R: Record>(store: &dyn RecordStore) -> Result<Vec<R>> {
    let rows = store.list_all(R::COLLECTION)?;
    let records = rows
        .into_iter()
        .filter_map(|row| match serde_json::from_value::<R>(row) {
            Ok(r) => Some(r),
            Err(e) => {
                warn!(collection = %R::COLLECTION, "skipping undecodable record: {e}");
                None
            }
        })
        .collect();
    Ok(records)
}

/// Fetch one typed record by id (client-side scan over `list_all`).
pub fn find<R: Record>(store: &dyn RecordStore, id: &str) -> Result<Option<R>> {
    Ok(load_all::<R>(store)?
        .into_iter()
        .find(|r| r.record_id() == id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_names_are_snake_case() {
        assert_eq!(Collection::ShiftAssignments.as_str(), "shift_assignments");
        assert_eq!(Collection::Timetables.to_string(), "timetables");
        assert_eq!(Collection::ALL.len(), 4);
    }

    #[test]
    fn schema_patch_only_for_drift() {
        let missing = StoreError::MissingColumn {
            collection: Collection::ShiftTemplates,
            column: "updated_at".into(),
            patch: "ALTER TABLE shift_templates ADD COLUMN updated_at TEXT;".into(),
        };
        assert_eq!(
            missing.schema_patch(),
            Some("ALTER TABLE shift_templates ADD COLUMN updated_at TEXT;")
        );
        assert!(StoreError::Backend("timeout".into()).schema_patch().is_none());
    }
}
