use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use campus_core::store::{Collection, RecordStore, StoreError, StoreResult};
use rusqlite::Connection;
use tracing::{debug, instrument, warn};

use crate::db::{add_column_sql, create_table_sql, init_db};

/// Record store over a single SQLite connection.
///
/// The connection sits behind a `Mutex`; each call is one statement, so
/// there is no transaction spanning several records.
pub struct SqliteStore {
    db: Mutex<Connection>,
}

impl SqliteStore {
    /// Wrap an already-open connection. Does not create tables, so a store
    /// opened on a foreign database reports drift instead of hiding it.
    pub fn new(conn: Connection) -> Self {
        Self {
            db: Mutex::new(conn),
        }
    }

    /// Open (or create) a database file and make sure every table exists.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let conn = Connection::open(path).map_err(|e| StoreError::Backend(e.to_string()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        init_db(&conn).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self::new(conn))
    }

    /// Fresh in-memory store with all tables created.
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Backend(e.to_string()))?;
        init_db(&conn).map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self::new(conn))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.db.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordStore for SqliteStore {
    #[instrument(skip(self, body), fields(collection = %collection))]
    fn upsert(&self, collection: Collection, id: &str, body: &serde_json::Value) -> StoreResult<()> {
        let now = chrono::Utc::now().to_rfc3339();
        let sql = format!(
            "INSERT INTO {} (id, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            collection.as_str()
        );
        self.conn()
            .execute(&sql, rusqlite::params![id, body.to_string(), now])
            .map_err(|e| classify(collection, e))?;
        debug!("record upserted");
        Ok(())
    }

    #[instrument(skip(self), fields(collection = %collection))]
    fn delete(&self, collection: Collection, id: &str) -> StoreResult<bool> {
        let sql = format!("DELETE FROM {} WHERE id = ?1", collection.as_str());
        let n = self
            .conn()
            .execute(&sql, [id])
            .map_err(|e| classify(collection, e))?;
        Ok(n > 0)
    }

    #[instrument(skip(self), fields(collection = %collection))]
    fn list_all(&self, collection: Collection) -> StoreResult<Vec<serde_json::Value>> {
        // rowid survives ON CONFLICT updates, so this is insertion order.
        let sql = format!("SELECT id, body FROM {} ORDER BY rowid", collection.as_str());
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql).map_err(|e| classify(collection, e))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(|e| classify(collection, e))?;

        let mut out = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(|e| classify(collection, e))?;
            match serde_json::from_str(&body) {
                Ok(v) => out.push(v),
                Err(e) => warn!(record_id = %id, "body is not valid JSON: {e}"),
            }
        }
        Ok(out)
    }
}

/// Map a rusqlite failure onto the store taxonomy, recognising the schema
/// drift cases an operator can repair by hand.
fn classify(collection: Collection, err: rusqlite::Error) -> StoreError {
    let msg = err.to_string();
    if msg.contains("no such table") {
        return StoreError::MissingTable {
            collection,
            patch: create_table_sql(collection),
        };
    }
    let column = msg
        .split_once("has no column named ")
        .or_else(|| msg.split_once("no such column: "))
        .map(|(_, col)| col.trim().to_string());
    match column {
        Some(column) => StoreError::MissingColumn {
            collection,
            patch: add_column_sql(collection, &column),
            column,
        },
        None => StoreError::Backend(msg),
    }
}
