use campus_core::Collection;
use rusqlite::Connection;

/// DDL for one collection table. Also handed to operators as the repair
/// statement when the table turns out to be missing.
pub fn create_table_sql(collection: Collection) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {table} (
            id          TEXT NOT NULL PRIMARY KEY,
            body        TEXT NOT NULL,   -- JSON-encoded record
            updated_at  TEXT NOT NULL    -- RFC3339
        ) STRICT;",
        table = collection.as_str()
    )
}

/// Repair statement for a column the running schema lacks.
pub fn add_column_sql(collection: Collection, column: &str) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} TEXT;",
        collection.as_str(),
        column
    )
}

/// Initialise every collection table in `conn`. Safe to call on every
/// startup — CREATE IF NOT EXISTS means it's idempotent.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    let ddl: Vec<String> = Collection::ALL.into_iter().map(create_table_sql).collect();
    conn.execute_batch(&ddl.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_db_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_db(&conn).unwrap();
        init_db(&conn).unwrap();

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, Collection::ALL.len() as i64);
    }
}
