//! `campus-store` — SQLite-backed [`RecordStore`](campus_core::RecordStore).
//!
//! Every collection is a table of JSON documents keyed by id. The core
//! never queries by anything other than id, so the body stays opaque here.

pub mod db;
pub mod sqlite;

pub use db::init_db;
pub use sqlite::SqliteStore;
