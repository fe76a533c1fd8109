use std::sync::Arc;

use tracing::info;

use campus_core::config::CampusConfig;
use campus_core::{Actor, RecordStore, RoleMatrix};
use campus_shifts::{AssignmentResolver, ShiftTemplateRegistry};
use campus_store::SqliteStore;
use campus_timetable::TimetableSlotEngine;

/// Everything a command needs, built once per invocation.
pub struct App {
    pub config: CampusConfig,
    pub actor: Actor,
    pub registry: ShiftTemplateRegistry,
    pub resolver: AssignmentResolver,
    pub timetables: TimetableSlotEngine,
}

impl App {
    pub fn open(config: CampusConfig) -> anyhow::Result<Self> {
        let db_path = &config.database.path;
        ensure_parent_dir(db_path);
        info!(path = %db_path, "opening SQLite database");

        // all collections share one file; tables are created if missing
        let store: Arc<dyn RecordStore> = Arc::new(SqliteStore::open(db_path)?);
        let authz = Arc::new(RoleMatrix {
            roster_locked_before: config.roster.locked_before,
        });

        Ok(Self {
            actor: config.operator.actor(),
            registry: ShiftTemplateRegistry::new(store.clone(), authz.clone()),
            resolver: AssignmentResolver::new(store.clone(), authz.clone()),
            timetables: TimetableSlotEngine::new(store, authz),
            config,
        })
    }
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
