use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::authz::{Actor, Role};

pub const DEFAULT_ROSTER_DAYS: u32 = 7;
pub const DEFAULT_REFRESH_SECS: u64 = 30;
pub const ENV_PREFIX: &str = "CAMPUS_";

/// Top-level config (campus.toml + CAMPUS_* env overrides).
///
/// Nested keys use a double underscore: `CAMPUS_ROSTER__DEFAULT_DAYS=14`.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CampusConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub roster: RosterConfig,
    #[serde(default)]
    pub clock: ClockConfig,
    #[serde(default)]
    pub operator: OperatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    /// Number of date columns a roster grid shows when none are given.
    #[serde(default = "default_roster_days")]
    pub default_days: u32,
    /// ISO date; non-admins may not change rosters before it.
    #[serde(default)]
    pub locked_before: Option<chrono::NaiveDate>,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            default_days: DEFAULT_ROSTER_DAYS,
            locked_before: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClockConfig {
    /// Re-render cadence for `now --watch`.
    #[serde(default = "default_refresh_secs")]
    pub refresh_secs: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            refresh_secs: DEFAULT_REFRESH_SECS,
        }
    }
}

/// Identity the CLI acts as.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorConfig {
    #[serde(default = "default_operator_id")]
    pub id: String,
    #[serde(default)]
    pub role: Role,
}

impl Default for OperatorConfig {
    fn default() -> Self {
        Self {
            id: default_operator_id(),
            role: Role::default(),
        }
    }
}

impl OperatorConfig {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id.clone(), self.role)
    }
}

fn default_db_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.campus/schedule.db", home)
}
fn default_roster_days() -> u32 {
    DEFAULT_ROSTER_DAYS
}
fn default_refresh_secs() -> u64 {
    DEFAULT_REFRESH_SECS
}
fn default_operator_id() -> String {
    std::env::var("USER").unwrap_or_else(|_| "operator".to_string())
}

impl CampusConfig {
    /// Load config from a TOML file with CAMPUS_* env var overrides.
    ///
    /// Checks in order:
    ///   1. Explicit path argument
    ///   2. ~/.campus/campus.toml
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        Self::figment(&path)
            .extract()
            .map_err(|e| crate::error::ScheduleError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        Figment::from(Serialized::defaults(CampusConfig::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.campus/campus.toml", home)
}
