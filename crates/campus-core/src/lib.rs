//! `campus-core` — shared vocabulary of the campus scheduling core.
//!
//! Holds the pieces every other crate agrees on: targets and weekdays,
//! the [`store::RecordStore`] boundary, the [`authz::AuthorizationPort`]
//! policy seam, the error type and configuration loading.

pub mod authz;
pub mod config;
pub mod error;
pub mod store;
pub mod types;

pub use authz::{Actor, AllowAll, AuthorizationPort, Role, RoleMatrix};
pub use error::{Result, ScheduleError};
pub use store::{Collection, Record, RecordStore, StoreError};
pub use types::{Enrollee, Target, TargetType, Weekday};
