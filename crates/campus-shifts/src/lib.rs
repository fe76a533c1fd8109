//! `campus-shifts` — shift templates, assignments and the roster grid.
//!
//! # Overview
//!
//! [`registry::ShiftTemplateRegistry`] owns the reusable time windows.
//! [`resolver::AssignmentResolver`] binds them to targets per date and
//! answers "which shift applies to this target today".
//!
//! # Resolution
//!
//! | Record shape          | Matches `date` when                       |
//! |-----------------------|-------------------------------------------|
//! | single day            | `assigned_date == date`                   |
//! | range                 | `start_date <= date <= end_date`          |
//! | several records match | the first one in store order wins         |

pub mod registry;
pub mod resolver;
pub mod roster;
pub mod types;

pub use registry::ShiftTemplateRegistry;
pub use resolver::{first_covering, AssignmentResolver, BindRequest, RangeRequest};
pub use roster::{date_columns, RosterCell, RosterGrid, RosterRow, RosterShift};
pub use types::{
    Arrival, NewShiftTemplate, ShiftAssignment, ShiftCategory, ShiftTemplate, TemplateStatus,
};
