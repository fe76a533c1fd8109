//! `campus-timetable` — weekly timetables, their slot editor and the live
//! "now / next" view.
//!
//! A timetable is edited through a [`engine::TimetableForm`]: slots are added
//! and saved in memory, and the whole slot list is written back as one record
//! by [`engine::TimetableSlotEngine::commit`] once no slot is left open.

pub mod clock;
pub mod engine;
pub mod types;

pub use clock::{
    current_and_upcoming, LivePeriods, LiveScheduleClock, LiveSnapshot, PeriodView, SystemClock,
    WallClock,
};
pub use engine::{validate_slots, SlotState, TimetableForm, TimetableSlotEngine};
pub use types::{NewTimeTable, SlotDraft, TimeTable, TimeTableSlot, TimetableStatus};
