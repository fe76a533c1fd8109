use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use campus_core::store::{Collection, Record};
use campus_core::types::hhmm;
use campus_core::{Target, TargetType, Weekday};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TimetableStatus {
    #[default]
    Active,
    /// Decommissioned or not yet published; ignored when matching people.
    Draft,
}

impl std::fmt::Display for TimetableStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimetableStatus::Active => write!(f, "active"),
            TimetableStatus::Draft => write!(f, "draft"),
        }
    }
}

/// One recurring weekly period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTableSlot {
    pub id: String,
    pub subject: String,
    pub day: Weekday,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
    /// Id of the faculty member teaching the period.
    #[serde(default)]
    pub faculty_id: Option<String>,
}

/// Editable fields of a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotDraft {
    pub subject: String,
    pub day: Weekday,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    #[serde(default)]
    pub room: Option<String>,
    #[serde(default)]
    pub faculty_id: Option<String>,
}

impl SlotDraft {
    pub fn new(subject: impl Into<String>, day: Weekday, start: NaiveTime, end: NaiveTime) -> Self {
        Self {
            subject: subject.into(),
            day,
            start_time: start,
            end_time: end,
            room: None,
            faculty_id: None,
        }
    }

    pub fn in_room(mut self, room: impl Into<String>) -> Self {
        self.room = Some(room.into());
        self
    }

    pub fn taught_by(mut self, faculty_id: impl Into<String>) -> Self {
        self.faculty_id = Some(faculty_id.into());
        self
    }
}

/// Weekly recurring schedule bound to one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeTable {
    pub id: String,
    pub label: String,
    /// Anchor shift; informational only.
    pub shift_id: String,
    pub target: Target,
    /// Slots in editor order.
    #[serde(default)]
    pub content: Vec<TimeTableSlot>,
    #[serde(default)]
    pub status: TimetableStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Record for TimeTable {
    const COLLECTION: Collection = Collection::Timetables;

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl TimeTable {
    pub fn target_type(&self) -> TargetType {
        self.target.target_type()
    }

    pub fn slot(&self, slot_id: &str) -> Option<&TimeTableSlot> {
        self.content.iter().find(|s| s.id == slot_id)
    }

    /// Slots recurring on `day`, in editor order.
    pub fn slots_on(&self, day: Weekday) -> impl Iterator<Item = &TimeTableSlot> {
        self.content.iter().filter(move |s| s.day == day)
    }

    /// Another slot (not `except_id`) already starting at `day`/`start`.
    pub fn collision(&self, except_id: &str, day: Weekday, start: NaiveTime) -> Option<&TimeTableSlot> {
        self.content
            .iter()
            .find(|s| s.id != except_id && s.day == day && s.start_time == start)
    }
}

/// Input for creating a timetable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTimeTable {
    pub label: String,
    pub shift_id: String,
    pub target: Target,
    #[serde(default)]
    pub status: TimetableStatus,
}
