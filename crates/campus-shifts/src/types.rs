use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use campus_core::store::{Collection, Record};
use campus_core::types::{hhmm, minutes_since_midnight};
use campus_core::TargetType;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// Publication state of a shift template. Draft templates stay visible to
/// editors but are not offered when rostering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TemplateStatus {
    #[default]
    Active,
    Draft,
}

impl std::fmt::Display for TemplateStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TemplateStatus::Active => write!(f, "active"),
            TemplateStatus::Draft => write!(f, "draft"),
        }
    }
}

impl std::str::FromStr for TemplateStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(TemplateStatus::Active),
            "draft" => Ok(TemplateStatus::Draft),
            other => Err(format!("unknown template status: {other}")),
        }
    }
}

/// Taxonomy entry templates are filed under (e.g. "Teaching", "Security").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftCategory {
    pub id: String,
    pub label: String,
    /// Display colour, typically `#rrggbb`.
    pub color: String,
}

impl Record for ShiftCategory {
    const COLLECTION: Collection = Collection::ShiftCategories;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// A named, reusable working window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftTemplate {
    pub id: String,
    pub label: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    /// Minutes after `start_time` during which arrival still counts as on time.
    pub grace_period_mins: i32,
    /// Free-text category label (see [`ShiftCategory`]).
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: TemplateStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Record for ShiftTemplate {
    const COLLECTION: Collection = Collection::ShiftTemplates;

    fn record_id(&self) -> &str {
        &self.id
    }
}

/// How an arrival relates to a template's start and grace period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Arrival {
    Early { minutes: u32 },
    OnTime,
    /// Counted from `start_time`, not from the end of the grace period.
    Late { minutes: u32 },
}

impl ShiftTemplate {
    /// End at or before start. Stored as-is; callers read it as crossing
    /// midnight.
    pub fn is_overnight(&self) -> bool {
        self.end_time <= self.start_time
    }

    /// Length of the shift, wrapping past midnight for overnight templates.
    pub fn duration_minutes(&self) -> u32 {
        let start = minutes_since_midnight(self.start_time);
        let end = minutes_since_midnight(self.end_time);
        (end + MINUTES_PER_DAY - start) % MINUTES_PER_DAY
    }

    pub fn arrival_status(&self, at: NaiveTime) -> Arrival {
        let start = minutes_since_midnight(self.start_time) as i64;
        let at = minutes_since_midnight(at) as i64;
        let grace = self.grace_period_mins.max(0) as i64;
        let delta = at - start;
        if delta < 0 {
            Arrival::Early {
                minutes: (-delta) as u32,
            }
        } else if delta <= grace {
            Arrival::OnTime
        } else {
            Arrival::Late {
                minutes: delta as u32,
            }
        }
    }
}

/// Editor input for creating a template; id and timestamps are assigned
/// by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewShiftTemplate {
    pub label: String,
    #[serde(with = "hhmm")]
    pub start_time: NaiveTime,
    #[serde(with = "hhmm")]
    pub end_time: NaiveTime,
    pub grace_period_mins: i32,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub status: TemplateStatus,
}

/// Binding of one shift template to one target, for a single day or an
/// inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftAssignment {
    pub id: String,
    pub shift_id: String,
    pub target_id: String,
    pub target_type: TargetType,
    #[serde(default)]
    pub assigned_date: Option<NaiveDate>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub created_at: String,
}

impl Record for ShiftAssignment {
    const COLLECTION: Collection = Collection::ShiftAssignments;

    fn record_id(&self) -> &str {
        &self.id
    }
}

impl ShiftAssignment {
    /// `date == assigned_date`, or both range ends set and
    /// `start_date <= date <= end_date`.
    pub fn covers(&self, date: NaiveDate) -> bool {
        if self.assigned_date == Some(date) {
            return true;
        }
        match (self.start_date, self.end_date) {
            (Some(start), Some(end)) => start <= date && date <= end,
            _ => false,
        }
    }

    /// Every date this record can match, as an inclusive range. A record
    /// with both a single date and a range spans their union's bounds.
    pub fn span(&self) -> Option<(NaiveDate, NaiveDate)> {
        let range = match (self.start_date, self.end_date) {
            (Some(s), Some(e)) if s <= e => Some((s, e)),
            _ => None,
        };
        match (self.assigned_date, range) {
            (Some(d), Some((s, e))) => Some((d.min(s), d.max(e))),
            (Some(d), None) => Some((d, d)),
            (None, r) => r,
        }
    }

    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        self.span().is_some_and(|(s, e)| s <= end && start <= e)
    }
}
