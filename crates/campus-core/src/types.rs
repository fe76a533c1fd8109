use std::collections::BTreeSet;
use std::fmt;

use chrono::{Datelike, NaiveDate, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, ScheduleError};

/// Fresh record id. UUIDv7 so ids sort by creation time in logs and listings.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}

/// RFC3339 timestamp for `created_at` / `updated_at` columns.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Parse a time of day with minute precision. Accepts `HH:MM` and `HH:MM:SS`
/// (seconds are dropped).
pub fn parse_clock(s: &str) -> Result<NaiveTime> {
    let s = s.trim();
    let t = NaiveTime::parse_from_str(s, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M:%S"))
        .map_err(|_| ScheduleError::validation(format!("invalid time of day: {s:?}")))?;
    Ok(truncate_to_minute(t))
}

pub fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

pub fn minutes_since_midnight(t: NaiveTime) -> u32 {
    t.hour() * 60 + t.minute()
}

/// `HH:MM` rendering used in messages and the CLI.
pub fn format_clock(t: NaiveTime) -> String {
    t.format("%H:%M").to_string()
}

/// Serde adapter storing a [`NaiveTime`] as `"HH:MM"`.
pub mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&super::format_clock(*t))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_clock(&raw).map_err(serde::de::Error::custom)
    }
}

/// The seven weekday names a timetable slot can recur on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Weekday {
    Monday,
    Tuesday,
    Wednesday,
    Thursday,
    Friday,
    Saturday,
    Sunday,
}

impl Weekday {
    pub const ALL: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn of(date: NaiveDate) -> Self {
        date.weekday().into()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Weekday::Monday => "Monday",
            Weekday::Tuesday => "Tuesday",
            Weekday::Wednesday => "Wednesday",
            Weekday::Thursday => "Thursday",
            Weekday::Friday => "Friday",
            Weekday::Saturday => "Saturday",
            Weekday::Sunday => "Sunday",
        }
    }
}

impl From<chrono::Weekday> for Weekday {
    fn from(d: chrono::Weekday) -> Self {
        match d {
            chrono::Weekday::Mon => Weekday::Monday,
            chrono::Weekday::Tue => Weekday::Tuesday,
            chrono::Weekday::Wed => Weekday::Wednesday,
            chrono::Weekday::Thu => Weekday::Thursday,
            chrono::Weekday::Fri => Weekday::Friday,
            chrono::Weekday::Sat => Weekday::Saturday,
            chrono::Weekday::Sun => Weekday::Sunday,
        }
    }
}

impl fmt::Display for Weekday {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Weekday {
    type Err = String;

    /// Full names or three-letter abbreviations, case-insensitive.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Weekday::ALL
            .into_iter()
            .find(|d| {
                let name = d.as_str().to_ascii_lowercase();
                name == lower || name[..3] == lower
            })
            .ok_or_else(|| format!("unknown weekday: {s}"))
    }
}

/// Whether an assignment or timetable points at a class or a single person.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    Class,
    Individual,
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Class => write!(f, "class"),
            TargetType::Individual => write!(f, "individual"),
        }
    }
}

impl std::str::FromStr for TargetType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "class" => Ok(TargetType::Class),
            "individual" => Ok(TargetType::Individual),
            other => Err(format!("unknown target type: {other}")),
        }
    }
}

/// Who a timetable is for.
///
/// Replaces the legacy `"<className>:<grade1,grade2>"` composite key. An
/// empty grade set means the class as a whole, unrestricted by grade.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Target {
    Class {
        name: String,
        #[serde(default)]
        grades: BTreeSet<String>,
    },
    Individual {
        id: String,
    },
}

impl Target {
    pub fn class<I, S>(name: impl Into<String>, grades: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Target::Class {
            name: name.into(),
            grades: grades.into_iter().map(Into::into).collect(),
        }
    }

    pub fn individual(id: impl Into<String>) -> Self {
        Target::Individual { id: id.into() }
    }

    pub fn target_type(&self) -> TargetType {
        match self {
            Target::Class { .. } => TargetType::Class,
            Target::Individual { .. } => TargetType::Individual,
        }
    }

    /// Decode a legacy composite target id.
    ///
    /// Class keys split on the first `:`; grades are comma separated and
    /// trimmed. Individual keys are taken verbatim.
    pub fn parse_legacy(raw: &str, kind: TargetType) -> Result<Self> {
        let raw = raw.trim();
        match kind {
            TargetType::Individual => {
                if raw.is_empty() {
                    return Err(ScheduleError::validation("individual target id is empty"));
                }
                Ok(Target::individual(raw))
            }
            TargetType::Class => {
                let (name, grades) = raw.split_once(':').unwrap_or((raw, ""));
                let name = name.trim();
                if name.is_empty() {
                    return Err(ScheduleError::validation(format!(
                        "class target has no class name: {raw:?}"
                    )));
                }
                let grades = grades
                    .split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(String::from)
                    .collect();
                Ok(Target::Class {
                    name: name.to_string(),
                    grades,
                })
            }
        }
    }

    /// Encode back into the legacy composite form (grades in sorted order).
    pub fn legacy_key(&self) -> String {
        match self {
            Target::Individual { id } => id.clone(),
            Target::Class { name, grades } if grades.is_empty() => name.clone(),
            Target::Class { name, grades } => {
                let joined: Vec<&str> = grades.iter().map(String::as_str).collect();
                format!("{name}:{}", joined.join(","))
            }
        }
    }

    /// Whether this target governs `enrollee`.
    ///
    /// Class targets need the class name to equal the enrollee's class
    /// assignment, and (when grades are listed) the grade set to contain the
    /// enrollee's grade or, failing that, their designation.
    pub fn governs(&self, enrollee: &Enrollee) -> bool {
        match self {
            Target::Individual { id } => *id == enrollee.id,
            Target::Class { name, grades } => {
                if enrollee.class_name.as_deref() != Some(name.as_str()) {
                    return false;
                }
                if grades.is_empty() {
                    return true;
                }
                let has = |v: &Option<String>| v.as_ref().is_some_and(|g| grades.contains(g));
                has(&enrollee.grade) || has(&enrollee.designation)
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type(), self.legacy_key())
    }
}

/// A person looked up against timetables: a student or a staff member.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrollee {
    pub id: String,
    /// Class the person is assigned to, if any.
    pub class_name: Option<String>,
    pub grade: Option<String>,
    /// Non-class designation, matched against grade lists as a fallback.
    pub designation: Option<String>,
}

impl Enrollee {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn in_class(mut self, class_name: impl Into<String>, grade: impl Into<String>) -> Self {
        self.class_name = Some(class_name.into());
        self.grade = Some(grade.into());
        self
    }

    pub fn with_designation(mut self, designation: impl Into<String>) -> Self {
        self.designation = Some(designation.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_parsing_is_minute_precise() {
        let t = parse_clock("08:05:59").unwrap();
        assert_eq!(format_clock(t), "08:05");
        assert_eq!(minutes_since_midnight(t), 485);
        assert!(parse_clock("25:00").is_err());
        assert!(parse_clock("").is_err());
    }

    #[test]
    fn weekday_parsing() {
        assert_eq!("monday".parse::<Weekday>().unwrap(), Weekday::Monday);
        assert_eq!("Thu".parse::<Weekday>().unwrap(), Weekday::Thursday);
        assert!("Funday".parse::<Weekday>().is_err());
        let d = NaiveDate::from_ymd_opt(2024, 5, 10).unwrap();
        assert_eq!(Weekday::of(d), Weekday::Friday);
    }

    #[test]
    fn legacy_class_key_decodes_and_reencodes() {
        let t = Target::parse_legacy("Rose: 2 ,1,", TargetType::Class).unwrap();
        assert_eq!(t, Target::class("Rose", ["1", "2"]));
        assert_eq!(t.legacy_key(), "Rose:1,2");

        let bare = Target::parse_legacy("Lily", TargetType::Class).unwrap();
        assert_eq!(bare, Target::class("Lily", Vec::<String>::new()));
        assert_eq!(bare.legacy_key(), "Lily");

        assert!(Target::parse_legacy(":1,2", TargetType::Class).is_err());
        assert!(Target::parse_legacy("  ", TargetType::Individual).is_err());
    }

    #[test]
    fn target_serializes_as_tagged_variant() {
        let t = Target::class("Rose", ["1"]);
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["kind"], "class");
        assert_eq!(json["name"], "Rose");
        let back: Target = serde_json::from_value(json).unwrap();
        assert_eq!(back, t);
    }

    #[test]
    fn class_target_matches_grade_or_designation() {
        let target = Target::class("Rose", ["1", "Prefect"]);

        assert!(target.governs(&Enrollee::new("s1").in_class("Rose", "1")));
        assert!(!target.governs(&Enrollee::new("s2").in_class("Rose", "3")));
        assert!(target.governs(
            &Enrollee::new("s3")
                .in_class("Rose", "3")
                .with_designation("Prefect")
        ));
        assert!(!target.governs(&Enrollee::new("s4").in_class("Lily", "1")));
        // No class assignment never matches a class target.
        assert!(!target.governs(&Enrollee::new("s5").with_designation("Prefect")));
    }

    #[test]
    fn class_without_grades_covers_everyone_in_it() {
        let target = Target::class("Rose", Vec::<String>::new());
        assert!(target.governs(&Enrollee::new("s1").in_class("Rose", "9")));
    }

    #[test]
    fn individual_target_matches_by_id() {
        let target = Target::individual("u-7");
        assert!(target.governs(&Enrollee::new("u-7")));
        assert!(!target.governs(&Enrollee::new("u-8").in_class("u-7", "1")));
    }
}
