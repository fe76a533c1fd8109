use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScheduleError};
use crate::types::Target;

/// Operator roles known to the scheduling core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Coordinator,
    Teacher,
    #[default]
    Viewer,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Admin => "admin",
            Role::Coordinator => "coordinator",
            Role::Teacher => "teacher",
            Role::Viewer => "viewer",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "coordinator" => Ok(Role::Coordinator),
            "teacher" => Ok(Role::Teacher),
            "viewer" => Ok(Role::Viewer),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The operator on whose behalf a mutation runs. Passed explicitly to every
/// write; there is no ambient session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self { id: id.into(), role }
    }
}

/// Policy boundary consulted before the registry, resolver and slot engine
/// mutate anything.
pub trait AuthorizationPort: Send + Sync {
    fn can_bind(&self, actor: &Actor, target_id: &str, date: NaiveDate) -> bool;

    fn can_manage_templates(&self, actor: &Actor) -> bool;

    fn can_edit_timetable(&self, actor: &Actor, target: &Target) -> bool;
}

/// Permits everything. For tooling and tests that run without a policy.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AuthorizationPort for AllowAll {
    fn can_bind(&self, _actor: &Actor, _target_id: &str, _date: NaiveDate) -> bool {
        true
    }

    fn can_manage_templates(&self, _actor: &Actor) -> bool {
        true
    }

    fn can_edit_timetable(&self, _actor: &Actor, _target: &Target) -> bool {
        true
    }
}

/// Role-based policy.
///
/// Admins may do anything. Coordinators roster and edit timetables but do
/// not touch shift templates. Teachers may only edit their own individual
/// timetable. Viewers are read-only.
#[derive(Debug, Clone, Default)]
pub struct RoleMatrix {
    /// When set, nobody below Admin may change rosters dated before this day.
    pub roster_locked_before: Option<NaiveDate>,
}

impl AuthorizationPort for RoleMatrix {
    fn can_bind(&self, actor: &Actor, _target_id: &str, date: NaiveDate) -> bool {
        match actor.role {
            Role::Admin => true,
            Role::Coordinator => self.roster_locked_before.map_or(true, |lock| date >= lock),
            Role::Teacher | Role::Viewer => false,
        }
    }

    fn can_manage_templates(&self, actor: &Actor) -> bool {
        actor.role == Role::Admin
    }

    fn can_edit_timetable(&self, actor: &Actor, target: &Target) -> bool {
        match actor.role {
            Role::Admin | Role::Coordinator => true,
            Role::Teacher => matches!(target, Target::Individual { id } if *id == actor.id),
            Role::Viewer => false,
        }
    }
}

/// Turn a policy answer into a `Forbidden` error.
pub fn ensure(allowed: bool, actor: &Actor, action: &str) -> Result<()> {
    if allowed {
        Ok(())
    } else {
        Err(ScheduleError::Forbidden {
            reason: format!("{} ({}) may not {action}", actor.id, actor.role),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[test]
    fn admin_bypasses_everything() {
        let policy = RoleMatrix {
            roster_locked_before: Some(day(10)),
        };
        let admin = Actor::new("a", Role::Admin);
        assert!(policy.can_bind(&admin, "CL-A1", day(1)));
        assert!(policy.can_manage_templates(&admin));
        assert!(policy.can_edit_timetable(&admin, &Target::individual("x")));
    }

    #[test]
    fn coordinator_respects_roster_lock() {
        let policy = RoleMatrix {
            roster_locked_before: Some(day(10)),
        };
        let coord = Actor::new("c", Role::Coordinator);
        assert!(!policy.can_bind(&coord, "CL-A1", day(9)));
        assert!(policy.can_bind(&coord, "CL-A1", day(10)));
        assert!(!policy.can_manage_templates(&coord));
    }

    #[test]
    fn teacher_edits_only_own_timetable() {
        let policy = RoleMatrix::default();
        let teacher = Actor::new("t-1", Role::Teacher);
        assert!(policy.can_edit_timetable(&teacher, &Target::individual("t-1")));
        assert!(!policy.can_edit_timetable(&teacher, &Target::individual("t-2")));
        assert!(!policy.can_edit_timetable(&teacher, &Target::class("Rose", ["1"])));
        assert!(!policy.can_bind(&teacher, "t-1", day(1)));
    }

    #[test]
    fn ensure_reports_actor_and_action() {
        let viewer = Actor::new("v", Role::Viewer);
        let err = ensure(false, &viewer, "delete templates").unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(err.to_string().contains("v (viewer) may not delete templates"));
        assert!(ensure(true, &viewer, "read").is_ok());
    }
}
