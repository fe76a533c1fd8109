use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use campus_core::authz::{ensure, Actor, AuthorizationPort};
use campus_core::store::{self, RecordStore};
use campus_core::types::{new_id, now_rfc3339};
use campus_core::{Result, ScheduleError, TargetType};

use crate::roster::{CachedCell, RosterCache, RosterCell, RosterGrid, RosterRow, RosterShift};
use crate::types::{ShiftAssignment, ShiftTemplate};

/// Set one (target, date) roster cell to a shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    pub target_id: String,
    pub target_type: TargetType,
    pub date: NaiveDate,
    pub shift_id: String,
}

/// Assign one shift to a target over an inclusive date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeRequest {
    pub target_id: String,
    pub target_type: TargetType,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub shift_id: String,
}

/// First assignment in list order that belongs to `target_id` and covers
/// `date`.
///
/// When stored records overlap (a single day inside a range, or two ranges)
/// the earliest-inserted one wins. There is no other precedence rule.
pub fn first_covering<'a>(
    assignments: &'a [ShiftAssignment],
    target_id: &str,
    date: NaiveDate,
) -> Option<&'a ShiftAssignment> {
    assignments
        .iter()
        .find(|a| a.target_id == target_id && a.covers(date))
}

fn covering_cell(
    assignments: &[ShiftAssignment],
    target_id: &str,
    date: NaiveDate,
) -> Option<CachedCell> {
    first_covering(assignments, target_id, date).map(|a| CachedCell {
        assignment_id: a.id.clone(),
        shift_id: a.shift_id.clone(),
    })
}

/// Decides which shift governs a target on a date, and owns the roster
/// write path.
///
/// Writes go to the store first; the roster cache is only touched after the
/// store accepted the change, so a failed write leaves every view as it was.
pub struct AssignmentResolver {
    store: Arc<dyn RecordStore>,
    authz: Arc<dyn AuthorizationPort>,
    cache: RosterCache,
}

impl AssignmentResolver {
    pub fn new(store: Arc<dyn RecordStore>, authz: Arc<dyn AuthorizationPort>) -> Self {
        Self {
            store,
            authz,
            cache: RosterCache::default(),
        }
    }

    /// The assignment governing `target_id` on `date`, if any.
    pub fn resolve(&self, target_id: &str, date: NaiveDate) -> Result<Option<ShiftAssignment>> {
        let all = self.assignments()?;
        Ok(first_covering(&all, target_id.trim(), date).cloned())
    }

    /// Every assignment recorded for `target_id`, in list order.
    pub fn assignments_for(&self, target_id: &str) -> Result<Vec<ShiftAssignment>> {
        let target_id = target_id.trim();
        Ok(self
            .assignments()?
            .into_iter()
            .filter(|a| a.target_id == target_id)
            .collect())
    }

    /// Point the (target, date) cell at `shift_id`.
    ///
    /// If an assignment already covers the date its shift is rewritten in
    /// place; for a ranged assignment that changes every day of the range.
    /// Otherwise a single-day record is created. Never creates an overlap.
    #[instrument(skip(self, actor, req), fields(target = %req.target_id, date = %req.date))]
    pub fn bind(&self, actor: &Actor, req: BindRequest) -> Result<ShiftAssignment> {
        let target_id = req.target_id.trim();
        let shift_id = req.shift_id.trim();
        if target_id.is_empty() {
            return Err(ScheduleError::Validation("no target selected".into()));
        }
        if shift_id.is_empty() {
            return Err(ScheduleError::Validation("no shift selected".into()));
        }
        ensure(
            self.authz.can_bind(actor, target_id, req.date),
            actor,
            "change this roster",
        )?;
        self.require_template(shift_id)?;

        let all = self.assignments()?;
        if let Some(existing) = first_covering(&all, target_id, req.date) {
            if existing.shift_id == shift_id {
                debug!(assignment_id = %existing.id, "already bound; nothing to write");
                return Ok(existing.clone());
            }
            let mut updated = existing.clone();
            updated.shift_id = shift_id.to_string();
            store::put(self.store.as_ref(), &updated)?;

            let (start, end) = updated.span().unwrap_or((req.date, req.date));
            self.cache.invalidate(target_id, start, end);
            info!(assignment_id = %updated.id, shift_id, "assignment re-bound");
            return Ok(updated);
        }

        let created = ShiftAssignment {
            id: new_id(),
            shift_id: shift_id.to_string(),
            target_id: target_id.to_string(),
            target_type: req.target_type,
            assigned_date: Some(req.date),
            start_date: Some(req.date),
            end_date: Some(req.date),
            created_at: now_rfc3339(),
        };
        store::put(self.store.as_ref(), &created)?;
        self.cache.invalidate(target_id, req.date, req.date);
        info!(assignment_id = %created.id, shift_id, "assignment created");
        Ok(created)
    }

    /// Clear the (target, date) cell by deleting the covering assignment.
    ///
    /// Returns the removed record, or `None` when the cell was already
    /// empty. Removing a ranged assignment empties its whole range.
    #[instrument(skip(self, actor))]
    pub fn unbind(
        &self,
        actor: &Actor,
        target_id: &str,
        date: NaiveDate,
    ) -> Result<Option<ShiftAssignment>> {
        let target_id = target_id.trim();
        if target_id.is_empty() {
            return Err(ScheduleError::Validation("no target selected".into()));
        }
        ensure(
            self.authz.can_bind(actor, target_id, date),
            actor,
            "change this roster",
        )?;

        let all = self.assignments()?;
        let Some(existing) = first_covering(&all, target_id, date).cloned() else {
            debug!("nothing bound; unbind is a no-op");
            return Ok(None);
        };
        store::remove::<ShiftAssignment>(self.store.as_ref(), &existing.id)?;

        let (start, end) = existing.span().unwrap_or((date, date));
        self.cache.invalidate(target_id, start, end);
        info!(assignment_id = %existing.id, "assignment removed");
        Ok(Some(existing))
    }

    /// Create a ranged assignment. Refused when it would overlap any
    /// existing assignment of the same target.
    #[instrument(skip(self, actor, req), fields(target = %req.target_id))]
    pub fn assign_range(&self, actor: &Actor, req: RangeRequest) -> Result<ShiftAssignment> {
        let target_id = req.target_id.trim();
        let shift_id = req.shift_id.trim();
        if target_id.is_empty() {
            return Err(ScheduleError::Validation("no target selected".into()));
        }
        if shift_id.is_empty() {
            return Err(ScheduleError::Validation("no shift selected".into()));
        }
        if req.end_date < req.start_date {
            return Err(ScheduleError::Validation(format!(
                "range ends ({}) before it starts ({})",
                req.end_date, req.start_date
            )));
        }
        let mut day = req.start_date;
        while day <= req.end_date {
            ensure(
                self.authz.can_bind(actor, target_id, day),
                actor,
                "change this roster",
            )?;
            day += Duration::days(1);
        }
        self.require_template(shift_id)?;

        let all = self.assignments()?;
        if let Some(clash) = all
            .iter()
            .find(|a| a.target_id == target_id && a.overlaps(req.start_date, req.end_date))
        {
            return Err(ScheduleError::Validation(format!(
                "range {}..={} overlaps assignment {} for {target_id}",
                req.start_date, req.end_date, clash.id
            )));
        }

        let created = ShiftAssignment {
            id: new_id(),
            shift_id: shift_id.to_string(),
            target_id: target_id.to_string(),
            target_type: req.target_type,
            assigned_date: None,
            start_date: Some(req.start_date),
            end_date: Some(req.end_date),
            created_at: now_rfc3339(),
        };
        store::put(self.store.as_ref(), &created)?;
        self.cache
            .invalidate(target_id, req.start_date, req.end_date);
        info!(assignment_id = %created.id, shift_id, "ranged assignment created");
        Ok(created)
    }

    /// Build the roster grid for `targets` × `dates`.
    ///
    /// Which assignment covers a cell is cached; assignments are listed at
    /// most once per call, and only if some cell is missing from the cache.
    /// Labels always come from the current templates, so a renamed template
    /// shows its new label on the next build.
    pub fn roster(&self, targets: &[String], dates: &[NaiveDate]) -> Result<RosterGrid> {
        let labels: HashMap<String, String> =
            store::load_all::<ShiftTemplate>(self.store.as_ref())?
                .into_iter()
                .map(|t| (t.id, t.label))
                .collect();
        let mut assignments: Option<Vec<ShiftAssignment>> = None;
        let mut rows = Vec::with_capacity(targets.len());

        for target_id in targets {
            let target_id = target_id.trim();
            let mut cells = Vec::with_capacity(dates.len());
            for &date in dates {
                let cell = match self.cache.get(target_id, date) {
                    Some(hit) => hit,
                    None => {
                        let all = match assignments.take() {
                            Some(all) => all,
                            None => self.assignments()?,
                        };
                        let cell = covering_cell(&all, target_id, date);
                        assignments = Some(all);
                        self.cache.insert(target_id, date, cell.clone());
                        cell
                    }
                };
                let shift = cell.map(|c| RosterShift {
                    label: labels
                        .get(&c.shift_id)
                        .cloned()
                        .unwrap_or_else(|| c.shift_id.clone()),
                    assignment_id: c.assignment_id,
                    shift_id: c.shift_id,
                });
                cells.push(RosterCell { date, shift });
            }
            rows.push(RosterRow {
                target_id: target_id.to_string(),
                cells,
            });
        }

        Ok(RosterGrid {
            dates: dates.to_vec(),
            rows,
        })
    }

    /// Forget every cached cell, e.g. after another operator edited the roster.
    pub fn refresh(&self) {
        self.cache.clear();
    }

    fn assignments(&self) -> Result<Vec<ShiftAssignment>> {
        store::load_all(self.store.as_ref())
    }

    fn require_template(&self, shift_id: &str) -> Result<ShiftTemplate> {
        store::find::<ShiftTemplate>(self.store.as_ref(), shift_id)?.ok_or_else(|| {
            ScheduleError::Validation(format!("unknown shift template: {shift_id}"))
        })
    }
}
