use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use campus_core::authz::{ensure, Actor, AuthorizationPort};
use campus_core::store::{self, RecordStore};
use campus_core::types::{format_clock, new_id, now_rfc3339, truncate_to_minute};
use campus_core::{Enrollee, Result, ScheduleError, Target};
use campus_shifts::ShiftTemplate;

use crate::types::{NewTimeTable, SlotDraft, TimeTable, TimeTableSlot, TimetableStatus};

/// Editing state of one slot in the timetable form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotState {
    Collapsed,
    /// Open for editing; blocks commit until saved or removed.
    Expanded,
}

/// In-memory editor for a single timetable.
///
/// Slot edits only touch this form. Nothing reaches the store until
/// [`TimetableSlotEngine::commit`] writes the whole slot list as one record.
#[derive(Debug, Clone)]
pub struct TimetableForm {
    timetable: TimeTable,
    states: HashMap<String, SlotState>,
    dirty: bool,
}

impl TimetableForm {
    fn new(timetable: TimeTable) -> Self {
        let states = timetable
            .content
            .iter()
            .map(|s| (s.id.clone(), SlotState::Collapsed))
            .collect();
        Self {
            timetable,
            states,
            dirty: false,
        }
    }

    pub fn timetable(&self) -> &TimeTable {
        &self.timetable
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn slot_state(&self, slot_id: &str) -> Option<SlotState> {
        self.states.get(slot_id).copied()
    }

    /// First slot (in editor order) still open for editing.
    pub fn expanded_slot(&self) -> Option<&str> {
        self.timetable
            .content
            .iter()
            .map(|s| s.id.as_str())
            .find(|id| self.states.get(*id) == Some(&SlotState::Expanded))
    }

    /// The editor gates commit on "no slot expanded", not on dirtiness.
    pub fn can_commit(&self) -> bool {
        self.expanded_slot().is_none()
    }

    /// Append a new slot with a fresh id and open it for editing.
    /// Collisions are not checked until the slot is saved.
    pub fn add_slot(&mut self, draft: SlotDraft) -> &TimeTableSlot {
        let slot = TimeTableSlot {
            id: new_id(),
            subject: draft.subject.trim().to_string(),
            day: draft.day,
            start_time: truncate_to_minute(draft.start_time),
            end_time: truncate_to_minute(draft.end_time),
            room: draft.room,
            faculty_id: draft.faculty_id,
        };
        debug!(slot_id = %slot.id, "slot added");
        self.states.insert(slot.id.clone(), SlotState::Expanded);
        self.dirty = true;
        self.timetable.content.push(slot);
        let last = self.timetable.content.len() - 1;
        &self.timetable.content[last]
    }

    /// Reopen a saved slot for editing.
    pub fn expand(&mut self, slot_id: &str) -> Result<()> {
        let state = self
            .states
            .get_mut(slot_id)
            .ok_or_else(|| slot_not_found(slot_id))?;
        *state = SlotState::Expanded;
        Ok(())
    }

    /// Validate and apply `draft` to the slot, collapsing it.
    ///
    /// On a `(day, start_time)` clash with any other slot the form is left
    /// exactly as it was and the slot stays expanded.
    pub fn save_slot(&mut self, slot_id: &str, draft: SlotDraft) -> Result<&TimeTableSlot> {
        let idx = self
            .timetable
            .content
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| slot_not_found(slot_id))?;

        let subject = draft.subject.trim();
        if subject.is_empty() {
            return Err(ScheduleError::Validation("slot subject is required".into()));
        }
        let start = truncate_to_minute(draft.start_time);
        if let Some(other) = self.timetable.collision(slot_id, draft.day, start) {
            warn!(slot_id, conflicting = %other.id, "slot collision");
            return Err(ScheduleError::SlotCollision {
                day: draft.day,
                start: format_clock(start),
                subject: other.subject.clone(),
            });
        }

        let slot = &mut self.timetable.content[idx];
        slot.subject = subject.to_string();
        slot.day = draft.day;
        slot.start_time = start;
        slot.end_time = truncate_to_minute(draft.end_time);
        slot.room = draft.room.filter(|r| !r.trim().is_empty());
        slot.faculty_id = draft.faculty_id.filter(|f| !f.trim().is_empty());

        self.states.insert(slot_id.to_string(), SlotState::Collapsed);
        self.dirty = true;
        Ok(&self.timetable.content[idx])
    }

    /// Drop a slot by id, whatever its state. No cascading effects.
    pub fn remove_slot(&mut self, slot_id: &str) -> Result<TimeTableSlot> {
        let idx = self
            .timetable
            .content
            .iter()
            .position(|s| s.id == slot_id)
            .ok_or_else(|| slot_not_found(slot_id))?;
        self.states.remove(slot_id);
        self.dirty = true;
        Ok(self.timetable.content.remove(idx))
    }
}

fn slot_not_found(slot_id: &str) -> ScheduleError {
    ScheduleError::NotFound {
        kind: "Timetable slot",
        id: slot_id.to_string(),
    }
}

/// Check the whole slot list for `(day, start_time)` duplicates.
pub fn validate_slots(timetable: &TimeTable) -> Result<()> {
    for slot in &timetable.content {
        if let Some(other) = timetable.collision(&slot.id, slot.day, slot.start_time) {
            return Err(ScheduleError::SlotCollision {
                day: slot.day,
                start: format_clock(slot.start_time),
                subject: other.subject.clone(),
            });
        }
    }
    Ok(())
}

/// Owns timetables: lifecycle, per-person lookup and the commit path of the
/// slot editor.
pub struct TimetableSlotEngine {
    store: Arc<dyn RecordStore>,
    authz: Arc<dyn AuthorizationPort>,
}

impl TimetableSlotEngine {
    pub fn new(store: Arc<dyn RecordStore>, authz: Arc<dyn AuthorizationPort>) -> Self {
        Self { store, authz }
    }

    #[instrument(skip(self, actor, new), fields(label = %new.label))]
    pub fn create(&self, actor: &Actor, new: NewTimeTable) -> Result<TimeTable> {
        let label = new.label.trim();
        if label.is_empty() {
            return Err(ScheduleError::Validation("timetable label is required".into()));
        }
        if new.shift_id.trim().is_empty() {
            return Err(ScheduleError::Validation("no shift selected".into()));
        }
        validate_target(&new.target)?;
        ensure(
            self.authz.can_edit_timetable(actor, &new.target),
            actor,
            "edit this timetable",
        )?;
        let shift_id = new.shift_id.trim();
        if store::find::<ShiftTemplate>(self.store.as_ref(), shift_id)?.is_none() {
            return Err(ScheduleError::Validation(format!(
                "unknown shift template: {shift_id}"
            )));
        }

        let now = now_rfc3339();
        let timetable = TimeTable {
            id: new_id(),
            label: label.to_string(),
            shift_id: shift_id.to_string(),
            target: new.target,
            content: Vec::new(),
            status: new.status,
            created_at: now.clone(),
            updated_at: now,
        };
        store::put(self.store.as_ref(), &timetable)?;
        info!(timetable_id = %timetable.id, target = %timetable.target, "timetable created");
        Ok(timetable)
    }

    pub fn list(&self) -> Result<Vec<TimeTable>> {
        store::load_all(self.store.as_ref())
    }

    pub fn get(&self, id: &str) -> Result<Option<TimeTable>> {
        store::find(self.store.as_ref(), id)
    }

    /// Load a timetable into a fresh editor form, all slots collapsed.
    pub fn open(&self, id: &str) -> Result<TimetableForm> {
        Ok(TimetableForm::new(self.require(id)?))
    }

    /// Persist the form's slot list as one record.
    ///
    /// Refused while a slot is expanded. The store write happens first; the
    /// form is marked clean only once it succeeded.
    #[instrument(skip(self, actor, form), fields(timetable_id = %form.timetable.id))]
    pub fn commit(&self, actor: &Actor, form: &mut TimetableForm) -> Result<TimeTable> {
        if let Some(slot_id) = form.expanded_slot() {
            return Err(ScheduleError::EditInProgress {
                slot_id: slot_id.to_string(),
            });
        }
        ensure(
            self.authz.can_edit_timetable(actor, &form.timetable.target),
            actor,
            "edit this timetable",
        )?;
        validate_slots(&form.timetable)?;

        let mut record = form.timetable.clone();
        record.updated_at = now_rfc3339();
        store::put(self.store.as_ref(), &record)?;

        form.timetable.updated_at = record.updated_at.clone();
        form.dirty = false;
        info!(slots = record.content.len(), "timetable committed");
        Ok(record)
    }

    /// Soft-delete: the timetable stays readable but stops matching people.
    pub fn decommission(&self, actor: &Actor, id: &str) -> Result<TimeTable> {
        let mut timetable = self.require(id)?;
        ensure(
            self.authz.can_edit_timetable(actor, &timetable.target),
            actor,
            "edit this timetable",
        )?;
        timetable.status = TimetableStatus::Draft;
        timetable.updated_at = now_rfc3339();
        store::put(self.store.as_ref(), &timetable)?;
        info!(timetable_id = %id, "timetable decommissioned");
        Ok(timetable)
    }

    /// The timetable governing `enrollee`: the first active one, in store
    /// order, whose target matches. Later matches are ignored.
    pub fn timetable_for(&self, enrollee: &Enrollee) -> Result<Option<TimeTable>> {
        let matches: Vec<TimeTable> = self
            .list()?
            .into_iter()
            .filter(|t| t.status == TimetableStatus::Active && t.target.governs(enrollee))
            .collect();
        if matches.len() > 1 {
            debug!(
                enrollee = %enrollee.id,
                candidates = matches.len(),
                "several timetables match; using the first"
            );
        }
        Ok(matches.into_iter().next())
    }

    fn require(&self, id: &str) -> Result<TimeTable> {
        self.get(id)?.ok_or_else(|| ScheduleError::NotFound {
            kind: "Timetable",
            id: id.to_string(),
        })
    }
}

fn validate_target(target: &Target) -> Result<()> {
    let empty = match target {
        Target::Class { name, .. } => name.trim().is_empty(),
        Target::Individual { id } => id.trim().is_empty(),
    };
    if empty {
        return Err(ScheduleError::Validation("no target selected".into()));
    }
    Ok(())
}
