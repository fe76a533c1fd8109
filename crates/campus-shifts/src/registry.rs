use std::sync::Arc;

use campus_core::authz::{ensure, Actor, AuthorizationPort};
use campus_core::store::{self, Collection, RecordStore};
use campus_core::types::{format_clock, new_id, now_rfc3339, truncate_to_minute};
use campus_core::{Result, ScheduleError};
use tracing::{info, instrument, warn};

use crate::types::{
    NewShiftTemplate, ShiftAssignment, ShiftCategory, ShiftTemplate, TemplateStatus,
};

/// Owns shift templates and their categories.
///
/// Every call is a fresh snapshot of the store; nothing is cached here.
pub struct ShiftTemplateRegistry {
    store: Arc<dyn RecordStore>,
    authz: Arc<dyn AuthorizationPort>,
}

impl ShiftTemplateRegistry {
    pub fn new(store: Arc<dyn RecordStore>, authz: Arc<dyn AuthorizationPort>) -> Self {
        Self { store, authz }
    }

    /// Create a template. End before start is accepted (and logged) because
    /// overnight shifts are stored as-is.
    #[instrument(skip(self, actor, draft), fields(label = %draft.label))]
    pub fn create(&self, actor: &Actor, draft: NewShiftTemplate) -> Result<ShiftTemplate> {
        ensure(
            self.authz.can_manage_templates(actor),
            actor,
            "manage shift templates",
        )?;
        let now = now_rfc3339();
        let template = ShiftTemplate {
            id: new_id(),
            label: draft.label.trim().to_string(),
            start_time: truncate_to_minute(draft.start_time),
            end_time: truncate_to_minute(draft.end_time),
            grace_period_mins: draft.grace_period_mins,
            category: draft.category.trim().to_string(),
            status: draft.status,
            created_at: now.clone(),
            updated_at: now,
        };
        validate(&template)?;

        store::put(self.store.as_ref(), &template)?;
        info!(template_id = %template.id, "shift template created");
        Ok(template)
    }

    /// Replace an existing template in place (no versioning). `created_at`
    /// is carried over from the stored record.
    #[instrument(skip(self, actor, template), fields(template_id = %template.id))]
    pub fn update(&self, actor: &Actor, mut template: ShiftTemplate) -> Result<ShiftTemplate> {
        ensure(
            self.authz.can_manage_templates(actor),
            actor,
            "manage shift templates",
        )?;
        let existing = self.require(&template.id)?;
        template.label = template.label.trim().to_string();
        template.category = template.category.trim().to_string();
        template.start_time = truncate_to_minute(template.start_time);
        template.end_time = truncate_to_minute(template.end_time);
        template.created_at = existing.created_at;
        template.updated_at = now_rfc3339();
        validate(&template)?;

        store::put(self.store.as_ref(), &template)?;
        info!("shift template updated");
        Ok(template)
    }

    /// Soft-delete: move the template back to Draft so it drops out of
    /// roster pickers while existing assignments keep resolving.
    pub fn decommission(&self, actor: &Actor, id: &str) -> Result<ShiftTemplate> {
        let mut template = self.require(id)?;
        template.status = TemplateStatus::Draft;
        self.update(actor, template)
    }

    /// Hard delete. Refused with `ReferentialConflict` while any assignment
    /// or timetable still names this template. The scan runs against a fresh
    /// listing and is not atomic with the delete.
    #[instrument(skip(self, actor))]
    pub fn delete(&self, actor: &Actor, id: &str) -> Result<()> {
        ensure(
            self.authz.can_manage_templates(actor),
            actor,
            "manage shift templates",
        )?;
        self.require(id)?;

        let assignments = store::load_all::<ShiftAssignment>(self.store.as_ref())?
            .iter()
            .filter(|a| a.shift_id == id)
            .count();
        // Timetables anchor on a template too; only their `shift_id` is read.
        let timetables = self
            .store
            .list_all(Collection::Timetables)?
            .iter()
            .filter(|body| body.get("shift_id").and_then(|v| v.as_str()) == Some(id))
            .count();
        let references = assignments + timetables;
        if references > 0 {
            warn!(references, "refusing to delete referenced shift template");
            return Err(ScheduleError::ReferentialConflict {
                entity: "shift template",
                id: id.to_string(),
                references,
            });
        }

        store::remove::<ShiftTemplate>(self.store.as_ref(), id)?;
        info!("shift template deleted");
        Ok(())
    }

    /// All templates, Draft included, in creation order.
    pub fn list(&self) -> Result<Vec<ShiftTemplate>> {
        store::load_all(self.store.as_ref())
    }

    /// Only templates that may be picked for new assignments.
    pub fn list_active(&self) -> Result<Vec<ShiftTemplate>> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|t| t.status == TemplateStatus::Active)
            .collect())
    }

    pub fn get(&self, id: &str) -> Result<Option<ShiftTemplate>> {
        store::find(self.store.as_ref(), id)
    }

    fn require(&self, id: &str) -> Result<ShiftTemplate> {
        self.get(id)?.ok_or_else(|| ScheduleError::NotFound {
            kind: "Shift template",
            id: id.to_string(),
        })
    }

    // ── categories ───────────────────────────────────────────────────────────

    pub fn create_category(&self, actor: &Actor, label: &str, color: &str) -> Result<ShiftCategory> {
        ensure(
            self.authz.can_manage_templates(actor),
            actor,
            "manage shift categories",
        )?;
        let label = label.trim();
        if label.is_empty() {
            return Err(ScheduleError::Validation("category label is required".into()));
        }
        if self
            .list_categories()?
            .iter()
            .any(|c| c.label.eq_ignore_ascii_case(label))
        {
            return Err(ScheduleError::Validation(format!(
                "category {label:?} already exists"
            )));
        }
        let category = ShiftCategory {
            id: new_id(),
            label: label.to_string(),
            color: color.trim().to_string(),
        };
        store::put(self.store.as_ref(), &category)?;
        info!(category_id = %category.id, label, "shift category created");
        Ok(category)
    }

    pub fn list_categories(&self) -> Result<Vec<ShiftCategory>> {
        store::load_all(self.store.as_ref())
    }

    /// Refused while any template is filed under the category's label.
    pub fn delete_category(&self, actor: &Actor, id: &str) -> Result<()> {
        ensure(
            self.authz.can_manage_templates(actor),
            actor,
            "manage shift categories",
        )?;
        let category = store::find::<ShiftCategory>(self.store.as_ref(), id)?.ok_or_else(|| {
            ScheduleError::NotFound {
                kind: "Shift category",
                id: id.to_string(),
            }
        })?;
        let references = self
            .list()?
            .iter()
            .filter(|t| t.category == category.label)
            .count();
        if references > 0 {
            return Err(ScheduleError::ReferentialConflict {
                entity: "shift category",
                id: id.to_string(),
                references,
            });
        }
        store::remove::<ShiftCategory>(self.store.as_ref(), id)?;
        info!(category_id = %id, "shift category deleted");
        Ok(())
    }
}

fn validate(template: &ShiftTemplate) -> Result<()> {
    if template.label.is_empty() {
        return Err(ScheduleError::Validation("template label is required".into()));
    }
    if template.grace_period_mins < 0 {
        return Err(ScheduleError::Validation(format!(
            "grace period must be >= 0 minutes, got {}",
            template.grace_period_mins
        )));
    }
    if template.is_overnight() {
        // Known gap: overnight or zero-length windows are stored unchanged.
        warn!(
            label = %template.label,
            start = %format_clock(template.start_time),
            end = %format_clock(template.end_time),
            "template ends at or before it starts; storing as overnight"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use campus_core::types::parse_clock;
    use campus_core::{AllowAll, Role, RoleMatrix, TargetType};
    use campus_store::SqliteStore;

    fn admin() -> Actor {
        Actor::new("admin", Role::Admin)
    }

    fn setup() -> (Arc<SqliteStore>, ShiftTemplateRegistry) {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let registry = ShiftTemplateRegistry::new(store.clone(), Arc::new(AllowAll));
        (store, registry)
    }

    fn draft(label: &str, start: &str, end: &str, grace: i32) -> NewShiftTemplate {
        NewShiftTemplate {
            label: label.into(),
            start_time: parse_clock(start).unwrap(),
            end_time: parse_clock(end).unwrap(),
            grace_period_mins: grace,
            category: "Teaching".into(),
            status: TemplateStatus::Active,
        }
    }

    fn assignment_for(shift_id: &str) -> ShiftAssignment {
        ShiftAssignment {
            id: new_id(),
            shift_id: shift_id.into(),
            target_id: "CL-A1".into(),
            target_type: TargetType::Class,
            assigned_date: "2024-05-10".parse().ok(),
            start_date: None,
            end_date: None,
            created_at: now_rfc3339(),
        }
    }

    #[test]
    fn create_and_list_include_drafts() {
        let (_, reg) = setup();
        let a = reg.create(&admin(), draft("Morning", "08:00", "14:00", 10)).unwrap();
        let mut d = draft("Evening", "14:00", "20:00", 0);
        d.status = TemplateStatus::Draft;
        reg.create(&admin(), d).unwrap();

        let all = reg.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, a.id);
        assert_eq!(reg.list_active().unwrap().len(), 1);
    }

    #[test]
    fn blank_label_and_negative_grace_are_rejected() {
        let (_, reg) = setup();
        let err = reg.create(&admin(), draft("   ", "08:00", "09:00", 0)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let err = reg.create(&admin(), draft("X", "08:00", "09:00", -1)).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert!(reg.list().unwrap().is_empty());
    }

    #[test]
    fn backward_window_is_stored_as_is() {
        // Known gap: start >= end is accepted unchanged.
        let (_, reg) = setup();
        let night = reg.create(&admin(), draft("Night", "22:00", "06:00", 5)).unwrap();
        assert!(night.is_overnight());
        let stored = reg.get(&night.id).unwrap().unwrap();
        assert_eq!(stored.start_time, parse_clock("22:00").unwrap());
        assert_eq!(stored.end_time, parse_clock("06:00").unwrap());

        let flat = reg.create(&admin(), draft("Flat", "09:00", "09:00", 0)).unwrap();
        assert_eq!(flat.duration_minutes(), 0);
    }

    #[test]
    fn update_keeps_created_at_and_requires_existing() {
        let (_, reg) = setup();
        let t = reg.create(&admin(), draft("Morning", "08:00", "14:00", 10)).unwrap();
        let mut edited = t.clone();
        edited.label = "Early".into();
        edited.created_at = "bogus".into();
        let saved = reg.update(&admin(), edited).unwrap();
        assert_eq!(saved.label, "Early");
        assert_eq!(saved.created_at, t.created_at);

        let mut ghost = t;
        ghost.id = "missing".into();
        assert_eq!(reg.update(&admin(), ghost).unwrap_err().code(), "NOT_FOUND");
    }

    #[test]
    fn delete_refused_while_referenced() {
        let (db, reg) = setup();
        let t = reg.create(&admin(), draft("Morning", "08:00", "14:00", 10)).unwrap();
        let a = assignment_for(&t.id);
        store::put(db.as_ref(), &a).unwrap();

        match reg.delete(&admin(), &t.id).unwrap_err() {
            ScheduleError::ReferentialConflict { references, .. } => assert_eq!(references, 1),
            other => panic!("expected ReferentialConflict, got {other:?}"),
        }
        assert!(reg.get(&t.id).unwrap().is_some());

        store::remove::<ShiftAssignment>(db.as_ref(), &a.id).unwrap();
        reg.delete(&admin(), &t.id).unwrap();
        assert!(reg.get(&t.id).unwrap().is_none());
    }

    #[test]
    fn decommission_moves_to_draft() {
        let (_, reg) = setup();
        let t = reg.create(&admin(), draft("Morning", "08:00", "14:00", 10)).unwrap();
        let t = reg.decommission(&admin(), &t.id).unwrap();
        assert_eq!(t.status, TemplateStatus::Draft);
        assert!(reg.list_active().unwrap().is_empty());
        assert_eq!(reg.list().unwrap().len(), 1);
    }

    #[test]
    fn non_admins_cannot_manage_templates() {
        let store = Arc::new(SqliteStore::in_memory().unwrap());
        let reg = ShiftTemplateRegistry::new(store, Arc::new(RoleMatrix::default()));
        let coord = Actor::new("c", Role::Coordinator);
        let err = reg.create(&coord, draft("Morning", "08:00", "14:00", 0)).unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN");
        assert!(reg.create(&admin(), draft("Morning", "08:00", "14:00", 0)).is_ok());
    }

    #[test]
    fn category_lifecycle() {
        let (_, reg) = setup();
        let cat = reg.create_category(&admin(), "Teaching", "#2255aa").unwrap();
        assert!(reg.create_category(&admin(), "teaching", "#000").is_err());

        reg.create(&admin(), draft("Morning", "08:00", "14:00", 0)).unwrap();
        let err = reg.delete_category(&admin(), &cat.id).unwrap_err();
        assert_eq!(err.code(), "REFERENTIAL_CONFLICT");

        let spare = reg.create_category(&admin(), "Security", "#aa2222").unwrap();
        reg.delete_category(&admin(), &spare.id).unwrap();
        assert_eq!(reg.list_categories().unwrap(), vec![cat]);
    }

    #[test]
    fn delete_refused_while_a_timetable_anchors_on_it() {
        let (db, reg) = setup();
        let t = reg.create(&admin(), draft("Morning", "08:00", "14:00", 10)).unwrap();
        let body = serde_json::json!({ "id": "tt-1", "shift_id": &t.id, "label": "Rose 1" });
        db.upsert(Collection::Timetables, "tt-1", &body).unwrap();

        match reg.delete(&admin(), &t.id).unwrap_err() {
            ScheduleError::ReferentialConflict { references, .. } => assert_eq!(references, 1),
            other => panic!("expected ReferentialConflict, got {other:?}"),
        }

        db.delete(Collection::Timetables, "tt-1").unwrap();
        reg.delete(&admin(), &t.id).unwrap();
    }
}
