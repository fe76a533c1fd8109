// End-to-end scheduling flow over one SQLite database: templates, roster
// binding, timetable editing and the live view.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};

use campus_core::types::parse_clock;
use campus_core::{Actor, AllowAll, Enrollee, RecordStore, Role, ScheduleError, Target, TargetType, Weekday};
use campus_shifts::{AssignmentResolver, BindRequest, NewShiftTemplate, ShiftTemplateRegistry, TemplateStatus};
use campus_store::SqliteStore;
use campus_timetable::{
    current_and_upcoming, NewTimeTable, SlotDraft, TimetableSlotEngine, TimetableStatus,
};

fn admin() -> Actor {
    Actor::new("admin", Role::Admin)
}

fn date(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn slot(subject: &str, day: Weekday, start: &str, end: &str) -> SlotDraft {
    SlotDraft::new(subject, day, parse_clock(start).unwrap(), parse_clock(end).unwrap())
}

#[test]
fn roster_and_timetable_share_one_store() {
    let db: Arc<dyn RecordStore> = Arc::new(SqliteStore::in_memory().unwrap());
    let registry = ShiftTemplateRegistry::new(db.clone(), Arc::new(AllowAll));
    let resolver = AssignmentResolver::new(db.clone(), Arc::new(AllowAll));
    let engine = TimetableSlotEngine::new(db.clone(), Arc::new(AllowAll));

    let morning = registry
        .create(
            &admin(),
            NewShiftTemplate {
                label: "Morning".into(),
                start_time: parse_clock("07:30").unwrap(),
                end_time: parse_clock("12:30").unwrap(),
                grace_period_mins: 10,
                category: String::new(),
                status: TemplateStatus::Active,
            },
        )
        .unwrap();

    let target = Target::class("Rose", ["1", "2"]);
    let key = target.legacy_key();
    assert_eq!(key, "Rose:1,2");

    resolver
        .bind(
            &admin(),
            BindRequest {
                target_id: key.clone(),
                target_type: TargetType::Class,
                date: date("2024-05-13"),
                shift_id: morning.id.clone(),
            },
        )
        .unwrap();
    let grid = resolver
        .roster(&[key.clone()], &[date("2024-05-13"), date("2024-05-14")])
        .unwrap();
    assert_eq!(grid.label(&key, date("2024-05-13")), Some("Morning"));
    assert_eq!(grid.label(&key, date("2024-05-14")), None);

    // The template is now referenced and cannot go away.
    assert!(matches!(
        registry.delete(&admin(), &morning.id),
        Err(ScheduleError::ReferentialConflict { references: 1, .. })
    ));

    let tt = engine
        .create(
            &admin(),
            NewTimeTable {
                label: "Rose 1-2".into(),
                shift_id: morning.id.clone(),
                target: Target::parse_legacy(&key, TargetType::Class).unwrap(),
                status: TimetableStatus::Active,
            },
        )
        .unwrap();

    let mut form = engine.open(&tt.id).unwrap();
    let math = form.add_slot(slot("Math", Weekday::Monday, "08:00", "09:00")).id.clone();
    form.save_slot(&math, slot("Math", Weekday::Monday, "08:00", "09:00").in_room("B12"))
        .unwrap();
    let sci = form.add_slot(slot("Science", Weekday::Monday, "09:00", "10:00")).id.clone();
    form.save_slot(&sci, slot("Science", Weekday::Monday, "09:00", "10:00").taught_by("t-7"))
        .unwrap();
    engine.commit(&admin(), &mut form).unwrap();

    let pupil = Enrollee::new("s-1").in_class("Rose", "2");
    let governing = engine.timetable_for(&pupil).unwrap().unwrap();
    assert_eq!(governing.id, tt.id);
    assert_eq!(governing.content.len(), 2);

    let now = NaiveDateTime::parse_from_str("2024-05-13 08:30", "%Y-%m-%d %H:%M").unwrap();
    let live = current_and_upcoming(&governing, now);
    assert_eq!(live.current.map(|s| s.subject.as_str()), Some("Math"));
    assert_eq!(live.upcoming.map(|s| s.subject.as_str()), Some("Science"));
    assert_eq!(live.current.and_then(|s| s.room.as_deref()), Some("B12"));

    // Clearing the cell drops one reference; the timetable anchor remains.
    resolver.unbind(&admin(), &key, date("2024-05-13")).unwrap();
    assert!(resolver.resolve(&key, date("2024-05-13")).unwrap().is_none());
    assert!(matches!(
        registry.delete(&admin(), &morning.id),
        Err(ScheduleError::ReferentialConflict { references: 1, .. })
    ));
}

#[test]
fn missing_table_reports_schema_patch() {
    // Bare connection: no tables created.
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    let engine = TimetableSlotEngine::new(Arc::new(SqliteStore::new(conn)), Arc::new(AllowAll));

    let err = engine
        .create(
            &admin(),
            NewTimeTable {
                label: "Alex".into(),
                shift_id: "SH-1".into(),
                target: Target::individual("u-1"),
                status: TimetableStatus::Active,
            },
        )
        .unwrap_err();
    assert_eq!(err.code(), "STORE_ERROR");
    let ScheduleError::Store(store_err) = err else {
        panic!("expected a store error");
    };
    let patch = store_err.schema_patch().unwrap();
    // The anchor template is looked up before anything is written.
    assert!(patch.starts_with("CREATE TABLE IF NOT EXISTS shift_templates"));
}
