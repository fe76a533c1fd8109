//! "What is happening now" for a timetable.
//!
//! Everything here is recomputed from scratch on each call; the only input
//! besides the timetable is the wall-clock reading.

use chrono::{Local, NaiveDateTime};
use serde::Serialize;

use campus_core::types::{format_clock, minutes_since_midnight};
use campus_core::Weekday;

use crate::types::{TimeTable, TimeTableSlot};

/// Source of the current local time.
pub trait WallClock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the host's local time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

/// Current and next period for one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LivePeriods<'a> {
    pub now: NaiveDateTime,
    /// Slot with `start <= now < end`.
    pub current: Option<&'a TimeTableSlot>,
    /// First slot starting strictly after `now`.
    pub upcoming: Option<&'a TimeTableSlot>,
}

impl LivePeriods<'_> {
    pub fn minutes_remaining(&self) -> Option<u32> {
        let slot = self.current?;
        Some(minutes_since_midnight(slot.end_time) - minutes_since_midnight(self.now.time()))
    }

    pub fn minutes_until_upcoming(&self) -> Option<u32> {
        let slot = self.upcoming?;
        Some(minutes_since_midnight(slot.start_time) - minutes_since_midnight(self.now.time()))
    }
}

/// Derive the current and upcoming slot of `timetable` at `now`.
///
/// Only slots on the weekday of `now` are considered, ordered by start time
/// (ties keep editor order). Times compare at minute precision.
pub fn current_and_upcoming(timetable: &TimeTable, now: NaiveDateTime) -> LivePeriods<'_> {
    let today = Weekday::of(now.date());
    let minute = minutes_since_midnight(now.time());

    let mut todays: Vec<&TimeTableSlot> = timetable.slots_on(today).collect();
    todays.sort_by_key(|s| minutes_since_midnight(s.start_time));

    let current = todays.iter().copied().find(|s| {
        minutes_since_midnight(s.start_time) <= minute && minute < minutes_since_midnight(s.end_time)
    });
    let upcoming = todays
        .iter()
        .copied()
        .find(|s| minutes_since_midnight(s.start_time) > minute);

    LivePeriods {
        now,
        current,
        upcoming,
    }
}

/// Owned, printable view of one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PeriodView {
    pub subject: String,
    pub start: String,
    pub end: String,
    pub room: Option<String>,
    /// Minutes left (current) or minutes to go (upcoming).
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveSnapshot {
    pub timetable_id: String,
    pub day: Weekday,
    pub at: String,
    pub current: Option<PeriodView>,
    pub upcoming: Option<PeriodView>,
}

/// Polls a [`WallClock`] and renders [`LiveSnapshot`]s.
pub struct LiveScheduleClock<C: WallClock = SystemClock> {
    clock: C,
}

impl Default for LiveScheduleClock<SystemClock> {
    fn default() -> Self {
        Self::new(SystemClock)
    }
}

impl<C: WallClock> LiveScheduleClock<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    pub fn snapshot(&self, timetable: &TimeTable) -> LiveSnapshot {
        let periods = current_and_upcoming(timetable, self.clock.now());
        let view = |slot: &TimeTableSlot, minutes: u32| PeriodView {
            subject: slot.subject.clone(),
            start: format_clock(slot.start_time),
            end: format_clock(slot.end_time),
            room: slot.room.clone(),
            minutes,
        };
        LiveSnapshot {
            timetable_id: timetable.id.clone(),
            day: Weekday::of(periods.now.date()),
            at: periods.now.format("%H:%M").to_string(),
            current: periods
                .current
                .zip(periods.minutes_remaining())
                .map(|(s, m)| view(s, m)),
            upcoming: periods
                .upcoming
                .zip(periods.minutes_until_upcoming())
                .map(|(s, m)| view(s, m)),
        }
    }
}
