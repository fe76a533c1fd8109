use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};

/// Maximum number of (target, date) cells kept in memory. Simple eviction:
/// when full, drop the oldest half.
const CACHE_MAX: usize = 2048;

/// One resolved roster cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterCell {
    pub date: NaiveDate,
    /// `None` when no assignment covers the date.
    pub shift: Option<RosterShift>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterShift {
    pub assignment_id: String,
    pub shift_id: String,
    /// Template label, or the raw shift id when the template is gone.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterRow {
    pub target_id: String,
    pub cells: Vec<RosterCell>,
}

/// Target × date grid as shown on the roster screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterGrid {
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<RosterRow>,
}

impl RosterGrid {
    /// Label for a single cell, or `None` if empty / outside the grid.
    pub fn label(&self, target_id: &str, date: NaiveDate) -> Option<&str> {
        self.rows
            .iter()
            .find(|r| r.target_id == target_id)?
            .cells
            .iter()
            .find(|c| c.date == date)?
            .shift
            .as_ref()
            .map(|s| s.label.as_str())
    }
}

/// `days` consecutive dates starting at `start`.
pub fn date_columns(start: NaiveDate, days: u32) -> Vec<NaiveDate> {
    (0..days as i64).map(|i| start + Duration::days(i)).collect()
}

type CellKey = (String, NaiveDate);

/// Which assignment covers a cell. Labels are not cached; they are looked up
/// from the current templates on every grid build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CachedCell {
    pub(crate) assignment_id: String,
    pub(crate) shift_id: String,
}

/// Cached roster cells keyed by (target, date). Empty cells are cached too,
/// so a cleared cell does not trigger a re-scan on every render.
#[derive(Default)]
pub(crate) struct RosterCache {
    cells: Mutex<HashMap<CellKey, Option<CachedCell>>>,
    /// Insertion-order key list for eviction, parallel to the HashMap.
    order: Mutex<Vec<CellKey>>,
}

impl RosterCache {
    pub(crate) fn get(&self, target_id: &str, date: NaiveDate) -> Option<Option<CachedCell>> {
        lock(&self.cells)
            .get(&(target_id.to_string(), date))
            .cloned()
    }

    pub(crate) fn insert(&self, target_id: &str, date: NaiveDate, shift: Option<CachedCell>) {
        let key = (target_id.to_string(), date);
        let mut cells = lock(&self.cells);
        let mut order = lock(&self.order);

        if let std::collections::hash_map::Entry::Occupied(mut e) = cells.entry(key.clone()) {
            e.insert(shift);
            return;
        }

        if cells.len() >= CACHE_MAX {
            let evict_count = CACHE_MAX / 2;
            for k in order.drain(..evict_count) {
                cells.remove(&k);
            }
        }

        order.push(key.clone());
        cells.insert(key, shift);
    }

    /// Drop every cached cell of `target_id` dated within `[start, end]`.
    pub(crate) fn invalidate(&self, target_id: &str, start: NaiveDate, end: NaiveDate) {
        let mut cells = lock(&self.cells);
        let mut order = lock(&self.order);
        let hit = |k: &CellKey| k.0 == target_id && start <= k.1 && k.1 <= end;
        cells.retain(|k, _| !hit(k));
        order.retain(|k| !hit(k));
    }

    pub(crate) fn clear(&self) {
        lock(&self.cells).clear();
        lock(&self.order).clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        lock(&self.cells).len()
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn shift(shift_id: &str) -> Option<CachedCell> {
        Some(CachedCell {
            assignment_id: "a".into(),
            shift_id: shift_id.into(),
        })
    }

    #[test]
    fn date_columns_are_consecutive() {
        let cols = date_columns(date("2024-02-28"), 3);
        assert_eq!(
            cols,
            vec![date("2024-02-28"), date("2024-02-29"), date("2024-03-01")]
        );
        assert!(date_columns(date("2024-02-28"), 0).is_empty());
    }

    #[test]
    fn cache_distinguishes_empty_from_missing() {
        let cache = RosterCache::default();
        assert_eq!(cache.get("t", date("2024-05-10")), None);
        cache.insert("t", date("2024-05-10"), None);
        assert_eq!(cache.get("t", date("2024-05-10")), Some(None));
    }

    #[test]
    fn invalidate_only_touches_target_and_range() {
        let cache = RosterCache::default();
        cache.insert("t", date("2024-05-09"), shift("A"));
        cache.insert("t", date("2024-05-10"), shift("A"));
        cache.insert("t", date("2024-05-12"), shift("A"));
        cache.insert("u", date("2024-05-10"), shift("B"));

        cache.invalidate("t", date("2024-05-10"), date("2024-05-11"));
        assert!(cache.get("t", date("2024-05-09")).is_some());
        assert!(cache.get("t", date("2024-05-10")).is_none());
        assert!(cache.get("t", date("2024-05-12")).is_some());
        assert!(cache.get("u", date("2024-05-10")).is_some());
    }

    #[test]
    fn cache_evicts_oldest_half_when_full() {
        let cache = RosterCache::default();
        let start = date("2000-01-01");
        for (i, d) in date_columns(start, CACHE_MAX as u32).into_iter().enumerate() {
            cache.insert(&format!("t{}", i % 3), d, None);
        }
        assert_eq!(cache.len(), CACHE_MAX);
        cache.insert("late", start, None);
        assert_eq!(cache.len(), CACHE_MAX / 2 + 1);
        assert!(cache.get("t0", start).is_none());
    }

    #[test]
    fn grid_label_lookup() {
        let d = date("2024-05-10");
        let grid = RosterGrid {
            dates: vec![d],
            rows: vec![RosterRow {
                target_id: "CL-A1".into(),
                cells: vec![RosterCell {
                    date: d,
                    shift: Some(RosterShift {
                        assignment_id: "a".into(),
                        shift_id: "s".into(),
                        label: "Morning".into(),
                    }),
                }],
            }],
        };
        assert_eq!(grid.label("CL-A1", d), Some("Morning"));
        assert_eq!(grid.label("CL-A2", d), None);
    }
}
