//! Per-day limit sets and usage records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::app_id::{sanitized_map, AppId};

/// Whole seconds of budget or usage.
pub type Seconds = u64;

/// Daily budget per application.
///
/// Two of these live side by side: `current` is what is enforced today and
/// `pending` is what becomes `current` at the next rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSet {
    pub day: NaiveDate,
    #[serde(default, deserialize_with = "sanitized_map")]
    pub per_app: BTreeMap<AppId, Seconds>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl LimitSet {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            per_app: BTreeMap::new(),
            is_active: true,
        }
    }

    pub fn limit_for(&self, app: &AppId) -> Option<Seconds> {
        if !self.is_active {
            return None;
        }
        self.per_app.get(app).copied()
    }

    pub fn set(&mut self, app: AppId, seconds: Seconds) {
        self.per_app.insert(app, seconds);
    }

    pub fn remove(&mut self, app: &AppId) -> Option<Seconds> {
        self.per_app.remove(app)
    }

    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.day != today
    }

    /// A copy of this set re-dated to `day` and marked active.
    pub fn promoted(&self, day: NaiveDate) -> Self {
        Self {
            day,
            per_app: self.per_app.clone(),
            is_active: true,
        }
    }

    /// Limited apps in key order. Threshold event indices refer to positions
    /// in this list.
    pub fn sorted_apps(&self) -> Vec<AppId> {
        self.per_app.keys().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.per_app.is_empty()
    }
}

/// Seconds used per application on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub day: NaiveDate,
    #[serde(default, deserialize_with = "sanitized_map")]
    pub per_app: BTreeMap<AppId, Seconds>,
}

impl UsageRecord {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            per_app: BTreeMap::new(),
        }
    }

    pub fn is_stale(&self, today: NaiveDate) -> bool {
        self.day != today
    }

    pub fn used(&self, app: &AppId) -> Seconds {
        self.per_app.get(app).copied().unwrap_or(0)
    }

    /// Add `seconds` to the app's total, returning the new total.
    pub fn add(&mut self, app: AppId, seconds: Seconds) -> Seconds {
        let total = self.per_app.entry(app).or_insert(0);
        *total = total.saturating_add(seconds);
        *total
    }

    /// Raise the app's total to at least `floor`. Never lowers it.
    pub fn raise_to(&mut self, app: AppId, floor: Seconds) -> bool {
        let total = self.per_app.entry(app).or_insert(0);
        if *total < floor {
            *total = floor;
            true
        } else {
            false
        }
    }

    /// Merge another replica of the same day by per-app maximum.
    ///
    /// Records for a different day are ignored; usage only resets through
    /// rollover.
    pub fn merge_max(&mut self, other: &UsageRecord) {
        if other.day != self.day {
            return;
        }
        for (app, seconds) in &other.per_app {
            self.raise_to(app.clone(), *seconds);
        }
    }

    /// Raise every app listed in `floors`. Returns whether anything changed.
    pub fn raise_all(&mut self, floors: &BTreeMap<AppId, Seconds>) -> bool {
        let mut changed = false;
        for (app, floor) in floors {
            changed |= self.raise_to(app.clone(), *floor);
        }
        changed
    }

    pub fn total(&self) -> Seconds {
        self.per_app.values().fold(0, |acc, s| acc.saturating_add(*s))
    }
}
