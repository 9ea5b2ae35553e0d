//! Records the background monitor leaves behind for the foreground side.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::app_id::AppId;
use super::limits::Seconds;

/// One threshold crossing observed by the background monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitReached {
    pub app: AppId,
    pub at: DateTime<Utc>,
    pub event: String,
    /// The app's limit when the threshold fired. Usage for the day is never
    /// reported below this.
    #[serde(default)]
    pub usage_floor: Seconds,
}

/// Threshold crossings for a single day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitReachedLog {
    pub day: NaiveDate,
    #[serde(default)]
    pub entries: Vec<LimitReached>,
}

impl LimitReachedLog {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            entries: Vec::new(),
        }
    }

    pub fn apps(&self) -> BTreeSet<AppId> {
        self.entries.iter().map(|e| e.app.clone()).collect()
    }

    /// Highest recorded floor per app.
    pub fn floors(&self) -> BTreeMap<AppId, Seconds> {
        let mut floors = BTreeMap::new();
        for entry in &self.entries {
            let floor = floors.entry(entry.app.clone()).or_insert(0);
            *floor = (*floor).max(entry.usage_floor);
        }
        floors
    }
}

/// Which schedule put which apps behind the shield.
///
/// Scoped sub-schedules retract only their own entry when they end.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShieldContributions {
    #[serde(default)]
    pub by_schedule: BTreeMap<String, BTreeSet<AppId>>,
}

impl ShieldContributions {
    pub fn add(&mut self, schedule: &str, apps: impl IntoIterator<Item = AppId>) {
        self.by_schedule
            .entry(schedule.to_string())
            .or_default()
            .extend(apps);
    }

    pub fn take(&mut self, schedule: &str) -> BTreeSet<AppId> {
        self.by_schedule.remove(schedule).unwrap_or_default()
    }

    /// Apps still held by any schedule.
    pub fn held(&self) -> BTreeSet<AppId> {
        self.by_schedule.values().flatten().cloned().collect()
    }
}

/// What happened on one finished day. Written at rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaySummary {
    pub day: NaiveDate,
    #[serde(default)]
    pub usage: BTreeMap<AppId, Seconds>,
    #[serde(default)]
    pub block_count: u32,
    #[serde(default)]
    pub limit_reached: Vec<AppId>,
    #[serde(default)]
    pub donations_cents: u64,
}

/// Running counters for today, folded into a [`DaySummary`] at rollover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayCounters {
    pub day: NaiveDate,
    #[serde(default)]
    pub block_count: u32,
    #[serde(default)]
    pub donations_cents: u64,
}

impl DayCounters {
    pub fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            block_count: 0,
            donations_cents: 0,
        }
    }
}
