//! Typed access to the shared container.
//!
//! Reads never fail: a missing, legacy-shaped or corrupt record decodes to
//! its default. Writes are fire-and-forget; a failed write is logged and the
//! next recomputation converges again.

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;

use super::keys;
use super::records::{self, RecordKind};
use super::SharedStore;
use crate::model::app_id::sanitized_list;
use crate::model::{
    AppId, DayCounters, DaySummary, EventTokenMap, LimitReachedLog, LimitSet,
    ShieldContributions, SuppressionSet, UsageRecord,
};

/// The three records that are replaced together at rollover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DailyState {
    pub current: LimitSet,
    pub pending: LimitSet,
    pub usage: UsageRecord,
}

impl DailyState {
    pub fn first_launch(today: NaiveDate) -> Self {
        Self {
            current: LimitSet::empty(today),
            pending: LimitSet::empty(today),
            usage: UsageRecord::empty(today),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackedApps {
    #[serde(default, deserialize_with = "sanitized_list")]
    apps: Vec<AppId>,
}

/// Handle on the shared container. Cheap to clone.
#[derive(Clone)]
pub struct SharedState {
    store: Arc<dyn SharedStore>,
}

impl SharedState {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    fn load<T: DeserializeOwned>(&self, key: &str, kind: RecordKind) -> Option<T> {
        match self.store.get(key) {
            Ok(Some(raw)) => records::decode(kind, &raw),
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(key, error = %e, "shared store read failed");
                None
            }
        }
    }

    fn save<T: Serialize>(&self, key: &str, value: &T) {
        let result = records::encode(value).and_then(|raw| self.store.set(key, &raw));
        if let Err(e) = result {
            tracing::warn!(key, error = %e, "shared store write failed");
        }
    }

    // ── Daily records ───────────────────────────────────────────────

    /// Load `current`/`pending`/`usage` exactly as stored, stale dates
    /// included, so the caller can detect a missed rollover.
    pub fn load_daily(&self, today: NaiveDate) -> DailyState {
        let current: LimitSet = self
            .load(keys::CURRENT_LIMITS, RecordKind::Limits)
            .unwrap_or_else(|| LimitSet::empty(today));
        let pending: LimitSet = self
            .load(keys::PENDING_LIMITS, RecordKind::Limits)
            .unwrap_or_else(|| current.clone());
        let usage: UsageRecord = self
            .load(keys::USAGE_TODAY, RecordKind::Usage)
            .unwrap_or_else(|| UsageRecord::empty(current.day));
        DailyState {
            current,
            pending,
            usage,
        }
    }

    pub fn save_daily(&self, state: &DailyState) {
        self.save_current(&state.current);
        self.save_pending(&state.pending);
        self.save_usage(&state.usage);
    }

    pub fn load_current(&self) -> Option<LimitSet> {
        self.load(keys::CURRENT_LIMITS, RecordKind::Limits)
    }

    pub fn save_current(&self, limits: &LimitSet) {
        self.save(keys::CURRENT_LIMITS, limits);
    }

    pub fn save_pending(&self, limits: &LimitSet) {
        self.save(keys::PENDING_LIMITS, limits);
    }

    pub fn load_usage(&self) -> Option<UsageRecord> {
        self.load(keys::USAGE_TODAY, RecordKind::Usage)
    }

    pub fn save_usage(&self, usage: &UsageRecord) {
        self.save(keys::USAGE_TODAY, usage);
    }

    // ── Unlocks ─────────────────────────────────────────────────────

    pub fn load_suppressions(&self) -> SuppressionSet {
        self.load(keys::SUPPRESSIONS, RecordKind::Suppressions)
            .unwrap_or_default()
    }

    pub fn save_suppressions(&self, suppressions: &SuppressionSet) {
        self.save(keys::SUPPRESSIONS, suppressions);
    }

    // ── Monitoring ──────────────────────────────────────────────────

    pub fn load_event_map(&self) -> EventTokenMap {
        self.load(keys::EVENT_MAP, RecordKind::EventMap)
            .unwrap_or_default()
    }

    pub fn save_event_map(&self, map: &EventTokenMap) {
        self.save(keys::EVENT_MAP, map);
    }

    /// Today's threshold crossings. A log left over from another day reads
    /// as empty.
    pub fn load_limit_reached(&self, today: NaiveDate) -> LimitReachedLog {
        self.load::<LimitReachedLog>(keys::LIMIT_REACHED, RecordKind::Other)
            .filter(|log| log.day == today)
            .unwrap_or_else(|| LimitReachedLog::empty(today))
    }

    pub fn save_limit_reached(&self, log: &LimitReachedLog) {
        self.save(keys::LIMIT_REACHED, log);
    }

    pub fn load_contributions(&self) -> ShieldContributions {
        self.load(keys::CONTRIBUTIONS, RecordKind::Other)
            .unwrap_or_default()
    }

    pub fn save_contributions(&self, contributions: &ShieldContributions) {
        self.save(keys::CONTRIBUTIONS, contributions);
    }

    // ── Selection ───────────────────────────────────────────────────

    pub fn load_tracked_apps(&self) -> BTreeSet<AppId> {
        self.load::<TrackedApps>(keys::TRACKED_APPS, RecordKind::Other)
            .map(|t| t.apps.into_iter().collect())
            .unwrap_or_default()
    }

    pub fn save_tracked_apps(&self, apps: &BTreeSet<AppId>) {
        let record = TrackedApps {
            apps: apps.iter().cloned().collect(),
        };
        self.save(keys::TRACKED_APPS, &record);
    }

    // ── Counters and summaries ──────────────────────────────────────

    /// Counters for `day`. Counters dated any other day read as zero.
    pub fn load_counters(&self, day: NaiveDate) -> DayCounters {
        self.load::<DayCounters>(keys::DAY_COUNTERS, RecordKind::Other)
            .filter(|c| c.day == day)
            .unwrap_or_else(|| DayCounters::empty(day))
    }

    pub fn save_counters(&self, counters: &DayCounters) {
        self.save(keys::DAY_COUNTERS, counters);
    }

    pub fn save_summary(&self, summary: &DaySummary) {
        self.save(&keys::summary(summary.day), summary);
    }

    pub fn load_summary(&self, day: NaiveDate) -> Option<DaySummary> {
        self.load(&keys::summary(day), RecordKind::Other)
    }

    /// All stored day summaries, oldest first.
    pub fn summaries(&self) -> Vec<DaySummary> {
        let keys = match self.store.keys_with_prefix(keys::SUMMARY_PREFIX) {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!(error = %e, "listing day summaries failed");
                return Vec::new();
            }
        };
        keys.iter()
            .filter_map(|key| self.load(key, RecordKind::Other))
            .collect()
    }
}
