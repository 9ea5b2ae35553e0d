//! The platform's activity-tracking service, seen from the foreground.
//!
//! Registrations are keyed by schedule name; starting a schedule that is
//! already registered replaces it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use crate::error::{Result, ValidationError};
use crate::model::{AppId, Seconds};
use crate::storage::records::{self, RecordKind};
use crate::storage::{keys, SharedStore};

const SCOPED_PREFIX: &str = "scoped:";

/// Identity of a monitoring schedule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScheduleName {
    /// The recurring all-day schedule carrying the budget thresholds.
    Daily,
    /// A one-off window with its own shield contribution.
    Scoped(String),
}

impl ScheduleName {
    pub fn scoped(name: impl Into<String>) -> Self {
        ScheduleName::Scoped(name.into())
    }

    pub fn is_daily(&self) -> bool {
        matches!(self, ScheduleName::Daily)
    }
}

impl fmt::Display for ScheduleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleName::Daily => f.write_str("daily"),
            ScheduleName::Scoped(name) => write!(f, "{SCOPED_PREFIX}{name}"),
        }
    }
}

impl FromStr for ScheduleName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "daily" {
            return Ok(ScheduleName::Daily);
        }
        match s.strip_prefix(SCOPED_PREFIX) {
            Some(name) if !name.is_empty() => Ok(ScheduleName::Scoped(name.to_string())),
            _ => Err(ValidationError::InvalidValue {
                field: "schedule".into(),
                message: format!("expected 'daily' or '{SCOPED_PREFIX}<name>', got '{s}'"),
            }),
        }
    }
}

impl Serialize for ScheduleName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScheduleName {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Fire `event_name` once the apps' combined usage in the schedule's
/// interval reaches `threshold_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdWatch {
    pub event_name: String,
    pub apps: Vec<AppId>,
    pub threshold_secs: Seconds,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleWindow {
    /// Local 00:00 to 23:59, repeating every day.
    AllDayRepeating,
    /// From registration until `ends_at`, once.
    Until { ends_at: DateTime<Utc> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    pub schedule: ScheduleName,
    pub window: ScheduleWindow,
    #[serde(default)]
    pub watches: Vec<ThresholdWatch>,
}

pub trait ActivityCenter: Send + Sync {
    /// Register `registration`, replacing any registration with the same
    /// schedule name.
    fn start_monitoring(&self, registration: Registration) -> Result<()>;

    fn stop_monitoring(&self, schedules: &[ScheduleName]) -> Result<()>;

    fn registrations(&self) -> Vec<Registration>;
}

/// In-process activity center that just remembers what it was given.
#[derive(Debug, Clone, Default)]
pub struct RecordingActivityCenter {
    active: Arc<Mutex<BTreeMap<ScheduleName, Registration>>>,
}

impl RecordingActivityCenter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registration(&self, schedule: &ScheduleName) -> Option<Registration> {
        self.map().get(schedule).cloned()
    }

    fn map(&self) -> std::sync::MutexGuard<'_, BTreeMap<ScheduleName, Registration>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ActivityCenter for RecordingActivityCenter {
    fn start_monitoring(&self, registration: Registration) -> Result<()> {
        self.map().insert(registration.schedule.clone(), registration);
        Ok(())
    }

    fn stop_monitoring(&self, schedules: &[ScheduleName]) -> Result<()> {
        let mut map = self.map();
        for schedule in schedules {
            map.remove(schedule);
        }
        Ok(())
    }

    fn registrations(&self) -> Vec<Registration> {
        self.map().values().cloned().collect()
    }
}

/// Registrations persisted in the shared container, so a later process can
/// look up what the platform was asked to watch.
#[derive(Clone)]
pub struct StoreBackedActivityCenter {
    store: Arc<dyn SharedStore>,
}

impl StoreBackedActivityCenter {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }

    fn load(&self) -> BTreeMap<String, Registration> {
        match self.store.get(keys::REGISTRATIONS) {
            Ok(Some(raw)) => records::decode(RecordKind::Other, &raw).unwrap_or_default(),
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, "reading registrations failed");
                BTreeMap::new()
            }
        }
    }

    fn save(&self, map: &BTreeMap<String, Registration>) -> Result<()> {
        self.store.set(keys::REGISTRATIONS, &records::encode(map)?)
    }
}

impl ActivityCenter for StoreBackedActivityCenter {
    fn start_monitoring(&self, registration: Registration) -> Result<()> {
        let mut map = self.load();
        map.insert(registration.schedule.to_string(), registration);
        self.save(&map)
    }

    fn stop_monitoring(&self, schedules: &[ScheduleName]) -> Result<()> {
        let mut map = self.load();
        for schedule in schedules {
            map.remove(&schedule.to_string());
        }
        self.save(&map)
    }

    fn registrations(&self) -> Vec<Registration> {
        self.load().into_values().collect()
    }
}
