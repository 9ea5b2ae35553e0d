//! Turns the enforced limits into threshold registrations.
//!
//! Every caller that changes something the thresholds depend on (limits,
//! app selection, authorization, rollover) goes through [`MonitoringScheduler::refresh`].

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use super::platform::{ActivityCenter, Registration, ScheduleName, ScheduleWindow, ThresholdWatch};
use crate::clock::Clock;
use crate::error::{Result, ValidationError};
use crate::model::{AppId, EventTokenMap, LimitSet, Seconds};
use crate::storage::SharedState;

/// Scope prefix of the sub-schedules that re-evaluate enforcement when an
/// unlock expires.
pub const UNLOCK_EXPIRY_SCOPE: &str = "unlock-expiry";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefreshOutcome {
    Registered { watches: usize },
    Stopped,
}

/// `<prefix>.<index>`, where `index` is the app's position among the sorted
/// keys of the current limit set.
pub fn event_name(prefix: &str, index: usize) -> String {
    format!("{prefix}.{index}")
}

/// Recover the positional index embedded by [`event_name`].
pub fn event_index(prefix: &str, event: &str) -> Option<usize> {
    event.strip_prefix(prefix)?.strip_prefix('.')?.parse().ok()
}

pub fn is_unlock_expiry(schedule: &ScheduleName) -> bool {
    match schedule {
        ScheduleName::Scoped(name) => name
            .strip_prefix(UNLOCK_EXPIRY_SCOPE)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with('.')),
        ScheduleName::Daily => false,
    }
}

pub struct MonitoringScheduler {
    shared: SharedState,
    center: Arc<dyn ActivityCenter>,
    clock: Arc<dyn Clock>,
    event_prefix: String,
}

impl MonitoringScheduler {
    pub fn new(
        shared: SharedState,
        center: Arc<dyn ActivityCenter>,
        clock: Arc<dyn Clock>,
        event_prefix: impl Into<String>,
    ) -> Self {
        Self {
            shared,
            center,
            clock,
            event_prefix: event_prefix.into(),
        }
    }

    pub fn event_prefix(&self) -> &str {
        &self.event_prefix
    }

    /// One watch per limited app, named by its sorted position. Apps with a
    /// zero budget get no watch; they are blocked by recomputation alone.
    pub fn daily_watches(&self, current: &LimitSet) -> Vec<ThresholdWatch> {
        if !current.is_active {
            return Vec::new();
        }
        current
            .per_app
            .iter()
            .enumerate()
            .filter(|(_, (_, secs))| **secs > 0)
            .map(|(index, (app, secs))| ThresholdWatch {
                event_name: event_name(&self.event_prefix, index),
                apps: vec![app.clone()],
                threshold_secs: *secs,
            })
            .collect()
    }

    /// Re-register the daily thresholds from what is stored now.
    ///
    /// # Errors
    /// Returns an error if the activity center rejects the request.
    pub fn refresh(&self, reason: &str) -> Result<RefreshOutcome> {
        let today = self.clock.today();
        let current = self.shared.load_daily(today).current;
        let mut tracked = self.shared.load_tracked_apps();
        tracked.extend(current.per_app.keys().cloned());

        let watches = self.daily_watches(&current);

        // The map is written before registering so a threshold that fires
        // right away can already be resolved.
        let mut map = self.scoped_event_map();
        for watch in &watches {
            map.insert(watch.event_name.clone(), watch.apps.clone());
        }
        self.shared.save_event_map(&map);

        // Replace, never merge.
        self.center.stop_monitoring(&[ScheduleName::Daily])?;

        if tracked.is_empty() || watches.is_empty() {
            tracing::info!(reason, "nothing to watch; monitoring stopped");
            return Ok(RefreshOutcome::Stopped);
        }

        let count = watches.len();
        self.center.start_monitoring(Registration {
            schedule: ScheduleName::Daily,
            window: ScheduleWindow::AllDayRepeating,
            watches,
        })?;
        tracing::info!(reason, watches = count, "monitoring refreshed");
        Ok(RefreshOutcome::Registered { watches: count })
    }

    /// Register a one-off scoped schedule ending at `ends_at` with its own
    /// thresholds. Event names are `<schedule>/<index>`.
    ///
    /// # Errors
    /// Returns an error for an empty scope name or an end in the past, or if
    /// the activity center rejects the request.
    pub fn register_scoped(
        &self,
        scope: &str,
        ends_at: DateTime<Utc>,
        thresholds: &[(AppId, Seconds)],
    ) -> Result<ScheduleName> {
        if scope.is_empty() {
            return Err(ValidationError::InvalidValue {
                field: "scope".into(),
                message: "must not be empty".into(),
            }
            .into());
        }
        if ends_at <= self.clock.now_utc() {
            return Err(ValidationError::InvalidValue {
                field: "ends_at".into(),
                message: "scoped schedule must end in the future".into(),
            }
            .into());
        }

        let schedule = ScheduleName::scoped(scope);
        let watches: Vec<ThresholdWatch> = thresholds
            .iter()
            .filter(|(_, secs)| *secs > 0)
            .enumerate()
            .map(|(index, (app, secs))| ThresholdWatch {
                event_name: format!("{schedule}/{index}"),
                apps: vec![app.clone()],
                threshold_secs: *secs,
            })
            .collect();

        let own_prefix = format!("{schedule}/");
        let mut map = self.shared.load_event_map();
        map.events.retain(|event, _| !event.starts_with(&own_prefix));
        for watch in &watches {
            map.insert(watch.event_name.clone(), watch.apps.clone());
        }
        self.shared.save_event_map(&map);

        self.prune_finished_scopes()?;
        self.center.start_monitoring(Registration {
            schedule: schedule.clone(),
            window: ScheduleWindow::Until { ends_at },
            watches,
        })?;
        tracing::debug!(%schedule, %ends_at, "scoped schedule registered");
        Ok(schedule)
    }

    /// Ask the platform to call back when an unlock ending at `expiry` runs
    /// out, so enforcement is re-evaluated even if the foreground is idle.
    pub fn schedule_unlock_expiry(&self, expiry: DateTime<Utc>) -> Result<ScheduleName> {
        self.register_scoped(
            &format!("{UNLOCK_EXPIRY_SCOPE}.{}", expiry.timestamp()),
            expiry,
            &[],
        )
    }

    /// Drop scoped registrations whose window has already closed.
    pub fn prune_finished_scopes(&self) -> Result<()> {
        let now = self.clock.now_utc();
        let finished: Vec<ScheduleName> = self
            .center
            .registrations()
            .into_iter()
            .filter(|r| matches!(r.window, ScheduleWindow::Until { ends_at } if ends_at <= now))
            .map(|r| r.schedule)
            .collect();
        if !finished.is_empty() {
            self.center.stop_monitoring(&finished)?;
        }
        Ok(())
    }

    fn scoped_event_map(&self) -> EventTokenMap {
        let mut map = EventTokenMap::new();
        for registration in self.center.registrations() {
            if registration.schedule.is_daily() {
                continue;
            }
            for watch in registration.watches {
                map.insert(watch.event_name, watch.apps);
            }
        }
        map
    }
}
