//! Background activity monitor.
//!
//! Runs in its own process lifetime, invoked only by the platform's
//! interval and threshold callbacks. It may wake before the foreground
//! controller has run on a given day, so every handler starts with its own
//! rollover, and it must cope with an event map that is missing or stale.

use std::collections::BTreeSet;

use tokio::sync::mpsc;

use crate::context::Context;
use crate::enforcement::blocked_apps;
use crate::error::Result;
use crate::model::{AppId, DayCounters, LimitReached, LimitSet, SuppressionSet, UsageRecord};
use crate::monitoring::{event_index, is_unlock_expiry, ScheduleName};
use crate::rollover::perform_rollover;
use crate::storage::DailyState;

/// A callback from the platform activity service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    IntervalDidStart { schedule: ScheduleName },
    IntervalDidEnd { schedule: ScheduleName },
    ThresholdReached { schedule: ScheduleName, event: String },
}

/// How a threshold event was mapped back to applications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Found in the persisted event map.
    Mapped(Vec<AppId>),
    /// Recovered from the index embedded in the event name.
    Inferred(Vec<AppId>),
    /// Neither worked; every tracked app.
    Fallback(Vec<AppId>),
}

impl Resolution {
    pub fn apps(&self) -> &[AppId] {
        match self {
            Resolution::Mapped(apps) | Resolution::Inferred(apps) | Resolution::Fallback(apps) => {
                apps.as_slice()
            }
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Resolution::Mapped(_) => "mapped",
            Resolution::Inferred(_) => "inferred",
            Resolution::Fallback(_) => "fallback",
        }
    }
}

pub struct ActivityMonitor {
    ctx: Context,
}

impl ActivityMonitor {
    pub fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Dispatch one platform callback.
    ///
    /// # Errors
    /// Returns an error only if the enforcement capability rejects a change.
    /// Store writes that fail are logged and skipped.
    pub fn handle(&self, event: &MonitorEvent) -> Result<()> {
        match event {
            MonitorEvent::IntervalDidStart { schedule } => self.interval_did_start(schedule),
            MonitorEvent::IntervalDidEnd { schedule } => self.interval_did_end(schedule),
            MonitorEvent::ThresholdReached { schedule, event } => {
                self.threshold_reached(schedule, event)
            }
        }
    }

    /// The daily interval starting is a new-day signal: roll over and lift
    /// the shield. Apps that are somehow already over budget today (a zero
    /// limit, or a re-registration in the middle of the day) are shielded
    /// again straight away.
    pub fn interval_did_start(&self, schedule: &ScheduleName) -> Result<()> {
        if !schedule.is_daily() {
            tracing::debug!(%schedule, "scoped interval started");
            return Ok(());
        }

        let now = self.ctx.clock.now_utc();
        let daily = self.enforced_view();
        let suppressions = self.live_suppressions();

        self.ctx.enforcement.clear()?;
        let mut contributions = self.ctx.state.load_contributions();
        contributions.by_schedule.clear();

        let blocked = blocked_apps(&daily.current, &daily.usage, &suppressions, now);
        if !blocked.is_empty() {
            self.ctx.enforcement.replace(&blocked)?;
            contributions.add(&schedule.to_string(), blocked.iter().cloned());
        }
        self.ctx.state.save_contributions(&contributions);

        tracing::info!(day = %daily.current.day, reshielded = blocked.len(), "daily interval started");
        Ok(())
    }

    /// A threshold fired: log it, backfill usage, and add the resolved apps
    /// (minus any that are unlocked) to the shield.
    pub fn threshold_reached(&self, schedule: &ScheduleName, event: &str) -> Result<()> {
        let today = self.ctx.clock.today();
        let now = self.ctx.clock.now_utc();
        let (mut daily, _) = perform_rollover(&self.ctx.state, today);
        let resolution = self.resolve(event, &daily.current);
        let suppressions = self.live_suppressions();

        tracing::info!(
            %schedule,
            event,
            resolution = resolution.kind(),
            apps = resolution.apps().len(),
            "threshold reached"
        );

        // Only a daily event resolved to specific apps says anything about
        // how much of the daily budget was used.
        let backfill = schedule.is_daily() && !matches!(resolution, Resolution::Fallback(_));

        let mut log = self.ctx.state.load_limit_reached(today);
        let mut usage_changed = false;
        for app in resolution.apps() {
            let usage_floor = if backfill {
                daily.current.limit_for(app).unwrap_or(0)
            } else {
                0
            };
            usage_changed |= usage_floor > 0 && daily.usage.raise_to(app.clone(), usage_floor);
            log.entries.push(LimitReached {
                app: app.clone(),
                at: now,
                event: event.to_string(),
                usage_floor,
            });
        }
        self.ctx.state.save_limit_reached(&log);
        if usage_changed {
            self.merge_usage_into_store(&daily.usage);
        }

        let to_shield: BTreeSet<AppId> = resolution
            .apps()
            .iter()
            .filter(|app| !suppressions.is_active(app, now))
            .cloned()
            .collect();
        if to_shield.is_empty() {
            return Ok(());
        }

        let already = self.ctx.enforcement.shielded();
        let newly = to_shield.difference(&already).count();
        self.ctx.enforcement.add(&to_shield)?;

        let mut contributions = self.ctx.state.load_contributions();
        contributions.add(&schedule.to_string(), to_shield);
        self.ctx.state.save_contributions(&contributions);
        self.count_blocks(newly);
        Ok(())
    }

    /// The daily schedule's end means nothing. A scoped schedule retracts
    /// what it contributed, except apps another schedule still holds or that
    /// are over budget anyway. An unlock-expiry schedule ending also puts the
    /// shield back on apps whose unlock just ran out.
    pub fn interval_did_end(&self, schedule: &ScheduleName) -> Result<()> {
        if schedule.is_daily() {
            return Ok(());
        }

        let now = self.ctx.clock.now_utc();
        let daily = self.enforced_view();
        let suppressions = self.live_suppressions();
        let over_budget = blocked_apps(&daily.current, &daily.usage, &suppressions, now);

        let mut contributions = self.ctx.state.load_contributions();
        let released = contributions.take(&schedule.to_string());
        let held = contributions.held();
        let retract: BTreeSet<AppId> = released
            .iter()
            .filter(|app| !held.contains(*app) && !over_budget.contains(*app))
            .cloned()
            .collect();
        if !retract.is_empty() {
            self.ctx.enforcement.remove(&retract)?;
        }

        let mut reapplied = 0;
        if is_unlock_expiry(schedule) && !over_budget.is_empty() {
            let already = self.ctx.enforcement.shielded();
            reapplied = over_budget.difference(&already).count();
            self.ctx.enforcement.add(&over_budget)?;
            contributions.add(&ScheduleName::Daily.to_string(), over_budget);
            self.count_blocks(reapplied);
        }
        self.ctx.state.save_contributions(&contributions);

        tracing::info!(%schedule, retracted = retract.len(), reapplied, "scoped interval ended");
        Ok(())
    }

    /// Map a threshold event back to applications: the persisted map first,
    /// then the index embedded in the name against today's sorted limit
    /// keys, then every tracked app.
    pub fn resolve(&self, event: &str, current: &LimitSet) -> Resolution {
        let map = self.ctx.state.load_event_map();
        if let Some(apps) = map.resolve(event).filter(|apps| !apps.is_empty()) {
            return Resolution::Mapped(apps.to_vec());
        }

        let inferred = event_index(&self.ctx.config.monitor.event_prefix, event)
            .and_then(|index| current.sorted_apps().into_iter().nth(index));
        if let Some(app) = inferred {
            tracing::warn!(event, app = %app, "event missing from map; inferred from its index");
            return Resolution::Inferred(vec![app]);
        }

        let mut tracked = self.ctx.state.load_tracked_apps();
        tracked.extend(current.per_app.keys().cloned());
        tracing::warn!(event, apps = tracked.len(), "unresolvable event; blocking all tracked apps");
        Resolution::Fallback(tracked.into_iter().collect())
    }

    /// Today's records after rollover, with usage raised to the floors left
    /// by earlier threshold events.
    fn enforced_view(&self) -> DailyState {
        let today = self.ctx.clock.today();
        let (mut daily, _) = perform_rollover(&self.ctx.state, today);
        let floors = self.ctx.state.load_limit_reached(today).floors();
        daily.usage.raise_all(&floors);
        daily
    }

    fn live_suppressions(&self) -> SuppressionSet {
        let now = self.ctx.clock.now_utc();
        let mut suppressions = self.ctx.state.load_suppressions();
        if !suppressions.prune_expired(now).is_empty() {
            self.ctx.state.save_suppressions(&suppressions);
        }
        suppressions
    }

    /// Usage written by the foreground since we loaded it must survive.
    fn merge_usage_into_store(&self, usage: &UsageRecord) {
        let mut merged = usage.clone();
        if let Some(stored) = self.ctx.state.load_usage() {
            merged.merge_max(&stored);
        }
        self.ctx.state.save_usage(&merged);
    }

    fn count_blocks(&self, newly: usize) {
        if newly == 0 {
            return;
        }
        let today = self.ctx.clock.today();
        let mut counters: DayCounters = self.ctx.state.load_counters(today);
        counters.block_count = counters
            .block_count
            .saturating_add(u32::try_from(newly).unwrap_or(u32::MAX));
        self.ctx.state.save_counters(&counters);
    }
}

/// Handle callbacks until every sender is dropped.
pub async fn run_monitor(monitor: ActivityMonitor, mut events: mpsc::Receiver<MonitorEvent>) {
    while let Some(event) = events.recv().await {
        if let Err(e) = monitor.handle(&event) {
            tracing::warn!(?event, error = %e, "monitor callback failed");
        }
    }
    tracing::debug!("monitor event channel closed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::model::EventTokenMap;
    use chrono::{Duration, NaiveDate};
    use std::sync::Arc;

    fn app(s: &str) -> AppId {
        AppId::parse(s).unwrap()
    }

    fn apps(names: &[&str]) -> BTreeSet<AppId> {
        names.iter().map(|n| app(n)).collect()
    }

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
    }

    fn setup(limits: &[(&str, u64)]) -> (Context, Arc<ManualClock>, ActivityMonitor) {
        let clock = Arc::new(ManualClock::at(date(), 14, 0));
        let ctx = Context::in_memory(clock.clone());
        let mut current = LimitSet::empty(date());
        for (name, secs) in limits {
            current.set(app(name), *secs);
        }
        ctx.state.save_current(&current);
        ctx.state.save_pending(&current);
        ctx.state.save_usage(&UsageRecord::empty(date()));
        let monitor = ActivityMonitor::new(ctx.clone());
        (ctx, clock, monitor)
    }

    fn threshold(event: &str) -> MonitorEvent {
        MonitorEvent::ThresholdReached {
            schedule: ScheduleName::Daily,
            event: event.into(),
        }
    }

    #[test]
    fn mapped_threshold_shields_and_backfills() {
        let (ctx, _, monitor) = setup(&[("ig", 600), ("yt", 900)]);
        let mut map = EventTokenMap::new();
        map.insert("limit.1", vec![app("yt")]);
        ctx.state.save_event_map(&map);

        monitor.handle(&threshold("limit.1")).unwrap();

        assert_eq!(ctx.enforcement.shielded(), apps(&["yt"]));
        assert_eq!(ctx.state.load_usage().unwrap().used(&app("yt")), 900);
        let log = ctx.state.load_limit_reached(date());
        assert_eq!(log.entries.len(), 1);
        assert_eq!(log.entries[0].usage_floor, 900);
        assert_eq!(ctx.state.load_counters(date()).block_count, 1);
    }

    #[test]
    fn empty_map_falls_back_to_positional_inference() {
        let (ctx, _, monitor) = setup(&[("ig", 600), ("tiktok", 300), ("yt", 900)]);
        assert!(ctx.state.load_event_map().is_empty());

        let resolution = monitor.resolve("limit.2", &ctx.state.load_current().unwrap());
        assert_eq!(resolution, Resolution::Inferred(vec![app("yt")]));

        monitor.handle(&threshold("limit.2")).unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["yt"]));
    }

    #[test]
    fn unresolvable_event_blocks_every_tracked_app() {
        let (ctx, _, monitor) = setup(&[("ig", 600)]);
        ctx.state.save_tracked_apps(&apps(&["news"]));

        monitor.handle(&threshold("limit.7")).unwrap();

        assert_eq!(ctx.enforcement.shielded(), apps(&["ig", "news"]));
        // A coarse block says nothing about real usage.
        assert_eq!(ctx.state.load_usage().unwrap().total(), 0);
        assert_eq!(ctx.state.load_counters(date()).block_count, 2);
    }

    #[test]
    fn unlocked_apps_are_logged_but_not_shielded() {
        let (ctx, clock, monitor) = setup(&[("ig", 600)]);
        let mut suppressions = SuppressionSet::new();
        suppressions.grant(app("ig"), clock.now_utc() + Duration::minutes(10));
        ctx.state.save_suppressions(&suppressions);

        monitor.handle(&threshold("limit.0")).unwrap();

        assert!(ctx.enforcement.shielded().is_empty());
        assert_eq!(ctx.state.load_limit_reached(date()).entries.len(), 1);
        assert_eq!(ctx.state.load_usage().unwrap().used(&app("ig")), 600);
    }

    #[test]
    fn thresholds_union_into_the_shield() {
        let (ctx, _, monitor) = setup(&[("ig", 600), ("yt", 900)]);
        monitor.handle(&threshold("limit.0")).unwrap();
        monitor.handle(&threshold("limit.1")).unwrap();
        monitor.handle(&threshold("limit.1")).unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["ig", "yt"]));
        assert_eq!(ctx.state.load_counters(date()).block_count, 2);
    }

    #[test]
    fn interval_start_rolls_over_and_clears_the_shield() {
        let (ctx, clock, monitor) = setup(&[("ig", 600)]);
        let mut pending = ctx.state.load_daily(date()).pending;
        pending.set(app("ig"), 1200);
        ctx.state.save_pending(&pending);
        monitor.handle(&threshold("limit.0")).unwrap();
        assert!(!ctx.enforcement.shielded().is_empty());

        clock.advance(Duration::hours(11));
        monitor
            .handle(&MonitorEvent::IntervalDidStart {
                schedule: ScheduleName::Daily,
            })
            .unwrap();

        let tomorrow = date().succ_opt().unwrap();
        let daily = ctx.state.load_daily(tomorrow);
        assert_eq!(daily.current.day, tomorrow);
        assert_eq!(daily.current.limit_for(&app("ig")), Some(1200));
        assert_eq!(daily.usage.total(), 0);
        assert!(ctx.enforcement.shielded().is_empty());
        assert_eq!(ctx.state.load_summary(date()).unwrap().limit_reached, vec![app("ig")]);
    }

    #[test]
    fn interval_start_keeps_apps_that_are_still_over_budget() {
        let (ctx, _, monitor) = setup(&[("ig", 600), ("news", 0)]);
        ctx.enforcement.replace(&apps(&["ig", "news"])).unwrap();

        monitor
            .handle(&MonitorEvent::IntervalDidStart {
                schedule: ScheduleName::Daily,
            })
            .unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["news"]));
    }

    #[test]
    fn daily_interval_end_is_a_no_op() {
        let (ctx, _, monitor) = setup(&[("ig", 600)]);
        monitor.handle(&threshold("limit.0")).unwrap();
        monitor
            .handle(&MonitorEvent::IntervalDidEnd {
                schedule: ScheduleName::Daily,
            })
            .unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["ig"]));
    }

    #[test]
    fn scoped_end_retracts_only_its_own_contribution() {
        let (ctx, clock, monitor) = setup(&[("ig", 600)]);
        let focus = ctx
            .scheduler()
            .register_scoped(
                "focus",
                clock.now_utc() + Duration::hours(1),
                &[(app("yt"), 60), (app("ig"), 60)],
            )
            .unwrap();

        monitor
            .handle(&MonitorEvent::ThresholdReached {
                schedule: focus.clone(),
                event: format!("{focus}/0"),
            })
            .unwrap();
        monitor
            .handle(&MonitorEvent::ThresholdReached {
                schedule: focus.clone(),
                event: format!("{focus}/1"),
            })
            .unwrap();
        monitor.handle(&threshold("limit.0")).unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["ig", "yt"]));
        // Scoped thresholds do not count against the daily budget.
        assert_eq!(ctx.state.load_usage().unwrap().used(&app("yt")), 0);

        monitor
            .handle(&MonitorEvent::IntervalDidEnd { schedule: focus })
            .unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["ig"]));
    }

    #[test]
    fn unlock_expiry_end_reapplies_the_shield() {
        let (ctx, clock, monitor) = setup(&[("ig", 600)]);
        let mut usage = UsageRecord::empty(date());
        usage.add(app("ig"), 700);
        ctx.state.save_usage(&usage);

        let expiry = clock.now_utc() + Duration::minutes(15);
        let mut suppressions = SuppressionSet::new();
        suppressions.grant(app("ig"), expiry);
        ctx.state.save_suppressions(&suppressions);
        let schedule = ctx.scheduler().schedule_unlock_expiry(expiry).unwrap();

        clock.advance(Duration::minutes(15));
        monitor
            .handle(&MonitorEvent::IntervalDidEnd { schedule })
            .unwrap();

        assert_eq!(ctx.enforcement.shielded(), apps(&["ig"]));
        assert!(ctx.state.load_suppressions().is_empty());
        assert_eq!(ctx.state.load_counters(date()).block_count, 1);
    }

    #[test]
    fn threshold_on_a_new_day_rolls_over_first() {
        let (ctx, clock, monitor) = setup(&[("ig", 600)]);
        let mut usage = UsageRecord::empty(date());
        usage.add(app("ig"), 300);
        ctx.state.save_usage(&usage);

        clock.advance(Duration::days(1));
        monitor.handle(&threshold("limit.0")).unwrap();

        let tomorrow = date().succ_opt().unwrap();
        assert_eq!(ctx.state.load_current().unwrap().day, tomorrow);
        let usage = ctx.state.load_usage().unwrap();
        assert_eq!(usage.day, tomorrow);
        assert_eq!(usage.used(&app("ig")), 600);
        assert_eq!(ctx.state.load_summary(date()).unwrap().usage[&app("ig")], 300);
    }

    #[tokio::test]
    async fn run_monitor_drains_the_channel() {
        let (ctx, _, monitor) = setup(&[("ig", 600)]);
        let (tx, rx) = mpsc::channel(4);
        let task = tokio::spawn(run_monitor(monitor, rx));
        tx.send(threshold("limit.0")).await.unwrap();
        drop(tx);
        task.await.unwrap();
        assert_eq!(ctx.enforcement.shielded(), apps(&["ig"]));
    }
}
