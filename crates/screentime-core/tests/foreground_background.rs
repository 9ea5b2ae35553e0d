//! Integration tests for the foreground controller and the background
//! monitor sharing one container.
//!
//! Each side gets its own `Context` over clones of one `MemoryStore`, the way
//! two processes would each open the shared container.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;

use screentime_core::storage::keys;
use screentime_core::{
    ActivityMonitor, AppId, ChangeMode, Clock, Config, Context, DailyLimitsController,
    ManualClock, MemoryStore, MonitorEvent, ScheduleName, SharedStore, UnlockSource,
};

fn app(s: &str) -> AppId {
    AppId::parse(s).unwrap()
}

fn apps(names: &[&str]) -> BTreeSet<AppId> {
    names.iter().map(|n| app(n)).collect()
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 10).unwrap()
}

struct Device {
    store: MemoryStore,
    clock: Arc<ManualClock>,
}

impl Device {
    fn new(hour: u32) -> Self {
        Self {
            store: MemoryStore::new(),
            clock: Arc::new(ManualClock::at(date(), hour, 0)),
        }
    }

    fn context(&self) -> Context {
        Context::with_store(Config::default(), Arc::new(self.store.clone()), self.clock.clone())
    }

    fn foreground(&self) -> DailyLimitsController {
        DailyLimitsController::start(self.context()).unwrap()
    }

    fn background(&self) -> ActivityMonitor {
        ActivityMonitor::new(self.context())
    }
}

fn threshold(event: &str) -> MonitorEvent {
    MonitorEvent::ThresholdReached {
        schedule: ScheduleName::Daily,
        event: event.into(),
    }
}

#[test]
fn test_threshold_from_background_is_reconciled_in_foreground() {
    let device = Device::new(9);
    let mut controller = device.foreground();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();
    controller.set_limit(app("yt"), 900, ChangeMode::Immediate).unwrap();
    controller.record_usage(app("yt"), 120).unwrap();

    let monitor = device.background();
    monitor.handle(&threshold("limit.1")).unwrap();
    assert_eq!(device.context().enforcement.shielded(), apps(&["yt"]));

    // The foreground has not seen the event yet.
    assert!(!controller.has_exceeded_limit(&app("yt")));
    controller.reconcile().unwrap();
    assert!(controller.has_exceeded_limit(&app("yt")));
    assert_eq!(controller.today_usage().used(&app("yt")), 900);
    assert_eq!(controller.block_count_today(), 1);

    // Recording more usage in the foreground keeps the backfilled floor.
    controller.record_usage(app("yt"), 10).unwrap();
    assert_eq!(controller.today_usage().used(&app("yt")), 910);
}

#[test]
fn test_monitor_rolls_over_before_the_foreground_wakes() {
    let device = Device::new(18);
    let mut controller = device.foreground();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();
    controller.request_limit(app("ig"), Some(1200)).unwrap();
    controller.record_usage(app("ig"), 600).unwrap();
    assert_eq!(device.context().enforcement.shielded(), apps(&["ig"]));

    device.clock.advance(Duration::hours(7));
    device
        .background()
        .handle(&MonitorEvent::IntervalDidStart {
            schedule: ScheduleName::Daily,
        })
        .unwrap();
    assert!(device.context().enforcement.shielded().is_empty());

    let outcome = controller.check_day_boundary().unwrap();
    assert!(matches!(outcome, screentime_core::RolloverOutcome::Promoted { .. }));
    assert_eq!(controller.current_limits().limit_for(&app("ig")), Some(1200));
    assert_eq!(controller.today_usage().used(&app("ig")), 0);
    assert_eq!(controller.day_summaries().len(), 1);
    assert_eq!(controller.day_summaries()[0].block_count, 1);
}

#[test]
fn test_unlock_expiry_is_enforced_without_the_foreground() {
    let device = Device::new(12);
    let mut controller = device.foreground();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();
    controller.record_usage(app("ig"), 600).unwrap();
    let grant = controller
        .grant_temporary_unlock(vec![app("ig")], Duration::minutes(20), UnlockSource::Free)
        .unwrap();
    assert!(device.context().enforcement.shielded().is_empty());
    drop(controller);

    let expiry_schedule = device
        .context()
        .activity
        .registrations()
        .into_iter()
        .map(|r| r.schedule)
        .find(|s| !s.is_daily())
        .unwrap();

    device.clock.advance(Duration::minutes(20));
    assert!(grant.expires_at <= device.clock.now_utc());
    device
        .background()
        .handle(&MonitorEvent::IntervalDidEnd {
            schedule: expiry_schedule,
        })
        .unwrap();
    assert_eq!(device.context().enforcement.shielded(), apps(&["ig"]));
}

#[test]
fn test_threshold_with_stale_map_is_inferred_from_position() {
    let device = Device::new(9);
    let mut controller = device.foreground();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();
    controller.set_limit(app("yt"), 900, ChangeMode::Immediate).unwrap();
    device.store.remove(keys::EVENT_MAP).unwrap();

    device.background().handle(&threshold("limit.0")).unwrap();
    assert_eq!(device.context().enforcement.shielded(), apps(&["ig"]));
}

#[test]
fn test_unlocked_app_is_not_shielded_by_a_late_threshold() {
    let device = Device::new(9);
    let mut controller = device.foreground();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();
    controller
        .grant_until_day_boundary(vec![app("ig")], UnlockSource::Free)
        .unwrap();

    device.background().handle(&threshold("limit.0")).unwrap();
    assert!(device.context().enforcement.shielded().is_empty());

    controller.reconcile().unwrap();
    assert!(!controller.has_exceeded_limit(&app("ig")));
    assert!(device.context().enforcement.shielded().is_empty());
}

#[test]
fn test_foreground_recompute_clears_a_coarse_fallback_block() {
    let device = Device::new(9);
    let mut controller = device.foreground();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();
    controller.set_tracked_apps(apps(&["news"])).unwrap();

    device.background().handle(&threshold("garbage")).unwrap();
    assert_eq!(device.context().enforcement.shielded(), apps(&["ig", "news"]));

    // The foreground knows the real usage and replaces the shield.
    controller.reconcile().unwrap();
    assert!(device.context().enforcement.shielded().is_empty());
}
