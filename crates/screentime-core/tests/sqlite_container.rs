//! Integration tests for two processes sharing one SQLite container.

use chrono::{Duration, NaiveDate};
use std::collections::BTreeSet;
use std::sync::Arc;

use screentime_core::storage::keys;
use screentime_core::{
    ActivityMonitor, AppId, ChangeMode, Config, Context, DailyLimitsController, ManualClock,
    MonitorEvent, ScheduleName, SharedStore, SqliteStore,
};

fn app(s: &str) -> AppId {
    AppId::parse(s).unwrap()
}

fn context(path: &std::path::Path, clock: Arc<ManualClock>) -> Context {
    let config = Config::default();
    let store = SqliteStore::open(path, &config.storage.container).unwrap();
    Context::with_store(config, Arc::new(store), clock)
}

#[test]
fn test_foreground_and_monitor_share_a_database_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let clock = Arc::new(ManualClock::at(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(), 9, 0));

    let mut controller = DailyLimitsController::start(context(&path, clock.clone())).unwrap();
    controller.set_limit(app("ig"), 600, ChangeMode::Immediate).unwrap();

    let monitor = ActivityMonitor::new(context(&path, clock.clone()));
    monitor
        .handle(&MonitorEvent::ThresholdReached {
            schedule: ScheduleName::Daily,
            event: "limit.0".into(),
        })
        .unwrap();

    controller.reconcile().unwrap();
    assert!(controller.has_exceeded_limit(&app("ig")));
    assert_eq!(
        controller.context().enforcement.shielded(),
        BTreeSet::from([app("ig")])
    );

    clock.advance(Duration::days(1));
    controller.check_day_boundary().unwrap();
    assert!(!controller.has_exceeded_limit(&app("ig")));
    assert_eq!(controller.day_summaries().len(), 1);
}

#[test]
fn test_legacy_records_are_migrated_on_read() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("shared.db");
    let config = Config::default();
    let store = SqliteStore::open(&path, &config.storage.container).unwrap();
    store
        .set(
            keys::CURRENT_LIMITS,
            r#"{"date":"2026-03-10","limits":{"IG":10},"enabled":true}"#,
        )
        .unwrap();
    store.set(keys::SUPPRESSIONS, "not json at all").unwrap();
    drop(store);

    let clock = Arc::new(ManualClock::at(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(), 9, 0));
    let controller = DailyLimitsController::start(context(&path, clock)).unwrap();
    assert_eq!(controller.current_limits().limit_for(&app("ig")), Some(600));
    assert!(controller.suppressions().is_empty());
}
