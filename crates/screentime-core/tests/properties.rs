//! Property tests for usage accounting and rollover.

use chrono::{Duration, NaiveDate};
use proptest::prelude::*;
use std::sync::Arc;

use screentime_core::rollover::{perform_rollover, roll_daily_state};
use screentime_core::storage::DailyState;
use screentime_core::{
    AppId, ChangeMode, Context, DailyLimitsController, LimitSet, ManualClock, MemoryStore,
    SharedState, UsageRecord,
};

const APPS: [&str; 3] = ["ig", "tiktok", "yt"];

fn app(i: usize) -> AppId {
    AppId::parse(APPS[i % APPS.len()]).unwrap()
}

fn day(offset: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, 1).unwrap() + Duration::days(i64::from(offset))
}

fn daily_state() -> impl Strategy<Value = DailyState> {
    (
        0u32..5,
        0u32..5,
        0u32..5,
        prop::collection::vec((0usize..3, 0u64..5000), 0..4),
        prop::collection::vec((0usize..3, 0u64..5000), 0..4),
        any::<bool>(),
    )
        .prop_map(|(c, p, u, limits, usage, active)| {
            let mut current = LimitSet::empty(day(c));
            let mut pending = LimitSet::empty(day(p));
            for (i, secs) in &limits {
                current.set(app(*i), *secs);
                pending.set(app(*i), secs + 60);
            }
            current.is_active = active;
            let mut record = UsageRecord::empty(day(u));
            for (i, secs) in usage {
                record.add(app(i), secs);
            }
            DailyState {
                current,
                pending,
                usage: record,
            }
        })
}

proptest! {
    #[test]
    fn usage_is_the_running_sum(steps in prop::collection::vec((0usize..3, 0u64..3600), 1..40)) {
        let clock = Arc::new(ManualClock::at(day(0), 8, 0));
        let mut controller = DailyLimitsController::start(Context::in_memory(clock)).unwrap();
        controller.set_limit(app(0), 1800, ChangeMode::Immediate).unwrap();

        let mut expected = [0u64; 3];
        for (i, secs) in steps {
            let before = controller.today_usage().used(&app(i));
            controller.record_usage(app(i), secs).unwrap();
            expected[i] += secs;
            let after = controller.today_usage().used(&app(i));
            prop_assert!(after >= before);
            prop_assert_eq!(after, expected[i]);
        }
    }

    #[test]
    fn rolling_twice_equals_rolling_once(state in daily_state(), today in 0u32..6) {
        let mut once = state.clone();
        roll_daily_state(&mut once, day(today));
        let mut twice = once.clone();
        roll_daily_state(&mut twice, day(today));
        prop_assert_eq!(&once, &twice);
        prop_assert_eq!(once.current.day, day(today));
        prop_assert_eq!(once.pending.day, day(today));
        prop_assert_eq!(once.usage.day, day(today));
    }

    #[test]
    fn persisted_rollover_is_idempotent(state in daily_state(), today in 0u32..6) {
        let shared = SharedState::new(Arc::new(MemoryStore::new()));
        shared.save_daily(&state);

        let (first, _) = perform_rollover(&shared, day(today));
        let summaries = shared.summaries();
        let (second, _) = perform_rollover(&shared, day(today));
        prop_assert_eq!(first, second);
        prop_assert_eq!(summaries, shared.summaries());
    }
}
