//! Day-boundary rollover.
//!
//! Shared by the foreground controller and the background monitor; either
//! may get there first on a given day, and both may run it repeatedly.

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::{DaySummary, ShieldContributions, UsageRecord};
use crate::storage::{keys, DailyState, SharedState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RolloverOutcome {
    /// Everything was already dated today.
    Current,
    /// `current` was fresh but `pending` or `usage` carried an old date.
    Repaired,
    /// `pending` was promoted; `from` is the day that was closed out.
    Promoted { from: NaiveDate },
}

/// Bring `state` to `today` in memory.
///
/// However many days were missed, this is a single promotion of `pending`
/// and a single usage reset.
pub fn roll_daily_state(state: &mut DailyState, today: NaiveDate) -> RolloverOutcome {
    if state.current.is_stale(today) {
        let from = state.current.day;
        let promoted = state.pending.promoted(today);
        state.pending = promoted.clone();
        state.current = promoted;
        state.usage = UsageRecord::empty(today);
        return RolloverOutcome::Promoted { from };
    }

    let mut repaired = false;
    if state.pending.is_stale(today) {
        state.pending = state.pending.promoted(today);
        repaired = true;
    }
    if state.usage.is_stale(today) {
        state.usage = UsageRecord::empty(today);
        repaired = true;
    }
    if repaired {
        RolloverOutcome::Repaired
    } else {
        RolloverOutcome::Current
    }
}

/// Load the daily records, roll them to `today` and persist the result.
///
/// On promotion the closed day is written as a [`DaySummary`] and the
/// per-day journals are reset. Running this again on the same day changes
/// nothing.
pub fn perform_rollover(shared: &SharedState, today: NaiveDate) -> (DailyState, RolloverOutcome) {
    let mut state = shared.load_daily(today);
    let previous_usage = state.usage.clone();
    let outcome = roll_daily_state(&mut state, today);

    match outcome {
        RolloverOutcome::Current => {}
        RolloverOutcome::Repaired => {
            tracing::debug!(%today, "repaired stale daily records");
            shared.save_daily(&state);
        }
        RolloverOutcome::Promoted { from } => {
            tracing::info!(%from, %today, "rolled over to a new day");
            close_day(shared, from, previous_usage);
            shared.save_daily(&state);
        }
    }

    (state, outcome)
}

fn close_day(shared: &SharedState, day: NaiveDate, usage: UsageRecord) {
    let counters = shared.load_counters(day);
    let reached = shared.load_limit_reached(day);
    let usage = if usage.day == day {
        usage.per_app
    } else {
        Default::default()
    };

    shared.save_summary(&DaySummary {
        day,
        usage,
        block_count: counters.block_count,
        limit_reached: reached.apps().into_iter().collect(),
        donations_cents: counters.donations_cents,
    });

    // Clearing these is a reset, not a write of today's data; the loaders
    // already ignore records dated another day.
    for key in [keys::DAY_COUNTERS, keys::LIMIT_REACHED] {
        if let Err(e) = shared.store().remove(key) {
            tracing::warn!(key, error = %e, "failed to reset daily journal");
        }
    }
    shared.save_contributions(&ShieldContributions::default());
}
