use chrono::Duration;
use clap::Subcommand;
use screentime_core::{ActivityMonitor, AppId, MonitorEvent, ScheduleName};
use serde_json::json;

use super::{open_context, print_json, CliResult};

#[derive(Subcommand)]
pub enum MonitorAction {
    /// An interval began (`daily` or `scoped:<name>`)
    IntervalStart {
        #[arg(long, default_value = "daily")]
        schedule: ScheduleName,
    },
    /// An interval ended
    IntervalEnd {
        #[arg(long, default_value = "daily")]
        schedule: ScheduleName,
    },
    /// A usage threshold was crossed
    Threshold {
        /// Event name as registered, e.g. `limit.0`
        event: String,
        #[arg(long, default_value = "daily")]
        schedule: ScheduleName,
    },
    /// Re-register the daily thresholds from stored limits
    Refresh {
        #[arg(long, default_value = "manual refresh")]
        reason: String,
    },
    /// Register a scoped schedule with its own thresholds
    Scoped {
        name: String,
        /// Window length in minutes from now
        #[arg(long)]
        minutes: i64,
        /// `<app>=<seconds>` thresholds
        #[arg(value_parser = parse_watch)]
        watches: Vec<(AppId, u64)>,
    },
    /// Print current registrations as JSON
    Registrations,
}

fn parse_watch(raw: &str) -> Result<(AppId, u64), String> {
    let (app, secs) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected <app>=<seconds>, got '{raw}'"))?;
    let app: AppId = app.parse().map_err(|e| format!("{e}"))?;
    let secs = secs.parse().map_err(|e| format!("invalid seconds '{secs}': {e}"))?;
    Ok((app, secs))
}

pub fn run(action: MonitorAction) -> CliResult {
    let ctx = open_context()?;
    let event = match action {
        MonitorAction::IntervalStart { schedule } => MonitorEvent::IntervalDidStart { schedule },
        MonitorAction::IntervalEnd { schedule } => MonitorEvent::IntervalDidEnd { schedule },
        MonitorAction::Threshold { event, schedule } => {
            MonitorEvent::ThresholdReached { schedule, event }
        }
        MonitorAction::Refresh { reason } => {
            let outcome = ctx.scheduler().refresh(&reason)?;
            return print_json(&outcome);
        }
        MonitorAction::Scoped {
            name,
            minutes,
            watches,
        } => {
            let ends_at = ctx.clock.now_utc() + Duration::minutes(minutes);
            let schedule = ctx.scheduler().register_scoped(&name, ends_at, &watches)?;
            return print_json(&json!({ "schedule": schedule, "ends_at": ends_at }));
        }
        MonitorAction::Registrations => {
            return print_json(&ctx.activity.registrations());
        }
    };

    let shield = ctx.enforcement.clone();
    ActivityMonitor::new(ctx).handle(&event)?;
    print_json(&json!({ "shielded": shield.shielded() }))
}
