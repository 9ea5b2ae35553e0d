use chrono::{DateTime, Utc};
use screentime_core::{AppId, RemainingTime};
use serde::Serialize;
use std::collections::BTreeSet;

use super::{controller, print_json, CliResult};

#[derive(Serialize)]
struct AppStatus {
    app: AppId,
    limit_secs: Option<u64>,
    used_secs: u64,
    remaining_secs: RemainingTime,
    exceeded: bool,
    unlocked_until: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
struct Status {
    day: chrono::NaiveDate,
    apps: Vec<AppStatus>,
    shielded: BTreeSet<AppId>,
    block_count: u32,
    donations_cents: u64,
}

pub fn run() -> CliResult {
    let controller = controller()?;
    let ctx = controller.context();
    let now = ctx.clock.now_utc();

    let apps = controller
        .tracked_apps()
        .into_iter()
        .map(|app| AppStatus {
            limit_secs: controller.current_limits().limit_for(&app),
            used_secs: controller.today_usage().used(&app),
            remaining_secs: controller.remaining_time(&app),
            exceeded: controller.has_exceeded_limit(&app),
            unlocked_until: controller.suppressions().active_expiry(&app, now),
            app,
        })
        .collect();

    print_json(&Status {
        day: controller.current_limits().day,
        apps,
        shielded: ctx.enforcement.shielded(),
        block_count: controller.block_count_today(),
        donations_cents: controller.donations_today_cents(),
    })
}
