use clap::Subcommand;
use screentime_core::{AppId, ApplyNow};
use serde_json::json;

use super::{controller, print_json, CliResult};

#[derive(Subcommand)]
pub enum LimitAction {
    /// Set an app's daily budget. Lowering applies today, raising tomorrow.
    Set {
        app: AppId,
        /// Daily budget in minutes
        minutes: u64,
    },
    /// Remove an app's limit (takes effect tomorrow)
    Remove { app: AppId },
    /// Apply tomorrow's limit for an app today
    ApplyNow {
        app: AppId,
        /// Confirm that today's budget should change
        #[arg(long)]
        confirm: bool,
    },
    /// Print today's and tomorrow's limits as JSON
    List,
}

pub fn run(action: LimitAction) -> CliResult {
    let mut controller = controller()?;
    match action {
        LimitAction::Set { app, minutes } => {
            let secs = minutes.saturating_mul(60);
            let mode = controller.request_limit(app.clone(), Some(secs))?;
            print_json(&json!({ "app": app, "limit_secs": secs, "mode": mode }))?;
        }
        LimitAction::Remove { app } => {
            let mode = controller.request_limit(app.clone(), None)?;
            print_json(&json!({ "app": app, "removed": true, "mode": mode }))?;
        }
        LimitAction::ApplyNow { app, confirm } => {
            if !confirm {
                return Err("refusing to change today's budget without --confirm".into());
            }
            controller.apply_pending_now(&app, ApplyNow::confirmed_by_user())?;
            print_json(&json!({
                "app": app,
                "limit_secs": controller.current_limits().limit_for(&app),
            }))?;
        }
        LimitAction::List => {
            print_json(&json!({
                "current": controller.current_limits(),
                "pending": controller.pending_limits(),
            }))?;
        }
    }
    Ok(())
}
