use clap::Subcommand;
use screentime_core::AppId;
use serde_json::json;

use super::{controller, print_json, CliResult};

#[derive(Subcommand)]
pub enum UsageAction {
    /// Add seconds of use for an app
    Record { app: AppId, seconds: u64 },
    /// Print today's usage as JSON
    Show,
}

pub fn run(action: UsageAction) -> CliResult {
    let mut controller = controller()?;
    match action {
        UsageAction::Record { app, seconds } => {
            let total = controller.record_usage(app.clone(), seconds)?;
            print_json(&json!({
                "app": app,
                "used_secs": total,
                "exceeded": controller.has_exceeded_limit(&app),
            }))?;
        }
        UsageAction::Show => print_json(controller.today_usage())?,
    }
    Ok(())
}
