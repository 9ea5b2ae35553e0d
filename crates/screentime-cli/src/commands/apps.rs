use clap::Subcommand;
use screentime_core::AppId;

use super::{controller, print_json, CliResult};

#[derive(Subcommand)]
pub enum AppsAction {
    /// Replace the tracked app selection
    Set { apps: Vec<AppId> },
    /// Print the tracked apps (selection plus limited apps)
    List,
}

pub fn run(action: AppsAction) -> CliResult {
    let mut controller = controller()?;
    match action {
        AppsAction::Set { apps } => {
            controller.set_tracked_apps(apps.into_iter().collect())?;
            print_json(&controller.tracked_apps())?;
        }
        AppsAction::List => print_json(&controller.tracked_apps())?,
    }
    Ok(())
}
