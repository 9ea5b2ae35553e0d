use clap::Subcommand;

use super::{print_json, CliResult};

#[derive(Subcommand)]
pub enum SummaryAction {
    /// Print every finished day's summary as JSON, oldest first
    List,
}

pub fn run(action: SummaryAction) -> CliResult {
    match action {
        SummaryAction::List => {
            // Starting the controller closes out a day that ended while
            // nothing was running.
            let controller = super::controller()?;
            print_json(&controller.day_summaries())?;
        }
    }
    Ok(())
}
