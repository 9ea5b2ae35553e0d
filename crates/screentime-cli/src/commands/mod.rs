pub mod apps;
pub mod config;
pub mod limit;
pub mod monitor;
pub mod status;
pub mod summary;
pub mod unlock;
pub mod usage;

use serde::Serialize;
use screentime_core::{Config, Context, DailyLimitsController};

pub type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Open the shared container the way either execution domain would.
pub fn open_context() -> Result<Context, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    Ok(Context::open(config)?)
}

/// Start the foreground controller over the shared container.
pub fn controller() -> Result<DailyLimitsController, Box<dyn std::error::Error>> {
    Ok(DailyLimitsController::start(open_context()?)?)
}

pub fn print_json<T: Serialize>(value: &T) -> CliResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
