use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "screentime-cli", version, about = "Screentime CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily limits
    Limit {
        #[command(subcommand)]
        action: commands::limit::LimitAction,
    },
    /// Usage accounting
    Usage {
        #[command(subcommand)]
        action: commands::usage::UsageAction,
    },
    /// Temporary unlocks
    Unlock {
        #[command(subcommand)]
        action: commands::unlock::UnlockAction,
    },
    /// Tracked app selection
    Apps {
        #[command(subcommand)]
        action: commands::apps::AppsAction,
    },
    /// Print enforcement state for every tracked app as JSON
    Status,
    /// Deliver platform monitoring callbacks (background side)
    Monitor {
        #[command(subcommand)]
        action: commands::monitor::MonitorAction,
    },
    /// Finished-day summaries
    Summary {
        #[command(subcommand)]
        action: commands::summary::SummaryAction,
    },
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_env("SCREENTIME_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_logging();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Limit { action } => commands::limit::run(action),
        Commands::Usage { action } => commands::usage::run(action),
        Commands::Unlock { action } => commands::unlock::run(action),
        Commands::Apps { action } => commands::apps::run(action),
        Commands::Status => commands::status::run(),
        Commands::Monitor { action } => commands::monitor::run(action),
        Commands::Summary { action } => commands::summary::run(action),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
