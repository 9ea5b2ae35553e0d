use chrono::Duration;
use clap::{Args, Subcommand};
use screentime_core::{AppId, UnlockSource};
use serde_json::json;

use super::{controller, print_json, CliResult};

#[derive(Args)]
pub struct Payment {
    /// Donation settled for this unlock, in cents
    #[arg(long, requires = "charity")]
    donation_cents: Option<u64>,
    /// Charity receiving the donation
    #[arg(long, requires = "donation_cents")]
    charity: Option<String>,
}

impl Payment {
    fn source(self) -> UnlockSource {
        match (self.donation_cents, self.charity) {
            (Some(donation_cents), Some(charity)) => UnlockSource::Paid {
                donation_cents,
                charity,
            },
            _ => UnlockSource::Free,
        }
    }
}

#[derive(Subcommand)]
pub enum UnlockAction {
    /// Unlock apps for a short break
    Break {
        #[arg(required = true)]
        apps: Vec<AppId>,
        /// Break length (defaults to unlock.default_break_minutes)
        #[arg(long)]
        minutes: Option<u32>,
        #[command(flatten)]
        payment: Payment,
    },
    /// Unlock apps until midnight
    DayPass {
        #[arg(required = true)]
        apps: Vec<AppId>,
        #[command(flatten)]
        payment: Payment,
    },
    /// End an unlock early
    Revoke { app: AppId },
}

pub fn run(action: UnlockAction) -> CliResult {
    let mut controller = controller()?;
    match action {
        UnlockAction::Break {
            apps,
            minutes,
            payment,
        } => {
            let minutes =
                minutes.unwrap_or(controller.context().config.unlock.default_break_minutes);
            let grant = controller.grant_temporary_unlock(
                apps,
                Duration::minutes(i64::from(minutes)),
                payment.source(),
            )?;
            print_json(&grant)?;
        }
        UnlockAction::DayPass { apps, payment } => {
            let grant = controller.grant_until_day_boundary(apps, payment.source())?;
            print_json(&grant)?;
        }
        UnlockAction::Revoke { app } => {
            let revoked = controller.revoke_unlock(&app)?;
            print_json(&json!({ "app": app, "revoked": revoked }))?;
        }
    }
    Ok(())
}
