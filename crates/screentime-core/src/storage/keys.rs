//! Key layout inside the shared container.

pub const CURRENT_LIMITS: &str = "limits.current";
pub const PENDING_LIMITS: &str = "limits.pending";
pub const USAGE_TODAY: &str = "usage.today";
pub const SUPPRESSIONS: &str = "unlock.suppressions";
pub const EVENT_MAP: &str = "monitor.event_map";
pub const LIMIT_REACHED: &str = "monitor.limit_reached";
pub const CONTRIBUTIONS: &str = "monitor.contributions";
pub const TRACKED_APPS: &str = "apps.tracked";
pub const DAY_COUNTERS: &str = "counters.today";
pub const SUMMARY_PREFIX: &str = "summary.";

/// Shielded set for the store-backed enforcement capability.
pub const SHIELDED: &str = "enforcement.shielded";
/// Registrations held by the store-backed activity center.
pub const REGISTRATIONS: &str = "platform.registrations";

pub fn summary(day: chrono::NaiveDate) -> String {
    format!("{SUMMARY_PREFIX}{}", day.format("%Y-%m-%d"))
}
