//! Limit & usage data model.

pub mod app_id;
mod event_map;
mod journal;
mod limits;
mod suppression;

pub use app_id::AppId;
pub use event_map::EventTokenMap;
pub use journal::{DayCounters, DaySummary, LimitReached, LimitReachedLog, ShieldContributions};
pub use limits::{LimitSet, Seconds, UsageRecord};
pub use suppression::SuppressionSet;
