//! Threshold registration with the platform activity service.

mod platform;
mod scheduler;

pub use platform::{
    ActivityCenter, RecordingActivityCenter, Registration, ScheduleName, ScheduleWindow,
    StoreBackedActivityCenter, ThresholdWatch,
};
pub use scheduler::{
    event_index, event_name, is_unlock_expiry, MonitoringScheduler, RefreshOutcome,
    UNLOCK_EXPIRY_SCOPE,
};
