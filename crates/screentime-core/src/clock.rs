//! Wall-clock access.
//!
//! Day boundaries are local-time concepts, so everything that decides "what
//! day is it" or "when is midnight" goes through a [`Clock`].

use chrono::{DateTime, Duration, Local, NaiveDate, TimeZone, Utc};
use std::sync::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Local>;

    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Local>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Start at `hour:minute` local time on the given date.
    pub fn at(date: NaiveDate, hour: u32, minute: u32) -> Self {
        Self::new(local_datetime(date, hour, minute))
    }

    pub fn set(&self, to: DateTime<Local>) {
        *self.lock() = to;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.lock();
        *now += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<Local>> {
        // A poisoned clock still holds a valid instant.
        self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Local> {
        *self.lock()
    }
}

/// Resolve a local wall-clock time, preferring the earlier instant when a DST
/// transition makes it ambiguous and skipping forward an hour when it falls
/// in a gap.
pub fn local_datetime(date: NaiveDate, hour: u32, minute: u32) -> DateTime<Local> {
    let naive = date.and_hms_opt(hour, minute, 0).unwrap_or_default();
    Local
        .from_local_datetime(&naive)
        .earliest()
        .or_else(|| Local.from_local_datetime(&(naive + Duration::hours(1))).earliest())
        .unwrap_or_else(|| Local.from_utc_datetime(&naive))
}

/// The first instant of the local day after `now`'s.
pub fn next_local_midnight(now: DateTime<Local>) -> DateTime<Local> {
    let tomorrow = now.date_naive().succ_opt().unwrap_or(NaiveDate::MAX);
    local_datetime(tomorrow, 0, 0)
}
