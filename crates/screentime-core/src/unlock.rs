//! Temporary unlocks.
//!
//! A grant suspends enforcement for some apps until an absolute expiry. It
//! never touches usage: the budget keeps running underneath it.

use chrono::{DateTime, Duration, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::next_local_midnight;
use crate::error::ValidationError;
use crate::model::{AppId, Seconds};
use crate::storage::UnlockConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnlockKind {
    /// Unlocked for a fixed number of seconds from now.
    TimedBreak { secs: Seconds },
    /// Unlocked until the next local midnight.
    DayPass,
}

impl UnlockKind {
    pub fn timed(duration: Duration) -> Self {
        UnlockKind::TimedBreak {
            secs: u64::try_from(duration.num_seconds()).unwrap_or(0),
        }
    }

    pub fn expiry(&self, now: DateTime<Local>) -> DateTime<Utc> {
        match self {
            UnlockKind::TimedBreak { secs } => {
                let secs = i64::try_from(*secs).unwrap_or(i64::MAX);
                (now + Duration::try_seconds(secs).unwrap_or(Duration::MAX)).with_timezone(&Utc)
            }
            UnlockKind::DayPass => next_local_midnight(now).with_timezone(&Utc),
        }
    }

    pub fn validate(&self, config: &UnlockConfig) -> Result<(), ValidationError> {
        if let UnlockKind::TimedBreak { secs } = self {
            let max = u64::from(config.max_break_minutes) * 60;
            if *secs == 0 {
                return Err(ValidationError::InvalidValue {
                    field: "duration".into(),
                    message: "break must be longer than zero".into(),
                });
            }
            if *secs > max {
                return Err(ValidationError::InvalidValue {
                    field: "duration".into(),
                    message: format!("break exceeds {} minutes", config.max_break_minutes),
                });
            }
        }
        Ok(())
    }
}

/// Who paid for the unlock, if anyone. Payment itself is settled elsewhere;
/// only the resulting donation total is kept.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum UnlockSource {
    #[default]
    Free,
    Paid {
        donation_cents: u64,
        charity: String,
    },
}

impl UnlockSource {
    pub fn donation_cents(&self) -> u64 {
        match self {
            UnlockSource::Free => 0,
            UnlockSource::Paid { donation_cents, .. } => *donation_cents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnlockGrant {
    pub id: Uuid,
    pub apps: Vec<AppId>,
    #[serde(flatten)]
    pub kind: UnlockKind,
    #[serde(flatten)]
    pub source: UnlockSource,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl UnlockGrant {
    /// Validate and build a grant issued at `now`.
    ///
    /// # Errors
    /// Returns a validation error for an empty app list or a break that is
    /// zero or longer than the configured maximum.
    pub fn new(
        apps: Vec<AppId>,
        kind: UnlockKind,
        source: UnlockSource,
        now: DateTime<Local>,
        config: &UnlockConfig,
    ) -> Result<Self, ValidationError> {
        if apps.is_empty() {
            return Err(ValidationError::EmptyCollection("apps to unlock".into()));
        }
        kind.validate(config)?;

        let mut apps = apps;
        apps.sort();
        apps.dedup();

        Ok(Self {
            id: Uuid::new_v4(),
            apps,
            kind,
            source,
            granted_at: now.with_timezone(&Utc),
            expires_at: kind.expiry(now),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::local_datetime;
    use chrono::NaiveDate;

    fn app(s: &str) -> AppId {
        AppId::parse(s).unwrap()
    }

    fn noon() -> DateTime<Local> {
        local_datetime(NaiveDate::from_ymd_opt(2026, 3, 10).unwrap(), 12, 0)
    }

    #[test]
    fn timed_break_expires_after_duration() {
        let kind = UnlockKind::timed(Duration::minutes(15));
        assert_eq!(kind, UnlockKind::TimedBreak { secs: 900 });
        assert_eq!(kind.expiry(noon()), (noon() + Duration::minutes(15)).with_timezone(&Utc));
    }

    #[test]
    fn day_pass_expires_at_next_midnight() {
        let expiry = UnlockKind::DayPass.expiry(noon()).with_timezone(&Local);
        assert_eq!(expiry.date_naive(), NaiveDate::from_ymd_opt(2026, 3, 11).unwrap());
        assert_eq!(expiry.format("%H:%M").to_string(), "00:00");
    }

    #[test]
    fn grant_rejects_bad_requests() {
        let config = UnlockConfig::default();
        let empty = UnlockGrant::new(vec![], UnlockKind::DayPass, UnlockSource::Free, noon(), &config);
        assert!(matches!(empty, Err(ValidationError::EmptyCollection(_))));

        let zero = UnlockGrant::new(
            vec![app("ig")],
            UnlockKind::timed(Duration::zero()),
            UnlockSource::Free,
            noon(),
            &config,
        );
        assert!(matches!(zero, Err(ValidationError::InvalidValue { .. })));

        let too_long = UnlockGrant::new(
            vec![app("ig")],
            UnlockKind::timed(Duration::hours(5)),
            UnlockSource::Free,
            noon(),
            &config,
        );
        assert!(too_long.is_err());
    }

    #[test]
    fn grant_dedups_apps_and_keeps_donation() {
        let grant = UnlockGrant::new(
            vec![app("yt"), app("ig"), app("yt")],
            UnlockKind::DayPass,
            UnlockSource::Paid {
                donation_cents: 299,
                charity: "library".into(),
            },
            noon(),
            &UnlockConfig::default(),
        )
        .unwrap();
        assert_eq!(grant.apps, vec![app("ig"), app("yt")]);
        assert_eq!(grant.source.donation_cents(), 299);

        let json = serde_json::to_value(&grant).unwrap();
        assert_eq!(json["kind"], "day_pass");
        assert_eq!(json["source"], "paid");
        assert_eq!(json["donation_cents"], 299);
    }
}
