//! Limit change policy.
//!
//! Tightening takes effect now; loosening waits for the next rollover unless
//! the user explicitly confirms applying it today. Otherwise a user could
//! defeat today's budget by quietly raising it once it runs out.

use serde::{Deserialize, Serialize};

use crate::model::Seconds;

/// When a limit change reaches the enforced (`current`) set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeMode {
    /// Written to both `current` and `pending`.
    Immediate,
    /// Written to `pending` only; `current` changes at rollover.
    Deferred,
}

/// Classify moving an app's limit from `current` to `requested`
/// (`None` meaning "no limit").
pub fn classify(current: Option<Seconds>, requested: Option<Seconds>) -> ChangeMode {
    match (current, requested) {
        (None, _) => ChangeMode::Immediate,
        (Some(old), Some(new)) if new <= old => ChangeMode::Immediate,
        (Some(_), Some(_)) => ChangeMode::Deferred,
        (Some(_), None) => ChangeMode::Deferred,
    }
}

/// Proof that the user consciously confirmed applying a loosening change
/// today. Only obtainable through [`ApplyNow::confirmed_by_user`].
#[derive(Debug)]
pub struct ApplyNow {
    _confirmed: (),
}

impl ApplyNow {
    /// Call only from the explicit confirmation path of the UI.
    pub fn confirmed_by_user() -> Self {
        Self { _confirmed: () }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tightening_is_immediate() {
        assert_eq!(classify(Some(1200), Some(600)), ChangeMode::Immediate);
        assert_eq!(classify(Some(1200), Some(1200)), ChangeMode::Immediate);
        assert_eq!(classify(None, Some(600)), ChangeMode::Immediate);
    }

    #[test]
    fn loosening_is_deferred() {
        assert_eq!(classify(Some(1200), Some(1800)), ChangeMode::Deferred);
        assert_eq!(classify(Some(1200), None), ChangeMode::Deferred);
    }

    #[test]
    fn removing_an_unlimited_app_is_a_no_op_applied_now() {
        assert_eq!(classify(None, None), ChangeMode::Immediate);
    }
}
