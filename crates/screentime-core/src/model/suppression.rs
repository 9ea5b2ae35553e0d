//! Temporary-unlock suppressions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::app_id::{sanitized_map, AppId};

/// Apps whose enforcement is suspended until an absolute expiry.
///
/// An entry is active iff `expiry > now`. Expired entries stay in the map
/// until a read path calls [`SuppressionSet::prune_expired`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionSet {
    #[serde(default, deserialize_with = "sanitized_map")]
    pub entries: BTreeMap<AppId, DateTime<Utc>>,
}

impl SuppressionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `expiry` for `app`, replacing any earlier expiry.
    pub fn grant(&mut self, app: AppId, expiry: DateTime<Utc>) {
        self.entries.insert(app, expiry);
    }

    pub fn revoke(&mut self, app: &AppId) -> bool {
        self.entries.remove(app).is_some()
    }

    pub fn is_active(&self, app: &AppId, now: DateTime<Utc>) -> bool {
        self.active_expiry(app, now).is_some()
    }

    pub fn active_expiry(&self, app: &AppId, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.entries.get(app).copied().filter(|expiry| *expiry > now)
    }

    pub fn active_apps(&self, now: DateTime<Utc>) -> Vec<AppId> {
        self.entries
            .iter()
            .filter(|(_, expiry)| **expiry > now)
            .map(|(app, _)| app.clone())
            .collect()
    }

    /// Drop expired entries, returning the apps that were pruned.
    pub fn prune_expired(&mut self, now: DateTime<Utc>) -> Vec<AppId> {
        let expired: Vec<AppId> = self
            .entries
            .iter()
            .filter(|(_, expiry)| **expiry <= now)
            .map(|(app, _)| app.clone())
            .collect();
        for app in &expired {
            self.entries.remove(app);
        }
        expired
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
