//! The capability that actually blocks applications.
//!
//! It holds nothing but the currently shielded set. The controller replaces
//! that set wholesale after each recomputation; the background monitor only
//! ever adds to it or retracts its own contributions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use crate::error::Result;
use crate::model::app_id::sanitized_list;
use crate::model::{AppId, LimitSet, SuppressionSet, UsageRecord};
use crate::storage::records::{self, RecordKind};
use crate::storage::{keys, SharedStore};

/// Apps whose usage has reached their limit and that no active unlock covers.
///
/// Apps without a limit are never blocked; a zero limit blocks immediately.
pub fn blocked_apps(
    current: &LimitSet,
    usage: &UsageRecord,
    suppressions: &SuppressionSet,
    now: DateTime<Utc>,
) -> BTreeSet<AppId> {
    current
        .per_app
        .keys()
        .filter(|app| !suppressions.is_active(app, now))
        .filter(|app| {
            current
                .limit_for(app)
                .is_some_and(|limit| usage.used(app) >= limit)
        })
        .cloned()
        .collect()
}

pub trait EnforcementStore: Send + Sync {
    fn shielded(&self) -> BTreeSet<AppId>;

    /// Shield exactly `apps`, unshielding everything else.
    fn replace(&self, apps: &BTreeSet<AppId>) -> Result<()>;

    fn add(&self, apps: &BTreeSet<AppId>) -> Result<()> {
        let mut shielded = self.shielded();
        shielded.extend(apps.iter().cloned());
        self.replace(&shielded)
    }

    fn remove(&self, apps: &BTreeSet<AppId>) -> Result<()> {
        let shielded: BTreeSet<AppId> = self.shielded().difference(apps).cloned().collect();
        self.replace(&shielded)
    }

    fn clear(&self) -> Result<()> {
        self.replace(&BTreeSet::new())
    }
}

/// In-process shield. Clones share one set.
#[derive(Debug, Clone, Default)]
pub struct MemoryEnforcement {
    shielded: Arc<Mutex<BTreeSet<AppId>>>,
}

impl MemoryEnforcement {
    pub fn new() -> Self {
        Self::default()
    }

    fn set(&self) -> std::sync::MutexGuard<'_, BTreeSet<AppId>> {
        self.shielded.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EnforcementStore for MemoryEnforcement {
    fn shielded(&self) -> BTreeSet<AppId> {
        self.set().clone()
    }

    fn replace(&self, apps: &BTreeSet<AppId>) -> Result<()> {
        *self.set() = apps.clone();
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ShieldRecord {
    #[serde(default, deserialize_with = "sanitized_list")]
    apps: Vec<AppId>,
}

/// Shield persisted in the shared container, so separate processes (the CLI
/// playing either execution domain) see one shielded set.
#[derive(Clone)]
pub struct StoreBackedEnforcement {
    store: Arc<dyn SharedStore>,
}

impl StoreBackedEnforcement {
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self { store }
    }
}

impl EnforcementStore for StoreBackedEnforcement {
    fn shielded(&self) -> BTreeSet<AppId> {
        match self.store.get(keys::SHIELDED) {
            Ok(Some(raw)) => records::decode::<ShieldRecord>(RecordKind::Other, &raw)
                .map(|r| r.apps.into_iter().collect())
                .unwrap_or_default(),
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(error = %e, "reading shielded set failed");
                BTreeSet::new()
            }
        }
    }

    fn replace(&self, apps: &BTreeSet<AppId>) -> Result<()> {
        if apps.is_empty() {
            return self.store.remove(keys::SHIELDED);
        }
        let record = ShieldRecord {
            apps: apps.iter().cloned().collect(),
        };
        self.store.set(keys::SHIELDED, &records::encode(&record)?)
    }
}
