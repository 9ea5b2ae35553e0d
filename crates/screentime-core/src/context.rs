//! Everything a component needs to reach the outside world.
//!
//! The foreground controller and the background monitor each get their own
//! [`Context`]. In production they share nothing but the container the store
//! points at.

use std::sync::Arc;

use crate::clock::{Clock, SystemClock};
use crate::enforcement::{EnforcementStore, StoreBackedEnforcement};
use crate::error::Result;
use crate::monitoring::{ActivityCenter, MonitoringScheduler, StoreBackedActivityCenter};
use crate::storage::{Config, MemoryStore, SharedState, SharedStore, SqliteStore};

#[derive(Clone)]
pub struct Context {
    pub config: Config,
    pub state: SharedState,
    pub enforcement: Arc<dyn EnforcementStore>,
    pub activity: Arc<dyn ActivityCenter>,
    pub clock: Arc<dyn Clock>,
}

impl Context {
    /// Open the on-disk container named by `config`, with the shield and the
    /// threshold registrations kept in the same container.
    ///
    /// # Errors
    /// Returns an error if the data directory or database cannot be opened.
    pub fn open(config: Config) -> Result<Self> {
        let path = config.database_path()?;
        let store = SqliteStore::open(&path, &config.storage.container)?;
        Ok(Self::with_store(config, Arc::new(store), Arc::new(SystemClock)))
    }

    /// Build a context whose capabilities all live in `store`. Two contexts
    /// over clones of one [`MemoryStore`] behave like two processes sharing a
    /// container.
    pub fn with_store(config: Config, store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            state: SharedState::new(store.clone()),
            enforcement: Arc::new(StoreBackedEnforcement::new(store.clone())),
            activity: Arc::new(StoreBackedActivityCenter::new(store)),
            clock,
        }
    }

    /// A fresh private container in memory.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Self {
        Self::with_store(Config::default(), Arc::new(MemoryStore::new()), clock)
    }

    pub fn scheduler(&self) -> MonitoringScheduler {
        MonitoringScheduler::new(
            self.state.clone(),
            self.activity.clone(),
            self.clock.clone(),
            self.config.monitor.event_prefix.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::model::{AppId, LimitSet};
    use chrono::NaiveDate;
    use std::collections::BTreeSet;

    #[test]
    fn contexts_over_one_store_see_each_other() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        let clock = Arc::new(ManualClock::at(date, 9, 0));
        let store = MemoryStore::new();
        let foreground = Context::with_store(Config::default(), Arc::new(store.clone()), clock.clone());
        let background = Context::with_store(Config::default(), Arc::new(store), clock);

        let ig = AppId::parse("ig").unwrap();
        let mut limits = LimitSet::empty(date);
        limits.set(ig.clone(), 600);
        foreground.state.save_current(&limits);
        foreground
            .enforcement
            .replace(&BTreeSet::from([ig.clone()]))
            .unwrap();

        assert_eq!(background.state.load_current(), Some(limits));
        assert!(background.enforcement.shielded().contains(&ig));
    }
}
