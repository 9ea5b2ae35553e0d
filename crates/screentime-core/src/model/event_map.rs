//! Threshold event name to application mapping.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use super::app_id::{sanitize_list, AppId};

/// Written by the monitoring scheduler before it registers thresholds, read
/// by the activity monitor when a threshold fires. It may be missing or
/// describe an older limit configuration by the time it is read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTokenMap {
    #[serde(default, deserialize_with = "sanitized_events")]
    pub events: BTreeMap<String, Vec<AppId>>,
}

fn sanitized_events<'de, D>(deserializer: D) -> Result<BTreeMap<String, Vec<AppId>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, Vec<String>>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .map(|(event, apps)| (event, sanitize_list(apps)))
        .filter(|(_, apps)| !apps.is_empty())
        .collect())
}

impl EventTokenMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, event: impl Into<String>, apps: Vec<AppId>) {
        self.events.insert(event.into(), apps);
    }

    /// Apps for `event`, or `None` when the map has no usable entry.
    pub fn resolve(&self, event: &str) -> Option<&[AppId]> {
        self.events
            .get(event)
            .map(Vec::as_slice)
            .filter(|apps| !apps.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
