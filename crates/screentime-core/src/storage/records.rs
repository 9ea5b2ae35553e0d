//! Versioned record encoding for the shared store.
//!
//! Every record is written as `{"version": N, "data": ...}`. Reads accept the
//! current version and migrate the legacy un-enveloped shapes written by
//! version 1. Anything else (newer versions, broken JSON, wrong shape) decodes
//! to `None` so callers fall back to defaults.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

/// Version stamped on every record this build writes.
pub const RECORD_VERSION: u32 = 2;

/// Which logical record a payload holds; selects the legacy migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Limits,
    Usage,
    Suppressions,
    EventMap,
    Other,
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    version: u32,
    data: &'a T,
}

#[derive(Deserialize)]
struct Envelope {
    version: u32,
    data: Value,
}

pub fn encode<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(&EnvelopeRef {
        version: RECORD_VERSION,
        data: value,
    })?)
}

pub fn decode<T: DeserializeOwned>(kind: RecordKind, raw: &str) -> Option<T> {
    let value: Value = match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(?kind, error = %e, "unparseable record treated as absent");
            return None;
        }
    };

    let data = match upgrade(kind, value) {
        Some(data) => data,
        None => {
            tracing::warn!(?kind, "unsupported record shape treated as absent");
            return None;
        }
    };

    match serde_json::from_value(data) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            tracing::warn!(?kind, error = %e, "malformed record treated as absent");
            None
        }
    }
}

fn upgrade(kind: RecordKind, value: Value) -> Option<Value> {
    let is_envelope = value
        .as_object()
        .is_some_and(|obj| obj.contains_key("version") && obj.contains_key("data"));
    if is_envelope {
        let envelope: Envelope = serde_json::from_value(value).ok()?;
        return match envelope.version {
            RECORD_VERSION => Some(envelope.data),
            1 => migrate_v1(kind, envelope.data),
            _ => None,
        };
    }
    migrate_v1(kind, value)
}

/// Version 1 wrote bare objects: limits in whole minutes under `limits`,
/// usage seconds under `usage`, suppressions as `{app: unix_seconds}` and the
/// event map without a wrapper.
fn migrate_v1(kind: RecordKind, value: Value) -> Option<Value> {
    let obj = value.as_object()?;
    match kind {
        RecordKind::Limits => {
            let day = obj.get("date")?.clone();
            let minutes = obj.get("limits")?.as_object()?;
            let per_app: Map<String, Value> = minutes
                .iter()
                .filter_map(|(app, m)| {
                    let secs = m.as_u64()?.checked_mul(60)?;
                    Some((app.clone(), Value::from(secs)))
                })
                .collect();
            let is_active = obj.get("enabled").and_then(Value::as_bool).unwrap_or(true);
            Some(serde_json::json!({
                "day": day,
                "per_app": per_app,
                "is_active": is_active,
            }))
        }
        RecordKind::Usage => {
            let day = obj.get("date")?.clone();
            let usage = obj.get("usage")?.clone();
            Some(serde_json::json!({ "day": day, "per_app": usage }))
        }
        RecordKind::Suppressions => {
            let entries: Map<String, Value> = obj
                .iter()
                .filter_map(|(app, secs)| {
                    let secs = secs.as_f64()?;
                    let at = chrono::DateTime::from_timestamp(secs as i64, 0)?;
                    Some((app.clone(), Value::from(at.to_rfc3339())))
                })
                .collect();
            Some(serde_json::json!({ "entries": entries }))
        }
        RecordKind::EventMap => Some(serde_json::json!({ "events": value })),
        RecordKind::Other => None,
    }
}
