//! Canonical application identifiers.
//!
//! Both execution domains key their maps by [`AppId`], so the string form
//! must be identical no matter which side produced it: surrounding
//! whitespace is trimmed and ASCII letters are lowercased.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

const MAX_LEN: usize = 255;

/// Opaque, stable identifier of a tracked application (e.g. a bundle id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);

impl AppId {
    /// Canonicalize `raw`, returning `None` when it is not a recognizable
    /// application identifier.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = raw.trim().to_ascii_lowercase();
        if canonical.is_empty() || canonical.len() > MAX_LEN {
            return None;
        }
        let mut chars = canonical.chars();
        if !chars.next().is_some_and(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        if !chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_')) {
            return None;
        }
        Some(Self(canonical))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AppId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for AppId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppId::parse(s).ok_or_else(|| ValidationError::InvalidAppId(s.to_string()))
    }
}

impl TryFrom<String> for AppId {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AppId> for String {
    fn from(id: AppId) -> Self {
        id.0
    }
}

/// Deserialize a `{ app: value }` map, silently dropping keys that are not
/// valid application identifiers instead of failing the whole record.
pub(crate) fn sanitized_map<'de, D, V>(deserializer: D) -> Result<BTreeMap<AppId, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    let raw = BTreeMap::<String, V>::deserialize(deserializer)?;
    Ok(sanitize_keys(raw))
}

pub(crate) fn sanitize_keys<V>(raw: BTreeMap<String, V>) -> BTreeMap<AppId, V> {
    let mut out = BTreeMap::new();
    for (key, value) in raw {
        match AppId::parse(&key) {
            // Two raw spellings of the same app collapse; the later one wins.
            Some(id) => {
                out.insert(id, value);
            }
            None => tracing::debug!(key = %key, "dropping unrecognized app identifier"),
        }
    }
    out
}

/// Deserialize a list of identifiers, dropping unrecognized entries.
pub(crate) fn sanitized_list<'de, D>(deserializer: D) -> Result<Vec<AppId>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<String>::deserialize(deserializer)?;
    Ok(sanitize_list(raw))
}

pub(crate) fn sanitize_list(raw: Vec<String>) -> Vec<AppId> {
    let mut out: Vec<AppId> = raw.iter().filter_map(|s| AppId::parse(s)).collect();
    out.sort();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_and_lowercases() {
        let id = AppId::parse("  Com.Instagram.IOS ").unwrap();
        assert_eq!(id.as_str(), "com.instagram.ios");
        assert_eq!(id, AppId::parse("com.instagram.ios").unwrap());
    }

    #[test]
    fn parse_rejects_empty_and_garbage() {
        assert!(AppId::parse("").is_none());
        assert!(AppId::parse("   ").is_none());
        assert!(AppId::parse(".hidden").is_none());
        assert!(AppId::parse("has space").is_none());
        assert!(AppId::parse("emoji🙂").is_none());
        assert!(AppId::parse(&"a".repeat(256)).is_none());
    }

    #[test]
    fn deserialize_rejects_invalid_single_id() {
        assert!(serde_json::from_str::<AppId>("\"not valid\"").is_err());
        let id: AppId = serde_json::from_str("\"YouTube\"").unwrap();
        assert_eq!(id.as_str(), "youtube");
    }

    #[test]
    fn sanitize_keys_filters_and_merges_spellings() {
        let mut raw = BTreeMap::new();
        raw.insert("IG".to_string(), 1u64);
        raw.insert("bad key".to_string(), 2);
        raw.insert("tiktok".to_string(), 3);
        let clean = sanitize_keys(raw);
        assert_eq!(clean.len(), 2);
        assert_eq!(clean[&AppId::parse("ig").unwrap()], 1);
    }

    #[test]
    fn sanitize_list_sorts_and_dedups() {
        let clean = sanitize_list(vec!["b".into(), "A".into(), "a".into(), "??".into()]);
        let names: Vec<&str> = clean.iter().map(AppId::as_str).collect();
        assert_eq!(names, vec!["a", "b"]);
    }
}
