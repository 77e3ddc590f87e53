//! Third-party webhook ingest entities (spec.md §4.9 C9).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Pending,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLifecycleStatus {
    Firing,
    Resolved,
}

/// A single JSON-path-to-field mapping rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub json_path: String,
    pub target_field: String,
}

/// Stored configuration for a registered webhook endpoint (spec §4.9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdPartyWebhook {
    /// `wh_`-prefixed id, 20-40 chars, MD5-derived (spec §4.9).
    pub webhook_id: String,
    pub tenant_id: String,
    pub fault_center_id: String,
    pub notice_ids: Vec<String>,
    pub enabled: bool,
    pub mappings: Vec<FieldMapping>,
}

impl ThirdPartyWebhook {
    /// Validate the id shape named in spec §4.9: `wh_` prefix, 20-40 chars.
    #[must_use]
    pub fn is_valid_id(id: &str) -> bool {
        id.starts_with("wh_") && id.len() >= 20 && id.len() <= 40
    }
}

/// Raw payload persisted on receipt, before mapping (spec §4.9 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThirdPartyAlert {
    pub id: String,
    pub webhook_id: String,
    pub raw_payload: serde_json::Value,
    pub headers: BTreeMap<String, String>,
    pub process_status: ProcessStatus,
    pub received_at: DateTime<Utc>,
    pub linked_event_id: Option<String>,
}

/// The result of applying a webhook's mapping to a raw payload (spec §4.9 step 3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    pub source: String,
    pub host: String,
    pub title: String,
    pub content: String,
    pub severity: super::rule::Severity,
    pub status: EventLifecycleStatus,
    pub source_time: DateTime<Utc>,
    pub tags: BTreeMap<String, String>,
}

impl NormalizedEvent {
    /// `fingerprint = MD5(lower(source|host|title|...extras))` (spec §4.9 step 4).
    #[must_use]
    pub fn fingerprint(&self) -> String {
        use md5::{Digest, Md5};
        let mut key = format!("{}|{}|{}", self.source, self.host, self.title);
        let mut extra_keys: Vec<_> = self.tags.keys().collect();
        extra_keys.sort();
        for k in extra_keys {
            key.push('|');
            key.push_str(&self.tags[k]);
        }
        let mut hasher = Md5::new();
        hasher.update(key.to_lowercase().as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_id_validation() {
        assert!(ThirdPartyWebhook::is_valid_id("wh_abcdefghijklmnopqrs"));
        assert!(!ThirdPartyWebhook::is_valid_id("short"));
        assert!(!ThirdPartyWebhook::is_valid_id("nope_abcdefghijklmnopqrstuvwxyz"));
    }

    #[test]
    fn fingerprint_is_stable_and_case_insensitive() {
        let a = NormalizedEvent {
            source: "Datadog".into(),
            host: "h1".into(),
            title: "CPU High".into(),
            content: String::new(),
            severity: super::super::rule::Severity::P1,
            status: EventLifecycleStatus::Firing,
            source_time: Utc::now(),
            tags: BTreeMap::new(),
        };
        let b = NormalizedEvent { source: "datadog".into(), title: "cpu high".into(), ..a.clone() };
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_differs_on_title() {
        let base = NormalizedEvent {
            source: "datadog".into(),
            host: "h1".into(),
            title: "cpu high".into(),
            content: String::new(),
            severity: super::super::rule::Severity::P1,
            status: EventLifecycleStatus::Firing,
            source_time: Utc::now(),
            tags: BTreeMap::new(),
        };
        let other = NormalizedEvent { title: "mem high".into(), ..base.clone() };
        assert_ne!(base.fingerprint(), other.fingerprint());
    }
}
