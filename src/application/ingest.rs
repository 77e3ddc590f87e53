//! Third-Party Ingest (spec.md §4.9 C9): webhook handler pipeline from raw
//! payload to a normalized, deduplicated `AlertEvent`.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::models::{
    AlertEvent, ConfirmState, EnrichedFields, EventKey, EventLifecycleStatus, EventStatus, FieldMapping, NormalizedEvent, ProcessStatus, ThirdPartyAlert, ThirdPartyWebhook,
};
use crate::domain::ports::event_store::EventStore;
use crate::domain::ports::repository::ThirdPartyWebhookRepository;
use crate::domain::ports::sink::ThirdPartyAlertSink;
use crate::domain::{DomainError, DomainResult};

/// Window within which a repeat post with the same fingerprint is treated
/// as the same episode rather than a new one (spec §8 dedup scenario).
const DEDUP_WINDOW: chrono::Duration = chrono::Duration::minutes(5);

#[derive(Debug)]
pub struct IngestOutcome {
    pub alert_id: String,
    pub event_id: Option<String>,
    pub status: ProcessStatus,
}

/// Handle one inbound webhook POST (spec §4.9 steps 1-6).
pub async fn handle_webhook(
    webhook_id: &str,
    raw_payload: serde_json::Value,
    headers: BTreeMap<String, String>,
    now: DateTime<Utc>,
    webhooks: &dyn ThirdPartyWebhookRepository,
    alerts: &dyn ThirdPartyAlertSink,
    store: &dyn EventStore,
) -> DomainResult<IngestOutcome> {
    if !ThirdPartyWebhook::is_valid_id(webhook_id) {
        return Err(DomainError::ValidationFailed("malformed webhook id".to_string()));
    }

    let webhook = webhooks
        .get(webhook_id)
        .await
        .map_err(|e| DomainError::ValidationFailed(e.to_string()))?
        .filter(|w| w.enabled)
        .ok_or_else(|| DomainError::WebhookNotFound(webhook_id.to_string()))?;

    let alert_id = format!("tpa_{}", Uuid::new_v4().simple());
    let alert = ThirdPartyAlert {
        id: alert_id.clone(),
        webhook_id: webhook_id.to_string(),
        raw_payload: raw_payload.clone(),
        headers,
        process_status: ProcessStatus::Pending,
        received_at: now,
        linked_event_id: None,
    };
    alerts.insert(alert).await.map_err(|e| DomainError::StoreError(e.to_string()))?;

    let normalized = match apply_mappings(&raw_payload, &webhook.mappings, now) {
        Ok(n) => n,
        Err(err) => {
            alerts
                .update_status(&alert_id, ProcessStatus::Failed, None, None)
                .await
                .map_err(|e| DomainError::StoreError(e.to_string()))?;
            return Err(DomainError::ValidationFailed(err));
        }
    };

    let fingerprint = normalized.fingerprint();
    let recent = alerts
        .recent_by_fingerprint(webhook_id, &fingerprint, DEDUP_WINDOW)
        .await
        .map_err(|e| DomainError::StoreError(e.to_string()))?;
    let is_repeat = recent.iter().any(|a| a.id != alert_id && a.linked_event_id.is_some());

    let key = EventKey { tenant_id: webhook.tenant_id.clone(), fault_center_id: webhook.fault_center_id.clone(), fingerprint: fingerprint.clone() };
    let existing = store.get(&key).await?;

    let event = build_event(&webhook, key, &normalized, existing, now, is_repeat);
    let event_id = event.event_id.clone();
    store.push(event).await?;

    alerts
        .update_status(&alert_id, ProcessStatus::Success, Some(event_id.clone()), Some(&fingerprint))
        .await
        .map_err(|e| DomainError::StoreError(e.to_string()))?;

    Ok(IngestOutcome { alert_id, event_id: Some(event_id), status: ProcessStatus::Success })
}

/// Apply `(jsonPath -> targetField)` mappings to produce a normalized
/// event. A real deployment may layer an optional transform script on top
/// (spec §4.9 step 3); this core implements the mapping stage only.
fn apply_mappings(payload: &serde_json::Value, mappings: &[FieldMapping], now: DateTime<Utc>) -> Result<NormalizedEvent, String> {
    let mut fields: BTreeMap<String, serde_json::Value> = BTreeMap::new();
    for mapping in mappings {
        if let Some(value) = json_path_get(payload, &mapping.json_path) {
            fields.insert(mapping.target_field.clone(), value.clone());
        }
    }

    let as_str = |key: &str| fields.get(key).and_then(|v| v.as_str()).unwrap_or_default().to_string();
    let source = as_str("source");
    let host = as_str("host");
    let title = as_str("title");
    if source.is_empty() || title.is_empty() {
        return Err("mapping produced empty source/title".to_string());
    }
    let content = as_str("content");
    let severity = match as_str("severity").to_uppercase().as_str() {
        "P1" | "CRITICAL" => crate::domain::models::Severity::P1,
        "P2" | "WARNING" => crate::domain::models::Severity::P2,
        _ => crate::domain::models::Severity::P3,
    };
    let status = match as_str("status").to_lowercase().as_str() {
        "resolved" => EventLifecycleStatus::Resolved,
        _ => EventLifecycleStatus::Firing,
    };
    let source_time = fields
        .get("sourceTime")
        .and_then(|v| v.as_str())
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);

    let mut tags = BTreeMap::new();
    for (key, value) in &fields {
        if matches!(key.as_str(), "source" | "host" | "title" | "content" | "severity" | "status" | "sourceTime") {
            continue;
        }
        if let Some(s) = value.as_str() {
            tags.insert(key.clone(), s.to_string());
        }
    }

    Ok(NormalizedEvent { source, host, title, content, severity, status, source_time, tags })
}

/// A minimal JSON-path subset: dot-separated field access, no array indices.
fn json_path_get<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = value;
    for segment in path.trim_start_matches('$').trim_start_matches('.').split('.') {
        if segment.is_empty() {
            continue;
        }
        current = current.get(segment)?;
    }
    Some(current)
}

fn build_event(webhook: &ThirdPartyWebhook, key: EventKey, normalized: &NormalizedEvent, existing: Option<AlertEvent>, now: DateTime<Utc>, is_repeat: bool) -> AlertEvent {
    let is_recovered = normalized.status == EventLifecycleStatus::Resolved;
    let mut labels = normalized.tags.clone();
    labels.insert("source".to_string(), normalized.source.clone());
    labels.insert("host".to_string(), normalized.host.clone());

    match existing {
        Some(mut event) => {
            event.last_eval_time = now;
            if is_recovered {
                event.mark_recovered(now);
            } else if is_repeat {
                event.promote_to_alerting();
            }
            event
        }
        None => AlertEvent {
            key,
            event_id: Uuid::new_v4().to_string(),
            rule_id: format!("webhook:{}", webhook.webhook_id),
            rule_name: normalized.title.clone(),
            severity: normalized.severity,
            labels,
            annotations: [("content".to_string(), normalized.content.clone())].into_iter().collect(),
            first_trigger_time: now,
            last_eval_time: now,
            last_send_time: None,
            recover_time: if is_recovered { Some(now) } else { None },
            status: if is_recovered { EventStatus::Recovered } else { EventStatus::PreAlert },
            is_recovered,
            confirm: None::<ConfirmState>,
            silence: None,
            enriched: EnrichedFields::default(),
            value: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    fn webhook() -> ThirdPartyWebhook {
        ThirdPartyWebhook {
            webhook_id: "wh_abcdefghijklmnopqrst".into(),
            tenant_id: "t1".into(),
            fault_center_id: "fc_webhooks".into(),
            notice_ids: vec!["n1".into()],
            enabled: true,
            mappings: vec![
                FieldMapping { json_path: "$.alert.source".into(), target_field: "source".into() },
                FieldMapping { json_path: "$.alert.host".into(), target_field: "host".into() },
                FieldMapping { json_path: "$.alert.title".into(), target_field: "title".into() },
                FieldMapping { json_path: "$.alert.severity".into(), target_field: "severity".into() },
                FieldMapping { json_path: "$.alert.status".into(), target_field: "status".into() },
            ],
        }
    }

    struct FixedWebhookRepo(ThirdPartyWebhook);
    #[async_trait]
    impl ThirdPartyWebhookRepository for FixedWebhookRepo {
        async fn get(&self, _webhook_id: &str) -> anyhow::Result<Option<ThirdPartyWebhook>> {
            Ok(Some(self.0.clone()))
        }
    }

    #[derive(Default)]
    struct InMemoryAlertSink {
        alerts: Mutex<Vec<ThirdPartyAlert>>,
    }

    #[async_trait]
    impl ThirdPartyAlertSink for InMemoryAlertSink {
        async fn insert(&self, alert: ThirdPartyAlert) -> anyhow::Result<()> {
            self.alerts.lock().unwrap().push(alert);
            Ok(())
        }
        async fn update_status(&self, id: &str, status: ProcessStatus, linked_event_id: Option<String>, _fingerprint: Option<&str>) -> anyhow::Result<()> {
            let mut guard = self.alerts.lock().unwrap();
            if let Some(a) = guard.iter_mut().find(|a| a.id == id) {
                a.process_status = status;
                a.linked_event_id = linked_event_id;
            }
            Ok(())
        }
        async fn recent_by_fingerprint(&self, webhook_id: &str, _fingerprint: &str, _within: chrono::Duration) -> anyhow::Result<Vec<ThirdPartyAlert>> {
            Ok(self.alerts.lock().unwrap().iter().filter(|a| a.webhook_id == webhook_id).cloned().collect())
        }
    }

    #[derive(Default)]
    struct InMemoryStore {
        events: Mutex<std::collections::HashMap<EventKey, AlertEvent>>,
    }

    #[async_trait]
    impl EventStore for InMemoryStore {
        async fn push(&self, event: AlertEvent) -> DomainResult<()> {
            self.events.lock().unwrap().insert(event.key.clone(), event);
            Ok(())
        }
        async fn get(&self, key: &EventKey) -> DomainResult<Option<AlertEvent>> {
            Ok(self.events.lock().unwrap().get(key).cloned())
        }
        async fn list(&self, _tenant_id: &str, _fault_center_id: &str) -> DomainResult<Vec<AlertEvent>> {
            Ok(self.events.lock().unwrap().values().cloned().collect())
        }
        async fn delete(&self, key: &EventKey) -> DomainResult<()> {
            self.events.lock().unwrap().remove(key);
            Ok(())
        }
        async fn list_recovered(&self, _tenant_id: &str, _fault_center_id: &str, _now: DateTime<Utc>, _silence_gap: chrono::Duration) -> DomainResult<Vec<AlertEvent>> {
            Ok(vec![])
        }
    }

    fn payload() -> serde_json::Value {
        json!({"alert": {"source": "Datadog", "host": "h1", "title": "CPU High", "severity": "P1", "status": "firing"}})
    }

    #[tokio::test]
    async fn rejects_malformed_webhook_id() {
        let repo = FixedWebhookRepo(webhook());
        let alerts = InMemoryAlertSink::default();
        let store = InMemoryStore::default();
        let result = handle_webhook("short", payload(), BTreeMap::new(), Utc::now(), &repo, &alerts, &store).await;
        assert!(matches!(result, Err(DomainError::ValidationFailed(_))));
    }

    #[tokio::test]
    async fn normalizes_and_creates_event() {
        let repo = FixedWebhookRepo(webhook());
        let alerts = InMemoryAlertSink::default();
        let store = InMemoryStore::default();
        let outcome = handle_webhook("wh_abcdefghijklmnopqrst", payload(), BTreeMap::new(), Utc::now(), &repo, &alerts, &store).await.unwrap();
        assert_eq!(outcome.status, ProcessStatus::Success);
        assert!(outcome.event_id.is_some());

        let events = store.list("t1", "fc_webhooks").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::PreAlert);
    }

    #[tokio::test]
    async fn resolved_status_creates_recovered_event() {
        let repo = FixedWebhookRepo(webhook());
        let alerts = InMemoryAlertSink::default();
        let store = InMemoryStore::default();
        let mut p = payload();
        p["alert"]["status"] = json!("resolved");
        let outcome = handle_webhook("wh_abcdefghijklmnopqrst", p, BTreeMap::new(), Utc::now(), &repo, &alerts, &store).await.unwrap();
        let events = store.list("t1", "fc_webhooks").await.unwrap();
        assert!(events[0].is_recovered);
        assert_eq!(outcome.status, ProcessStatus::Success);
    }

    #[tokio::test]
    async fn repeated_post_reuses_same_event_key() {
        let repo = FixedWebhookRepo(webhook());
        let alerts = InMemoryAlertSink::default();
        let store = InMemoryStore::default();
        handle_webhook("wh_abcdefghijklmnopqrst", payload(), BTreeMap::new(), Utc::now(), &repo, &alerts, &store).await.unwrap();
        handle_webhook("wh_abcdefghijklmnopqrst", payload(), BTreeMap::new(), Utc::now(), &repo, &alerts, &store).await.unwrap();
        let events = store.list("t1", "fc_webhooks").await.unwrap();
        assert_eq!(events.len(), 1, "same fingerprint must upsert, not duplicate");
    }
}
