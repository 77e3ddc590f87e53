//! State Recovery Loop (spec.md §4.10 C10): one goroutine-equivalent per
//! fault center, flipping idle Alerting events to Recovered.
//!
//! Crash-mid-flip safety: `EventHistorySink::record_recovered` is idempotent
//! on `(tenant_id, event_id)` (spec §4.10 "Failure semantics"), so a
//! recovery tick that's interrupted after the store flip but before the
//! delete is safe to replay — the next tick's `list_recovered` will no
//! longer select an already-terminal event.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::domain::models::{AlertEvent, FaultCenter};
use crate::domain::ports::event_store::{EventHistorySink, EventStore};
use crate::domain::DomainResult;

/// Scan `fault_center`'s events, flip idle Alerting ones to Recovered, and
/// record each into history. Returns the flipped events so the caller can
/// hand them to the dispatcher (which observes `is_recovered==true` and
/// sends exactly once) before calling [`delete_recovered`].
pub async fn recovery_tick(fault_center: &FaultCenter, now: DateTime<Utc>, store: &dyn EventStore, history: &dyn EventHistorySink) -> DomainResult<Vec<AlertEvent>> {
    let silence_gap = fault_center.effective_silence_gap(chrono::Duration::minutes(1));
    let flipped = store.list_recovered(&fault_center.tenant_id, &fault_center.fault_center_id, now, silence_gap).await?;

    for event in &flipped {
        history.record_recovered(event).await?;
        info!(event_id = %event.event_id, fault_center_id = %fault_center.fault_center_id, "event recovered");
    }

    Ok(flipped)
}

/// Remove recovered events from the active store once the dispatcher has
/// had a chance to observe and send the recovery notification.
pub async fn delete_recovered(events: &[AlertEvent], store: &dyn EventStore) -> DomainResult<()> {
    for event in events {
        store.delete(&event.key).await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AggregationMode, ConfirmState, EnrichedFields, EventKey, EventStatus, Severity};
    use async_trait::async_trait;
    use std::collections::{BTreeMap, HashMap};
    use std::sync::Mutex;

    fn fault_center() -> FaultCenter {
        FaultCenter {
            tenant_id: "t1".into(),
            fault_center_id: "fc1".into(),
            name: "default".into(),
            aggregation_mode: AggregationMode::None,
            recovery_silence_gap: Some(chrono::Duration::minutes(3)),
            recovery_scan_interval: chrono::Duration::seconds(30),
            dispatch_floor: chrono::Duration::seconds(15),
        }
    }

    fn alerting_event(id: &str, last_eval_time: DateTime<Utc>) -> AlertEvent {
        AlertEvent {
            key: EventKey { tenant_id: "t1".into(), fault_center_id: "fc1".into(), fingerprint: id.to_string() },
            event_id: id.to_string(),
            rule_id: "r1".into(),
            rule_name: "cpu_high".into(),
            severity: Severity::P1,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            first_trigger_time: last_eval_time,
            last_eval_time,
            last_send_time: None,
            recover_time: None,
            status: EventStatus::Alerting,
            is_recovered: false,
            confirm: None::<ConfirmState>,
            silence: None,
            enriched: EnrichedFields::default(),
            value: Some(1.0),
        }
    }

    #[derive(Default)]
    struct InMemoryStore {
        events: Mutex<HashMap<EventKey, AlertEvent>>,
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
        async fn list_recovered(&self, tenant_id: &str, fault_center_id: &str, now: DateTime<Utc>, silence_gap: chrono::Duration) -> DomainResult<Vec<AlertEvent>> {
            let mut guard = self.events.lock().unwrap();
            let mut flipped = Vec::new();
            for event in guard.values_mut() {
                if event.key.tenant_id == tenant_id
                    && event.key.fault_center_id == fault_center_id
                    && event.status == EventStatus::Alerting
                    && now - event.last_eval_time >= silence_gap
                {
                    event.mark_recovered(now);
                    flipped.push(event.clone());
                }
            }
            Ok(flipped)
        }
    }

    #[derive(Default)]
    struct RecordingHistory {
        recorded: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHistorySink for RecordingHistory {
        async fn record_recovered(&self, event: &AlertEvent) -> DomainResult<()> {
            self.recorded.lock().unwrap().push(event.event_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn flips_idle_alerting_event_and_records_history() {
        let fc = fault_center();
        let now = Utc::now();
        let stale = now - chrono::Duration::minutes(5);
        let store = InMemoryStore::default();
        store.push(alerting_event("e1", stale)).await.unwrap();
        let history = RecordingHistory::default();

        let flipped = recovery_tick(&fc, now, &store, &history).await.unwrap();
        assert_eq!(flipped.len(), 1);
        assert!(flipped[0].invariant_holds());
        assert_eq!(history.recorded.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn leaves_recently_evaluated_event_alone() {
        let fc = fault_center();
        let now = Utc::now();
        let store = InMemoryStore::default();
        store.push(alerting_event("e1", now)).await.unwrap();
        let history = RecordingHistory::default();

        let flipped = recovery_tick(&fc, now, &store, &history).await.unwrap();
        assert!(flipped.is_empty());
    }

    #[tokio::test]
    async fn delete_recovered_removes_from_active_store() {
        let fc = fault_center();
        let now = Utc::now();
        let stale = now - chrono::Duration::minutes(5);
        let store = InMemoryStore::default();
        store.push(alerting_event("e1", stale)).await.unwrap();
        let history = RecordingHistory::default();

        let flipped = recovery_tick(&fc, now, &store, &history).await.unwrap();
        delete_recovered(&flipped, &store).await.unwrap();
        assert!(store.list("t1", "fc1").await.unwrap().is_empty());
    }
}
