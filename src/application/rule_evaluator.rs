//! Rule Evaluator (spec.md §4.4 C4): one evaluation tick of a single rule.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::fingerprint::rule_fingerprint;
use crate::application::silence_matcher::SilenceMatcher;
use crate::domain::models::{AlertEvent, ConfirmState, EnrichedFields, EventKey, EventStatus, Rule, Sample, SilenceInfo};
use crate::domain::ports::datasource::DataSourcePort;
use crate::domain::ports::event_store::EventStore;
use crate::domain::DomainResult;

/// Outcome of one tick, for callers that want per-rule telemetry.
#[derive(Debug, Default)]
pub struct EvalOutcome {
    pub candidates: usize,
    pub upserted: usize,
    pub datasource_errors: usize,
}

/// Evaluate `rule` once against `now`, using `datasources` (keyed by
/// datasource id) to pull samples, and upsert results into `store`.
///
/// A datasource error aborts only this rule's tick and never mutates the
/// store (spec §4.4 "Failure semantics").
pub async fn evaluate_tick(
    rule: &Rule,
    now: DateTime<Utc>,
    datasources: &BTreeMap<String, Box<dyn DataSourcePort>>,
    store: &dyn EventStore,
    silences: &SilenceMatcher,
) -> DomainResult<EvalOutcome> {
    let mut outcome = EvalOutcome::default();

    if !rule.is_effective_at(now) {
        return Ok(outcome);
    }

    let mut samples = Vec::new();
    for ds_id in &rule.datasource_ids {
        let Some(ds) = datasources.get(ds_id) else {
            warn!(rule_id = %rule.rule_id, datasource_id = %ds_id, "datasource not found, skipping rule tick");
            outcome.datasource_errors += 1;
            continue;
        };
        match ds.query(&rule.query, now).await {
            Ok(mut s) => samples.append(&mut s),
            Err(err) => {
                error!(rule_id = %rule.rule_id, datasource_id = %ds_id, error = %err, "datasource query failed");
                outcome.datasource_errors += 1;
            }
        }
    }
    if samples.is_empty() && outcome.datasource_errors > 0 {
        return Ok(outcome);
    }

    // Tie-break: when multiple samples share a fingerprint, the largest
    // value wins (spec §4.4 "Tie-breaks").
    let mut by_fingerprint: BTreeMap<String, (Sample, BTreeMap<String, String>)> = BTreeMap::new();
    for sample in samples {
        let labels = canonicalize_labels(&rule.label_template, &sample.labels);
        let fp = rule_fingerprint(&rule.rule_id, &labels);
        by_fingerprint
            .entry(fp)
            .and_modify(|(existing, existing_labels)| {
                if sample.value > existing.value {
                    *existing = sample.clone();
                    *existing_labels = labels.clone();
                }
            })
            .or_insert((sample, labels));
    }

    for (fingerprint, (sample, labels)) in by_fingerprint {
        outcome.candidates += 1;
        let violated = rule.comparator.violates(sample.value, rule.threshold);
        if !violated {
            continue;
        }

        let key = EventKey { tenant_id: rule.tenant_id.clone(), fault_center_id: rule.fault_center_id.clone(), fingerprint: fingerprint.clone() };
        let existing = store.get(&key).await?;

        let silence_id = silences.matching_silence(&rule.tenant_id, &labels, now);

        let event = match existing {
            None => AlertEvent {
                key,
                event_id: Uuid::new_v4().to_string(),
                rule_id: rule.rule_id.clone(),
                rule_name: rule.rule_name.clone(),
                severity: rule.severity,
                labels,
                annotations: rule.annotations.clone(),
                first_trigger_time: now,
                last_eval_time: now,
                last_send_time: None,
                recover_time: None,
                status: EventStatus::PreAlert,
                is_recovered: false,
                confirm: None::<ConfirmState>,
                silence: silence_id.map(|silence_id| SilenceInfo { silence_id }),
                enriched: EnrichedFields::default(),
                value: Some(sample.value),
            },
            Some(mut existing) => {
                existing.last_eval_time = now;
                existing.value = Some(sample.value);
                existing.silence = silence_id.map(|silence_id| SilenceInfo { silence_id });
                if existing.status == EventStatus::PreAlert && now - existing.first_trigger_time >= rule.for_duration {
                    existing.promote_to_alerting();
                }
                existing
            }
        };

        store.push(event).await?;
        outcome.upserted += 1;
    }

    Ok(outcome)
}

/// Project a sample's full label set down to the rule's template keys,
/// sorted for stable fingerprinting (spec §4.4 step 3/step "merged
/// deterministically by sorted key").
fn canonicalize_labels(template: &[String], sample_labels: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    if template.is_empty() {
        return sample_labels.clone();
    }
    template
        .iter()
        .filter_map(|key| sample_labels.get(key).map(|v| (key.clone(), v.clone())))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{Comparator, EffectiveCalendar, Severity};
    use crate::domain::ports::repository::SilenceRepository;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct FixedDatasource {
        samples: Vec<Sample>,
    }

    #[async_trait]
    impl DataSourcePort for FixedDatasource {
        async fn query(&self, _expr: &str, _at: DateTime<Utc>) -> anyhow::Result<Vec<Sample>> {
            Ok(self.samples.clone())
        }
        async fn query_range(&self, _expr: &str, _start: DateTime<Utc>, _end: DateTime<Utc>, _step: chrono::Duration) -> anyhow::Result<Vec<Sample>> {
            Ok(vec![])
        }
        async fn get_targets(&self) -> anyhow::Result<Vec<crate::domain::models::TargetHealth>> {
            Ok(vec![])
        }
        async fn check(&self) -> anyhow::Result<bool> {
            Ok(true)
        }
    }

    struct FailingDatasource;

    #[async_trait]
    impl DataSourcePort for FailingDatasource {
        async fn query(&self, _expr: &str, _at: DateTime<Utc>) -> anyhow::Result<Vec<Sample>> {
            anyhow::bail!("connection refused")
        }
        async fn query_range(&self, _expr: &str, _start: DateTime<Utc>, _end: DateTime<Utc>, _step: chrono::Duration) -> anyhow::Result<Vec<Sample>> {
            Ok(vec![])
        }
        async fn get_targets(&self) -> anyhow::Result<Vec<crate::domain::models::TargetHealth>> {
            Ok(vec![])
        }
        async fn check(&self) -> anyhow::Result<bool> {
            Ok(false)
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
        async fn list_recovered(&self, _tenant_id: &str, _fault_center_id: &str, _now: DateTime<Utc>, _silence_gap: chrono::Duration) -> DomainResult<Vec<AlertEvent>> {
            Ok(vec![])
        }
    }

    struct EmptySilenceRepo;
    #[async_trait]
    impl SilenceRepository for EmptySilenceRepo {
        async fn list_active(&self, _tenant_id: &str, _at: DateTime<Utc>) -> anyhow::Result<Vec<crate::domain::models::Silence>> {
            Ok(vec![])
        }
    }

    fn base_rule() -> Rule {
        Rule {
            tenant_id: "t1".into(),
            rule_id: "r1".into(),
            rule_name: "cpu_high".into(),
            fault_center_id: "fc1".into(),
            datasource_ids: vec!["ds1".into()],
            eval_interval: chrono::Duration::seconds(30),
            for_duration: chrono::Duration::minutes(1),
            repeat_notice_interval: chrono::Duration::minutes(5),
            severity: Severity::P1,
            effective_calendar: EffectiveCalendar::default(),
            query: "cpu_usage > 0.9".into(),
            comparator: Comparator::Gt,
            threshold: 0.9,
            label_template: vec!["instance".into()],
            annotations: BTreeMap::new(),
            notice_id: None,
            enabled: true,
        }
    }

    fn sample(instance: &str, value: f64) -> Sample {
        Sample { labels: [("instance".to_string(), instance.to_string())].into_iter().collect(), value, timestamp: Utc::now() }
    }

    #[tokio::test]
    async fn violating_sample_creates_prealert_event() {
        let rule = base_rule();
        let now = Utc::now();
        let mut ds: BTreeMap<String, Box<dyn DataSourcePort>> = BTreeMap::new();
        ds.insert("ds1".into(), Box::new(FixedDatasource { samples: vec![sample("h1:9100", 0.95)] }));
        let store = InMemoryStore::default();
        let silences = SilenceMatcher::new();
        silences.refresh(&["t1".to_string()], &EmptySilenceRepo, now).await.unwrap();

        let outcome = evaluate_tick(&rule, now, &ds, &store, &silences).await.unwrap();
        assert_eq!(outcome.upserted, 1);

        let events = store.list("t1", "fc1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, EventStatus::PreAlert);
    }

    #[tokio::test]
    async fn non_violating_sample_produces_no_event() {
        let rule = base_rule();
        let now = Utc::now();
        let mut ds: BTreeMap<String, Box<dyn DataSourcePort>> = BTreeMap::new();
        ds.insert("ds1".into(), Box::new(FixedDatasource { samples: vec![sample("h1:9100", 0.1)] }));
        let store = InMemoryStore::default();
        let silences = SilenceMatcher::new();
        silences.refresh(&["t1".to_string()], &EmptySilenceRepo, now).await.unwrap();

        let outcome = evaluate_tick(&rule, now, &ds, &store, &silences).await.unwrap();
        assert_eq!(outcome.upserted, 0);
        assert!(store.list("t1", "fc1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn promotes_to_alerting_after_for_duration() {
        let rule = base_rule();
        let t0 = Utc::now() - chrono::Duration::minutes(2);
        let mut ds: BTreeMap<String, Box<dyn DataSourcePort>> = BTreeMap::new();
        ds.insert("ds1".into(), Box::new(FixedDatasource { samples: vec![sample("h1:9100", 0.95)] }));
        let store = InMemoryStore::default();
        let silences = SilenceMatcher::new();
        silences.refresh(&["t1".to_string()], &EmptySilenceRepo, t0).await.unwrap();

        evaluate_tick(&rule, t0, &ds, &store, &silences).await.unwrap();
        let t1 = t0 + chrono::Duration::minutes(2);
        evaluate_tick(&rule, t1, &ds, &store, &silences).await.unwrap();

        let events = store.list("t1", "fc1").await.unwrap();
        assert_eq!(events[0].status, EventStatus::Alerting);
    }

    #[tokio::test]
    async fn datasource_error_does_not_mutate_store() {
        let rule = base_rule();
        let now = Utc::now();
        let mut ds: BTreeMap<String, Box<dyn DataSourcePort>> = BTreeMap::new();
        ds.insert("ds1".into(), Box::new(FailingDatasource));
        let store = InMemoryStore::default();
        let silences = SilenceMatcher::new();
        silences.refresh(&["t1".to_string()], &EmptySilenceRepo, now).await.unwrap();

        let outcome = evaluate_tick(&rule, now, &ds, &store, &silences).await.unwrap();
        assert_eq!(outcome.datasource_errors, 1);
        assert!(store.list("t1", "fc1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn tie_break_keeps_largest_value() {
        let rule = base_rule();
        let now = Utc::now();
        let mut ds: BTreeMap<String, Box<dyn DataSourcePort>> = BTreeMap::new();
        ds.insert("ds1".into(), Box::new(FixedDatasource { samples: vec![sample("h1:9100", 0.91), sample("h1:9100", 0.99)] }));
        let store = InMemoryStore::default();
        let silences = SilenceMatcher::new();
        silences.refresh(&["t1".to_string()], &EmptySilenceRepo, now).await.unwrap();

        evaluate_tick(&rule, now, &ds, &store, &silences).await.unwrap();
        let events = store.list("t1", "fc1").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].value, Some(0.99));
    }
}
