//! Aggregator & Dispatcher (spec.md §4.6 C6): one dispatch cycle for a
//! single fault center.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::domain::models::{
    AggregationMode, AlertEvent, ChannelKind, EnrichedFields, EventStatus, FaultCenter, Notice, NoticeRecord, NoticeStatus, Severity,
};
use crate::domain::ports::channel::{Channel, SendParams};
use crate::domain::ports::event_store::EventStore;
use crate::domain::ports::repository::{CmdbOwnerLookup, DutyCalendarRepository, NoticeRepository, RuleRepository};
use crate::domain::ports::sink::NoticeRecordSink;
use crate::domain::ports::template::TemplateRenderer;

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub throttled: usize,
    pub failed: usize,
    pub skipped_no_route: usize,
}

impl DispatchOutcome {
    fn merge(&mut self, other: Self) {
        self.sent += other.sent;
        self.throttled += other.throttled;
        self.failed += other.failed;
        self.skipped_no_route += other.skipped_no_route;
    }
}

/// Wires the ports a dispatch cycle needs. Each cycle runs once per
/// fault center; the caller (scheduler/engine) picks the cadence.
pub struct Dispatcher {
    pub rules: Arc<dyn RuleRepository>,
    pub notices: Arc<dyn NoticeRepository>,
    pub duty_calendars: Arc<dyn DutyCalendarRepository>,
    pub cmdb: Arc<dyn CmdbOwnerLookup>,
    pub store: Arc<dyn EventStore>,
    pub records: Arc<dyn NoticeRecordSink>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub channels: HashMap<ChannelKind, Arc<dyn Channel>>,
    /// Bounds how many notice-group send loops run concurrently (spec §5
    /// "bounded worker pool for channel sends"). Defaults to 10 if unset.
    pub channel_workers: usize,
}

impl Dispatcher {
    /// Group events by notice route, then fan each notice group's send loop
    /// out onto its own task bounded by `channel_workers` permits, so one
    /// slow or hanging channel send can't serialize behind every other group
    /// (spec §4.6/§5: "each notice-group send runs on its own task").
    pub async fn run_cycle(&self, fault_center: &FaultCenter, now: DateTime<Utc>) -> anyhow::Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        let events = self
            .store
            .list(&fault_center.tenant_id, &fault_center.fault_center_id)
            .await?
            .into_iter()
            .filter(|e| e.status == EventStatus::Alerting || e.is_recovered)
            .collect::<Vec<_>>();
        if events.is_empty() {
            return Ok(outcome);
        }

        let mut by_notice: HashMap<String, Vec<AlertEvent>> = HashMap::new();
        for event in events {
            let Some(rule) = self.rules.get(&fault_center.tenant_id, &event.rule_id).await? else {
                warn!(rule_id = %event.rule_id, "rule not found for event, skipping dispatch");
                outcome.skipped_no_route += 1;
                continue;
            };
            let Some(notice_id) = rule.notice_id else {
                outcome.skipped_no_route += 1;
                continue;
            };
            by_notice.entry(notice_id).or_default().push(event);
        }

        let semaphore = Arc::new(tokio::sync::Semaphore::new(self.channel_workers.max(1)));
        let mut handles = Vec::with_capacity(by_notice.len());
        for (notice_id, notice_events) in by_notice {
            let group = NoticeGroupTask {
                rules: Arc::clone(&self.rules),
                notices: Arc::clone(&self.notices),
                duty_calendars: Arc::clone(&self.duty_calendars),
                cmdb: Arc::clone(&self.cmdb),
                store: Arc::clone(&self.store),
                records: Arc::clone(&self.records),
                renderer: Arc::clone(&self.renderer),
                channels: self.channels.clone(),
            };
            let fault_center = fault_center.clone();
            let semaphore = Arc::clone(&semaphore);
            handles.push(tokio::spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
                group.run(&fault_center, &notice_id, notice_events, now).await
            }));
        }

        for handle in handles {
            match handle.await {
                Ok(Ok(partial)) => outcome.merge(partial),
                Ok(Err(err)) => return Err(err),
                Err(join_err) => return Err(anyhow::anyhow!("notice-group dispatch task panicked: {join_err}")),
            }
        }

        Ok(outcome)
    }
}

/// Everything one notice group's send loop needs, cloned out of `Dispatcher`
/// so its work can run on its own task (spec §5).
struct NoticeGroupTask {
    rules: Arc<dyn RuleRepository>,
    notices: Arc<dyn NoticeRepository>,
    duty_calendars: Arc<dyn DutyCalendarRepository>,
    cmdb: Arc<dyn CmdbOwnerLookup>,
    store: Arc<dyn EventStore>,
    records: Arc<dyn NoticeRecordSink>,
    renderer: Arc<dyn TemplateRenderer>,
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
}

impl NoticeGroupTask {
    async fn run(&self, fault_center: &FaultCenter, notice_id: &str, notice_events: Vec<AlertEvent>, now: DateTime<Utc>) -> anyhow::Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        let Some(notice) = self.notices.get(&fault_center.tenant_id, notice_id).await? else {
            warn!(notice_id = %notice_id, "notice not found, skipping group");
            outcome.skipped_no_route += notice_events.len();
            return Ok(outcome);
        };

        let mut by_severity: HashMap<Severity, Vec<AlertEvent>> = HashMap::new();
        for event in notice_events {
            by_severity.entry(event.severity).or_default().push(event);
        }

        for (severity, group) in by_severity {
            let sendables: Vec<(AlertEvent, Vec<AlertEvent>)> = match fault_center.aggregation_mode {
                AggregationMode::Rule => aggregate_by_rule(group),
                AggregationMode::None => group.into_iter().map(|e| (e.clone(), vec![e])).collect(),
            };

            for (event, members) in sendables {
                let should_send = event.is_recovered || now - event.last_send_time.unwrap_or(DateTime::<Utc>::MIN_UTC) >= event_repeat_interval(&event, &self.rules, &fault_center.tenant_id).await?;
                if !should_send {
                    outcome.throttled += 1;
                    continue;
                }

                let route = notice.resolve_route(severity);
                let recipients = self.resolve_recipients(&fault_center.tenant_id, &event, &notice, &route.to, now).await?;
                if recipients.is_empty() && route.hook.is_none() {
                    warn!(event_id = %event.event_id, "no recipients and no hook, refusing send");
                    outcome.skipped_no_route += 1;
                    continue;
                }

                let content = self.renderer.render(&event, event.is_recovered);
                let provider_config = merge_dingding_enterprise(route.provider_config.clone(), &notice);
                let params = SendParams {
                    tenant_id: fault_center.tenant_id.clone(),
                    event_id: event.event_id.clone(),
                    rule_name: event.rule_name.clone(),
                    severity,
                    notice_id: notice.notice_id.clone(),
                    notice_name: notice.name.clone(),
                    is_recovered: event.is_recovered,
                    hook: route.hook.clone(),
                    content: content.clone(),
                    to: recipients,
                    cc: route.cc.clone(),
                    signature: route.signature.clone(),
                    provider_config,
                };

                let send_result = match self.channels.get(&notice.channel) {
                    Some(channel) => match channel.validate(&params) {
                        Ok(()) => channel.send(&params).await,
                        Err(err) => Err(err),
                    },
                    None => Err(anyhow::anyhow!("no channel driver registered for {:?}", notice.channel)),
                };

                let status = match &send_result {
                    Ok(()) => {
                        outcome.sent += 1;
                        NoticeStatus::Ok
                    }
                    Err(err) => {
                        error!(event_id = %event.event_id, error = %err, "notice send failed");
                        outcome.failed += 1;
                        NoticeStatus::Fail
                    }
                };

                self.records
                    .append(NoticeRecord {
                        event_id: event.event_id.clone(),
                        date: now,
                        tenant_id: fault_center.tenant_id.clone(),
                        rule_name: event.rule_name.clone(),
                        channel: notice.channel,
                        notice_name: notice.name.clone(),
                        severity,
                        status,
                        content,
                        error: send_result.as_ref().err().map(std::string::ToString::to_string),
                    })
                    .await?;

                if send_result.is_ok() {
                    // An aggregated send covers every event in `members`, not
                    // just the synthetic one that carried the content (spec
                    // §8 scenario 3: lastSendTime advances on all of them).
                    for member in &members {
                        let mut updated = member.clone();
                        updated.last_send_time = Some(now);
                        self.store.push(updated).await?;
                    }
                    info!(event_id = %event.event_id, notice_id = %notice.notice_id, members = members.len(), "dispatched notice");
                }
            }
        }

        Ok(outcome)
    }

    /// Duty-calendar users today, unioned with CMDB owners (prefixed `@name`)
    /// and the route's static recipients, de-duplicated preserving
    /// first-seen order (SPEC_FULL.md §7 Open Question 2).
    async fn resolve_recipients(&self, tenant_id: &str, event: &AlertEvent, notice: &Notice, route_to: &[String], now: DateTime<Utc>) -> anyhow::Result<Vec<String>> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();

        let cmdb_owners = cmdb_owners_for(event, tenant_id, self.cmdb.as_ref()).await?;
        for owner in cmdb_owners {
            let tagged = format!("@{owner}");
            if seen.insert(tagged.clone()) {
                out.push(tagged);
            }
        }

        if let Some(duty_id) = &notice.duty_calendar_id {
            if let Some(calendar) = self.duty_calendars.get(tenant_id, duty_id).await? {
                let today: NaiveDate = now.date_naive();
                for user in calendar.users_on(today) {
                    if seen.insert(user.clone()) {
                        out.push(user);
                    }
                }
            }
        }

        for recipient in route_to {
            if seen.insert(recipient.clone()) {
                out.push(recipient.clone());
            }
        }

        Ok(out)
    }
}

async fn cmdb_owners_for(event: &AlertEvent, tenant_id: &str, cmdb: &dyn CmdbOwnerLookup) -> anyhow::Result<Vec<String>> {
    let instance_or_ip = event.labels.get("instance").or_else(|| event.labels.get("ip"));
    match instance_or_ip {
        Some(value) => cmdb.owners_for(tenant_id, value).await,
        None => Ok(vec![]),
    }
}

async fn event_repeat_interval(event: &AlertEvent, rules: &Arc<dyn RuleRepository>, tenant_id: &str) -> anyhow::Result<chrono::Duration> {
    Ok(rules.get(tenant_id, &event.rule_id).await?.map(|r| r.repeat_notice_interval).unwrap_or_else(|| chrono::Duration::minutes(5)))
}

/// DingDing's optional "enterprise internal API" personal-message path
/// (spec §4.7) needs the notice's `dingding_enterprise` credentials, which
/// have no home in `RouteTarget`; fold them into `provider_config` under a
/// well-known key so the channel driver can find them without widening
/// `SendParams` for every other channel.
fn merge_dingding_enterprise(provider_config: Option<serde_json::Value>, notice: &Notice) -> Option<serde_json::Value> {
    let Some(enterprise) = &notice.dingding_enterprise else {
        return provider_config;
    };
    let mut merged = match provider_config {
        Some(serde_json::Value::Object(map)) => map,
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("_route".to_string(), other);
            map
        }
        None => serde_json::Map::new(),
    };
    merged.insert("dingding_enterprise".to_string(), serde_json::json!(enterprise));
    Some(serde_json::Value::Object(merged))
}

/// Collapse events sharing a `ruleId` into one synthetic event carrying the
/// annotation `"aggregated N alerts"` (spec §4.6.b). Groups of one pass
/// through unchanged. Each result pairs the event to actually send with the
/// full set of underlying events it stands in for, so the caller can advance
/// `lastSendTime` on every one of them after a successful send.
fn aggregate_by_rule(events: Vec<AlertEvent>) -> Vec<(AlertEvent, Vec<AlertEvent>)> {
    let mut by_rule: HashMap<String, Vec<AlertEvent>> = HashMap::new();
    for event in events {
        by_rule.entry(event.rule_id.clone()).or_default().push(event);
    }

    let mut out = Vec::with_capacity(by_rule.len());
    for (_, group) in by_rule {
        if group.len() == 1 {
            let event = group[0].clone();
            out.push((event, group));
            continue;
        }
        let mut synthetic = group[0].clone();
        synthetic.annotations.insert("aggregated".to_string(), format!("aggregated {} alerts", group.len()));
        synthetic.is_recovered = group.iter().all(|e| e.is_recovered);
        synthetic.last_send_time = group.iter().filter_map(|e| e.last_send_time).max();
        synthetic.enriched = EnrichedFields::default();
        out.push((synthetic, group));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ConfirmState, EventKey, Rule};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    fn base_event(rule_id: &str, severity: Severity) -> AlertEvent {
        AlertEvent {
            key: EventKey { tenant_id: "t1".into(), fault_center_id: "fc1".into(), fingerprint: format!("fp-{rule_id}") },
            event_id: format!("evt-{rule_id}"),
            rule_id: rule_id.to_string(),
            rule_name: rule_id.to_string(),
            severity,
            labels: BTreeMap::new(),
            annotations: BTreeMap::new(),
            first_trigger_time: Utc::now(),
            last_eval_time: Utc::now(),
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

    #[test]
    fn aggregate_by_rule_collapses_same_rule_group() {
        let events = vec![base_event("r1", Severity::P1), base_event("r1", Severity::P1), base_event("r2", Severity::P1)];
        let collapsed = aggregate_by_rule(events);
        assert_eq!(collapsed.len(), 2);
        let (aggregated, members) = collapsed.iter().find(|(e, _)| e.rule_id == "r1").unwrap();
        assert!(aggregated.annotations.get("aggregated").unwrap().contains("2 alerts"));
        assert_eq!(members.len(), 2, "the synthetic carries every underlying event it stands in for");
    }

    #[derive(Default)]
    struct NullRecordSink {
        records: Mutex<Vec<NoticeRecord>>,
    }

    #[async_trait]
    impl NoticeRecordSink for NullRecordSink {
        async fn append(&self, record: NoticeRecord) -> anyhow::Result<()> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    #[tokio::test]
    async fn resolve_recipients_dedups_preserving_order() {
        struct FixedCmdb;
        #[async_trait]
        impl CmdbOwnerLookup for FixedCmdb {
            async fn owners_for(&self, _tenant_id: &str, _instance_or_ip: &str) -> anyhow::Result<Vec<String>> {
                Ok(vec!["alice".to_string()])
            }
        }
        struct NoDutyCalendars;
        #[async_trait]
        impl DutyCalendarRepository for NoDutyCalendars {
            async fn get(&self, _tenant_id: &str, _duty_id: &str) -> anyhow::Result<Option<crate::domain::models::DutyCalendar>> {
                Ok(None)
            }
        }
        struct NoRules;
        #[async_trait]
        impl RuleRepository for NoRules {
            async fn list_enabled(&self, _fault_center_id: &str) -> anyhow::Result<Vec<Rule>> {
                Ok(vec![])
            }
            async fn get(&self, _tenant_id: &str, _rule_id: &str) -> anyhow::Result<Option<Rule>> {
                Ok(None)
            }
        }
        struct NoNotices;
        #[async_trait]
        impl NoticeRepository for NoNotices {
            async fn get(&self, _tenant_id: &str, _notice_id: &str) -> anyhow::Result<Option<Notice>> {
                Ok(None)
            }
        }
        #[derive(Default)]
        struct NoStore;
        #[async_trait]
        impl EventStore for NoStore {
            async fn push(&self, _event: AlertEvent) -> crate::domain::DomainResult<()> {
                Ok(())
            }
            async fn get(&self, _key: &EventKey) -> crate::domain::DomainResult<Option<AlertEvent>> {
                Ok(None)
            }
            async fn list(&self, _tenant_id: &str, _fault_center_id: &str) -> crate::domain::DomainResult<Vec<AlertEvent>> {
                Ok(vec![])
            }
            async fn delete(&self, _key: &EventKey) -> crate::domain::DomainResult<()> {
                Ok(())
            }
            async fn list_recovered(&self, _tenant_id: &str, _fault_center_id: &str, _now: DateTime<Utc>, _silence_gap: chrono::Duration) -> crate::domain::DomainResult<Vec<AlertEvent>> {
                Ok(vec![])
            }
        }

        let group = NoticeGroupTask {
            rules: Arc::new(NoRules),
            notices: Arc::new(NoNotices),
            duty_calendars: Arc::new(NoDutyCalendars),
            cmdb: Arc::new(FixedCmdb),
            store: Arc::new(NoStore),
            records: Arc::new(NullRecordSink::default()),
            renderer: Arc::new(crate::domain::ports::template::PlainTextRenderer),
            channels: HashMap::new(),
        };

        let mut event = base_event("r1", Severity::P1);
        event.labels.insert("instance".to_string(), "h1:9100".to_string());
        let notice = Notice {
            tenant_id: "t1".into(),
            notice_id: "n1".into(),
            name: "oncall".into(),
            channel: ChannelKind::Webhook,
            default_target: crate::domain::models::RouteTarget::default(),
            severity_routes: vec![],
            duty_calendar_id: None,
            dingding_enterprise: None,
        };

        let recipients = group.resolve_recipients("t1", &event, &notice, &["alice".to_string(), "bob".to_string()], Utc::now()).await.unwrap();
        assert_eq!(recipients, vec!["@alice".to_string(), "alice".to_string(), "bob".to_string()]);
    }
}
