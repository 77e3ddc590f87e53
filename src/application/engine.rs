//! Composition root (SPEC_FULL.md §9 "rearchitect global mutable state"):
//! owns every port implementation and wires the scheduler jobs that drive
//! rule evaluation, dispatch, recovery, and inspection.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use tracing::{error, info};

use crate::application::dispatcher::Dispatcher;
use crate::application::scheduler::{JobStatsSnapshot, Schedule, Scheduler};
use crate::application::silence_matcher::SilenceMatcher;
use crate::application::{ingest, inspector, recovery, rule_evaluator};
use crate::domain::models::FaultCenter;
use crate::domain::ports::channel::Channel;
use crate::domain::ports::datasource::DataSourcePort;
use crate::domain::ports::event_store::{EventHistorySink, EventStore};
use crate::domain::ports::repository::{
    CmdbOwnerLookup, DatasourceRepository, DutyCalendarRepository, FaultCenterRepository, NoticeRepository, RuleRepository, SilenceRepository, ThirdPartyWebhookRepository,
};
use crate::domain::ports::sink::{InspectionSink, NoticeRecordSink, ThirdPartyAlertSink};
use crate::domain::ports::template::TemplateRenderer;
use crate::infrastructure::rate_limiter::SmsRateLimiter;

/// Every port implementation the engine needs, handed in by `main` once the
/// concrete adapters are built.
pub struct EngineDeps {
    pub rules: Arc<dyn RuleRepository>,
    pub datasource_configs: Arc<dyn DatasourceRepository>,
    pub silences: Arc<dyn SilenceRepository>,
    pub notices: Arc<dyn NoticeRepository>,
    pub fault_centers: Arc<dyn FaultCenterRepository>,
    pub duty_calendars: Arc<dyn DutyCalendarRepository>,
    pub cmdb: Arc<dyn CmdbOwnerLookup>,
    pub webhooks: Arc<dyn ThirdPartyWebhookRepository>,
    pub event_store: Arc<dyn EventStore>,
    pub history: Arc<dyn EventHistorySink>,
    pub notice_records: Arc<dyn NoticeRecordSink>,
    pub inspections: Arc<dyn InspectionSink>,
    pub third_party_alerts: Arc<dyn ThirdPartyAlertSink>,
    pub renderer: Arc<dyn TemplateRenderer>,
    pub datasources: Arc<BTreeMap<String, Box<dyn DataSourcePort>>>,
    pub channels: Arc<std::collections::HashMap<crate::domain::models::ChannelKind, Arc<dyn Channel>>>,
    pub sms_limiter: Arc<SmsRateLimiter>,
}

/// Owns the scheduler and every registered job. `start` fans rule
/// evaluation, recovery, and dispatch out across per-fault-center tasks;
/// `shutdown` drains them within the configured window.
pub struct Engine {
    deps: Arc<EngineDeps>,
    scheduler: Scheduler,
    silence_matcher: Arc<SilenceMatcher>,
    channel_workers: usize,
}

impl Engine {
    #[must_use]
    pub fn new(deps: EngineDeps, channel_workers: usize) -> Self {
        Self { deps: Arc::new(deps), scheduler: Scheduler::new(), silence_matcher: Arc::new(SilenceMatcher::new()), channel_workers }
    }

    /// Shared handle to the engine's ports, for HTTP handlers that need
    /// direct read/write access (exporter status, manual confirm/close).
    #[must_use]
    pub fn deps(&self) -> Arc<EngineDeps> {
        Arc::clone(&self.deps)
    }

    /// Register every fault center's jobs: one rule-tick job per enabled
    /// rule, one recovery loop, and one dispatch loop (spec §5 "one
    /// scheduler task per registered job ... one recovery loop per
    /// fault-center ... one dispatcher task per fault-center").
    pub async fn register_jobs(&mut self) -> anyhow::Result<()> {
        let fault_centers = self.deps.fault_centers.list().await?;
        let tenant_ids: Vec<String> = fault_centers.iter().map(|fc| fc.tenant_id.clone()).collect();
        self.silence_matcher.refresh(&tenant_ids, self.deps.silences.as_ref(), chrono::Utc::now()).await?;

        for fc in fault_centers {
            self.register_silence_refresh(&fc);
            self.register_rule_ticks(&fc).await?;
            self.register_recovery_loop(&fc);
            self.register_dispatch_loop(&fc);
        }

        Ok(())
    }

    fn register_silence_refresh(&mut self, fc: &FaultCenter) {
        let tenant_id = fc.tenant_id.clone();
        let matcher = Arc::clone(&self.silence_matcher);
        let silences = Arc::clone(&self.deps.silences);
        self.scheduler.register(format!("silence-refresh:{tenant_id}"), Schedule::Interval(StdDuration::from_secs(30)), move || {
            let tenant_id = tenant_id.clone();
            let matcher = Arc::clone(&matcher);
            let silences = Arc::clone(&silences);
            async move {
                if let Err(err) = matcher.refresh(std::slice::from_ref(&tenant_id), silences.as_ref(), chrono::Utc::now()).await {
                    error!(tenant_id = %tenant_id, error = %err, "silence refresh failed");
                }
            }
        });
    }

    async fn register_rule_ticks(&mut self, fc: &FaultCenter) -> anyhow::Result<()> {
        let rules = self.deps.rules.list_enabled(&fc.fault_center_id).await?;
        for rule in rules {
            let interval = duration_to_std(rule.eval_interval);
            let datasources = Arc::clone(&self.deps.datasources);
            let store = Arc::clone(&self.deps.event_store);
            let matcher = Arc::clone(&self.silence_matcher);
            let rule = Arc::new(rule);
            let job_rule = Arc::clone(&rule);
            self.scheduler.register(format!("rule-tick:{}", rule.rule_id), Schedule::Interval(interval), move || {
                let rule = Arc::clone(&job_rule);
                let datasources = Arc::clone(&datasources);
                let store = Arc::clone(&store);
                let matcher = Arc::clone(&matcher);
                async move {
                    let now = chrono::Utc::now();
                    match rule_evaluator::evaluate_tick(&rule, now, datasources.as_ref(), store.as_ref(), matcher.as_ref()).await {
                        Ok(outcome) if outcome.datasource_errors > 0 => {
                            error!(rule_id = %rule.rule_id, errors = outcome.datasource_errors, "rule tick had datasource errors");
                        }
                        Ok(_) => {}
                        Err(err) => error!(rule_id = %rule.rule_id, error = %err, "rule tick failed"),
                    }
                }
            });
        }
        Ok(())
    }

    fn register_recovery_loop(&mut self, fc: &FaultCenter) {
        let interval = duration_to_std(fc.recovery_scan_interval);
        let fc = Arc::new(fc.clone());
        let store = Arc::clone(&self.deps.event_store);
        let history = Arc::clone(&self.deps.history);
        self.scheduler.register(format!("recovery:{}", fc.fault_center_id), Schedule::Interval(interval), move || {
            let fc = Arc::clone(&fc);
            let store = Arc::clone(&store);
            let history = Arc::clone(&history);
            async move {
                let now = chrono::Utc::now();
                match recovery::recovery_tick(&fc, now, store.as_ref(), history.as_ref()).await {
                    Ok(flipped) if !flipped.is_empty() => {
                        info!(fault_center_id = %fc.fault_center_id, count = flipped.len(), "flipped events to recovered");
                        // Give the dispatcher one cycle to observe is_recovered==true
                        // and send the recovery notice (spec §4.10) before the key is
                        // retired from the active store.
                        tokio::time::sleep(duration_to_std(fc.dispatch_floor)).await;
                        if let Err(err) = recovery::delete_recovered(&flipped, store.as_ref()).await {
                            error!(fault_center_id = %fc.fault_center_id, error = %err, "failed to retire recovered events");
                        }
                    }
                    Ok(_) => {}
                    Err(err) => error!(fault_center_id = %fc.fault_center_id, error = %err, "recovery tick failed"),
                }
            }
        });
    }

    fn register_dispatch_loop(&mut self, fc: &FaultCenter) {
        let interval = duration_to_std(fc.dispatch_floor);
        let fc = Arc::new(fc.clone());
        let dispatcher = Arc::new(Dispatcher {
            rules: Arc::clone(&self.deps.rules),
            notices: Arc::clone(&self.deps.notices),
            duty_calendars: Arc::clone(&self.deps.duty_calendars),
            cmdb: Arc::clone(&self.deps.cmdb),
            store: Arc::clone(&self.deps.event_store),
            records: Arc::clone(&self.deps.notice_records),
            renderer: Arc::clone(&self.deps.renderer),
            channels: self.deps.channels.as_ref().clone(),
            channel_workers: self.channel_workers,
        });
        self.scheduler.register(format!("dispatch:{}", fc.fault_center_id), Schedule::Interval(interval), move || {
            let fc = Arc::clone(&fc);
            let dispatcher = Arc::clone(&dispatcher);
            async move {
                match dispatcher.run_cycle(&fc, chrono::Utc::now()).await {
                    Ok(outcome) if outcome.failed > 0 => {
                        error!(fault_center_id = %fc.fault_center_id, failed = outcome.failed, "dispatch cycle had failures");
                    }
                    Ok(_) => {}
                    Err(err) => error!(fault_center_id = %fc.fault_center_id, error = %err, "dispatch cycle failed"),
                }
            }
        });
    }

    /// Accept a third-party webhook post (spec §4.9 C9). Exposed for the
    /// HTTP ingest adapter to call directly, outside the scheduler.
    pub async fn ingest_webhook(&self, webhook_id: &str, payload: serde_json::Value, headers: BTreeMap<String, String>) -> crate::domain::DomainResult<ingest::IngestOutcome> {
        ingest::handle_webhook(webhook_id, payload, headers, chrono::Utc::now(), self.deps.webhooks.as_ref(), self.deps.third_party_alerts.as_ref(), self.deps.event_store.as_ref()).await
    }

    /// Run one inspection pass for a tenant (spec §4.8 C8), for use by the
    /// inspection cron job or an on-demand diagnostics call.
    pub async fn run_inspection(&self, config: &crate::domain::models::InspectionConfig) -> anyhow::Result<Vec<crate::domain::models::Inspection>> {
        inspector::run_tenant_inspection(config, self.deps.datasources.as_ref(), self.deps.inspections.as_ref()).await
    }

    pub fn start(&mut self) {
        self.scheduler.start();
    }

    /// Snapshot every scheduler job's run/skip counters, for the
    /// diagnostics endpoint (spec §5/§7).
    #[must_use]
    pub fn job_stats(&self) -> Vec<JobStatsSnapshot> {
        self.scheduler.job_stats()
    }

    pub async fn shutdown(self, drain: StdDuration) {
        self.scheduler.shutdown(drain).await;
    }
}

fn duration_to_std(d: chrono::Duration) -> StdDuration {
    d.to_std().unwrap_or(StdDuration::from_secs(30))
}
