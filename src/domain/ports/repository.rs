//! Read-only repository ports that loan Rule/Notice/Silence/FaultCenter/DutyCalendar
//! objects into the evaluator/dispatcher for the duration of a tick (spec.md §3
//! "Ownership"). The CRUD surface that mutates these is explicitly out of scope
//! (spec §1); these ports model the read side the core consumes.

use async_trait::async_trait;

use crate::domain::models::{
    DatasourceConfig, DutyCalendar, FaultCenter, Notice, Rule, Silence, ThirdPartyWebhook,
};

#[async_trait]
pub trait RuleRepository: Send + Sync {
    async fn list_enabled(&self, fault_center_id: &str) -> anyhow::Result<Vec<Rule>>;
    async fn get(&self, tenant_id: &str, rule_id: &str) -> anyhow::Result<Option<Rule>>;
}

#[async_trait]
pub trait DatasourceRepository: Send + Sync {
    async fn get(&self, tenant_id: &str, datasource_id: &str) -> anyhow::Result<Option<DatasourceConfig>>;
    async fn list_enabled(&self, tenant_id: &str) -> anyhow::Result<Vec<DatasourceConfig>>;
}

#[async_trait]
pub trait SilenceRepository: Send + Sync {
    /// Active set at `t`: all silences with `start <= t < end` (spec §3).
    async fn list_active(&self, tenant_id: &str, t: chrono::DateTime<chrono::Utc>) -> anyhow::Result<Vec<Silence>>;
}

#[async_trait]
pub trait NoticeRepository: Send + Sync {
    async fn get(&self, tenant_id: &str, notice_id: &str) -> anyhow::Result<Option<Notice>>;
}

#[async_trait]
pub trait FaultCenterRepository: Send + Sync {
    async fn list(&self) -> anyhow::Result<Vec<FaultCenter>>;
    async fn get(&self, tenant_id: &str, fault_center_id: &str) -> anyhow::Result<Option<FaultCenter>>;
}

#[async_trait]
pub trait DutyCalendarRepository: Send + Sync {
    async fn get(&self, tenant_id: &str, duty_id: &str) -> anyhow::Result<Option<DutyCalendar>>;
}

/// CMDB owner lookup by instance/ip label (spec §4.6.e).
#[async_trait]
pub trait CmdbOwnerLookup: Send + Sync {
    async fn owners_for(&self, tenant_id: &str, instance_or_ip: &str) -> anyhow::Result<Vec<String>>;
}

#[async_trait]
pub trait ThirdPartyWebhookRepository: Send + Sync {
    async fn get(&self, webhook_id: &str) -> anyhow::Result<Option<ThirdPartyWebhook>>;
}
