//! Declarative read-side repository adapter (spec.md §1 Non-goals: "the
//! REST/CRUD surface ... relational persistence layer beyond what C3/C8/C9
//! need" are explicitly out of scope). Rule/DataSource/Notice/Silence/
//! FaultCenter/DutyCalendar/CMDB/webhook config is treated as a declarative
//! topology loaded from YAML, the same `figment`/`serde_yaml` idiom as
//! `infrastructure::config::loader::ConfigLoader`, reloadable at runtime
//! (spec §3: "mutated by CRUD, taking effect on next tick").

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::models::{
    DatasourceConfig, DutyCalendar, FaultCenter, Notice, Rule, Silence, ThirdPartyWebhook,
};
use crate::domain::ports::repository::{
    CmdbOwnerLookup, DatasourceRepository, DutyCalendarRepository, FaultCenterRepository,
    NoticeRepository, RuleRepository, SilenceRepository, ThirdPartyWebhookRepository,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DutyCalendarEntryFile {
    pub tenant_id: String,
    pub duty_id: String,
    #[serde(flatten)]
    pub calendar: DutyCalendar,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CmdbEntry {
    pub tenant_id: String,
    pub instance_or_ip: String,
    pub owners: Vec<String>,
}

/// The full declarative topology, deserialized from one YAML document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub datasources: Vec<DatasourceConfig>,
    #[serde(default)]
    pub notices: Vec<Notice>,
    #[serde(default)]
    pub silences: Vec<Silence>,
    #[serde(default)]
    pub fault_centers: Vec<FaultCenter>,
    #[serde(default)]
    pub duty_calendars: Vec<DutyCalendarEntryFile>,
    #[serde(default)]
    pub webhooks: Vec<ThirdPartyWebhook>,
    #[serde(default)]
    pub cmdb: Vec<CmdbEntry>,
}

impl Topology {
    /// # Errors
    /// Returns an error if the file can't be read or doesn't parse as YAML.
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read topology file {}", path.display()))?;
        serde_yaml::from_str(&raw).with_context(|| format!("failed to parse topology file {}", path.display()))
    }
}

/// Holds the current topology behind a lock so `reload` can swap it in
/// atomically; every repository trait is implemented against a clone of
/// the snapshot (cheap: topologies are small relative to event volume).
pub struct TopologyRepository {
    topology: RwLock<Topology>,
}

impl TopologyRepository {
    #[must_use]
    pub fn new(topology: Topology) -> Self {
        Self { topology: RwLock::new(topology) }
    }

    /// # Errors
    /// Returns an error if the file can't be read or doesn't parse.
    pub fn reload_from_file(&self, path: impl AsRef<std::path::Path>) -> Result<()> {
        let next = Topology::load_from_file(path)?;
        let mut guard = self.topology.write().expect("topology lock poisoned");
        *guard = next;
        Ok(())
    }

    fn snapshot(&self) -> Topology {
        self.topology.read().expect("topology lock poisoned").clone()
    }
}

#[async_trait]
impl RuleRepository for TopologyRepository {
    async fn list_enabled(&self, fault_center_id: &str) -> Result<Vec<Rule>> {
        Ok(self.snapshot().rules.into_iter().filter(|r| r.enabled && r.fault_center_id == fault_center_id).collect())
    }

    async fn get(&self, tenant_id: &str, rule_id: &str) -> Result<Option<Rule>> {
        Ok(self.snapshot().rules.into_iter().find(|r| r.tenant_id == tenant_id && r.rule_id == rule_id))
    }
}

#[async_trait]
impl DatasourceRepository for TopologyRepository {
    async fn get(&self, tenant_id: &str, datasource_id: &str) -> Result<Option<DatasourceConfig>> {
        Ok(self.snapshot().datasources.into_iter().find(|d| d.tenant_id == tenant_id && d.datasource_id == datasource_id))
    }

    async fn list_enabled(&self, tenant_id: &str) -> Result<Vec<DatasourceConfig>> {
        Ok(self.snapshot().datasources.into_iter().filter(|d| d.enabled && d.tenant_id == tenant_id).collect())
    }
}

#[async_trait]
impl SilenceRepository for TopologyRepository {
    async fn list_active(&self, tenant_id: &str, t: chrono::DateTime<chrono::Utc>) -> Result<Vec<Silence>> {
        Ok(self.snapshot().silences.into_iter().filter(|s| s.tenant_id == tenant_id && s.is_active_at(t)).collect())
    }
}

#[async_trait]
impl NoticeRepository for TopologyRepository {
    async fn get(&self, tenant_id: &str, notice_id: &str) -> Result<Option<Notice>> {
        Ok(self.snapshot().notices.into_iter().find(|n| n.tenant_id == tenant_id && n.notice_id == notice_id))
    }
}

#[async_trait]
impl FaultCenterRepository for TopologyRepository {
    async fn list(&self) -> Result<Vec<FaultCenter>> {
        let topology = self.snapshot();
        Ok(topology.fault_centers.iter().map(|fc| resolve_silence_gap(fc.clone(), &topology.rules)).collect())
    }

    async fn get(&self, tenant_id: &str, fault_center_id: &str) -> Result<Option<FaultCenter>> {
        let topology = self.snapshot();
        Ok(topology
            .fault_centers
            .iter()
            .find(|fc| fc.tenant_id == tenant_id && fc.fault_center_id == fault_center_id)
            .map(|fc| resolve_silence_gap(fc.clone(), &topology.rules)))
    }
}

/// Resolve `recovery_silence_gap` against the fault center's fastest enabled
/// rule when the topology left it unset (SPEC_FULL.md §7.3). A center with
/// no enabled rules yet falls back to a conservative 1 minute eval interval.
fn resolve_silence_gap(mut fc: FaultCenter, rules: &[Rule]) -> FaultCenter {
    if fc.recovery_silence_gap.is_none() {
        let fastest = rules
            .iter()
            .filter(|r| r.enabled && r.fault_center_id == fc.fault_center_id)
            .map(|r| r.eval_interval)
            .min()
            .unwrap_or_else(|| chrono::Duration::minutes(1));
        fc.recovery_silence_gap = Some(FaultCenter::default_silence_gap(fastest));
    }
    fc
}

#[async_trait]
impl DutyCalendarRepository for TopologyRepository {
    async fn get(&self, tenant_id: &str, duty_id: &str) -> Result<Option<DutyCalendar>> {
        Ok(self.snapshot().duty_calendars.into_iter().find(|e| e.tenant_id == tenant_id && e.duty_id == duty_id).map(|e| e.calendar))
    }
}

#[async_trait]
impl CmdbOwnerLookup for TopologyRepository {
    async fn owners_for(&self, tenant_id: &str, instance_or_ip: &str) -> Result<Vec<String>> {
        let by_key: HashMap<(String, String), Vec<String>> =
            self.snapshot().cmdb.into_iter().map(|e| ((e.tenant_id, e.instance_or_ip), e.owners)).collect();
        Ok(by_key.get(&(tenant_id.to_string(), instance_or_ip.to_string())).cloned().unwrap_or_default())
    }
}

#[async_trait]
impl ThirdPartyWebhookRepository for TopologyRepository {
    async fn get(&self, webhook_id: &str) -> Result<Option<ThirdPartyWebhook>> {
        Ok(self.snapshot().webhooks.into_iter().find(|w| w.webhook_id == webhook_id && w.enabled))
    }
}
