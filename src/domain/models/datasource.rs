//! DataSource entity and sample/target types (spec.md §3 "DataSource", §4.2 C2).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// The variant of backend a datasource talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasourceKind {
    Prometheus,
    VictoriaMetrics,
    Loki,
    ElasticSearch,
    ClickHouse,
    VictoriaLogs,
    Jaeger,
    Kubernetes,
    CloudWatch,
    AliCloudSls,
    Consul,
}

impl DatasourceKind {
    /// Whether this kind exposes `GetTargets`/health scraping (Exporter Inspector, C8
    /// requires "must be a metrics datasource").
    #[must_use]
    pub fn is_metrics(self) -> bool {
        matches!(self, DatasourceKind::Prometheus | DatasourceKind::VictoriaMetrics)
    }
}

/// Connection parameters common to all datasource variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasourceConfig {
    pub tenant_id: String,
    pub datasource_id: String,
    pub name: String,
    pub kind: DatasourceKind,
    pub url: String,
    pub basic_auth_user: Option<String>,
    pub basic_auth_password: Option<String>,
    pub bearer_token: Option<String>,
    #[serde(with = "duration_secs")]
    pub timeout: Duration,
    pub enabled: bool,
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        d.as_secs().serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}

/// A single sample returned by `Query`/`QueryRange`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: BTreeMap<String, String>,
    pub value: f64,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Health of a single scrape target, returned by `GetTargets` (spec §4.2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetHealth {
    pub instance: String,
    pub job: String,
    pub labels: BTreeMap<String, String>,
    pub scrape_url: String,
    pub health: TargetHealthState,
    pub last_scrape: chrono::DateTime<chrono::Utc>,
    pub last_error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetHealthState {
    Up,
    Down,
    Unknown,
}

impl TargetHealth {
    /// Reconstruct `host:port` when the upstream only reports a bare host
    /// (spec §4.2: "the client reconstructs the port from the scrape URL scheme").
    #[must_use]
    pub fn normalized_instance(&self) -> String {
        if self.instance.contains(':') {
            return self.instance.clone();
        }
        let port = if self.scrape_url.starts_with("https://") {
            "443"
        } else {
            "80"
        };
        format!("{}:{port}", self.instance)
    }
}
