//! Concrete `DataSourcePort` backends (spec.md §4.2 C2).

pub mod prometheus;

use crate::domain::models::datasource::{DatasourceConfig, DatasourceKind};
use crate::domain::ports::datasource::DataSourcePort;
use crate::infrastructure::retry::RetryPolicy;

/// Build the concrete client for a datasource's configured kind.
///
/// Only the metrics backends (Prometheus/VictoriaMetrics, which speak the
/// same wire protocol) are wired up; the remaining `DatasourceKind` variants
/// are out of scope for this engine (spec.md Non-goals: "building new
/// datasource integrations").
///
/// # Errors
/// Returns an error if the kind has no client, or the client fails to build.
pub fn build(config: DatasourceConfig, retry: RetryPolicy) -> anyhow::Result<Box<dyn DataSourcePort>> {
    match config.kind {
        DatasourceKind::Prometheus | DatasourceKind::VictoriaMetrics => {
            Ok(Box::new(prometheus::PrometheusDataSource::new(config, retry)?))
        }
        other => anyhow::bail!("no datasource client implemented for {other:?}"),
    }
}
