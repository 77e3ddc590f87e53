//! DataSource port (spec.md §4.2 C2): uniform query surface over many backends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::models::{Sample, TargetHealth};

/// Uniform operations every datasource backend exposes. All calls must be
/// context-cancellable and bounded by a configured timeout (spec §4.2).
#[async_trait]
pub trait DataSourcePort: Send + Sync {
    /// `Query(expr, at) -> []Sample`.
    async fn query(&self, expr: &str, at: DateTime<Utc>) -> anyhow::Result<Vec<Sample>>;

    /// `QueryRange(expr, start, end, step) -> []Sample`.
    async fn query_range(
        &self,
        expr: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        step: chrono::Duration,
    ) -> anyhow::Result<Vec<Sample>>;

    /// `GetTargets() -> []TargetHealth`. Only meaningful for metrics datasources.
    async fn get_targets(&self) -> anyhow::Result<Vec<TargetHealth>>;

    /// `Check() -> bool`, a health probe.
    async fn check(&self) -> anyhow::Result<bool>;
}
