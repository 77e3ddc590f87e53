//! Event Store port (spec.md §4.3 C3).

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::DomainResult;
use crate::domain::models::{AlertEvent, EventKey};

/// Keyed mapping `(fault_center_id, fingerprint) -> AlertEvent`. The only
/// component permitted to mutate active event state (spec §5); evaluators
/// and the recovery loop both funnel through this API.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Upsert by key, preserving `first_trigger_time` on update.
    async fn push(&self, event: AlertEvent) -> DomainResult<()>;

    async fn get(&self, key: &EventKey) -> DomainResult<Option<AlertEvent>>;

    async fn list(&self, tenant_id: &str, fault_center_id: &str) -> DomainResult<Vec<AlertEvent>>;

    async fn delete(&self, key: &EventKey) -> DomainResult<()>;

    /// Selects events whose last evaluation time is older than `silence_gap`
    /// and flips them to recovered as a single logical transaction,
    /// returning the flipped events (spec §4.3).
    async fn list_recovered(
        &self,
        tenant_id: &str,
        fault_center_id: &str,
        now: DateTime<Utc>,
        silence_gap: chrono::Duration,
    ) -> DomainResult<Vec<AlertEvent>>;
}

/// Append-only sink receiving a copy of every event on recovery (spec §4.3).
#[async_trait]
pub trait EventHistorySink: Send + Sync {
    async fn record_recovered(&self, event: &AlertEvent) -> DomainResult<()>;
}
