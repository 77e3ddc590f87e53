//! Write sinks for append-only / batch-written entities (spec.md §3, §4.8, §4.9).

use async_trait::async_trait;

use crate::domain::models::{Inspection, InspectionDetail, NoticeRecord, ThirdPartyAlert};

#[async_trait]
pub trait NoticeRecordSink: Send + Sync {
    async fn append(&self, record: NoticeRecord) -> anyhow::Result<()>;
}

#[async_trait]
pub trait InspectionSink: Send + Sync {
    /// Persist as a two-table write; detail inserts are batched (<=500 per
    /// statement, spec §4.8 step 4).
    async fn write_batch(&self, inspection: Inspection, details: Vec<InspectionDetail>) -> anyhow::Result<()>;

    /// Delete inspections and details older than `retention_days` (spec §4.8 step 5).
    async fn apply_retention(&self, tenant_id: &str, retention_days: i64) -> anyhow::Result<u64>;

    async fn latest_for_tenant(&self, tenant_id: &str, datasource_ids: &[String]) -> anyhow::Result<Vec<Inspection>>;
}

#[async_trait]
pub trait ThirdPartyAlertSink: Send + Sync {
    async fn insert(&self, alert: ThirdPartyAlert) -> anyhow::Result<()>;

    /// `fingerprint` is set here rather than at `insert` time: the raw
    /// payload is persisted before mapping (spec §4.9 step 2), and the
    /// fingerprint is only known once mapping has produced a normalized
    /// event (step 4).
    async fn update_status(
        &self,
        id: &str,
        status: crate::domain::models::ProcessStatus,
        linked_event_id: Option<String>,
        fingerprint: Option<&str>,
    ) -> anyhow::Result<()>;
    /// Used for third-party ingest dedup (spec §8): find a recent alert with
    /// the same fingerprint fields within a window.
    async fn recent_by_fingerprint(
        &self,
        webhook_id: &str,
        fingerprint: &str,
        within: chrono::Duration,
    ) -> anyhow::Result<Vec<ThirdPartyAlert>>;
}
