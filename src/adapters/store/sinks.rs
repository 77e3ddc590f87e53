//! SQLite implementations of the append-only/batch-write sink ports
//! (spec.md §3 "NoticeRecord", §4.8 C8, §4.9 C9).

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::domain::models::{Inspection, InspectionDetail, NoticeRecord, ProcessStatus, ThirdPartyAlert};
use crate::domain::ports::sink::{InspectionSink, NoticeRecordSink, ThirdPartyAlertSink};

#[derive(Clone)]
pub struct SqliteNoticeRecordSink {
    pool: SqlitePool,
}

impl SqliteNoticeRecordSink {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NoticeRecordSink for SqliteNoticeRecordSink {
    async fn append(&self, record: NoticeRecord) -> anyhow::Result<()> {
        let channel = serde_json::to_string(&record.channel)?;
        let severity = serde_json::to_string(&record.severity)?;
        let status = serde_json::to_string(&record.status)?;
        sqlx::query(
            r"
            INSERT INTO notice_record (event_id, date, tenant_id, rule_name, channel, notice_name, severity, status, content, error)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(&record.event_id)
        .bind(record.date.to_rfc3339())
        .bind(&record.tenant_id)
        .bind(&record.rule_name)
        .bind(channel)
        .bind(&record.notice_name)
        .bind(severity)
        .bind(status)
        .bind(&record.content)
        .bind(&record.error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[derive(Clone)]
pub struct SqliteInspectionSink {
    pool: SqlitePool,
}

impl SqliteInspectionSink {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InspectionSink for SqliteInspectionSink {
    async fn write_batch(&self, inspection: Inspection, details: Vec<InspectionDetail>) -> anyhow::Result<()> {
        let down_summary = serde_json::to_string(&inspection.down_summary)?;
        sqlx::query(
            r"
            INSERT INTO exporter_inspection (batch_id, tenant_id, datasource_id, total, up, down, unknown, availability, down_summary, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (batch_id) DO NOTHING
            ",
        )
        .bind(&inspection.batch_id)
        .bind(&inspection.tenant_id)
        .bind(&inspection.datasource_id)
        .bind(inspection.total)
        .bind(inspection.up)
        .bind(inspection.down)
        .bind(inspection.unknown)
        .bind(inspection.availability)
        .bind(down_summary)
        .bind(inspection.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        // Detail inserts are pre-chunked by the caller to <=500 rows/statement
        // (spec §4.8 step 4); this writes one row per call within that chunk.
        for detail in details {
            let health = serde_json::to_string(&detail.health)?;
            sqlx::query("INSERT INTO exporter_inspection_detail (batch_id, instance, job, health, last_error) VALUES (?, ?, ?, ?, ?)")
                .bind(&detail.batch_id)
                .bind(&detail.instance)
                .bind(&detail.job)
                .bind(health)
                .bind(&detail.last_error)
                .execute(&self.pool)
                .await?;
        }
        Ok(())
    }

    async fn apply_retention(&self, tenant_id: &str, retention_days: i64) -> anyhow::Result<u64> {
        let cutoff = (chrono::Utc::now() - chrono::Duration::days(retention_days)).to_rfc3339();
        let stale_batches: Vec<(String,)> = sqlx::query_as("SELECT batch_id FROM exporter_inspection WHERE tenant_id = ? AND created_at < ?")
            .bind(tenant_id)
            .bind(&cutoff)
            .fetch_all(&self.pool)
            .await?;

        // Two-step delete (details, then inspections) since there's no FK to cascade on.
        for (batch_id,) in &stale_batches {
            sqlx::query("DELETE FROM exporter_inspection_detail WHERE batch_id = ?").bind(batch_id).execute(&self.pool).await?;
        }
        let result = sqlx::query("DELETE FROM exporter_inspection WHERE tenant_id = ? AND created_at < ?")
            .bind(tenant_id)
            .bind(&cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn latest_for_tenant(&self, tenant_id: &str, datasource_ids: &[String]) -> anyhow::Result<Vec<Inspection>> {
        let mut out = Vec::with_capacity(datasource_ids.len());
        for datasource_id in datasource_ids {
            let row: Option<(String, String, String, u32, u32, u32, u32, f64, String, String)> = sqlx::query_as(
                r"
                SELECT batch_id, tenant_id, datasource_id, total, up, down, unknown, availability, down_summary, created_at
                FROM exporter_inspection WHERE tenant_id = ? AND datasource_id = ? ORDER BY created_at DESC LIMIT 1
                ",
            )
            .bind(tenant_id)
            .bind(datasource_id)
            .fetch_optional(&self.pool)
            .await?;

            if let Some((batch_id, tenant_id, datasource_id, total, up, down, unknown, availability, down_summary, created_at)) = row {
                out.push(Inspection {
                    batch_id,
                    tenant_id,
                    datasource_id,
                    total,
                    up,
                    down,
                    unknown,
                    availability,
                    down_summary: serde_json::from_str(&down_summary)?,
                    created_at: chrono::DateTime::parse_from_rfc3339(&created_at)?.with_timezone(&chrono::Utc),
                });
            }
        }
        Ok(out)
    }
}

#[derive(Clone)]
pub struct SqliteThirdPartyAlertSink {
    pool: SqlitePool,
}

impl SqliteThirdPartyAlertSink {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ThirdPartyAlertSink for SqliteThirdPartyAlertSink {
    async fn insert(&self, alert: ThirdPartyAlert) -> anyhow::Result<()> {
        let payload = serde_json::to_string(&alert.raw_payload)?;
        let headers = serde_json::to_string(&alert.headers)?;
        let status = serde_json::to_string(&alert.process_status)?;
        sqlx::query(
            r"
            INSERT INTO third_party_alerts (id, webhook_id, raw_payload, headers, process_status, received_at, linked_event_id, fingerprint)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
            ",
        )
        .bind(&alert.id)
        .bind(&alert.webhook_id)
        .bind(payload)
        .bind(headers)
        .bind(status)
        .bind(alert.received_at.to_rfc3339())
        .bind(&alert.linked_event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_status(&self, id: &str, status: ProcessStatus, linked_event_id: Option<String>, fingerprint: Option<&str>) -> anyhow::Result<()> {
        let status_json = serde_json::to_string(&status)?;
        sqlx::query("UPDATE third_party_alerts SET process_status = ?, linked_event_id = ?, fingerprint = COALESCE(?, fingerprint) WHERE id = ?")
            .bind(status_json)
            .bind(&linked_event_id)
            .bind(fingerprint)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn recent_by_fingerprint(&self, webhook_id: &str, fingerprint: &str, within: chrono::Duration) -> anyhow::Result<Vec<ThirdPartyAlert>> {
        let cutoff = (chrono::Utc::now() - within).to_rfc3339();
        let rows: Vec<(String, String, String, String, String, String, Option<String>)> = sqlx::query_as(
            r"
            SELECT id, webhook_id, raw_payload, headers, process_status, received_at, linked_event_id
            FROM third_party_alerts WHERE webhook_id = ? AND fingerprint = ? AND received_at >= ?
            ",
        )
        .bind(webhook_id)
        .bind(fingerprint)
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, webhook_id, raw_payload, headers, process_status, received_at, linked_event_id)| {
                Ok(ThirdPartyAlert {
                    id,
                    webhook_id,
                    raw_payload: serde_json::from_str(&raw_payload)?,
                    headers: serde_json::from_str(&headers)?,
                    process_status: serde_json::from_str(&process_status)?,
                    received_at: chrono::DateTime::parse_from_rfc3339(&received_at)?.with_timezone(&chrono::Utc),
                    linked_event_id,
                })
            })
            .collect()
    }
}
