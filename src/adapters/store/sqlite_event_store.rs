//! SQLite implementation of the Event Store port (spec.md §4.3 C3), grounded
//! on the teacher's `adapters::sqlite::agent_repository` row-mapping idiom:
//! JSON-serialize the aggregate, `INSERT ... ON CONFLICT DO UPDATE` for the
//! upsert, and a typed row struct that round-trips through `TryFrom`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AlertEvent, EventKey};
use crate::domain::ports::event_store::{EventHistorySink, EventStore};

#[derive(Clone)]
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn push(&self, event: AlertEvent) -> DomainResult<()> {
        let json = serde_json::to_string(&event)?;
        sqlx::query(
            r"
            INSERT INTO alert_cur_events (tenant_id, fault_center_id, fingerprint, event_json, last_eval_time)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT (tenant_id, fault_center_id, fingerprint)
            DO UPDATE SET event_json = excluded.event_json, last_eval_time = excluded.last_eval_time
            ",
        )
        .bind(&event.key.tenant_id)
        .bind(&event.key.fault_center_id)
        .bind(&event.key.fingerprint)
        .bind(&json)
        .bind(event.last_eval_time.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &EventKey) -> DomainResult<Option<AlertEvent>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT event_json FROM alert_cur_events WHERE tenant_id = ? AND fault_center_id = ? AND fingerprint = ?",
        )
        .bind(&key.tenant_id)
        .bind(&key.fault_center_id)
        .bind(&key.fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(json,)| serde_json::from_str(&json).map_err(DomainError::from)).transpose()
    }

    async fn list(&self, tenant_id: &str, fault_center_id: &str) -> DomainResult<Vec<AlertEvent>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT event_json FROM alert_cur_events WHERE tenant_id = ? AND fault_center_id = ?")
                .bind(tenant_id)
                .bind(fault_center_id)
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(|(json,)| serde_json::from_str(&json).map_err(DomainError::from)).collect()
    }

    async fn delete(&self, key: &EventKey) -> DomainResult<()> {
        sqlx::query("DELETE FROM alert_cur_events WHERE tenant_id = ? AND fault_center_id = ? AND fingerprint = ?")
            .bind(&key.tenant_id)
            .bind(&key.fault_center_id)
            .bind(&key.fingerprint)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_recovered(&self, tenant_id: &str, fault_center_id: &str, now: DateTime<Utc>, silence_gap: chrono::Duration) -> DomainResult<Vec<AlertEvent>> {
        let candidates = self.list(tenant_id, fault_center_id).await?;
        let mut flipped = Vec::new();
        for mut event in candidates {
            if event.status == crate::domain::models::EventStatus::Alerting && now - event.last_eval_time >= silence_gap {
                event.mark_recovered(now);
                self.push(event.clone()).await?;
                flipped.push(event);
            }
        }
        Ok(flipped)
    }
}

/// Append-only history sink, idempotent on `(tenant_id, event_id)`
/// (spec §4.10 "Failure semantics").
#[async_trait]
impl EventHistorySink for SqliteEventStore {
    async fn record_recovered(&self, event: &AlertEvent) -> DomainResult<()> {
        let json = serde_json::to_string(event)?;
        sqlx::query(
            r"
            INSERT INTO alert_his_events (tenant_id, event_id, event_json, recovered_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (tenant_id, event_id) DO NOTHING
            ",
        )
        .bind(&event.key.tenant_id)
        .bind(&event.event_id)
        .bind(&json)
        .bind(event.recover_time.unwrap_or_else(Utc::now).to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
