//! SQLite connection pool and schema management, mirroring the teacher's
//! `infrastructure::database::connection::DatabaseConnection` (WAL mode,
//! bounded pool). Backs the persisted snapshot layer, history table, notice
//! records, inspections, and third-party alerts (spec.md §6 "Persisted
//! state layout").
//!
//! spec.md names Redis for the event-store K/V; the teacher's stack has no
//! Redis client, so the snapshot + history write-through (spec §4.3) and
//! every other persisted table in spec §6 use sqlx/SQLite, the teacher's
//! own persistence idiom (see DESIGN.md).

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

#[derive(Clone)]
pub struct DatabaseConnection {
    pool: SqlitePool,
}

impl DatabaseConnection {
    /// WAL mode, foreign keys on, bounded pool (5-10 connections), matching
    /// the teacher's `DatabaseConnection::new` configuration.
    pub async fn new(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .context("invalid database URL")?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .idle_timeout(Duration::from_secs(30))
            .max_lifetime(Duration::from_secs(1800))
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .context("failed to create connection pool")?;

        Ok(Self { pool })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create every table spec §6 names. Idempotent; run on startup.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS alert_cur_events (
                tenant_id TEXT NOT NULL,
                fault_center_id TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                event_json TEXT NOT NULL,
                last_eval_time TEXT NOT NULL,
                PRIMARY KEY (tenant_id, fault_center_id, fingerprint)
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS alert_his_events (
                tenant_id TEXT NOT NULL,
                event_id TEXT NOT NULL,
                event_json TEXT NOT NULL,
                recovered_at TEXT NOT NULL,
                PRIMARY KEY (tenant_id, event_id)
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS notice_record (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                event_id TEXT NOT NULL,
                date TEXT NOT NULL,
                tenant_id TEXT NOT NULL,
                rule_name TEXT NOT NULL,
                channel TEXT NOT NULL,
                notice_name TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                content TEXT NOT NULL,
                error TEXT
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS exporter_inspection (
                batch_id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL,
                datasource_id TEXT NOT NULL,
                total INTEGER NOT NULL,
                up INTEGER NOT NULL,
                down INTEGER NOT NULL,
                unknown INTEGER NOT NULL,
                availability REAL NOT NULL,
                down_summary TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS exporter_inspection_detail (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                batch_id TEXT NOT NULL,
                instance TEXT NOT NULL,
                job TEXT NOT NULL,
                health TEXT NOT NULL,
                last_error TEXT NOT NULL
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS third_party_alerts (
                id TEXT PRIMARY KEY,
                webhook_id TEXT NOT NULL,
                raw_payload TEXT NOT NULL,
                headers TEXT NOT NULL,
                process_status TEXT NOT NULL,
                received_at TEXT NOT NULL,
                linked_event_id TEXT,
                fingerprint TEXT
            );
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
