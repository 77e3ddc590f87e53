//! Engine configuration (ambient stack, SPEC_FULL.md §4; mirrors the
//! teacher's `domain::models::config::Config`).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub retry: RetryConfig,
    pub sms_rate_limit: SmsRateLimitConfig,
    pub dispatch: DispatchConfig,
    pub smtp: SmtpConfig,
}

/// Global SMTP settings shared by the Email channel driver (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpConfig {
    #[serde(default = "default_smtp_host")]
    pub host: String,
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    #[serde(default = "default_smtp_from")]
    pub from: String,
}

fn default_smtp_host() -> String {
    "localhost".to_string()
}
const fn default_smtp_port() -> u16 {
    587
}
fn default_smtp_from() -> String {
    "alerthub@localhost".to_string()
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self { host: default_smtp_host(), port: default_smtp_port(), username: None, password: None, from: default_smtp_from() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_diagnostics_port")]
    pub diagnostics_port: u16,
    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

const fn default_http_port() -> u16 {
    8080
}
const fn default_diagnostics_port() -> u16 {
    9999
}
const fn default_shutdown_drain_secs() -> u64 {
    15
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            diagnostics_port: default_diagnostics_port(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_db_path() -> String {
    ".alerthub/alerthub.db".to_string()
}
const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: default_db_path(), max_connections: default_max_connections() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    pub log_dir: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
const fn default_retention_days() -> u32 {
    30
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            retention_days: default_retention_days(),
            log_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}
const fn default_initial_backoff_ms() -> u64 {
    1_000
}
const fn default_max_backoff_ms() -> u64 {
    60_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsRateLimitConfig {
    #[serde(default = "default_per_second")]
    pub max_per_second: u32,
    #[serde(default = "default_per_minute")]
    pub max_per_minute: u32,
    #[serde(default = "default_per_hour")]
    pub max_per_hour: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

const fn default_per_second() -> u32 {
    5
}
const fn default_per_minute() -> u32 {
    100
}
const fn default_per_hour() -> u32 {
    1000
}
const fn default_burst() -> u32 {
    5
}

impl Default for SmsRateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_second: default_per_second(),
            max_per_minute: default_per_minute(),
            max_per_hour: default_per_hour(),
            burst: default_burst(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    #[serde(default = "default_dispatch_floor_secs")]
    pub floor_secs: u64,
    #[serde(default = "default_channel_workers")]
    pub channel_workers: usize,
}

const fn default_dispatch_floor_secs() -> u64 {
    15
}
const fn default_channel_workers() -> usize {
    10
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self { floor_secs: default_dispatch_floor_secs(), channel_workers: default_channel_workers() }
    }
}
