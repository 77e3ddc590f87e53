//! Logging configuration types, mirroring the teacher's
//! `infrastructure::logging::config`.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Pretty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationPolicy {
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
    pub log_dir: Option<String>,
    pub rotation: RotationPolicy,
    pub enable_stdout: bool,
}

impl From<&crate::domain::models::config::LoggingConfig> for LogConfig {
    fn from(cfg: &crate::domain::models::config::LoggingConfig) -> Self {
        Self {
            level: cfg.level.clone(),
            format: if cfg.format == "pretty" { LogFormat::Pretty } else { LogFormat::Json },
            log_dir: cfg.log_dir.clone(),
            rotation: RotationPolicy::Daily,
            enable_stdout: true,
        }
    }
}
