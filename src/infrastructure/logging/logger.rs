//! tracing-based logger initialization, mirroring the teacher's
//! `infrastructure::logging::logger::LoggerImpl`.

use anyhow::{Context, Result};
use std::io;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use super::config::{LogConfig, LogFormat, RotationPolicy};

/// Holds the non-blocking writer guard alive for the process lifetime.
pub struct LoggerImpl {
    _guard: Option<WorkerGuard>,
}

fn parse_log_level(level: &str) -> Result<Level> {
    level
        .parse::<Level>()
        .with_context(|| format!("invalid log level: {level}"))
}

impl LoggerImpl {
    /// Mirrors the teacher's per-format `with_filter` construction: each
    /// stdout layer carries its own `EnvFilter`, sidestepping the need to
    /// unify Json/Pretty layers behind one dynamically-sized `Layer` type.
    pub fn init(config: &LogConfig) -> Result<Self> {
        let default_level = parse_log_level(&config.level)?;
        let env_filter = || EnvFilter::builder().with_default_directive(default_level.into()).from_env_lossy();

        let guard = if let Some(ref log_dir) = config.log_dir {
            let file_appender = match config.rotation {
                RotationPolicy::Daily => rolling::daily(log_dir, "alerthub.log"),
                RotationPolicy::Hourly => rolling::hourly(log_dir, "alerthub.log"),
                RotationPolicy::Never => rolling::never(log_dir, "alerthub.log"),
            };
            let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking_file)
                .with_ansi(false)
                .with_target(true)
                .with_line_number(true)
                .with_filter(env_filter());

            if config.enable_stdout {
                match config.format {
                    LogFormat::Json => {
                        let stdout_layer = tracing_subscriber::fmt::layer()
                            .json()
                            .with_writer(io::stdout)
                            .with_target(true)
                            .with_filter(env_filter());
                        tracing_subscriber::registry()
                            .with(file_layer)
                            .with(stdout_layer)
                            .try_init()
                            .context("failed to install tracing subscriber")?;
                    }
                    LogFormat::Pretty => {
                        let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout).with_filter(env_filter());
                        tracing_subscriber::registry()
                            .with(file_layer)
                            .with(stdout_layer)
                            .try_init()
                            .context("failed to install tracing subscriber")?;
                    }
                }
            } else {
                tracing_subscriber::registry().with(file_layer).try_init().context("failed to install tracing subscriber")?;
            }
            Some(guard)
        } else {
            match config.format {
                LogFormat::Json => {
                    let stdout_layer =
                        tracing_subscriber::fmt::layer().json().with_writer(io::stdout).with_target(true).with_filter(env_filter());
                    tracing_subscriber::registry().with(stdout_layer).try_init().context("failed to install tracing subscriber")?;
                }
                LogFormat::Pretty => {
                    let stdout_layer = tracing_subscriber::fmt::layer().pretty().with_writer(io::stdout).with_filter(env_filter());
                    tracing_subscriber::registry().with(stdout_layer).try_init().context("failed to install tracing subscriber")?;
                }
            }
            None
        };

        Ok(Self { _guard: guard })
    }
}
