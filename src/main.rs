//! AlertHub entry point: loads configuration, brings up the persistence
//! and topology layers, wires the engine, and serves the ingest + manual
//! ops HTTP surface alongside an internal diagnostics listener (spec.md
//! §6), mirroring the teacher's `main.rs` bootstrap sequence.

use std::net::SocketAddr;
use std::sync::Arc;

use alerthub::adapters::http::{self, AppState};
use alerthub::adapters::store::{SqliteEventStore, SqliteInspectionSink, SqliteNoticeRecordSink, SqliteThirdPartyAlertSink};
use alerthub::adapters::topology::{Topology, TopologyRepository};
use alerthub::adapters::{channels, datasources};
use alerthub::application::engine::{Engine, EngineDeps};
use alerthub::domain::ports::template::PlainTextRenderer;
use alerthub::infrastructure::config::ConfigLoader;
use alerthub::infrastructure::logging::{LogConfig, LoggerImpl};
use alerthub::infrastructure::retry::RetryPolicy;
use alerthub::infrastructure::DatabaseConnection;
use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "alerthub", about = "Multi-tenant alerting engine")]
struct Cli {
    /// Path to the engine configuration file (defaults to the figment
    /// merge chain rooted at `.alerthub/config.yaml`).
    #[arg(long)]
    config: Option<String>,

    /// Path to the declarative topology YAML (rules, datasources, notices,
    /// silences, fault centers, duty calendars, webhooks, CMDB).
    #[arg(long, default_value = ".alerthub/topology.yaml")]
    topology: String,

    /// Load and validate configuration, then exit without starting the engine.
    #[arg(long)]
    validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path).context("failed to load configuration")?,
        None => ConfigLoader::load().context("failed to load configuration")?,
    };

    if cli.validate_config {
        println!("configuration OK");
        return Ok(());
    }

    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging)).context("failed to initialize logging")?;

    let database_url = format!("sqlite:{}", config.database.path);
    let db = DatabaseConnection::new(&database_url).await.context("failed to connect to database")?;
    db.migrate().await.context("failed to run database migrations")?;

    let topology = Topology::load_from_file(&cli.topology).with_context(|| format!("failed to load topology file {}", cli.topology))?;

    let mut datasource_clients = std::collections::BTreeMap::new();
    for ds in &topology.datasources {
        match datasources::build(ds.clone(), RetryPolicy::from(&config.retry)) {
            Ok(client) => {
                datasource_clients.insert(ds.datasource_id.clone(), client);
            }
            Err(err) => tracing::warn!(datasource_id = %ds.datasource_id, error = %err, "skipping unsupported datasource"),
        }
    }

    let topology_repo = Arc::new(TopologyRepository::new(topology));
    let (channel_registry, sms_limiter) = channels::build_registry(&config).context("failed to build channel registry")?;

    let deps = EngineDeps {
        rules: Arc::clone(&topology_repo) as _,
        datasource_configs: Arc::clone(&topology_repo) as _,
        silences: Arc::clone(&topology_repo) as _,
        notices: Arc::clone(&topology_repo) as _,
        fault_centers: Arc::clone(&topology_repo) as _,
        duty_calendars: Arc::clone(&topology_repo) as _,
        cmdb: Arc::clone(&topology_repo) as _,
        webhooks: Arc::clone(&topology_repo) as _,
        event_store: Arc::new(SqliteEventStore::new(db.pool().clone())),
        history: Arc::new(SqliteEventStore::new(db.pool().clone())),
        notice_records: Arc::new(SqliteNoticeRecordSink::new(db.pool().clone())),
        inspections: Arc::new(SqliteInspectionSink::new(db.pool().clone())),
        third_party_alerts: Arc::new(SqliteThirdPartyAlertSink::new(db.pool().clone())),
        renderer: Arc::new(PlainTextRenderer),
        datasources: Arc::new(datasource_clients),
        channels: Arc::new(channel_registry),
        sms_limiter,
    };

    let mut engine = Engine::new(deps, config.dispatch.channel_workers);
    engine.register_jobs().await.context("failed to register scheduler jobs")?;
    engine.start();

    let engine = Arc::new(engine);
    let app_state = AppState { engine: Arc::clone(&engine), deps: engine.deps() };

    let main_addr: SocketAddr = format!("0.0.0.0:{}", config.server.http_port).parse()?;
    let diagnostics_addr: SocketAddr = format!("127.0.0.1:{}", config.server.diagnostics_port).parse()?;

    let main_router = http::build_router(app_state.clone());
    let diagnostics_router = http::build_diagnostics_router(app_state);

    let main_server = tokio::spawn(http::serve(main_router, main_addr));
    let diagnostics_server = tokio::spawn(http::serve(diagnostics_router, diagnostics_addr));

    tokio::select! {
        res = main_server => {
            res.context("HTTP server task panicked")?.context("HTTP server failed")?;
        }
        res = diagnostics_server => {
            res.context("diagnostics server task panicked")?.context("diagnostics server failed")?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received shutdown signal");
        }
    }

    let drain = std::time::Duration::from_secs(config.server.shutdown_drain_secs);
    match Arc::try_unwrap(engine) {
        Ok(engine) => engine.shutdown(drain).await,
        Err(_) => tracing::warn!("engine still referenced at shutdown; skipping scheduler drain"),
    }

    Ok(())
}
