//! HTTP ingest surface (spec.md §6): third-party webhook ingestion, the
//! exporter monitor status read, and manual confirm/close, grounded on the
//! teacher's `adapters::mcp::events_http` router-building idiom (`Router`
//! + `State` + a `{code, msg}` error envelope).

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::{get, post};
use axum::Router;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::application::engine::{Engine, EngineDeps};
use crate::domain::models::{ConfirmState, EventKey};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
    pub deps: Arc<EngineDeps>,
}

/// Error envelope named in spec §7: "API error envelopes `{code, msg}` for
/// CRUD endpoints".
#[derive(Debug, Serialize)]
struct ErrorEnvelope {
    code: &'static str,
    msg: String,
}

fn error_response(status: StatusCode, code: &'static str, msg: impl std::fmt::Display) -> axum::response::Response {
    (status, Json(ErrorEnvelope { code, msg: msg.to_string() })).into_response()
}

/// Build the main HTTP server's router (spec §6 "the main HTTP server on
/// the configured port").
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/v1/webhook/{webhook_id}", post(ingest_webhook))
        .route("/api/w8t/exporter/monitor/status", get(exporter_monitor_status))
        .route("/api/w8t/event/processAlertEvent", post(process_alert_event))
        .route("/healthz", get(health))
        .with_state(state)
}

/// The internal diagnostics listener on `localhost:9999` (spec §6:
/// "exposes an internal diagnostics HTTP listener ... profiling
/// endpoints"). Kept deliberately separate from the main router so it can
/// never be exposed on a non-loopback interface.
pub fn build_diagnostics_router(state: AppState) -> Router {
    Router::new().route("/healthz", get(health)).route("/metrics", get(diagnostics_metrics)).with_state(state)
}

/// # Errors
/// Returns an error if the listener can't bind (spec §7 "Fatal: failure to
/// bind the HTTP listener").
pub async fn serve(router: Router, addr: SocketAddr) -> anyhow::Result<()> {
    info!(%addr, "HTTP listener starting");
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn diagnostics_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let sms = state.deps.sms_limiter.stats();
    let jobs: Vec<_> = state
        .engine
        .job_stats()
        .into_iter()
        .map(|j| serde_json::json!({"name": j.name, "runs": j.runs, "skippedOverlaps": j.skipped_overlaps}))
        .collect();
    Json(serde_json::json!({
        "status": "ok",
        "smsProvider": {
            "sent": sms.sent,
            "success": sms.success,
            "failure": sms.failure,
            "rateLimited": sms.rate_limited,
            "successRate": sms.success_rate,
        },
        "schedulerJobs": jobs,
    }))
}

async fn ingest_webhook(State(state): State<AppState>, Path(webhook_id): Path<String>, headers: HeaderMap, Json(payload): Json<serde_json::Value>) -> axum::response::Response {
    let header_map: BTreeMap<String, String> =
        headers.iter().filter_map(|(k, v)| v.to_str().ok().map(|v| (k.as_str().to_string(), v.to_string()))).collect();

    match state.engine.ingest_webhook(&webhook_id, payload, header_map).await {
        Ok(outcome) => Json(serde_json::json!({
            "alertId": outcome.alert_id,
            "eventId": outcome.event_id,
            "status": outcome.status,
        }))
        .into_response(),
        Err(err) => {
            error!(webhook_id = %webhook_id, error = %err, "webhook ingest failed");
            error_response(StatusCode::BAD_REQUEST, "INGEST_FAILED", err)
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExporterStatusQuery {
    tenant_id: String,
    datasource_ids: String,
}

async fn exporter_monitor_status(State(state): State<AppState>, Query(query): Query<ExporterStatusQuery>) -> axum::response::Response {
    let ids: Vec<String> = query.datasource_ids.split(',').map(str::to_string).filter(|s| !s.is_empty()).collect();
    match state.deps.inspections.latest_for_tenant(&query.tenant_id, &ids).await {
        Ok(inspections) => Json(serde_json::json!({"inspections": inspections})).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "INSPECTION_LOOKUP_FAILED", err),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessAlertEventRequest {
    tenant_id: String,
    fault_center_id: String,
    fingerprint: String,
    action: AlertEventAction,
    confirmed_by: Option<String>,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum AlertEventAction {
    Confirm,
    Close,
}

/// Manual confirm/close (spec §6: "`POST /api/w8t/event/processAlertEvent`
/// — manual confirm/close").
async fn process_alert_event(State(state): State<AppState>, Json(req): Json<ProcessAlertEventRequest>) -> axum::response::Response {
    let key = EventKey { tenant_id: req.tenant_id, fault_center_id: req.fault_center_id, fingerprint: req.fingerprint };

    let existing = match state.deps.event_store.get(&key).await {
        Ok(Some(event)) => event,
        Ok(None) => return error_response(StatusCode::NOT_FOUND, "EVENT_NOT_FOUND", "no event for that key"),
        Err(err) => return error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", err),
    };

    let result = match req.action {
        AlertEventAction::Close => state.deps.event_store.delete(&key).await,
        AlertEventAction::Confirm => {
            let mut event = existing;
            event.confirm = Some(ConfirmState { confirmed_by: req.confirmed_by.unwrap_or_else(|| "unknown".to_string()), confirmed_at: chrono::Utc::now() });
            state.deps.event_store.push(event).await
        }
    };

    match result {
        Ok(()) => Json(serde_json::json!({"status": "ok"})).into_response(),
        Err(err) => error_response(StatusCode::INTERNAL_SERVER_ERROR, "STORE_ERROR", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    #[tokio::test]
    async fn healthz_returns_ok() {
        let router = Router::new().route("/healthz", get(health));
        let response = router.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn error_response_builds_expected_envelope() {
        let response = error_response(StatusCode::BAD_REQUEST, "INGEST_FAILED", "boom");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
