//! REST handlers for the trigger endpoint and operational probes.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::Utc;
use serde::Serialize;
use tracing::{error, warn};

use dispatch_core::config::{AuthConfig, EngineConfig};
use dispatch_core::types::{QueueRunReport, SequenceRunReport};
use dispatch_engine::{QueueProcessor, SequenceEngine};
use dispatch_store::{MessageQueue, QueueStats};

/// Header carrying the platform's own periodic-trigger secret.
const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Header carrying the custom shared trigger secret.
const TRIGGER_SECRET_HEADER: &str = "x-trigger-secret";

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<MessageQueue>,
    pub processor: Arc<QueueProcessor>,
    pub sequences: Arc<SequenceEngine>,
    pub auth: Arc<AuthConfig>,
    pub engine: EngineConfig,
    pub node_id: String,
    pub start_time: Instant,
}

/// Combined tally returned from a trigger invocation. Callers (cron infra,
/// admin "resend" actions) confirm work occurred from these numbers; this
/// is never a bare success boolean.
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub reclaimed: usize,
    pub queue: QueueRunReport,
    pub sequences: SequenceRunReport,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Check the caller's credentials. Any one of the platform cron secret,
/// the custom trigger secret, or an admin bearer token suffices.
fn authorize(headers: &HeaderMap, auth: &AuthConfig) -> Result<(), &'static str> {
    let header_value = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());

    if let (Some(expected), Some(presented)) =
        (auth.cron_secret.as_deref(), header_value(CRON_SECRET_HEADER))
    {
        if expected == presented {
            return Ok(());
        }
    }

    if let (Some(expected), Some(presented)) = (
        auth.trigger_secret.as_deref(),
        header_value(TRIGGER_SECRET_HEADER),
    ) {
        if expected == presented {
            return Ok(());
        }
    }

    if let Some(bearer) = header_value("authorization").and_then(|v| v.strip_prefix("Bearer ")) {
        if auth.admin_tokens.iter().any(|t| t == bearer) {
            return Ok(());
        }
    }

    Err("missing or invalid trigger credentials")
}

/// Run one full pass: reclaim orphaned claims, drain due messages, advance
/// due enrollments. Shared by the cron and manual trigger routes.
async fn run_trigger(
    state: AppState,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, (StatusCode, Json<ErrorResponse>)> {
    if let Err(msg) = authorize(&headers, &state.auth) {
        warn!(error = msg, "Trigger call rejected");
        metrics::counter!("api.unauthorized_triggers").increment(1);
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "unauthorized".to_string(),
                message: msg.to_string(),
            }),
        ));
    }

    let now = Utc::now();
    let reclaimed = state
        .queue
        .reclaim_stale(now, state.engine.stale_claim_minutes);

    let queue_report = state
        .processor
        .process_due_messages(now, state.engine.message_batch_size)
        .map_err(|e| {
            error!(error = %e, "Queue pass aborted");
            metrics::counter!("api.trigger_errors").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "queue_pass_failed".to_string(),
                    message: e.to_string(),
                }),
            )
        })?;

    let sequence_report = state
        .sequences
        .advance_due_enrollments(now, state.engine.enrollment_batch_size)
        .map_err(|e| {
            error!(error = %e, "Sequence pass aborted");
            metrics::counter!("api.trigger_errors").increment(1);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "sequence_pass_failed".to_string(),
                    message: e.to_string(),
                }),
            )
        })?;

    metrics::counter!("api.triggers").increment(1);
    Ok(Json(TriggerResponse {
        reclaimed,
        queue: queue_report,
        sequences: sequence_report,
    }))
}

/// POST /v1/trigger/cron — periodic scheduler entry point.
pub async fn trigger_cron(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_trigger(state, headers).await
}

/// POST /v1/trigger/manual — manual invocation, identical logic.
pub async fn trigger_manual(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<TriggerResponse>, (StatusCode, Json<ErrorResponse>)> {
    run_trigger(state, headers).await
}

/// GET /v1/queue/stats — per-status row counts.
pub async fn queue_stats(State(state): State<AppState>) -> Json<QueueStats> {
    Json(state.queue.stats())
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
}

/// GET /health — health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

/// GET /ready — readiness probe.
pub async fn readiness() -> StatusCode {
    StatusCode::OK
}

/// GET /live — liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn auth_config() -> AuthConfig {
        AuthConfig {
            cron_secret: Some("cron-s3cret".to_string()),
            trigger_secret: Some("trigger-s3cret".to_string()),
            admin_tokens: vec!["admin-token-1".to_string()],
        }
    }

    fn headers(name: &'static str, value: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(name, HeaderValue::from_str(value).unwrap());
        map
    }

    #[test]
    fn test_cron_secret_accepted() {
        let auth = auth_config();
        assert!(authorize(&headers(CRON_SECRET_HEADER, "cron-s3cret"), &auth).is_ok());
    }

    #[test]
    fn test_trigger_secret_accepted() {
        let auth = auth_config();
        assert!(authorize(&headers(TRIGGER_SECRET_HEADER, "trigger-s3cret"), &auth).is_ok());
    }

    #[test]
    fn test_admin_bearer_accepted() {
        let auth = auth_config();
        assert!(authorize(&headers("authorization", "Bearer admin-token-1"), &auth).is_ok());
    }

    #[test]
    fn test_wrong_or_missing_credentials_rejected() {
        let auth = auth_config();
        assert!(authorize(&HeaderMap::new(), &auth).is_err());
        assert!(authorize(&headers(CRON_SECRET_HEADER, "nope"), &auth).is_err());
        assert!(authorize(&headers("authorization", "Bearer nope"), &auth).is_err());
        assert!(authorize(&headers("authorization", "admin-token-1"), &auth).is_err());
    }

    #[test]
    fn test_unconfigured_secrets_never_match_empty() {
        // A deployment with no secrets configured must not accept anything.
        let auth = AuthConfig::default();
        assert!(authorize(&HeaderMap::new(), &auth).is_err());
        assert!(authorize(&headers(CRON_SECRET_HEADER, ""), &auth).is_err());
    }
}
