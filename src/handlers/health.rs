use axum::{extract::State, response::IntoResponse, routing::get, Json};
use serde_json::json;

use crate::db;

use super::AppState;

/// Liveness/readiness combined: pings the database, reports the environment and a coarse
/// snapshot of the worker-side circuit breaker. Must never require auth (§6.1) so an
/// orchestrator can probe it unconditionally.
async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let db_status = match db::check_connection(state.db.as_ref()).await {
        Ok(_) => "up",
        Err(_) => "down",
    };

    Json(json!({
        "status": if db_status == "up" { "up" } else { "degraded" },
        "db": db_status,
        "env": state.config.environment,
        "metrics": "/metrics",
        "worker": {
            "erp_outbox_interval_seconds": state.config.erp_outbox.worker_interval_seconds,
            "sync_scheduler_enabled": state.config.sync_scheduler.enabled,
        },
    }))
}

/// Prometheus text exposition for the counters registered in `prometheus::default_registry()`.
async fn metrics(State(_state): State<AppState>) -> impl IntoResponse {
    use prometheus::{Encoder, TextEncoder};

    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    if encoder.encode(&metric_families, &mut buffer).is_err() {
        buffer.clear();
    }

    let body = String::from_utf8(buffer).unwrap_or_default();
    ([(axum::http::header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}
