//! Admin-only integration endpoints. There is no auth layer in this service (ambient only, per
//! the non-goals); these routes are expected to sit behind a gateway or VPN boundary in
//! deployment, not to authenticate callers themselves.

use std::collections::HashMap;

use axum::{
    extract::{Query, State},
    routing::post,
    Json, Router,
};

use crate::errors::AppError;

use super::AppState;

async fn trigger_sync(
    State(state): State<AppState>,
    super::TenantId(tenant_id): super::TenantId,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let scope = query
        .get("scope")
        .cloned()
        .ok_or_else(|| AppError::validation("scope_required"))?;

    let records_in = state.sync_scheduler.pull_scope_now(&tenant_id, &scope).await?;
    Ok(Json(serde_json::json!({
        "scope": scope,
        "records_in": records_in,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/api/procurement/integrations/sync", post(trigger_sync))
}
