//! Operator-facing diagnostic for canonical-envelope drift (§4.7 step b): when the ERP gateway's
//! contract expectations and the core's `CanonicalPurchaseOrder` schema disagree, rows get
//! dead-lettered with `error_summary = erp_contract_invalid`. This endpoint surfaces how often
//! and which ones, without requiring a direct database session.

use axum::{extract::State, routing::get, Json, Router};
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, QuerySelect};

use crate::entities::sync_run;
use crate::errors::AppError;

use super::AppState;

async fn contract_health(State(state): State<AppState>) -> Result<Json<serde_json::Value>, AppError> {
    let db = state.db.as_ref();

    let total = sync_run::Entity::find()
        .filter(sync_run::Column::ErrorSummary.eq("erp_contract_invalid"))
        .count(db)
        .await?;

    let recent = sync_run::Entity::find()
        .filter(sync_run::Column::ErrorSummary.eq("erp_contract_invalid"))
        .order_by_desc(sync_run::Column::Id)
        .limit(20)
        .all(db)
        .await?;

    let recent_failures: Vec<_> = recent
        .into_iter()
        .map(|r| {
            serde_json::json!({
                "sync_run_id": r.id,
                "tenant_id": r.tenant_id,
                "finished_at": r.finished_at,
                "error_details": r.error_details,
            })
        })
        .collect();

    Ok(Json(serde_json::json!({
        "erp_contract_invalid_total": total,
        "recent_dead_lettered": recent_failures,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/internal/erp/contract-health", get(contract_health))
}
