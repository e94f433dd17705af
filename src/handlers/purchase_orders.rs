use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde::Deserialize;

use crate::commands::procurement::create_purchase_order_from_award::CreatePurchaseOrderFromAwardCommand;
use crate::commands::procurement::enqueue_erp_push::EnqueueErpPushCommand;
use crate::commands::Command;
use crate::errors::AppError;

use super::{confirmation_from_query, merge_header_confirmation, AppState, TenantId};

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseOrderBody {
    pub quote_item_ids: Vec<i64>,
    pub currency: String,
    #[serde(default)]
    pub confirm: Option<serde_json::Value>,
    #[serde(default)]
    pub confirm_token: Option<String>,
}

async fn create_purchase_order_from_award(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(award_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<CreatePurchaseOrderBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut confirmation = confirmation_from_query(&query);
    confirmation.payload_confirm = body.confirm.clone();
    confirmation.payload_confirm_token = body.confirm_token.clone();
    merge_header_confirmation(&mut confirmation, &headers);

    let command = CreatePurchaseOrderFromAwardCommand {
        tenant_id,
        award_id,
        quote_item_ids: body.quote_item_ids,
        currency: body.currency,
        confirmation,
    };
    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "purchase_order_id": result.purchase_order_id,
            "number": result.number,
            "status": result.status.as_str(),
            "total_amount": result.total_amount,
        })),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct PushToErpBody {
    #[serde(default)]
    pub confirm: Option<serde_json::Value>,
    #[serde(default)]
    pub confirm_token: Option<String>,
}

async fn push_to_erp(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(purchase_order_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<PushToErpBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let mut confirmation = confirmation_from_query(&query);
    confirmation.payload_confirm = body.confirm.clone();
    confirmation.payload_confirm_token = body.confirm_token.clone();
    merge_header_confirmation(&mut confirmation, &headers);

    let command = EnqueueErpPushCommand {
        tenant_id,
        purchase_order_id,
        confirmation,
    };
    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok(Json(serde_json::json!({
        "purchase_order_id": result.purchase_order_id,
        "status": result.status.as_str(),
        "external_id": result.external_id,
        "sync_run_id": result.sync_run_id,
        "queued": true,
        "already_queued": result.already_queued,
        "message": result.message,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route(
            "/api/procurement/awards/:id/purchase-orders",
            post(create_purchase_order_from_award),
        )
        .route(
            "/api/procurement/purchase-orders/:id/push-to-erp",
            post(push_to_erp),
        )
}
