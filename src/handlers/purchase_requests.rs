use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    routing::{delete, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::commands::procurement::cancel_purchase_request::CancelPurchaseRequestCommand;
use crate::commands::procurement::create_purchase_request::{
    CreatePurchaseRequestCommand, CreatePurchaseRequestItem,
};
use crate::commands::Command;
use crate::entities::purchase_request::Priority;
use crate::errors::AppError;

use super::{confirmation_from_query, merge_header_confirmation, AppState, TenantId};

#[derive(Debug, Deserialize)]
pub struct CreatePurchaseRequestBody {
    pub number: String,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub requested_by: Option<String>,
    pub department: Option<String>,
    pub needed_at: Option<DateTime<Utc>>,
    pub items: Vec<CreateItemBody>,
}

#[derive(Debug, Deserialize)]
pub struct CreateItemBody {
    pub description: String,
    pub quantity: i32,
    pub uom: String,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatePurchaseRequestResponse {
    pub id: i64,
    pub status: String,
    pub priority: String,
    pub items_created: usize,
}

async fn create_purchase_request(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(body): Json<CreatePurchaseRequestBody>,
) -> Result<(axum::http::StatusCode, Json<CreatePurchaseRequestResponse>), AppError> {
    if body.items.is_empty() {
        return Err(AppError::validation("items_required"));
    }

    let command = CreatePurchaseRequestCommand {
        tenant_id,
        number: body.number,
        priority: body.priority.unwrap_or(Priority::Medium),
        requested_by: body.requested_by,
        department: body.department,
        needed_at: body.needed_at,
        items: body
            .items
            .into_iter()
            .map(|i| CreatePurchaseRequestItem {
                description: i.description,
                quantity: i.quantity,
                uom: i.uom,
                category: i.category,
            })
            .collect(),
    };

    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok((
        axum::http::StatusCode::CREATED,
        Json(CreatePurchaseRequestResponse {
            id: result.id,
            status: result.status.as_str().to_string(),
            priority: format!("{:?}", command.priority).to_lowercase(),
            items_created: result.items_created,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CancelPurchaseRequestBody {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub confirm: Option<serde_json::Value>,
    #[serde(default)]
    pub confirm_token: Option<String>,
}

async fn cancel_purchase_request(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<CancelPurchaseRequestBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or(CancelPurchaseRequestBody {
        reason: None,
        confirm: None,
        confirm_token: None,
    });

    let mut confirmation = confirmation_from_query(&query);
    confirmation.payload_confirm = body.confirm.clone();
    confirmation.payload_confirm_token = body.confirm_token.clone();
    merge_header_confirmation(&mut confirmation, &headers);

    let command = CancelPurchaseRequestCommand {
        tenant_id,
        purchase_request_id: id,
        reason: body.reason.unwrap_or_else(|| "cancelled_by_requester".to_string()),
        confirmation,
    };

    command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok(Json(json!({ "id": id, "status": "cancelled" })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/procurement/solicitacoes", post(create_purchase_request))
        .route("/api/procurement/solicitacoes/:id", delete(cancel_purchase_request))
}
