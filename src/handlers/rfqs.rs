use std::collections::HashMap;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::commands::procurement::award_rfq::AwardRfqCommand;
use crate::commands::procurement::create_rfq::CreateRfqCommand;
use crate::commands::procurement::delete_supplier_proposal::DeleteSupplierProposalCommand;
use crate::commands::procurement::invite_suppliers::InviteSuppliersCommand;
use crate::commands::Command;
use crate::errors::AppError;

use super::{confirmation_from_query, merge_header_confirmation, AppState, TenantId};

#[derive(Debug, Deserialize)]
pub struct CreateRfqBody {
    pub purchase_request_id: i64,
    pub title: String,
    pub purchase_request_item_ids: Vec<i64>,
}

async fn create_rfq(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Json(body): Json<CreateRfqBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let command = CreateRfqCommand {
        tenant_id,
        purchase_request_id: body.purchase_request_id,
        title: body.title,
        purchase_request_item_ids: body.purchase_request_item_ids,
    };
    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "id": result.id,
            "status": result.status.as_str(),
            "items_created": result.items_created,
        })),
    ))
}

#[derive(Debug, Deserialize)]
pub struct InviteSuppliersBody {
    pub supplier_ids: Vec<i64>,
    pub rfq_item_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
struct InviteSuppliersResponse {
    rfq_id: i64,
    status: String,
    invites: Vec<InviteLink>,
}

#[derive(Debug, Serialize)]
struct InviteLink {
    supplier_id: i64,
    invite_id: i64,
    token: String,
    url: String,
}

async fn invite_suppliers(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(rfq_id): Path<i64>,
    Json(body): Json<InviteSuppliersBody>,
) -> Result<(StatusCode, Json<InviteSuppliersResponse>), AppError> {
    let command = InviteSuppliersCommand {
        tenant_id,
        rfq_id,
        supplier_ids: body.supplier_ids,
        rfq_item_ids: body.rfq_item_ids,
    };
    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;

    let base_url = state.config.public_app_url.trim_end_matches('/').to_string();
    let invites = result
        .invites
        .into_iter()
        .map(|inv| InviteLink {
            url: format!("{base_url}/fornecedor/convite/{}", inv.token),
            supplier_id: inv.supplier_id,
            invite_id: inv.invite_id,
            token: inv.token,
        })
        .collect();

    Ok((
        StatusCode::CREATED,
        Json(InviteSuppliersResponse {
            rfq_id: result.rfq_id,
            status: result.status.as_str().to_string(),
            invites,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct AwardRfqBody {
    pub supplier_name: String,
    pub reason: String,
    #[serde(default)]
    pub confirm: Option<serde_json::Value>,
    #[serde(default)]
    pub confirm_token: Option<String>,
}

async fn award_rfq(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(rfq_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    Json(body): Json<AwardRfqBody>,
) -> Result<(StatusCode, Json<serde_json::Value>), AppError> {
    let mut confirmation = confirmation_from_query(&query);
    confirmation.payload_confirm = body.confirm.clone();
    confirmation.payload_confirm_token = body.confirm_token.clone();
    merge_header_confirmation(&mut confirmation, &headers);

    let command = AwardRfqCommand {
        tenant_id,
        rfq_id,
        supplier_name: body.supplier_name,
        reason: body.reason,
        confirmation,
    };
    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "award_id": result.award_id,
            "rfq_id": result.rfq_id,
            "rfq_status": result.rfq_status.as_str(),
        })),
    ))
}

#[derive(Debug, Deserialize, Default)]
pub struct DeleteSupplierProposalBody {
    #[serde(default)]
    pub confirm: Option<serde_json::Value>,
    #[serde(default)]
    pub confirm_token: Option<String>,
}

async fn delete_supplier_proposal(
    State(state): State<AppState>,
    TenantId(tenant_id): TenantId,
    Path(quote_id): Path<i64>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
    body: Option<Json<DeleteSupplierProposalBody>>,
) -> Result<Json<serde_json::Value>, AppError> {
    let body = body.map(|Json(b)| b).unwrap_or_default();

    let mut confirmation = confirmation_from_query(&query);
    confirmation.payload_confirm = body.confirm.clone();
    confirmation.payload_confirm_token = body.confirm_token.clone();
    merge_header_confirmation(&mut confirmation, &headers);

    let command = DeleteSupplierProposalCommand {
        tenant_id,
        quote_id,
        confirmation,
    };
    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok(Json(serde_json::json!({
        "quote_id": result.quote_id,
        "rfq_id": result.rfq_id,
        "invite_id": result.invite_id,
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/procurement/rfqs", post(create_rfq))
        .route("/api/procurement/cotacoes/:rfq_id/convites", post(invite_suppliers))
        .route("/api/procurement/rfqs/:id/award", post(award_rfq))
        .route(
            "/api/procurement/propostas/:quote_id",
            delete(delete_supplier_proposal),
        )
}
