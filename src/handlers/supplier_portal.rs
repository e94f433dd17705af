//! The public supplier-facing routes (§6.1): addressed by invite token, not tenant + id, since a
//! supplier has no account in this system. `GET` lazily flips `pending` invites to `opened` the
//! first time a supplier follows the link; `POST` hands off to the submit-quote command.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::Deserialize;

use crate::commands::procurement::submit_supplier_quote::{
    SubmitQuoteItemInput, SubmitSupplierQuoteCommand,
};
use crate::commands::procurement::record_status_event;
use crate::commands::Command;
use crate::entities::rfq_supplier_invite::{self, InviteStatus};
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::Event;

use super::AppState;

async fn view_invite(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<serde_json::Value>, AppError> {
    let invite = rfq_supplier_invite::Entity::find()
        .filter(rfq_supplier_invite::Column::Token.eq(token))
        .one(state.db.as_ref())
        .await?
        .ok_or_else(AppError::not_found)?;

    let now = Utc::now();
    if invite.is_expired(now) {
        if !matches!(invite.status, InviteStatus::Expired) {
            let previous_status = invite.status;
            let rfq_id = invite.rfq_id;
            let tenant_id = invite.tenant_id.clone();
            let mut active: rfq_supplier_invite::ActiveModel = invite.into();
            active.status = Set(InviteStatus::Expired);
            active.updated_at = Set(now);
            active.update(state.db.as_ref()).await?;

            record_status_event(
                state.db.as_ref(),
                &tenant_id,
                EntityKind::Rfq,
                rfq_id,
                Some(previous_status.as_str().to_string()),
                InviteStatus::Expired.as_str(),
                "invite_expired",
            )
            .await?;
        }
        return Err(AppError::validation("invite_expired"));
    }

    let invite = if matches!(invite.status, InviteStatus::Pending) {
        let rfq_id = invite.rfq_id;
        let tenant_id = invite.tenant_id.clone();
        let invite_id = invite.id;
        let mut active: rfq_supplier_invite::ActiveModel = invite.into();
        active.status = Set(InviteStatus::Opened);
        active.opened_at = Set(Some(now));
        active.updated_at = Set(now);
        let invite = active.update(state.db.as_ref()).await?;

        let _ = state
            .event_sender
            .send(Event::SupplierInviteOpened {
                tenant_id,
                invite_id,
                rfq_id,
            })
            .await;
        invite
    } else {
        invite
    };

    Ok(Json(serde_json::json!({
        "rfq_id": invite.rfq_id,
        "status": invite.status.as_str(),
        "expires_at": invite.expires_at,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuoteBody {
    pub currency: String,
    pub items: Vec<SubmitQuoteItemBody>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuoteItemBody {
    pub rfq_item_id: i64,
    pub unit_price: rust_decimal::Decimal,
    pub lead_time_days: Option<i32>,
}

async fn submit_quote(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Json(body): Json<SubmitQuoteBody>,
) -> Result<Json<serde_json::Value>, AppError> {
    let command = SubmitSupplierQuoteCommand {
        invite_token: token,
        currency: body.currency,
        items: body
            .items
            .into_iter()
            .map(|i| SubmitQuoteItemInput {
                rfq_item_id: i.rfq_item_id,
                unit_price: i.unit_price,
                lead_time_days: i.lead_time_days,
            })
            .collect(),
    };

    let result = command.execute(state.db.clone(), state.event_sender.clone()).await?;
    Ok(Json(serde_json::json!({
        "quote_id": result.quote_id,
        "rfq_id": result.rfq_id,
        "status": result.status.as_str(),
    })))
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/fornecedor/convite/:token", get(view_invite))
        .route("/api/fornecedor/convite/:token/propostas", post(submit_quote))
}
