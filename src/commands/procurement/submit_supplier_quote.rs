//! The public supplier portal submission: addressed by invite token rather than tenant + id,
//! since the supplier has no session of their own. The tenant and RFQ are derived from the
//! invite row itself, never taken from caller input.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::db::DbPool;
use crate::entities::quote::{self, QuoteStatus};
use crate::entities::quote_item;
use crate::entities::rfq::{self, RfqStatus};
use crate::entities::rfq_item_supplier;
use crate::entities::rfq_supplier_invite::{self, InviteStatus};
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitQuoteItemInput {
    pub rfq_item_id: i64,
    pub unit_price: Decimal,
    pub lead_time_days: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SubmitSupplierQuoteCommand {
    #[validate(length(min = 1))]
    pub invite_token: String,
    #[validate(length(min = 3))]
    pub currency: String,
    #[validate(length(min = 1, message = "at least one priced item is required"))]
    pub items: Vec<SubmitQuoteItemInput>,
}

#[derive(Debug, Serialize)]
pub struct SubmitSupplierQuoteResult {
    pub quote_id: i64,
    pub rfq_id: i64,
    pub status: QuoteStatus,
}

#[async_trait]
impl Command for SubmitSupplierQuoteCommand {
    type Result = SubmitSupplierQuoteResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;

        tracing::debug!(invite_token = %redact(&self.invite_token), "submitting supplier quote");

        let token = self.invite_token.clone();
        let currency = self.currency.clone();
        let items = self.items.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (quote::Model, i64), AppError>(move |txn| {
                Box::pin(async move {
                    let invite = rfq_supplier_invite::Entity::find()
                        .filter(rfq_supplier_invite::Column::Token.eq(token.clone()))
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;

                    let now = Utc::now();
                    if invite.is_expired(now) {
                        return Err(AppError::validation("invite_expired"));
                    }

                    super::ensure_action_allowed("fornecedor", invite.status.as_str(), "submit_quote")?;

                    let invited_item_ids: HashSet<i64> = rfq_item_supplier::Entity::find()
                        .filter(rfq_item_supplier::Column::TenantId.eq(invite.tenant_id.clone()))
                        .filter(rfq_item_supplier::Column::SupplierId.eq(invite.supplier_id))
                        .all(txn)
                        .await?
                        .into_iter()
                        .map(|binding| binding.rfq_item_id)
                        .collect();

                    let uninvited_item_ids: Vec<i64> = items
                        .iter()
                        .map(|item| item.rfq_item_id)
                        .filter(|rfq_item_id| !invited_item_ids.contains(rfq_item_id))
                        .collect();
                    if !uninvited_item_ids.is_empty() {
                        return Err(AppError::validation_with_payload(
                            "supplier_not_invited_for_items",
                            json!({ "rfq_item_ids": uninvited_item_ids }),
                        ));
                    }

                    let rfq = rfq::Entity::find_by_id(invite.rfq_id)
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;

                    let quote = quote::ActiveModel {
                        tenant_id: Set(invite.tenant_id.clone()),
                        rfq_id: Set(invite.rfq_id),
                        supplier_id: Set(invite.supplier_id),
                        currency: Set(currency),
                        status: Set(QuoteStatus::Submitted),
                        created_at: Set(now),
                        updated_at: Set(now),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    for item in &items {
                        quote_item::ActiveModel {
                            tenant_id: Set(invite.tenant_id.clone()),
                            quote_id: Set(quote.id),
                            rfq_item_id: Set(item.rfq_item_id),
                            unit_price: Set(item.unit_price),
                            lead_time_days: Set(item.lead_time_days),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    let invite_id = invite.id;
                    let mut active: rfq_supplier_invite::ActiveModel = invite.into();
                    active.status = Set(InviteStatus::Submitted);
                    active.submitted_at = Set(Some(now));
                    active.updated_at = Set(now);
                    let invite = active.update(txn).await?;

                    let previous_rfq_status = rfq.status;
                    let new_rfq_status = if matches!(rfq.status, RfqStatus::Open) {
                        RfqStatus::CollectingQuotes
                    } else {
                        rfq.status
                    };
                    if new_rfq_status != previous_rfq_status {
                        let mut active_rfq: rfq::ActiveModel = rfq.into();
                        active_rfq.status = Set(new_rfq_status);
                        active_rfq.updated_at = Set(now);
                        active_rfq.update(txn).await?;
                    }

                    super::record_status_event(
                        txn,
                        &invite.tenant_id,
                        EntityKind::Rfq,
                        invite.rfq_id,
                        Some(previous_rfq_status.as_str().to_string()),
                        new_rfq_status.as_str(),
                        "supplier_quote_received",
                    )
                    .await?;

                    Ok((quote, invite_id))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (quote, invite_id) = result;

        info!(quote_id = quote.id, rfq_id = quote.rfq_id, "supplier quote submitted");

        let _ = event_sender
            .send(Event::SupplierQuoteSubmitted {
                tenant_id: quote.tenant_id.clone(),
                invite_id,
                quote_id: quote.id,
                rfq_id: quote.rfq_id,
            })
            .await;

        Ok(SubmitSupplierQuoteResult {
            quote_id: quote.id,
            rfq_id: quote.rfq_id,
            status: quote.status,
        })
    }
}

fn redact(token: &str) -> String {
    if token.len() <= 8 {
        "***".to_string()
    } else {
        format!("{}***", &token[..8])
    }
}
