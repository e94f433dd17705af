//! Withdraws a supplier's proposal: deletes the quote and its priced lines, then puts the
//! originating invite back in `opened` so the supplier can submit again. Scoped by `quote_id`
//! rather than by invite token since this is a buyer-side action, not a supplier-portal one.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, Set, TransactionError,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::critical_actions::ConfirmationInput;
use crate::db::DbPool;
use crate::entities::quote::{self, QuoteStatus};
use crate::entities::rfq;
use crate::entities::rfq_supplier_invite::{self, InviteStatus};
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};
use crate::repository::TenantScope;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DeleteSupplierProposalCommand {
    pub tenant_id: String,
    pub quote_id: i64,
    #[serde(skip)]
    pub confirmation: ConfirmationInput,
}

#[derive(Debug, Serialize)]
pub struct DeleteSupplierProposalResult {
    pub quote_id: i64,
    pub rfq_id: i64,
    pub invite_id: Option<i64>,
}

#[async_trait]
impl Command for DeleteSupplierProposalCommand {
    type Result = DeleteSupplierProposalResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;
        super::ensure_confirmed(
            "delete_supplier_proposal",
            &self.tenant_id,
            EntityKind::Quote,
            self.quote_id,
            &self.confirmation,
        )?;
        let scope = TenantScope::new(self.tenant_id.clone())?;

        let quote_id = self.quote_id;

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (quote::Model, Option<i64>), AppError>(move |txn| {
                Box::pin(async move {
                    let quote = scope.load::<quote::Entity, _>(txn, quote_id).await?;

                    let rfq = rfq::Entity::find_by_id(quote.rfq_id)
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;

                    super::ensure_action_allowed(
                        "cotacao",
                        rfq.status.as_str(),
                        "delete_supplier_proposal",
                    )?;

                    for item in quote.find_related(crate::entities::quote_item::Entity).all(txn).await? {
                        item.delete(txn).await?;
                    }

                    let invite = rfq_supplier_invite::Entity::find()
                        .filter(rfq_supplier_invite::Column::TenantId.eq(scope.tenant_id().to_string()))
                        .filter(rfq_supplier_invite::Column::RfqId.eq(quote.rfq_id))
                        .filter(rfq_supplier_invite::Column::SupplierId.eq(quote.supplier_id))
                        .one(txn)
                        .await?;

                    let invite_id = if let Some(invite) = invite {
                        let invite_id = invite.id;
                        if matches!(invite.status, InviteStatus::Submitted) {
                            let mut active: rfq_supplier_invite::ActiveModel = invite.into();
                            active.status = Set(InviteStatus::Opened);
                            active.submitted_at = Set(None);
                            active.updated_at = Set(Utc::now());
                            active.update(txn).await?;
                        }
                        Some(invite_id)
                    } else {
                        None
                    };

                    super::record_status_event(
                        txn,
                        scope.tenant_id(),
                        EntityKind::Quote,
                        quote.id,
                        Some(QuoteStatus::Submitted.as_str().to_string()),
                        "withdrawn",
                        "supplier_quote_withdrawn",
                    )
                    .await?;

                    let deleted = quote.clone();
                    quote.delete(txn).await?;

                    Ok((deleted, invite_id))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (quote, invite_id) = result;

        info!(quote_id = quote.id, rfq_id = quote.rfq_id, "supplier proposal deleted");

        let _ = event_sender
            .send(Event::SupplierQuoteWithdrawn {
                tenant_id: quote.tenant_id.clone(),
                invite_id: invite_id.unwrap_or_default(),
                quote_id: quote.id,
                rfq_id: quote.rfq_id,
            })
            .await;

        Ok(DeleteSupplierProposalResult {
            quote_id: quote.id,
            rfq_id: quote.rfq_id,
            invite_id,
        })
    }
}
