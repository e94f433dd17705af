//! Cancels a purchase request. Refuses once the request is ERP-managed (an `erp_*` field is
//! populated) since the ERP, not this system, owns the record at that point.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::critical_actions::ConfirmationInput;
use crate::db::DbPool;
use crate::entities::purchase_request::{self, PurchaseRequestStatus};
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};
use crate::repository::TenantScope;

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CancelPurchaseRequestCommand {
    pub tenant_id: String,
    pub purchase_request_id: i64,
    #[validate(length(min = 1, message = "a cancellation reason is required"))]
    pub reason: String,
    #[serde(skip)]
    pub confirmation: ConfirmationInput,
}

#[derive(Debug, Serialize)]
pub struct CancelPurchaseRequestResult {
    pub id: i64,
    pub status: PurchaseRequestStatus,
}

#[async_trait]
impl Command for CancelPurchaseRequestCommand {
    type Result = CancelPurchaseRequestResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;
        super::ensure_confirmed(
            "cancel_request",
            &self.tenant_id,
            EntityKind::PurchaseRequest,
            self.purchase_request_id,
            &self.confirmation,
        )?;
        let scope = TenantScope::new(self.tenant_id.clone())?;

        let tenant_id = self.tenant_id.clone();
        let purchase_request_id = self.purchase_request_id;
        let reason = self.reason.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, purchase_request::Model, AppError>(move |txn| {
                Box::pin(async move {
                    let request = scope
                        .load::<purchase_request::Entity, _>(txn, purchase_request_id)
                        .await?;
                    if request.is_erp_managed() {
                        return Err(AppError::erp_managed_readonly("purchase_request"));
                    }

                    super::ensure_action_allowed(
                        "solicitacao",
                        request.status.as_str(),
                        "cancel_request",
                    )?;

                    let previous_status = request.status;
                    let mut active: purchase_request::ActiveModel = request.into();
                    active.status = Set(PurchaseRequestStatus::Cancelled);
                    active.updated_at = Set(Utc::now());
                    let request = active.update(txn).await?;

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::PurchaseRequest,
                        request.id,
                        Some(previous_status.as_str().to_string()),
                        PurchaseRequestStatus::Cancelled.as_str(),
                        reason,
                    )
                    .await?;

                    Ok(request)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        info!(purchase_request_id = result.id, "purchase request cancelled");

        let _ = event_sender
            .send(Event::PurchaseRequestStatusChanged {
                tenant_id: result.tenant_id.clone(),
                purchase_request_id: result.id,
                from_status: None,
                to_status: "cancelled".to_string(),
                reason: "purchase_request_cancelled".to_string(),
            })
            .await;

        Ok(CancelPurchaseRequestResult {
            id: result.id,
            status: result.status,
        })
    }
}
