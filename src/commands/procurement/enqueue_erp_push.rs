//! Queues a purchase order for delivery to the ERP. The actual HTTP call happens later, off the
//! request path, in the outbox worker — this command only freezes the canonical snapshot and
//! creates (or reuses) the `sync_run` row that drives it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::critical_actions::ConfirmationInput;
use crate::db::DbPool;
use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::purchase_order_line;
use crate::entities::status_event::EntityKind;
use crate::entities::sync_run;
use crate::errors::messages::error_message;
use crate::errors::AppError;
use crate::events::outbox::{
    enqueue_purchase_order_push, CanonicalPurchaseOrder, OutboxPayload, SCOPE_PURCHASE_ORDER,
};
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EnqueueErpPushCommand {
    pub tenant_id: String,
    pub purchase_order_id: i64,
    #[serde(skip)]
    pub confirmation: ConfirmationInput,
}

#[derive(Debug, Serialize)]
pub struct EnqueueErpPushResult {
    pub purchase_order_id: i64,
    pub sync_run_id: Option<i64>,
    pub status: PurchaseOrderStatus,
    pub external_id: Option<String>,
    pub already_queued: bool,
    pub message: String,
}

#[async_trait]
impl Command for EnqueueErpPushCommand {
    type Result = EnqueueErpPushResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;
        super::ensure_confirmed(
            "push_to_erp",
            &self.tenant_id,
            EntityKind::PurchaseOrder,
            self.purchase_order_id,
            &self.confirmation,
        )?;

        let tenant_id = self.tenant_id.clone();
        let purchase_order_id = self.purchase_order_id;

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (purchase_order::Model, Option<i64>, bool, bool), AppError>(move |txn| {
                Box::pin(async move {
                    let po = purchase_order::Entity::find_by_id(purchase_order_id)
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;
                    if po.tenant_id != tenant_id {
                        return Err(AppError::not_found());
                    }

                    // Already delivered: report success without touching the flow policy or
                    // re-enqueuing anything (steps would otherwise reject this from `erp_accepted`).
                    if matches!(po.status, PurchaseOrderStatus::ErpAccepted) {
                        return Ok((po, None, true, true));
                    }

                    let existing_running = sync_run::Entity::find()
                        .filter(sync_run::Column::TenantId.eq(tenant_id.clone()))
                        .filter(sync_run::Column::Scope.eq(SCOPE_PURCHASE_ORDER))
                        .filter(sync_run::Column::Status.eq(sync_run::SyncRunStatus::Running))
                        .all(txn)
                        .await?
                        .into_iter()
                        .find_map(|row| {
                            serde_json::from_str::<OutboxPayload>(&row.payload_ref)
                                .ok()
                                .filter(|payload| payload.purchase_order_id == po.id)
                                .map(|_| row.id)
                        });

                    if let Some(sync_run_id) = existing_running {
                        return Ok((po, Some(sync_run_id), true, false));
                    }

                    super::ensure_action_allowed("ordem_compra", po.status.as_str(), "push_to_erp")?;

                    let lines = purchase_order_line::Entity::find()
                        .filter(purchase_order_line::Column::PurchaseOrderId.eq(po.id))
                        .all(txn)
                        .await?;

                    let canonical_po = CanonicalPurchaseOrder::new(&tenant_id, &po, &lines);
                    if !canonical_po.validate_schema() {
                        return Err(AppError::validation("purchase_order_not_ready_for_erp"));
                    }

                    let sync_run_id =
                        enqueue_purchase_order_push(txn, &tenant_id, po.id, canonical_po).await?;

                    let previous_status = po.status;
                    let po = if matches!(previous_status, PurchaseOrderStatus::Draft | PurchaseOrderStatus::Approved | PurchaseOrderStatus::ErpError)
                    {
                        let mut active: purchase_order::ActiveModel = po.into();
                        active.status = Set(PurchaseOrderStatus::SentToErp);
                        active.erp_last_error = Set(None);
                        active.updated_at = Set(Utc::now());
                        active.update(txn).await?
                    } else {
                        po
                    };

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::PurchaseOrder,
                        po.id,
                        Some(previous_status.as_str().to_string()),
                        po.status.as_str(),
                        "po_push_queued",
                    )
                    .await?;

                    Ok((po, Some(sync_run_id), false, false))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (po, sync_run_id, already_queued, already_accepted) = result;

        info!(
            purchase_order_id = po.id,
            ?sync_run_id,
            already_queued,
            already_accepted,
            "erp push enqueue handled"
        );

        if let (Some(sync_run_id), false) = (sync_run_id, already_queued) {
            let _ = event_sender
                .send(Event::PurchaseOrderPushQueued {
                    tenant_id: po.tenant_id.clone(),
                    purchase_order_id: po.id,
                    sync_run_id,
                })
                .await;
        }

        let message = if already_accepted {
            error_message("order_sent_to_erp", "Pedido ja aceito pelo ERP.")
        } else if already_queued {
            error_message("erp_send_queued", "Envio ao ERP ja enfileirado.")
        } else {
            error_message("erp_send_queued", "Envio ao ERP enfileirado com sucesso.")
        };

        Ok(EnqueueErpPushResult {
            purchase_order_id: po.id,
            sync_run_id,
            status: po.status,
            external_id: po.external_id.clone(),
            already_queued,
            message,
        })
    }
}
