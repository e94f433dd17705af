//! Converts a subset of a purchase request's pending items into a draft RFQ. The request stays
//! `pending_rfq` until the RFQ is actually sent to suppliers; creating an RFQ does not by itself
//! move the request forward.

use std::sync::Arc;

use async_trait::async_trait;
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::db::DbPool;
use crate::entities::purchase_request::PurchaseRequestStatus;
use crate::entities::rfq::{self, RfqStatus};
use crate::entities::rfq_item;
use crate::entities::status_event::EntityKind;
use crate::entities::{purchase_request, purchase_request_item};
use crate::errors::AppError;
use crate::events::{Event, EventSender};
use crate::repository::TenantScope;

lazy_static! {
    static ref RFQS_CREATED: IntCounter =
        IntCounter::new("rfqs_created_total", "Total number of RFQs created")
            .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateRfqCommand {
    pub tenant_id: String,
    pub purchase_request_id: i64,
    #[validate(length(min = 1))]
    pub title: String,
    #[validate(length(min = 1, message = "at least one item must be selected"))]
    pub purchase_request_item_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct CreateRfqResult {
    pub id: i64,
    pub status: RfqStatus,
    pub items_created: usize,
}

#[async_trait]
impl Command for CreateRfqCommand {
    type Result = CreateRfqResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;
        let scope = TenantScope::new(self.tenant_id.clone())?;

        let tenant_id = self.tenant_id.clone();
        let title = self.title.clone();
        let purchase_request_id = self.purchase_request_id;
        let item_ids = self.purchase_request_item_ids.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (rfq::Model, usize), AppError>(move |txn| {
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
                        "open_rfq",
                    )?;

                    let mut source_items = Vec::with_capacity(item_ids.len());
                    for item_id in &item_ids {
                        let item = purchase_request_item::Entity::find_by_id(*item_id)
                            .one(txn)
                            .await?
                            .ok_or_else(AppError::not_found)?;
                        if item.tenant_id != tenant_id || item.purchase_request_id != purchase_request_id {
                            return Err(AppError::validation(
                                "item does not belong to the given purchase request",
                            ));
                        }
                        source_items.push(item);
                    }

                    let rfq = rfq::ActiveModel {
                        tenant_id: Set(tenant_id.clone()),
                        title: Set(title),
                        status: Set(RfqStatus::Open),
                        cancel_reason: Set(None),
                        created_at: Set(chrono::Utc::now()),
                        updated_at: Set(chrono::Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    for source_item in &source_items {
                        rfq_item::ActiveModel {
                            tenant_id: Set(tenant_id.clone()),
                            rfq_id: Set(rfq.id),
                            purchase_request_item_id: Set(source_item.id),
                            description: Set(source_item.description.clone()),
                            quantity: Set(source_item.quantity),
                            uom: Set(source_item.uom.clone()),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::Rfq,
                        rfq.id,
                        None,
                        RfqStatus::Open.as_str(),
                        "rfq_created",
                    )
                    .await?;

                    let previous_request_status = request.status;
                    if matches!(previous_request_status, PurchaseRequestStatus::PendingRfq) {
                        let mut active_request: purchase_request::ActiveModel = request.into();
                        active_request.status = Set(PurchaseRequestStatus::InRfq);
                        active_request.updated_at = Set(chrono::Utc::now());
                        let updated_request = active_request.update(txn).await?;

                        super::record_status_event(
                            txn,
                            &tenant_id,
                            EntityKind::PurchaseRequest,
                            updated_request.id,
                            Some(previous_request_status.as_str().to_string()),
                            PurchaseRequestStatus::InRfq.as_str(),
                            "in_rfq",
                        )
                        .await?;
                    }

                    let count = source_items.len();
                    Ok((rfq, count))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (rfq, items_created) = result;

        info!(rfq_id = rfq.id, items_created, "rfq created");
        RFQS_CREATED.inc();

        let _ = event_sender
            .send(Event::RfqStatusChanged {
                tenant_id: rfq.tenant_id.clone(),
                rfq_id: rfq.id,
                from_status: None,
                to_status: "open".to_string(),
                reason: "rfq_created".to_string(),
            })
            .await;

        Ok(CreateRfqResult {
            id: rfq.id,
            status: rfq.status,
            items_created,
        })
    }
}
