use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use prometheus::IntCounter;
use sea_orm::{ActiveModelTrait, Set, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::db::DbPool;
use crate::entities::purchase_request::{self, Priority, PurchaseRequestStatus};
use crate::entities::purchase_request_item;
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};

use super::record_status_event;

lazy_static! {
    static ref PURCHASE_REQUESTS_CREATED: IntCounter = IntCounter::new(
        "purchase_requests_created_total",
        "Total number of purchase requests created"
    )
    .expect("metric can be created");
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseRequestItem {
    #[validate(length(min = 1, message = "description is required"))]
    pub description: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(length(min = 1))]
    pub uom: String,
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseRequestCommand {
    pub tenant_id: String,
    #[validate(length(min = 1))]
    pub number: String,
    pub priority: Priority,
    pub requested_by: Option<String>,
    pub department: Option<String>,
    pub needed_at: Option<DateTime<Utc>>,
    #[validate]
    pub items: Vec<CreatePurchaseRequestItem>,
}

#[derive(Debug, Serialize)]
pub struct CreatePurchaseRequestResult {
    pub id: i64,
    pub status: PurchaseRequestStatus,
    pub items_created: usize,
}

#[async_trait]
impl Command for CreatePurchaseRequestCommand {
    type Result = CreatePurchaseRequestResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;

        if self.items.is_empty() {
            return Err(AppError::validation("items_required"));
        }

        let tenant_id = self.tenant_id.clone();
        let number = self.number.clone();
        let priority = self.priority;
        let requested_by = self.requested_by.clone();
        let department = self.department.clone();
        let needed_at = self.needed_at;
        let items = self.items.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (purchase_request::Model, usize), AppError>(move |txn| {
                Box::pin(async move {
                    let request = purchase_request::ActiveModel {
                        tenant_id: Set(tenant_id.clone()),
                        number: Set(number),
                        status: Set(PurchaseRequestStatus::PendingRfq),
                        priority: Set(priority),
                        requested_by: Set(requested_by),
                        department: Set(department),
                        needed_at: Set(needed_at),
                        external_id: Set(None),
                        erp_num_cot: Set(None),
                        erp_num_pct: Set(None),
                        erp_sent_at: Set(None),
                        created_at: Set(Utc::now()),
                        updated_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    for (idx, item) in items.iter().enumerate() {
                        purchase_request_item::ActiveModel {
                            tenant_id: Set(tenant_id.clone()),
                            purchase_request_id: Set(request.id),
                            line_no: Set((idx + 1) as i32),
                            description: Set(item.description.clone()),
                            quantity: Set(item.quantity),
                            uom: Set(item.uom.clone()),
                            category: Set(item.category.clone()),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::PurchaseRequest,
                        request.id,
                        None,
                        "pending_rfq",
                        "purchase_request_created",
                    )
                    .await?;

                    let count = items.len();
                    Ok((request, count))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (request, items_created) = result;

        info!(purchase_request_id = request.id, items_created, "purchase request created");
        PURCHASE_REQUESTS_CREATED.inc();

        let _ = event_sender
            .send(Event::PurchaseRequestStatusChanged {
                tenant_id: request.tenant_id.clone(),
                purchase_request_id: request.id,
                from_status: None,
                to_status: "pending_rfq".to_string(),
                reason: "purchase_request_created".to_string(),
            })
            .await;

        Ok(CreatePurchaseRequestResult {
            id: request.id,
            status: request.status,
            items_created,
        })
    }
}
