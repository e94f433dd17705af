//! Issues a purchase order off an award. Line prices come from the award's RFQ quote items so
//! the PO cannot silently diverge from what was actually quoted.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionError, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::commands::Command;
use crate::critical_actions::ConfirmationInput;
use crate::db::DbPool;
use crate::entities::award::{self, AwardStatus};
use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::purchase_order_line;
use crate::entities::quote_item;
use crate::entities::rfq_item;
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};

fn generate_po_number() -> String {
    format!("PO-{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreatePurchaseOrderFromAwardCommand {
    pub tenant_id: String,
    pub award_id: i64,
    /// The winning supplier's quote: one line per RFQ item, in the order they'll appear on the PO.
    #[validate(length(min = 1, message = "at least one priced line is required"))]
    pub quote_item_ids: Vec<i64>,
    #[validate(length(min = 3))]
    pub currency: String,
    #[serde(skip)]
    pub confirmation: ConfirmationInput,
}

#[derive(Debug, Serialize)]
pub struct CreatePurchaseOrderFromAwardResult {
    pub purchase_order_id: i64,
    pub number: String,
    pub status: PurchaseOrderStatus,
    pub total_amount: Decimal,
}

#[async_trait]
impl Command for CreatePurchaseOrderFromAwardCommand {
    type Result = CreatePurchaseOrderFromAwardResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;
        super::ensure_confirmed(
            "create_purchase_order",
            &self.tenant_id,
            EntityKind::Award,
            self.award_id,
            &self.confirmation,
        )?;

        let tenant_id = self.tenant_id.clone();
        let award_id = self.award_id;
        let quote_item_ids = self.quote_item_ids.clone();
        let currency = self.currency.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, purchase_order::Model, AppError>(move |txn| {
                Box::pin(async move {
                    let award = award::Entity::find_by_id(award_id)
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;
                    if award.tenant_id != tenant_id {
                        return Err(AppError::not_found());
                    }
                    if award.purchase_order_id.is_some() {
                        return Err(AppError::validation("award_already_converted"));
                    }

                    super::ensure_action_allowed("decisao", award.status.as_str(), "create_purchase_order")?;

                    let mut lines = Vec::with_capacity(quote_item_ids.len());
                    let mut total_amount = Decimal::ZERO;
                    for (idx, quote_item_id) in quote_item_ids.iter().enumerate() {
                        let quote_item = quote_item::Entity::find_by_id(*quote_item_id)
                            .one(txn)
                            .await?
                            .ok_or_else(AppError::not_found)?;
                        if quote_item.tenant_id != tenant_id {
                            return Err(AppError::not_found());
                        }
                        let rfq_item = rfq_item::Entity::find()
                            .filter(rfq_item::Column::Id.eq(quote_item.rfq_item_id))
                            .filter(rfq_item::Column::TenantId.eq(tenant_id.clone()))
                            .one(txn)
                            .await?
                            .ok_or_else(AppError::not_found)?;

                        let line_total = quote_item.unit_price * Decimal::from(rfq_item.quantity);
                        total_amount += line_total;
                        lines.push((idx as i32 + 1, rfq_item, quote_item));
                    }

                    let number = generate_po_number();
                    let po = purchase_order::ActiveModel {
                        tenant_id: Set(tenant_id.clone()),
                        number: Set(number),
                        award_id: Set(Some(award_id)),
                        supplier_name: Set(award.supplier_name.clone()),
                        status: Set(PurchaseOrderStatus::Draft),
                        currency: Set(currency),
                        total_amount: Set(total_amount),
                        erp_last_error: Set(None),
                        external_id: Set(None),
                        created_at: Set(Utc::now()),
                        updated_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    for (line_no, rfq_item, quote_item) in &lines {
                        purchase_order_line::ActiveModel {
                            tenant_id: Set(tenant_id.clone()),
                            purchase_order_id: Set(po.id),
                            line_no: Set(*line_no),
                            product_code: Set(None),
                            description: Set(Some(rfq_item.description.clone())),
                            quantity: Set(Decimal::from(rfq_item.quantity)),
                            unit_price: Set(quote_item.unit_price),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }

                    let mut active_award: award::ActiveModel = award.into();
                    active_award.status = Set(AwardStatus::ConvertedToPo);
                    active_award.purchase_order_id = Set(Some(po.id));
                    active_award.updated_at = Set(Utc::now());
                    active_award.update(txn).await?;

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::PurchaseOrder,
                        po.id,
                        None,
                        PurchaseOrderStatus::Draft.as_str(),
                        "po_created_from_award",
                    )
                    .await?;

                    Ok(po)
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        info!(purchase_order_id = result.id, award_id, "purchase order created from award");

        let _ = event_sender
            .send(Event::PurchaseOrderStatusChanged {
                tenant_id: result.tenant_id.clone(),
                purchase_order_id: result.id,
                from_status: None,
                to_status: "draft".to_string(),
                reason: "po_created_from_award".to_string(),
            })
            .await;

        Ok(CreatePurchaseOrderFromAwardResult {
            purchase_order_id: result.id,
            number: result.number,
            status: result.status,
            total_amount: result.total_amount,
        })
    }
}
