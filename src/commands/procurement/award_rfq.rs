//! Records the winning supplier for an RFQ. Awarding does not itself create a purchase order —
//! that is a separate, explicit transition (`create_purchase_order_from_award`) so a reviewer can
//! award now and issue the PO later.

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
use crate::entities::award::{self, AwardStatus};
use crate::entities::rfq::{self, RfqStatus};
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AwardRfqCommand {
    pub tenant_id: String,
    pub rfq_id: i64,
    #[validate(length(min = 1))]
    pub supplier_name: String,
    #[validate(length(min = 1, message = "an award reason is required"))]
    pub reason: String,
    /// Populated by the handler from request payload/query/header before the command runs;
    /// never deserialized directly from the JSON body.
    #[serde(skip)]
    pub confirmation: ConfirmationInput,
}

#[derive(Debug, Serialize)]
pub struct AwardRfqResult {
    pub award_id: i64,
    pub rfq_id: i64,
    pub rfq_status: RfqStatus,
}

#[async_trait]
impl Command for AwardRfqCommand {
    type Result = AwardRfqResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;
        super::ensure_confirmed(
            "award_rfq",
            &self.tenant_id,
            EntityKind::Rfq,
            self.rfq_id,
            &self.confirmation,
        )?;

        let tenant_id = self.tenant_id.clone();
        let rfq_id = self.rfq_id;
        let supplier_name = self.supplier_name.clone();
        let reason = self.reason.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (award::Model, rfq::Model), AppError>(move |txn| {
                Box::pin(async move {
                    let rfq = rfq::Entity::find_by_id(rfq_id)
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;
                    if rfq.tenant_id != tenant_id {
                        return Err(AppError::not_found());
                    }

                    super::ensure_action_allowed("cotacao", rfq.status.as_str(), "award_rfq")?;

                    let award = award::ActiveModel {
                        tenant_id: Set(tenant_id.clone()),
                        rfq_id: Set(rfq_id),
                        supplier_name: Set(supplier_name.clone()),
                        status: Set(AwardStatus::Awarded),
                        reason: Set(reason),
                        purchase_order_id: Set(None),
                        created_at: Set(Utc::now()),
                        updated_at: Set(Utc::now()),
                        ..Default::default()
                    }
                    .insert(txn)
                    .await?;

                    let previous_status = rfq.status;
                    let mut active: rfq::ActiveModel = rfq.into();
                    active.status = Set(RfqStatus::Awarded);
                    active.updated_at = Set(Utc::now());
                    let rfq = active.update(txn).await?;

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::Rfq,
                        rfq.id,
                        Some(previous_status.as_str().to_string()),
                        RfqStatus::Awarded.as_str(),
                        "rfq_awarded",
                    )
                    .await?;

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::Award,
                        award.id,
                        None,
                        AwardStatus::Awarded.as_str(),
                        "award_created",
                    )
                    .await?;

                    Ok((award, rfq))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (award, rfq) = result;

        info!(award_id = award.id, rfq_id = rfq.id, "rfq awarded");

        let _ = event_sender
            .send(Event::AwardRecorded {
                tenant_id: award.tenant_id.clone(),
                award_id: award.id,
                rfq_id: rfq.id,
                supplier_name: award.supplier_name.clone(),
            })
            .await;

        Ok(AwardRfqResult {
            award_id: award.id,
            rfq_id: rfq.id,
            rfq_status: rfq.status,
        })
    }
}
