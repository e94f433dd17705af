//! Invites one or more suppliers to quote on an RFQ. Each supplier gets one unguessable,
//! single-purpose token addressing the public quote portal; tokens never encode the tenant or
//! RFQ id, so the portal must always look the invite up by token and re-derive the rest.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rand::RngCore;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, TransactionError, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use validator::Validate;

use crate::commands::Command;
use crate::db::DbPool;
use crate::entities::rfq::{self, RfqStatus};
use crate::entities::rfq_item_supplier;
use crate::entities::rfq_supplier_invite::{self, InviteStatus};
use crate::entities::status_event::EntityKind;
use crate::errors::AppError;
use crate::events::{Event, EventSender};

const INVITE_EXPIRY_DAYS: i64 = 7;

fn generate_invite_token() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InviteSuppliersCommand {
    pub tenant_id: String,
    pub rfq_id: i64,
    #[validate(length(min = 1, message = "at least one supplier is required"))]
    pub supplier_ids: Vec<i64>,
    #[validate(length(min = 1, message = "at least one rfq item is required"))]
    pub rfq_item_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct InvitedSupplier {
    pub supplier_id: i64,
    pub invite_id: i64,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct InviteSuppliersResult {
    pub rfq_id: i64,
    pub status: RfqStatus,
    pub invites: Vec<InvitedSupplier>,
}

#[async_trait]
impl Command for InviteSuppliersCommand {
    type Result = InviteSuppliersResult;

    #[instrument(skip(self, db_pool, event_sender))]
    async fn execute(
        &self,
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
    ) -> Result<Self::Result, AppError> {
        self.validate()
            .map_err(|e| AppError::validation(format!("invalid request: {e}")))?;

        let tenant_id = self.tenant_id.clone();
        let rfq_id = self.rfq_id;
        let supplier_ids = self.supplier_ids.clone();
        let rfq_item_ids = self.rfq_item_ids.clone();

        let db = db_pool.as_ref();
        let result = db
            .transaction::<_, (rfq::Model, Vec<InvitedSupplier>), AppError>(move |txn| {
                Box::pin(async move {
                    let rfq = rfq::Entity::find_by_id(rfq_id)
                        .one(txn)
                        .await?
                        .ok_or_else(AppError::not_found)?;
                    if rfq.tenant_id != tenant_id {
                        return Err(AppError::not_found());
                    }

                    super::ensure_action_allowed("cotacao", rfq.status.as_str(), "invite_supplier")?;

                    for rfq_item_id in &rfq_item_ids {
                        for supplier_id in &supplier_ids {
                            let already_bound = rfq_item_supplier::Entity::find()
                                .filter(rfq_item_supplier::Column::TenantId.eq(tenant_id.clone()))
                                .filter(rfq_item_supplier::Column::RfqItemId.eq(*rfq_item_id))
                                .filter(rfq_item_supplier::Column::SupplierId.eq(*supplier_id))
                                .one(txn)
                                .await?
                                .is_some();
                            if already_bound {
                                continue;
                            }
                            rfq_item_supplier::ActiveModel {
                                tenant_id: Set(tenant_id.clone()),
                                rfq_item_id: Set(*rfq_item_id),
                                supplier_id: Set(*supplier_id),
                                ..Default::default()
                            }
                            .insert(txn)
                            .await?;
                        }
                    }

                    let now = Utc::now();
                    let expires_at = now + ChronoDuration::days(INVITE_EXPIRY_DAYS);
                    let mut invites = Vec::with_capacity(supplier_ids.len());
                    for supplier_id in &supplier_ids {
                        let prior_active_invites = rfq_supplier_invite::Entity::find()
                            .filter(rfq_supplier_invite::Column::TenantId.eq(tenant_id.clone()))
                            .filter(rfq_supplier_invite::Column::RfqId.eq(rfq_id))
                            .filter(rfq_supplier_invite::Column::SupplierId.eq(*supplier_id))
                            .filter(
                                rfq_supplier_invite::Column::Status
                                    .is_in([InviteStatus::Pending, InviteStatus::Opened]),
                            )
                            .all(txn)
                            .await?;
                        for prior in prior_active_invites {
                            let mut active: rfq_supplier_invite::ActiveModel = prior.into();
                            active.status = Set(InviteStatus::Cancelled);
                            active.updated_at = Set(now);
                            active.update(txn).await?;
                        }

                        let invite = rfq_supplier_invite::ActiveModel {
                            tenant_id: Set(tenant_id.clone()),
                            rfq_id: Set(rfq_id),
                            supplier_id: Set(*supplier_id),
                            token: Set(generate_invite_token()),
                            status: Set(InviteStatus::Pending),
                            expires_at: Set(expires_at),
                            opened_at: Set(None),
                            submitted_at: Set(None),
                            created_at: Set(now),
                            updated_at: Set(now),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;

                        invites.push(InvitedSupplier {
                            supplier_id: *supplier_id,
                            invite_id: invite.id,
                            token: invite.token,
                        });
                    }

                    let previous_status = rfq.status;
                    let new_status = if matches!(rfq.status, RfqStatus::Draft) {
                        RfqStatus::Open
                    } else {
                        rfq.status
                    };

                    let rfq = if new_status != previous_status {
                        let mut active: rfq::ActiveModel = rfq.into();
                        active.status = Set(new_status);
                        active.updated_at = Set(now);
                        active.update(txn).await?
                    } else {
                        rfq
                    };

                    super::record_status_event(
                        txn,
                        &tenant_id,
                        EntityKind::Rfq,
                        rfq.id,
                        Some(previous_status.as_str().to_string()),
                        new_status.as_str(),
                        "suppliers_invited",
                    )
                    .await?;

                    Ok((rfq, invites))
                })
            })
            .await
            .map_err(|e| match e {
                TransactionError::Connection(db_err) => AppError::from(db_err),
                TransactionError::Transaction(app_err) => app_err,
            })?;

        let (rfq, invites) = result;

        info!(rfq_id = rfq.id, invited = invites.len(), "suppliers invited");

        let _ = event_sender
            .send(Event::RfqStatusChanged {
                tenant_id: rfq.tenant_id.clone(),
                rfq_id: rfq.id,
                from_status: None,
                to_status: rfq.status.as_str().to_string(),
                reason: "suppliers_invited".to_string(),
            })
            .await;

        Ok(InviteSuppliersResult {
            rfq_id: rfq.id,
            status: rfq.status,
            invites,
        })
    }
}
