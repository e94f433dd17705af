use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(24))")]
pub enum EntityKind {
    #[sea_orm(string_value = "purchase_request")]
    PurchaseRequest,
    #[sea_orm(string_value = "rfq")]
    Rfq,
    #[sea_orm(string_value = "award")]
    Award,
    #[sea_orm(string_value = "quote")]
    Quote,
    #[sea_orm(string_value = "purchase_order")]
    PurchaseOrder,
    #[sea_orm(string_value = "receipt")]
    Receipt,
}

/// Append-only audit record of a single state transition. Never updated nor deleted;
/// always written in the same transaction as the mutation it describes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "status_events")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub entity: EntityKind,
    pub entity_id: i64,
    pub from_status: Option<String>,
    pub to_status: String,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

/// `reason` values that analytics projections treat as governance-sensitive.
pub const CRITICAL_REASONS: &[&str] = &[
    "purchase_request_cancelled",
    "rfq_cancelled",
    "invite_cancelled",
    "order_cancelled",
    "rfq_awarded",
    "po_created_from_award",
    "po_push_queued",
    "po_push_succeeded",
    "po_push_retry_started",
    "po_push_rejected",
    "supplier_quote_withdrawn",
];

pub fn is_critical_reason(reason: &str) -> bool {
    CRITICAL_REASONS.contains(&reason)
}
