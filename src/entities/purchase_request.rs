use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Status values a purchase request may hold. `Cancelled` and `Received` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PurchaseRequestStatus {
    #[sea_orm(string_value = "pending_rfq")]
    PendingRfq,
    #[sea_orm(string_value = "in_rfq")]
    InRfq,
    #[sea_orm(string_value = "awarded")]
    Awarded,
    #[sea_orm(string_value = "ordered")]
    Ordered,
    #[sea_orm(string_value = "partially_received")]
    PartiallyReceived,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl PurchaseRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PendingRfq => "pending_rfq",
            Self::InRfq => "in_rfq",
            Self::Awarded => "awarded",
            Self::Ordered => "ordered",
            Self::PartiallyReceived => "partially_received",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parses an ERP-reported status string, the way a pull-side upsert must: unknown values
    /// fall back to `pending_rfq` rather than rejecting the whole record.
    pub fn parse_erp(value: &str) -> Self {
        match value {
            "in_rfq" => Self::InRfq,
            "awarded" => Self::Awarded,
            "ordered" => Self::Ordered,
            "partially_received" => Self::PartiallyReceived,
            "received" => Self::Received,
            "cancelled" => Self::Cancelled,
            _ => Self::PendingRfq,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum Priority {
    #[sea_orm(string_value = "low")]
    Low,
    #[sea_orm(string_value = "medium")]
    Medium,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

/// A request to buy something, made of one or more items, before it has been put to RFQ.
///
/// Once any `erp_*` field is populated the row is read-only in this system: the ERP is the
/// authority for that data from that point on.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_requests")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub number: String,
    pub status: PurchaseRequestStatus,
    pub priority: Priority,
    pub requested_by: Option<String>,
    pub department: Option<String>,
    pub needed_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub erp_num_cot: Option<String>,
    pub erp_num_pct: Option<String>,
    pub erp_sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::purchase_request_item::Entity")]
    Items,
}

impl Related<super::purchase_request_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// ERP-origin fields make the request read-only outside of ERP-driven sync.
    pub fn is_erp_managed(&self) -> bool {
        self.external_id.is_some() || self.erp_num_cot.is_some() || self.erp_num_pct.is_some()
    }
}

impl crate::repository::TenantOwned for Model {
    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}
