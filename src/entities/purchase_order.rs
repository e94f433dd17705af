use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum PurchaseOrderStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "sent_to_erp")]
    SentToErp,
    #[sea_orm(string_value = "erp_accepted")]
    ErpAccepted,
    #[sea_orm(string_value = "partially_received")]
    PartiallyReceived,
    #[sea_orm(string_value = "received")]
    Received,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
    #[sea_orm(string_value = "erp_error")]
    ErpError,
}

impl PurchaseOrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Approved => "approved",
            Self::SentToErp => "sent_to_erp",
            Self::ErpAccepted => "erp_accepted",
            Self::PartiallyReceived => "partially_received",
            Self::Received => "received",
            Self::Cancelled => "cancelled",
            Self::ErpError => "erp_error",
        }
    }
}

/// The commitment issued to the awarded supplier; the artifact shipped to the ERP.
///
/// Once `external_id` is set the row is read-only except for ERP-driven status transitions
/// (receipts, acceptance) applied by the sync scheduler or the outbox worker.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_orders")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub number: String,
    pub award_id: Option<i64>,
    pub supplier_name: String,
    pub status: PurchaseOrderStatus,
    pub currency: String,
    pub total_amount: Decimal,
    pub erp_last_error: Option<String>,
    pub external_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::award::Entity",
        from = "Column::AwardId",
        to = "super::award::Column::Id"
    )]
    Award,
    #[sea_orm(has_many = "super::purchase_order_line::Entity")]
    Lines,
}

impl Related<super::award::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Award.def()
    }
}

impl Related<super::purchase_order_line::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Lines.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Once the ERP has assigned an external id, the PO may only move through
    /// ERP-driven transitions; user mutation endpoints must reject it.
    pub fn is_erp_managed(&self) -> bool {
        self.external_id.is_some()
    }
}
