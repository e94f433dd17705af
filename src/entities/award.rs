use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum AwardStatus {
    #[sea_orm(string_value = "awarded")]
    Awarded,
    #[sea_orm(string_value = "converted_to_po")]
    ConvertedToPo,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl AwardStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Awarded => "awarded",
            Self::ConvertedToPo => "converted_to_po",
            Self::Cancelled => "cancelled",
        }
    }
}

/// The selection of a winning supplier for an RFQ. A given RFQ may accumulate several
/// awards over time (e.g. re-awards); the most recently created row is authoritative.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "awards")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub rfq_id: i64,
    pub supplier_name: String,
    pub status: AwardStatus,
    pub reason: String,
    pub purchase_order_id: Option<i64>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rfq::Entity",
        from = "Column::RfqId",
        to = "super::rfq::Column::Id"
    )]
    Rfq,
}

impl Related<super::rfq::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rfq.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
