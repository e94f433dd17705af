use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "purchase_request_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub purchase_request_id: i64,
    pub line_no: i32,
    pub description: String,
    pub quantity: i32,
    pub uom: String,
    pub category: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::purchase_request::Entity",
        from = "Column::PurchaseRequestId",
        to = "super::purchase_request::Column::Id"
    )]
    PurchaseRequest,
    #[sea_orm(has_many = "super::rfq_item::Entity")]
    RfqItems,
}

impl Related<super::purchase_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseRequest.def()
    }
}

impl Related<super::rfq_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RfqItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
