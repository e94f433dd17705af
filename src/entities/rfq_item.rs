use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// An item on an RFQ. Carries a denormalized snapshot of the source request item so the
/// RFQ remains stable even if the originating request item later changes.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rfq_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub rfq_id: i64,
    pub purchase_request_item_id: i64,
    pub description: String,
    pub quantity: i32,
    pub uom: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rfq::Entity",
        from = "Column::RfqId",
        to = "super::rfq::Column::Id"
    )]
    Rfq,
    #[sea_orm(
        belongs_to = "super::purchase_request_item::Entity",
        from = "Column::PurchaseRequestItemId",
        to = "super::purchase_request_item::Column::Id"
    )]
    PurchaseRequestItem,
    #[sea_orm(has_many = "super::rfq_item_supplier::Entity")]
    Suppliers,
    #[sea_orm(has_many = "super::quote_item::Entity")]
    QuoteItems,
}

impl Related<super::rfq::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Rfq.def()
    }
}

impl Related<super::purchase_request_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PurchaseRequestItem.def()
    }
}

impl Related<super::rfq_item_supplier::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Suppliers.def()
    }
}

impl Related<super::quote_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuoteItems.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
