use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Many-to-many binding recording that a supplier was invited to price a given RFQ item.
/// Unique on `(rfq_item_id, supplier_id, tenant_id)`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rfq_item_suppliers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub rfq_item_id: i64,
    pub supplier_id: i64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::rfq_item::Entity",
        from = "Column::RfqItemId",
        to = "super::rfq_item::Column::Id"
    )]
    RfqItem,
}

impl Related<super::rfq_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RfqItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
