use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// A supplier's price (and optional lead time) for one RFQ item. Unique per
/// `(quote, rfq_item, tenant)`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "quote_items")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub quote_id: i64,
    pub rfq_item_id: i64,
    pub unit_price: Decimal,
    pub lead_time_days: Option<i32>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::quote::Entity",
        from = "Column::QuoteId",
        to = "super::quote::Column::Id"
    )]
    Quote,
    #[sea_orm(
        belongs_to = "super::rfq_item::Entity",
        from = "Column::RfqItemId",
        to = "super::rfq_item::Column::Id"
    )]
    RfqItem,
}

impl Related<super::quote::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quote.def()
    }
}

impl Related<super::rfq_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RfqItem.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
