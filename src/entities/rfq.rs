use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(32))")]
pub enum RfqStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "open")]
    Open,
    #[sea_orm(string_value = "collecting_quotes")]
    CollectingQuotes,
    #[sea_orm(string_value = "closed")]
    Closed,
    #[sea_orm(string_value = "awarded")]
    Awarded,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl RfqStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Open => "open",
            Self::CollectingQuotes => "collecting_quotes",
            Self::Closed => "closed",
            Self::Awarded => "awarded",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A request for quotation: an invitation to one or more suppliers to price a bundle of items.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "rfqs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub title: String,
    pub status: RfqStatus,
    /// Free-text reason supplied by the caller on cancellation; the status event's own
    /// `reason` stays a controlled vocabulary (`rfq_cancelled`) regardless of this text.
    pub cancel_reason: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::rfq_item::Entity")]
    Items,
    #[sea_orm(has_many = "super::award::Entity")]
    Awards,
}

impl Related<super::rfq_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl Related<super::award::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Awards.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl crate::repository::TenantOwned for Model {
    fn tenant_id(&self) -> &str {
        &self.tenant_id
    }
}
