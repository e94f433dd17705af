use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// The highest `(updated_at, source_id)` pair successfully ingested for a
/// `(tenant, system, entity)` triple. Primary key is the triple itself; updated only after a
/// successful pull batch, never on an empty one.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "integration_watermarks")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub tenant_id: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub system: String,
    #[sea_orm(primary_key, auto_increment = false)]
    pub entity: String,
    pub last_success_source_updated_at: Option<DateTime<Utc>>,
    pub last_success_source_id: Option<String>,
    pub last_success_cursor: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
