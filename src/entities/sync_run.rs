use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
pub enum SyncRunStatus {
    #[sea_orm(string_value = "running")]
    Running,
    #[sea_orm(string_value = "succeeded")]
    Succeeded,
    #[sea_orm(string_value = "failed")]
    Failed,
}

/// One row per outbox attempt or pull cycle.
///
/// The ERP push outbox reuses this same table with `scope = "purchase_order"`, encoding the
/// pending job (including the immutable canonical PO snapshot) inside `payload_ref`. Pull
/// cycles for the other scopes use `payload_ref` for diagnostic context only.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "sync_runs")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    pub tenant_id: String,
    pub scope: String,
    pub status: SyncRunStatus,
    pub attempt: i32,
    pub parent_sync_run_id: Option<i64>,
    #[sea_orm(column_type = "Text")]
    pub payload_ref: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub records_in: i32,
    pub records_upserted: i32,
    pub records_failed: i32,
    pub error_summary: Option<String>,
    #[sea_orm(column_type = "Text", nullable)]
    pub error_details: Option<String>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
