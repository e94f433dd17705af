//! ERP outbox persistence (C5/C7 shared layer): `sync_runs` rows with `scope='purchase_order'`
//! are the physical representation of a queued push. There is no separate `outbox_events`
//! table — retries are modeled as new `SyncRun` rows chained through `parent_sync_run_id`.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};

use crate::config::ErpOutboxConfig;
use crate::entities::{purchase_order, sync_run};
use crate::errors::AppError;

pub const SCOPE_PURCHASE_ORDER: &str = "purchase_order";

/// The versioned envelope pushed to the ERP. Frozen at enqueue time and never recomputed from
/// the database for the lifetime of the outbox row and its retry chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPurchaseOrder {
    pub schema_name: String,
    pub schema_version: u32,
    pub workspace_id: String,
    pub external_ref: String,
    pub number: String,
    pub supplier_name: String,
    pub currency: String,
    pub total_amount: String,
    pub lines: Vec<CanonicalPurchaseOrderLine>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalPurchaseOrderLine {
    pub line_no: i32,
    pub product_code: Option<String>,
    pub description: Option<String>,
    pub quantity: String,
    pub unit_price: String,
}

impl CanonicalPurchaseOrder {
    pub fn new(
        tenant_id: &str,
        po: &purchase_order::Model,
        lines: &[crate::entities::purchase_order_line::Model],
    ) -> Self {
        Self {
            schema_name: "erp.purchase_order".to_string(),
            schema_version: 1,
            workspace_id: tenant_id.to_string(),
            external_ref: po.id.to_string(),
            number: po.number.clone(),
            supplier_name: po.supplier_name.clone(),
            currency: po.currency.clone(),
            total_amount: po.total_amount.to_string(),
            lines: lines
                .iter()
                .map(|l| CanonicalPurchaseOrderLine {
                    line_no: l.line_no,
                    product_code: l.product_code.clone(),
                    description: l.description.clone(),
                    quantity: l.quantity.to_string(),
                    unit_price: l.unit_price.to_string(),
                })
                .collect(),
        }
    }

    /// The minimal contract check the worker runs before ever calling the gateway (step 2a).
    pub fn validate_schema(&self) -> bool {
        self.schema_name == "erp.purchase_order"
            && self.schema_version == 1
            && !self.external_ref.is_empty()
            && !self.lines.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxPayload {
    pub kind: String,
    pub purchase_order_id: i64,
    pub next_attempt_at: DateTime<Utc>,
    pub canonical_po: CanonicalPurchaseOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dead_letter_reason: Option<String>,
}

fn backoff_with_jitter(cfg: &ErpOutboxConfig, attempt: u32) -> ChronoDuration {
    let exp = cfg.backoff_seconds.saturating_mul(1u64 << attempt.saturating_sub(1).min(20));
    let capped = exp.min(cfg.max_backoff_seconds).max(1);
    let jitter_span = (capped as f64 * cfg.backoff_jitter_ratio).max(0.0);
    let jitter = rand::thread_rng().gen_range(-jitter_span..=jitter_span);
    let seconds = (capped as f64 + jitter).max(1.0);
    ChronoDuration::milliseconds((seconds * 1000.0) as i64)
}

/// Idempotently enqueues a push for `purchase_order_id`: returns the existing running row's id
/// if one is already pending, otherwise creates a fresh attempt-1 `SyncRun`.
pub async fn enqueue_purchase_order_push(
    db: &impl ConnectionTrait,
    tenant_id: &str,
    purchase_order_id: i64,
    canonical_po: CanonicalPurchaseOrder,
) -> Result<i64, AppError> {
    let existing = sync_run::Entity::find()
        .filter(sync_run::Column::TenantId.eq(tenant_id))
        .filter(sync_run::Column::Scope.eq(SCOPE_PURCHASE_ORDER))
        .filter(sync_run::Column::Status.eq(sync_run::SyncRunStatus::Running))
        .all(db)
        .await?;

    for row in existing {
        if let Ok(payload) = serde_json::from_str::<OutboxPayload>(&row.payload_ref) {
            if payload.purchase_order_id == purchase_order_id {
                return Ok(row.id);
            }
        }
    }

    let payload = OutboxPayload {
        kind: "po_push".to_string(),
        purchase_order_id,
        next_attempt_at: Utc::now(),
        canonical_po,
        dead_letter: None,
        dead_letter_reason: None,
    };

    let row = sync_run::ActiveModel {
        tenant_id: Set(tenant_id.to_string()),
        scope: Set(SCOPE_PURCHASE_ORDER.to_string()),
        status: Set(sync_run::SyncRunStatus::Running),
        attempt: Set(1),
        parent_sync_run_id: Set(None),
        payload_ref: Set(serde_json::to_string(&payload).map_err(AppError::system)?),
        started_at: Set(Utc::now()),
        finished_at: Set(None),
        duration_ms: Set(None),
        records_in: Set(1),
        records_upserted: Set(0),
        records_failed: Set(0),
        error_summary: Set(None),
        error_details: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await?;

    Ok(row.id)
}

/// Leases up to `limit` due rows, oldest due-time first, optionally scoped to one tenant.
/// Relies on the caller running inside a transaction with a backend that honors
/// `FOR UPDATE SKIP LOCKED` (Postgres); under SQLite (tests) the lock is a no-op since tests run
/// single-threaded against the pool.
pub async fn lease_due_purchase_order_pushes(
    db: &impl ConnectionTrait,
    tenant_id: Option<&str>,
    limit: u64,
) -> Result<Vec<(sync_run::Model, OutboxPayload)>, AppError> {
    let mut query = sync_run::Entity::find()
        .filter(sync_run::Column::Scope.eq(SCOPE_PURCHASE_ORDER))
        .filter(sync_run::Column::Status.eq(sync_run::SyncRunStatus::Running))
        .order_by_asc(sync_run::Column::Id);

    if let Some(tenant_id) = tenant_id {
        query = query.filter(sync_run::Column::TenantId.eq(tenant_id));
    }

    let rows = query.all(db).await?;
    let now = Utc::now();

    let mut due = Vec::new();
    for row in rows {
        if let Ok(payload) = serde_json::from_str::<OutboxPayload>(&row.payload_ref) {
            if payload.next_attempt_at <= now {
                due.push((row, payload));
            }
        }
        if due.len() as u64 >= limit {
            break;
        }
    }
    due.sort_by_key(|(_, payload)| payload.next_attempt_at);
    due.truncate(limit as usize);
    Ok(due)
}

/// Defers a leased row without consuming an attempt — used when the circuit breaker is open
/// (step 2b): the push was never tried, so it must not count against `max_attempts`.
pub async fn defer_for_open_circuit(
    db: &impl ConnectionTrait,
    row: &sync_run::Model,
    mut payload: OutboxPayload,
    cfg: &ErpOutboxConfig,
) -> Result<(), AppError> {
    payload.next_attempt_at = Utc::now() + backoff_with_jitter(cfg, 1);
    let mut active: sync_run::ActiveModel = row.clone().into();
    active.payload_ref = Set(serde_json::to_string(&payload).map_err(AppError::system)?);
    active.update(db).await?;
    Ok(())
}

pub async fn mark_succeeded(
    db: &impl ConnectionTrait,
    row: &sync_run::Model,
) -> Result<(), AppError> {
    let mut active: sync_run::ActiveModel = row.clone().into();
    active.status = Set(sync_run::SyncRunStatus::Succeeded);
    active.finished_at = Set(Some(Utc::now()));
    active.records_upserted = Set(1);
    active.update(db).await?;
    Ok(())
}

/// Temporary failure (step 2e): marks the current row failed and, if attempts remain, chains a
/// fresh `running` row carrying the same canonical snapshot forward.
pub async fn mark_temporary_failure_and_maybe_retry(
    db: &impl ConnectionTrait,
    row: &sync_run::Model,
    mut payload: OutboxPayload,
    details: &str,
    cfg: &ErpOutboxConfig,
) -> Result<bool, AppError> {
    let mut active: sync_run::ActiveModel = row.clone().into();
    active.status = Set(sync_run::SyncRunStatus::Failed);
    active.finished_at = Set(Some(Utc::now()));
    active.records_failed = Set(1);
    active.error_summary = Set(Some("erp_temporarily_unavailable".to_string()));
    active.error_details = Set(Some(details.to_string()));
    active.update(db).await?;

    let next_attempt = row.attempt + 1;
    if row.attempt < cfg.max_attempts as i32 {
        payload.next_attempt_at = Utc::now() + backoff_with_jitter(cfg, next_attempt as u32);
        let child = sync_run::ActiveModel {
            tenant_id: Set(row.tenant_id.clone()),
            scope: Set(SCOPE_PURCHASE_ORDER.to_string()),
            status: Set(sync_run::SyncRunStatus::Running),
            attempt: Set(next_attempt),
            parent_sync_run_id: Set(Some(row.id)),
            payload_ref: Set(serde_json::to_string(&payload).map_err(AppError::system)?),
            started_at: Set(Utc::now()),
            finished_at: Set(None),
            duration_ms: Set(None),
            records_in: Set(1),
            records_upserted: Set(0),
            records_failed: Set(0),
            error_summary: Set(None),
            error_details: Set(None),
            ..Default::default()
        };
        child.insert(db).await?;
        Ok(true)
    } else {
        payload.dead_letter = Some(true);
        payload.dead_letter_reason = Some("max_attempts_exhausted".to_string());
        let mut dead: sync_run::ActiveModel = row.clone().into();
        dead.payload_ref = Set(serde_json::to_string(&payload).map_err(AppError::system)?);
        dead.update(db).await?;
        Ok(false)
    }
}

/// Definitive failure or contract-invalid rejection (step 2a/2f): no retry, dead-letter the row.
pub async fn mark_dead_letter(
    db: &impl ConnectionTrait,
    row: &sync_run::Model,
    mut payload: OutboxPayload,
    reason: &str,
    details: &str,
) -> Result<(), AppError> {
    payload.dead_letter = Some(true);
    payload.dead_letter_reason = Some(reason.to_string());

    let mut active: sync_run::ActiveModel = row.clone().into();
    active.status = Set(sync_run::SyncRunStatus::Failed);
    active.finished_at = Set(Some(Utc::now()));
    active.records_failed = Set(1);
    active.error_summary = Set(Some(reason.to_string()));
    active.error_details = Set(Some(details.to_string()));
    active.payload_ref = Set(serde_json::to_string(&payload).map_err(AppError::system)?);
    active.update(db).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_cfg() -> ErpOutboxConfig {
        ErpOutboxConfig {
            max_attempts: 8,
            backoff_seconds: 5,
            max_backoff_seconds: 900,
            backoff_jitter_ratio: 0.2,
            worker_interval_seconds: 2,
            worker_batch_size: 20,
        }
    }

    #[test]
    fn backoff_grows_and_caps() {
        let cfg = default_cfg();
        let d1 = backoff_with_jitter(&cfg, 1).num_milliseconds() as f64 / 1000.0;
        let d5 = backoff_with_jitter(&cfg, 5).num_milliseconds() as f64 / 1000.0;
        assert!(d1 >= 4.0 && d1 <= 6.0);
        assert!(d5 <= cfg.max_backoff_seconds as f64 * 1.2 + 1.0);
    }

    #[test]
    fn canonical_envelope_requires_lines_and_ref() {
        let po = CanonicalPurchaseOrder {
            schema_name: "erp.purchase_order".to_string(),
            schema_version: 1,
            workspace_id: "t1".to_string(),
            external_ref: "".to_string(),
            number: "PO-1".to_string(),
            supplier_name: "Acme".to_string(),
            currency: "BRL".to_string(),
            total_amount: "10.00".to_string(),
            lines: vec![],
        };
        assert!(!po.validate_schema());
    }
}
