//! Drains due `sync_run` rows and pushes their canonical purchase order to the ERP gateway
//! (C7). One iteration: lease a batch, validate each row's contract, consult the circuit
//! breaker, call the gateway with a deadline, and either mark the purchase order accepted or
//! chain a retry / dead-letter it.

use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge, histogram};
use sea_orm::{ActiveModelTrait, EntityTrait, Set, TransactionError, TransactionTrait};
use tracing::{error, info, instrument, warn};

use crate::circuit_breaker::{CircuitBreaker, CircuitState};
use crate::config::ErpOutboxConfig;
use crate::db::DbPool;
use crate::entities::purchase_order::{self, PurchaseOrderStatus};
use crate::entities::status_event::EntityKind;
use crate::entities::sync_run;
use crate::erp::ErpGateway;
use crate::errors::messages::error_message;
use crate::errors::AppError;
use crate::events::outbox::{
    defer_for_open_circuit, lease_due_purchase_order_pushes, mark_dead_letter,
    mark_succeeded, mark_temporary_failure_and_maybe_retry,
};
use crate::events::{Event, EventSender};

#[derive(Debug, Clone, Default)]
pub struct OutboxWorkerStats {
    pub processed: u64,
    pub succeeded: u64,
    pub requeued: u64,
    pub retried: u64,
    pub dead_lettered: u64,
}

pub struct ErpOutboxWorker {
    db: Arc<DbPool>,
    gateway: Arc<dyn ErpGateway>,
    circuit: CircuitBreaker,
    cfg: ErpOutboxConfig,
    event_sender: Arc<EventSender>,
}

impl ErpOutboxWorker {
    pub fn new(
        db: Arc<DbPool>,
        gateway: Arc<dyn ErpGateway>,
        circuit: CircuitBreaker,
        cfg: ErpOutboxConfig,
        event_sender: Arc<EventSender>,
    ) -> Self {
        Self {
            db,
            gateway,
            circuit,
            cfg,
            event_sender,
        }
    }

    /// Runs leased rows to completion until no more are due, then returns. Used by both
    /// `--once` CLI runs and each tick of the continuous loop.
    #[instrument(skip(self))]
    pub async fn run_once(&self, tenant_id: Option<&str>, limit: u64) -> Result<OutboxWorkerStats, AppError> {
        let due = lease_due_purchase_order_pushes(self.db.as_ref(), tenant_id, limit).await?;
        let mut stats = OutboxWorkerStats::default();

        for (row, payload) in due {
            stats.processed += 1;
            counter!("erp_outbox_processed_total", 1);

            if !payload.canonical_po.validate_schema() {
                warn!(sync_run_id = row.id, "purchase order failed contract validation");
                counter!("erp_contract_invalid_total", 1);
                mark_dead_letter(
                    self.db.as_ref(),
                    &row,
                    payload.clone(),
                    "erp_contract_invalid",
                    "canonical purchase order failed schema validation",
                )
                .await?;
                self.mark_po_error(row.tenant_id.clone(), payload.purchase_order_id, "erp_contract_invalid")
                    .await?;
                stats.dead_lettered += 1;
                counter!("erp_outbox_dead_letter_total", 1);
                continue;
            }

            if self.circuit.try_acquire().is_err() {
                info!(sync_run_id = row.id, "circuit breaker open, requeuing without consuming an attempt");
                defer_for_open_circuit(self.db.as_ref(), &row, payload, &self.cfg).await?;
                stats.requeued += 1;
                counter!("erp_outbox_requeued_total", 1);
                continue;
            }

            let deadline = Duration::from_secs(self.cfg.worker_interval_seconds.max(5) * 6);
            let push_result = tokio::time::timeout(
                deadline,
                self.gateway.push_purchase_order(&payload.canonical_po),
            )
            .await;

            match push_result {
                Ok(Ok(outcome)) => {
                    self.circuit.record_success();
                    mark_succeeded(self.db.as_ref(), &row).await?;
                    self.mark_po_accepted(row.tenant_id.clone(), payload.purchase_order_id, &outcome.external_id)
                        .await?;
                    stats.succeeded += 1;
                    counter!("erp_outbox_succeeded_total", 1);

                    let _ = self
                        .event_sender
                        .send(Event::PurchaseOrderPushSucceeded {
                            tenant_id: row.tenant_id.clone(),
                            purchase_order_id: payload.purchase_order_id,
                            sync_run_id: row.id,
                            external_id: outcome.external_id,
                        })
                        .await;
                }
                Ok(Err(failure)) => {
                    self.circuit.record_failure();
                    self.handle_failure(&row, payload, &failure.details, failure.definitive, &mut stats)
                        .await?;
                }
                Err(_) => {
                    self.circuit.record_failure();
                    self.handle_failure(&row, payload, "erp push timed out", false, &mut stats)
                        .await?;
                }
            }

            let metrics = self.circuit.metrics();
            gauge!(
                "erp_circuit_state",
                match metrics.state {
                    CircuitState::Closed => 0.0,
                    CircuitState::Open => 1.0,
                    CircuitState::HalfOpen => 2.0,
                }
            );
        }

        Ok(stats)
    }

    async fn handle_failure(
        &self,
        row: &sync_run::Model,
        payload: crate::events::outbox::OutboxPayload,
        details: &str,
        definitive: bool,
        stats: &mut OutboxWorkerStats,
    ) -> Result<(), AppError> {
        error!(sync_run_id = row.id, definitive, details, "erp push failed");

        let tenant_id = row.tenant_id.clone();
        let purchase_order_id = payload.purchase_order_id;

        if definitive {
            mark_dead_letter(self.db.as_ref(), row, payload, "erp_rejected", details).await?;
            self.mark_po_error(tenant_id.clone(), purchase_order_id, details).await?;
            stats.dead_lettered += 1;
            counter!("erp_outbox_dead_letter_total", 1);
            let _ = self
                .event_sender
                .send(Event::PurchaseOrderPushFailed {
                    tenant_id,
                    purchase_order_id,
                    sync_run_id: row.id,
                    definitive: true,
                    details: details.to_string(),
                })
                .await;
            return Ok(());
        }

        let retried = mark_temporary_failure_and_maybe_retry(self.db.as_ref(), row, payload, details, &self.cfg).await?;
        if retried {
            histogram!("erp_outbox_retry_backoff_seconds", self.cfg.backoff_seconds as f64);
            stats.retried += 1;
            counter!("erp_outbox_retried_total", 1);
        } else {
            self.mark_po_error(tenant_id.clone(), purchase_order_id, details).await?;
            stats.dead_lettered += 1;
            counter!("erp_outbox_dead_letter_total", 1);
        }

        let _ = self
            .event_sender
            .send(Event::PurchaseOrderPushFailed {
                tenant_id,
                purchase_order_id,
                sync_run_id: row.id,
                definitive: !retried,
                details: details.to_string(),
            })
            .await;

        Ok(())
    }

    async fn mark_po_accepted(&self, tenant_id: String, purchase_order_id: i64, external_id: &str) -> Result<(), AppError> {
        let db = self.db.as_ref();
        db.transaction::<_, (), AppError>(move |txn| {
            let external_id = external_id.to_string();
            Box::pin(async move {
                let Some(po) = purchase_order::Entity::find_by_id(purchase_order_id).one(txn).await? else {
                    return Ok(());
                };
                let previous_status = po.status;
                let mut active: purchase_order::ActiveModel = po.into();
                active.status = Set(PurchaseOrderStatus::ErpAccepted);
                active.external_id = Set(Some(external_id));
                active.erp_last_error = Set(None);
                active.updated_at = Set(chrono::Utc::now());
                let po = active.update(txn).await?;

                crate::commands::procurement::record_status_event(
                    txn,
                    &tenant_id,
                    EntityKind::PurchaseOrder,
                    po.id,
                    Some(previous_status.as_str().to_string()),
                    PurchaseOrderStatus::ErpAccepted.as_str(),
                    "po_push_succeeded",
                )
                .await?;
                Ok(())
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => AppError::from(db_err),
            TransactionError::Transaction(app_err) => app_err,
        })
    }

    async fn mark_po_error(&self, tenant_id: String, purchase_order_id: i64, details: &str) -> Result<(), AppError> {
        let db = self.db.as_ref();
        let details = details.to_string();
        db.transaction::<_, (), AppError>(move |txn| {
            Box::pin(async move {
                let Some(po) = purchase_order::Entity::find_by_id(purchase_order_id).one(txn).await? else {
                    return Ok(());
                };
                let previous_status = po.status;
                let mut active: purchase_order::ActiveModel = po.into();
                active.status = Set(PurchaseOrderStatus::ErpError);
                active.erp_last_error = Set(Some(error_message("erp_rejected", &details)));
                active.updated_at = Set(chrono::Utc::now());
                let po = active.update(txn).await?;

                crate::commands::procurement::record_status_event(
                    txn,
                    &tenant_id,
                    EntityKind::PurchaseOrder,
                    po.id,
                    Some(previous_status.as_str().to_string()),
                    PurchaseOrderStatus::ErpError.as_str(),
                    "po_push_rejected",
                )
                .await?;
                Ok(())
            })
        })
        .await
        .map_err(|e| match e {
            TransactionError::Connection(db_err) => AppError::from(db_err),
            TransactionError::Transaction(app_err) => app_err,
        })
    }

    /// Runs forever, sleeping `worker_interval_seconds` between idle ticks.
    pub async fn run_forever(&self, tenant_id: Option<&str>) {
        loop {
            match self.run_once(tenant_id, self.cfg.worker_batch_size as u64).await {
                Ok(stats) if stats.processed > 0 => {
                    info!(?stats, "erp outbox tick processed rows");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "erp outbox tick failed"),
            }
            tokio::time::sleep(Duration::from_secs(self.cfg.worker_interval_seconds)).await;
        }
    }
}
