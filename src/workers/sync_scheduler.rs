//! Incremental pull scheduler (C8): per `(tenant, scope)`, pulls ERP-side updates since the last
//! watermark on a fixed interval, backing off exponentially on failure and never starting a
//! second run for a pair that already has one in flight.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, IntoActiveModel, QueryFilter, QueryOrder, Set,
};
use tracing::{error, info, warn};

use crate::config::SyncSchedulerConfig;
use crate::db::DbPool;
use crate::entities::purchase_request::{self, PurchaseRequestStatus};
use crate::entities::{integration_watermark, sync_run, tenant};
use crate::erp::{ErpGateway, PulledRecord};
use crate::errors::AppError;

const SYSTEM: &str = "erp";

#[derive(Debug, Clone, Default)]
struct BackoffState {
    failure_count: u32,
    next_run_at: Option<Instant>,
    parent_sync_run_id: Option<i64>,
}

pub struct SyncScheduler {
    db: Arc<DbPool>,
    gateway: Arc<dyn ErpGateway>,
    cfg: SyncSchedulerConfig,
    backoff: DashMap<(String, String), BackoffState>,
}

impl SyncScheduler {
    pub fn new(db: Arc<DbPool>, gateway: Arc<dyn ErpGateway>, cfg: SyncSchedulerConfig) -> Self {
        Self {
            db,
            gateway,
            cfg,
            backoff: DashMap::new(),
        }
    }

    pub async fn run_once(&self) -> Result<(), AppError> {
        if !self.cfg.enabled {
            return Ok(());
        }

        let tenants = tenant::Entity::find().all(self.db.as_ref()).await?;
        let scopes = self.cfg.scope_list();

        for t in tenants {
            for scope in &scopes {
                self.run_scope(&t.id, scope).await;
            }
        }
        Ok(())
    }

    async fn run_scope(&self, tenant_id: &str, scope: &str) {
        let key = (tenant_id.to_string(), scope.to_string());
        if !self.is_due(&key) {
            return;
        }

        match self.has_running_sync(tenant_id, scope).await {
            Ok(true) => return,
            Ok(false) => {}
            Err(e) => {
                error!(tenant_id, scope, error = %e, "failed to check for a running sync");
                return;
            }
        }

        let attempt = self
            .backoff
            .get(&key)
            .map(|s| s.failure_count + 1)
            .unwrap_or(1);
        let parent_sync_run_id = self.backoff.get(&key).and_then(|s| s.parent_sync_run_id);

        match self.pull_once(tenant_id, scope, attempt as i32, parent_sync_run_id).await {
            Ok(records_in) => {
                info!(tenant_id, scope, records_in, "sync scope pulled successfully");
                self.backoff.remove(&key);
            }
            Err(e) => {
                warn!(tenant_id, scope, error = %e, "sync scope pull failed");
                self.register_failure(key);
            }
        }
    }

    async fn has_running_sync(&self, tenant_id: &str, scope: &str) -> Result<bool, AppError> {
        let existing = sync_run::Entity::find()
            .filter(sync_run::Column::TenantId.eq(tenant_id))
            .filter(sync_run::Column::Scope.eq(scope))
            .filter(sync_run::Column::Status.eq(sync_run::SyncRunStatus::Running))
            .order_by_desc(sync_run::Column::Id)
            .one(self.db.as_ref())
            .await?;
        Ok(existing.is_some())
    }

    async fn pull_once(
        &self,
        tenant_id: &str,
        scope: &str,
        attempt: i32,
        parent_sync_run_id: Option<i64>,
    ) -> Result<u32, AppError> {
        let watermark = integration_watermark::Entity::find()
            .filter(integration_watermark::Column::TenantId.eq(tenant_id))
            .filter(integration_watermark::Column::System.eq(SYSTEM))
            .filter(integration_watermark::Column::Entity.eq(scope))
            .one(self.db.as_ref())
            .await?;

        let since_updated_at = watermark.as_ref().and_then(|w| w.last_success_source_updated_at);
        let since_id = watermark.as_ref().and_then(|w| w.last_success_source_id.clone());

        let run = sync_run::ActiveModel {
            tenant_id: Set(tenant_id.to_string()),
            scope: Set(scope.to_string()),
            status: Set(sync_run::SyncRunStatus::Running),
            attempt: Set(attempt),
            parent_sync_run_id: Set(parent_sync_run_id),
            payload_ref: Set("{}".to_string()),
            started_at: Set(Utc::now()),
            finished_at: Set(None),
            duration_ms: Set(None),
            records_in: Set(0),
            records_upserted: Set(0),
            records_failed: Set(0),
            error_summary: Set(None),
            error_details: Set(None),
            ..Default::default()
        }
        .insert(self.db.as_ref())
        .await?;

        let start = Instant::now();
        let pull_result = self
            .gateway
            .pull_updates(scope, since_updated_at, since_id.as_deref(), self.cfg.limit)
            .await;

        let mut active = run.clone().into_active_model();
        active.finished_at = Set(Some(Utc::now()));
        active.duration_ms = Set(Some(start.elapsed().as_millis() as i64));

        match pull_result {
            Ok(outcome) => {
                let records_in = outcome.records.len() as u32;
                let records_upserted = self.upsert_records(tenant_id, scope, &outcome.records).await?;
                active.status = Set(sync_run::SyncRunStatus::Succeeded);
                active.records_in = Set(records_in as i32);
                active.records_upserted = Set(records_upserted as i32);
                active.update(self.db.as_ref()).await?;

                if let Some(last) = outcome.records.last() {
                    self.advance_watermark(tenant_id, scope, last.updated_at, &last.external_id)
                        .await?;
                }

                Ok(records_in)
            }
            Err(failure) => {
                let details: String = failure.details.chars().take(1000).collect();
                active.status = Set(sync_run::SyncRunStatus::Failed);
                active.error_summary = Set(Some("erp_pull_failed".to_string()));
                active.error_details = Set(Some(details.clone()));
                active.update(self.db.as_ref()).await?;
                Err(AppError::system(details))
            }
        }
    }

    /// Applies pulled records to the local model. Only `purchase_request` has a local
    /// counterpart to upsert into (§C8); other scopes are accepted by the gateway and the
    /// scheduler but have nothing to write, so they report zero upserts.
    async fn upsert_records(
        &self,
        tenant_id: &str,
        scope: &str,
        records: &[PulledRecord],
    ) -> Result<u32, AppError> {
        if scope != "purchase_request" {
            return Ok(0);
        }

        let mut upserted = 0;
        for record in records {
            self.upsert_purchase_request(tenant_id, record).await?;
            upserted += 1;
        }
        Ok(upserted)
    }

    async fn upsert_purchase_request(
        &self,
        tenant_id: &str,
        record: &PulledRecord,
    ) -> Result<(), AppError> {
        let status = PurchaseRequestStatus::parse_erp(record.status.as_deref().unwrap_or(""));

        let existing = purchase_request::Entity::find()
            .filter(purchase_request::Column::TenantId.eq(tenant_id))
            .filter(purchase_request::Column::ExternalId.eq(record.external_id.clone()))
            .one(self.db.as_ref())
            .await?;

        let mut active = match existing {
            Some(model) => model.into_active_model(),
            None => purchase_request::ActiveModel {
                tenant_id: Set(tenant_id.to_string()),
                number: Set(record.external_id.clone()),
                priority: Set(purchase_request::Priority::Medium),
                requested_by: Set(None),
                department: Set(None),
                needed_at: Set(None),
                external_id: Set(Some(record.external_id.clone())),
                erp_num_cot: Set(None),
                erp_num_pct: Set(None),
                erp_sent_at: Set(None),
                created_at: Set(record.updated_at),
                ..Default::default()
            },
        };
        active.status = Set(status);
        active.updated_at = Set(record.updated_at);
        active.save(self.db.as_ref()).await?;
        Ok(())
    }

    async fn advance_watermark(
        &self,
        tenant_id: &str,
        scope: &str,
        updated_at: chrono::DateTime<Utc>,
        external_id: &str,
    ) -> Result<(), AppError> {
        let existing = integration_watermark::Entity::find()
            .filter(integration_watermark::Column::TenantId.eq(tenant_id))
            .filter(integration_watermark::Column::System.eq(SYSTEM))
            .filter(integration_watermark::Column::Entity.eq(scope))
            .one(self.db.as_ref())
            .await?;

        let mut active = match existing {
            Some(model) => model.into_active_model(),
            None => integration_watermark::ActiveModel {
                tenant_id: Set(tenant_id.to_string()),
                system: Set(SYSTEM.to_string()),
                entity: Set(scope.to_string()),
                ..Default::default()
            },
        };
        active.last_success_source_updated_at = Set(Some(updated_at));
        active.last_success_source_id = Set(Some(external_id.to_string()));
        active.updated_at = Set(Utc::now());
        active.save(self.db.as_ref()).await?;
        Ok(())
    }

    fn is_due(&self, key: &(String, String)) -> bool {
        match self.backoff.get(key) {
            Some(state) => state.next_run_at.map(|at| Instant::now() >= at).unwrap_or(true),
            None => true,
        }
    }

    fn register_failure(&self, key: (String, String)) {
        let mut entry = self.backoff.entry(key).or_default();
        entry.failure_count += 1;
        let backoff_seconds = self
            .cfg
            .max_backoff_seconds
            .min(self.cfg.min_backoff_seconds.saturating_mul(1u64 << (entry.failure_count - 1).min(20)));
        entry.next_run_at = Some(Instant::now() + Duration::from_secs(backoff_seconds));
    }

    /// Runs a single scope synchronously for the admin `/integrations/sync` endpoint, bypassing
    /// the due-time check (an operator asking for a sync now means now) but still refusing to
    /// start a second run while one is already in flight.
    pub async fn pull_scope_now(&self, tenant_id: &str, scope: &str) -> Result<u32, AppError> {
        if self.has_running_sync(tenant_id, scope).await? {
            return Err(AppError::validation("sync_already_running"));
        }
        let key = (tenant_id.to_string(), scope.to_string());
        let attempt = self.backoff.get(&key).map(|s| s.failure_count + 1).unwrap_or(1);
        let parent_sync_run_id = self.backoff.get(&key).and_then(|s| s.parent_sync_run_id);
        let records_in = self.pull_once(tenant_id, scope, attempt as i32, parent_sync_run_id).await?;
        self.backoff.remove(&key);
        Ok(records_in)
    }

    pub async fn run_forever(&self) {
        loop {
            if let Err(e) = self.run_once().await {
                error!(error = %e, "sync scheduler tick failed");
            }
            tokio::time::sleep(Duration::from_secs(self.cfg.interval_seconds)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::erp::mock::MockErpGateway;
    use sea_orm::Set as SeaSet;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    async fn test_db() -> (Arc<DbPool>, String) {
        let n = COUNTER.fetch_add(1, Ordering::SeqCst);
        let file = format!("sync_scheduler_test_{}_{}.db", std::process::id(), n);
        let _ = std::fs::remove_file(&file);
        let cfg = AppConfig {
            database_url: format!("sqlite://{file}?mode=rwc"),
            db_max_connections: 1,
            db_min_connections: 1,
            db_connect_timeout_secs: 10,
            db_idle_timeout_secs: 60,
            db_acquire_timeout_secs: 10,
            ..Default::default()
        };
        let pool = crate::db::establish_connection_from_app_config(&cfg)
            .await
            .expect("open test database");
        crate::db::run_migrations(&pool).await.expect("run migrations");
        (Arc::new(pool), file)
    }

    #[tokio::test]
    async fn pull_scope_now_succeeds_against_the_mock_gateway() {
        let (db, file) = test_db().await;
        let gateway: Arc<dyn ErpGateway> = Arc::new(MockErpGateway::new());
        let scheduler = SyncScheduler::new(db, gateway, SyncSchedulerConfig::default());

        let records_in = scheduler
            .pull_scope_now("tenant-1", "purchase_order")
            .await
            .expect("pull should succeed against the mock gateway");

        assert_eq!(records_in, 0, "the mock gateway reports no pull-side records");
        let _ = std::fs::remove_file(&file);
    }

    #[tokio::test]
    async fn pull_scope_now_upserts_purchase_requests_from_the_mock_gateway() {
        let (db, file) = test_db().await;
        let gateway: Arc<dyn ErpGateway> = Arc::new(MockErpGateway::new());
        let scheduler = SyncScheduler::new(db.clone(), gateway, SyncSchedulerConfig::default());

        let records_in = scheduler
            .pull_scope_now("tenant-1", "purchase_request")
            .await
            .expect("pull should succeed against the mock gateway");
        assert_eq!(records_in, 3);

        let created = purchase_request::Entity::find()
            .filter(purchase_request::Column::TenantId.eq("tenant-1"))
            .all(db.as_ref())
            .await
            .expect("query upserted purchase requests");
        assert_eq!(created.len(), 3);
        assert!(created
            .iter()
            .any(|pr| pr.external_id.as_deref() == Some("PR-1003") && pr.status == PurchaseRequestStatus::Awarded));

        let _ = std::fs::remove_file(&file);
    }

    #[tokio::test]
    async fn pull_scope_now_refuses_a_concurrent_run() {
        let (db, file) = test_db().await;
        let gateway: Arc<dyn ErpGateway> = Arc::new(MockErpGateway::new());
        let scheduler = SyncScheduler::new(db.clone(), gateway, SyncSchedulerConfig::default());

        sync_run::ActiveModel {
            tenant_id: SeaSet("tenant-1".to_string()),
            scope: SeaSet("purchase_order".to_string()),
            status: SeaSet(sync_run::SyncRunStatus::Running),
            attempt: SeaSet(1),
            parent_sync_run_id: SeaSet(None),
            payload_ref: SeaSet("{}".to_string()),
            started_at: SeaSet(Utc::now()),
            finished_at: SeaSet(None),
            duration_ms: SeaSet(None),
            records_in: SeaSet(0),
            records_upserted: SeaSet(0),
            records_failed: SeaSet(0),
            error_summary: SeaSet(None),
            error_details: SeaSet(None),
            ..Default::default()
        }
        .insert(db.as_ref())
        .await
        .expect("seed a running sync_run row");

        let result = scheduler.pull_scope_now("tenant-1", "purchase_order").await;
        assert!(result.is_err(), "a second run for the same pair must be refused");
        let _ = std::fs::remove_file(&file);
    }

    #[tokio::test]
    async fn register_failure_backs_off_exponentially_up_to_the_configured_ceiling() {
        let (db, file) = test_db().await;
        let cfg = SyncSchedulerConfig {
            min_backoff_seconds: 1,
            max_backoff_seconds: 10,
            ..Default::default()
        };
        let scheduler = SyncScheduler::new(db, Arc::new(MockErpGateway::new()), cfg);

        let key = ("tenant-1".to_string(), "purchase_order".to_string());
        for _ in 0..6 {
            scheduler.register_failure(key.clone());
        }
        let state = scheduler.backoff.get(&key).expect("backoff state recorded");
        assert!(state.next_run_at.is_some());
        assert!(state.failure_count >= 6);
        let _ = std::fs::remove_file(&file);
    }
}
