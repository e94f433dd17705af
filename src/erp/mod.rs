//! The ERP gateway seam (C9): one trait, two adapters. Mock is the default so the service runs
//! end to end with no external dependency; the HTTP adapter talks to the real ERP once
//! `ERP_MODE=senior_http` and `ERP_BASE_URL` are configured.

pub mod csv;
pub mod http;
pub mod mock;

use async_trait::async_trait;

use crate::events::outbox::CanonicalPurchaseOrder;

/// Result of a successful push: the ERP's own identifier for the order plus whatever coarse
/// status it reported (usually just echoed back as `erp_accepted`).
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub external_id: String,
    pub status: String,
}

/// A push failure, already classified. `definitive` means retrying will never help (the ERP
/// rejected the order outright); the outbox worker dead-letters on `definitive == true` and
/// retries otherwise.
#[derive(Debug, Clone)]
pub struct PushFailure {
    pub details: String,
    pub definitive: bool,
}

impl std::fmt::Display for PushFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.details)
    }
}

impl std::error::Error for PushFailure {}

/// One ERP-side record observed during an incremental pull, already ordered by
/// `(updated_at, external_id)` the way the sync scheduler expects.
#[derive(Debug, Clone)]
pub struct PulledRecord {
    pub external_id: String,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PullOutcome {
    pub records: Vec<PulledRecord>,
}

#[async_trait]
pub trait ErpGateway: Send + Sync {
    async fn push_purchase_order(
        &self,
        canonical_po: &CanonicalPurchaseOrder,
    ) -> Result<PushOutcome, PushFailure>;

    /// Incremental pull for the sync scheduler (C8): records with `updated_at` after the
    /// watermark, or with `updated_at == watermark` and `external_id` after the cursor. The
    /// mock gateway has nothing to report; the HTTP gateway does not implement pull (the ERP
    /// here is push-only), so both fall back to this empty default.
    async fn pull_updates(
        &self,
        _entity: &str,
        _since_updated_at: Option<chrono::DateTime<chrono::Utc>>,
        _since_id: Option<&str>,
        _limit: u32,
    ) -> Result<PullOutcome, PushFailure> {
        Ok(PullOutcome::default())
    }
}
