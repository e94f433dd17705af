//! Deterministic in-memory ERP: accepts every syntactically valid purchase order and hands back
//! a stable, predictable external id so integration tests don't depend on external state. Also
//! answers incremental pulls (C8) from a fixed in-memory fixture keyed by scope, the same
//! `(updated_at, external_id)` ordering and watermark filter the real Senior ERP uses.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;

use super::{ErpGateway, PullOutcome, PulledRecord, PushFailure, PushOutcome};
use crate::events::outbox::CanonicalPurchaseOrder;

#[derive(Debug, Clone, Default)]
pub struct MockErpGateway;

impl MockErpGateway {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ErpGateway for MockErpGateway {
    async fn push_purchase_order(
        &self,
        canonical_po: &CanonicalPurchaseOrder,
    ) -> Result<PushOutcome, PushFailure> {
        if !canonical_po.validate_schema() {
            return Err(PushFailure {
                details: "mock erp rejected: empty purchase order".to_string(),
                definitive: true,
            });
        }

        let id: i64 = canonical_po.external_ref.parse().unwrap_or(0);
        Ok(PushOutcome {
            external_id: format!("SENIOR-OC-{:06}", id),
            status: "erp_accepted".to_string(),
        })
    }

    async fn pull_updates(
        &self,
        entity: &str,
        since_updated_at: Option<DateTime<Utc>>,
        since_id: Option<&str>,
        limit: u32,
    ) -> Result<PullOutcome, PushFailure> {
        let mut records: Vec<&MockErpRecord> = ERP_FIXTURES
            .iter()
            .filter(|r| r.entity == entity)
            .collect();
        records.sort_by(|a, b| (a.updated_at, a.external_id).cmp(&(b.updated_at, b.external_id)));

        let filtered: Vec<PulledRecord> = records
            .into_iter()
            .filter(|r| match since_updated_at {
                None => true,
                Some(watermark) => {
                    r.updated_at > watermark
                        || (r.updated_at == watermark
                            && since_id.map(|id| r.external_id > id).unwrap_or(false))
                }
            })
            .take(limit as usize)
            .map(|r| PulledRecord {
                external_id: r.external_id.to_string(),
                updated_at: r.updated_at,
                status: Some(r.status.to_string()),
            })
            .collect();

        Ok(PullOutcome { records: filtered })
    }
}

struct MockErpRecord {
    entity: &'static str,
    external_id: &'static str,
    status: &'static str,
    updated_at: DateTime<Utc>,
}

fn fixture_time(rfc3339: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(rfc3339)
        .expect("fixture timestamp is valid rfc3339")
        .with_timezone(&Utc)
}

/// Same shape and values as the original mock ERP's `purchase_request` fixture list: a small,
/// fixed set of records ordered by `updated_at`, so a pull against an empty watermark always
/// returns a stable, inspectable sequence.
static ERP_FIXTURES: Lazy<Vec<MockErpRecord>> = Lazy::new(|| {
    vec![
        MockErpRecord {
            entity: "purchase_request",
            external_id: "PR-1001",
            status: "pending_rfq",
            updated_at: fixture_time("2026-01-18T08:00:00Z"),
        },
        MockErpRecord {
            entity: "purchase_request",
            external_id: "PR-1002",
            status: "in_rfq",
            updated_at: fixture_time("2026-01-21T14:15:00Z"),
        },
        MockErpRecord {
            entity: "purchase_request",
            external_id: "PR-1003",
            status: "awarded",
            updated_at: fixture_time("2026-01-26T09:45:00Z"),
        },
    ]
});

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::outbox::CanonicalPurchaseOrderLine;

    fn sample_po(id: &str) -> CanonicalPurchaseOrder {
        CanonicalPurchaseOrder {
            schema_name: "erp.purchase_order".to_string(),
            schema_version: 1,
            workspace_id: "tenant-1".to_string(),
            external_ref: id.to_string(),
            number: "PO-1".to_string(),
            supplier_name: "Acme".to_string(),
            currency: "BRL".to_string(),
            total_amount: "120.00".to_string(),
            lines: vec![CanonicalPurchaseOrderLine {
                line_no: 1,
                product_code: Some("SKU-1".to_string()),
                description: Some("Widget".to_string()),
                quantity: "10".to_string(),
                unit_price: "12.00".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn accepts_valid_po_with_zero_padded_external_id() {
        let gateway = MockErpGateway::new();
        let outcome = gateway.push_purchase_order(&sample_po("42")).await.unwrap();
        assert_eq!(outcome.external_id, "SENIOR-OC-000042");
        assert_eq!(outcome.status, "erp_accepted");
    }

    #[tokio::test]
    async fn rejects_po_with_no_lines() {
        let gateway = MockErpGateway::new();
        let mut po = sample_po("7");
        po.lines.clear();
        let err = gateway.push_purchase_order(&po).await.unwrap_err();
        assert!(err.definitive);
    }

    #[tokio::test]
    async fn pull_updates_returns_all_fixtures_with_no_watermark() {
        let gateway = MockErpGateway::new();
        let outcome = gateway
            .pull_updates("purchase_request", None, None, 100)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 3);
        assert_eq!(outcome.records[0].external_id, "PR-1001");
        assert_eq!(outcome.records.last().unwrap().external_id, "PR-1003");
    }

    #[tokio::test]
    async fn pull_updates_honors_the_watermark_and_cursor() {
        let gateway = MockErpGateway::new();
        let watermark = fixture_time("2026-01-21T14:15:00Z");
        let outcome = gateway
            .pull_updates("purchase_request", Some(watermark), Some("PR-1002"), 100)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].external_id, "PR-1003");
    }

    #[tokio::test]
    async fn pull_updates_respects_the_limit() {
        let gateway = MockErpGateway::new();
        let outcome = gateway
            .pull_updates("purchase_request", None, None, 1)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].external_id, "PR-1001");
    }

    #[tokio::test]
    async fn pull_updates_returns_nothing_for_an_unknown_scope() {
        let gateway = MockErpGateway::new();
        let outcome = gateway.pull_updates("receipt", None, None, 100).await.unwrap();
        assert!(outcome.records.is_empty());
    }
}
