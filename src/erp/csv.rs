//! File-exchange ERP adapter (`ERP_MODE=senior_csv`): mirrors purchase orders to and from flat
//! files the way the real Senior integration exchanges fixed-name export tables
//! (`E420OCP` for purchase orders, `E405SOL` for purchase requests) over a shared drop directory,
//! instead of talking HTTP. Grounded on `ERP_CSV_*`/`ERP_MIRROR_SCHEMA` in the original config,
//! where the file paths were already wired up as settings with no adapter behind them.

use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{ErpGateway, PullOutcome, PulledRecord, PushFailure, PushOutcome};
use crate::config::ErpConfig;
use crate::events::outbox::CanonicalPurchaseOrder;

pub struct CsvErpGateway {
    outbound_path: PathBuf,
    inbound_path: PathBuf,
    write_lock: Mutex<()>,
}

impl CsvErpGateway {
    pub fn new(config: &ErpConfig) -> Self {
        let dir = PathBuf::from(config.csv_dir.clone().unwrap_or_else(|| ".".to_string()));
        Self {
            outbound_path: dir.join("E420OCP.csv"),
            inbound_path: dir.join("E405SOL.csv"),
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl ErpGateway for CsvErpGateway {
    async fn push_purchase_order(
        &self,
        canonical_po: &CanonicalPurchaseOrder,
    ) -> Result<PushOutcome, PushFailure> {
        if !canonical_po.validate_schema() {
            return Err(PushFailure {
                details: "csv mirror rejected: empty purchase order".to_string(),
                definitive: true,
            });
        }

        let id: i64 = canonical_po.external_ref.parse().unwrap_or(0);
        let external_id = format!("SENIOR-OC-{:06}", id);

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.outbound_path)
            .map_err(|e| PushFailure {
                details: format!("could not open csv mirror file: {e}"),
                definitive: false,
            })?;

        let line = format!(
            "{},{},{},{},{}\n",
            external_id,
            canonical_po.number,
            canonical_po.supplier_name,
            canonical_po.currency,
            canonical_po.total_amount,
        );
        file.write_all(line.as_bytes()).map_err(|e| PushFailure {
            details: format!("could not write csv mirror row: {e}"),
            definitive: false,
        })?;

        Ok(PushOutcome {
            external_id,
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
        if entity != "purchase_request" {
            return Ok(PullOutcome::default());
        }

        let file = match File::open(&self.inbound_path) {
            Ok(f) => f,
            Err(_) => return Ok(PullOutcome::default()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line.map_err(|e| PushFailure {
                details: format!("could not read csv mirror row: {e}"),
                definitive: false,
            })?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split(',').collect();
            if fields.len() < 3 {
                continue;
            }
            let Ok(updated_at) = DateTime::parse_from_rfc3339(fields[2]) else {
                continue;
            };
            records.push(PulledRecord {
                external_id: fields[0].to_string(),
                status: Some(fields[1].to_string()),
                updated_at: updated_at.with_timezone(&Utc),
            });
        }

        records.sort_by(|a, b| (a.updated_at, &a.external_id).cmp(&(b.updated_at, &b.external_id)));

        let filtered: Vec<PulledRecord> = records
            .into_iter()
            .filter(|r| match since_updated_at {
                None => true,
                Some(watermark) => {
                    r.updated_at > watermark
                        || (r.updated_at == watermark
                            && since_id.map(|id| r.external_id.as_str() > id).unwrap_or(false))
                }
            })
            .take(limit as usize)
            .collect();

        Ok(PullOutcome { records: filtered })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

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
            lines: vec![crate::events::outbox::CanonicalPurchaseOrderLine {
                line_no: 1,
                product_code: Some("SKU-1".to_string()),
                description: Some("Widget".to_string()),
                quantity: "10".to_string(),
                unit_price: "12.00".to_string(),
            }],
        }
    }

    #[tokio::test]
    async fn push_appends_a_row_to_the_outbound_mirror_file() {
        let dir = tempfile::tempdir().expect("create temp mirror dir");
        let gateway = CsvErpGateway::new(&ErpConfig {
            csv_dir: Some(dir.path().to_string_lossy().to_string()),
            ..Default::default()
        });

        let outcome = gateway.push_purchase_order(&sample_po("9")).await.unwrap();
        assert_eq!(outcome.external_id, "SENIOR-OC-000009");

        let contents = std::fs::read_to_string(dir.path().join("E420OCP.csv")).unwrap();
        assert!(contents.contains("SENIOR-OC-000009,PO-1,Acme,BRL,120.00"));
    }

    #[tokio::test]
    async fn pull_reads_and_filters_the_inbound_mirror_file() {
        let dir = tempfile::tempdir().expect("create temp mirror dir");
        std::fs::write(
            dir.path().join("E405SOL.csv"),
            "PR-1,pending_rfq,2026-01-18T08:00:00Z\nPR-2,awarded,2026-01-26T09:45:00Z\n",
        )
        .unwrap();
        let gateway = CsvErpGateway::new(&ErpConfig {
            csv_dir: Some(dir.path().to_string_lossy().to_string()),
            ..Default::default()
        });

        let outcome = gateway
            .pull_updates("purchase_request", None, None, 100)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 2);
        assert_eq!(outcome.records[0].external_id, "PR-1");

        let watermark = DateTime::parse_from_rfc3339("2026-01-18T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let outcome = gateway
            .pull_updates("purchase_request", Some(watermark), None, 100)
            .await
            .unwrap();
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(outcome.records[0].external_id, "PR-2");
    }

    #[tokio::test]
    async fn pull_returns_nothing_for_a_missing_mirror_file() {
        let dir = tempfile::tempdir().expect("create temp mirror dir");
        let gateway = CsvErpGateway::new(&ErpConfig {
            csv_dir: Some(dir.path().to_string_lossy().to_string()),
            ..Default::default()
        });

        let outcome = gateway
            .pull_updates("purchase_request", None, None, 100)
            .await
            .unwrap();
        assert!(outcome.records.is_empty());
    }
}
