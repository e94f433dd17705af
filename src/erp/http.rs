//! Live ERP adapter (`ERP_MODE=senior_http`): posts the canonical envelope to `ERP_BASE_URL` and
//! maps the response the same way the reference client does — `external_id`/`id`/`codigo` for
//! the returned identifier, `status`/`erp_status` for the coarse outcome, falling back to
//! `erp_accepted` when the ERP omits one.

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;

use super::{ErpGateway, PushFailure, PushOutcome};
use crate::config::ErpConfig;
use crate::events::outbox::CanonicalPurchaseOrder;

pub struct HttpErpGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpErpGateway {
    pub fn new(config: &ErpConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .expect("reqwest client can be built");

        Self {
            client,
            base_url: config.base_url.clone().unwrap_or_default(),
            api_key: config.api_key.clone(),
        }
    }
}

#[async_trait]
impl ErpGateway for HttpErpGateway {
    async fn push_purchase_order(
        &self,
        canonical_po: &CanonicalPurchaseOrder,
    ) -> Result<PushOutcome, PushFailure> {
        let url = format!("{}/purchase_order", self.base_url.trim_end_matches('/'));

        let payload = serde_json::json!({
            "number": canonical_po.number,
            "supplier_name": canonical_po.supplier_name,
            "currency": canonical_po.currency,
            "total_amount": canonical_po.total_amount,
            "local_id": canonical_po.external_ref,
            "source": "plataforma_compras",
        });

        let mut request = self.client.post(&url).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.header("X-API-Key", api_key);
        }

        let response = request.send().await.map_err(|e| PushFailure {
            details: format!("erp connection error: {e}"),
            definitive: false,
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let truncated: String = body.chars().take(200).collect();
            let (_, _, _, definitive) =
                crate::errors::classify_erp_failure(&format!("ERP HTTP {}: {truncated}", status.as_u16()));
            return Err(PushFailure {
                details: format!("ERP HTTP {}: {truncated}", status.as_u16()),
                definitive,
            });
        }

        let body: Value = response.json().await.map_err(|e| PushFailure {
            details: format!("erp returned invalid json: {e}"),
            definitive: false,
        })?;

        let external_id = body
            .get("external_id")
            .or_else(|| body.get("id"))
            .or_else(|| body.get("codigo"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let Some(external_id) = external_id else {
            return Err(PushFailure {
                details: "erp did not return an external_id for the order".to_string(),
                definitive: true,
            });
        };

        let status = body
            .get("status")
            .or_else(|| body.get("erp_status"))
            .and_then(Value::as_str)
            .unwrap_or("erp_accepted")
            .to_string();

        Ok(PushOutcome { external_id, status })
    }
}
