//! HTTP adapter (C11). Handlers collect a request's confirmation signal from every place it
//! might arrive, build the right command struct, and hand it to `Command::execute`. Nothing in
//! here touches sea-orm directly except the read-only GET endpoints.

pub mod contract_health;
pub mod health;
pub mod integrations;
pub mod purchase_orders;
pub mod purchase_requests;
pub mod rfqs;
pub mod supplier_portal;

use std::sync::Arc;

use axum::{
    extract::FromRequestParts,
    http::{header::HeaderMap, request::Parts},
};
use serde_json::Value;

use crate::config::AppConfig;
use crate::critical_actions::ConfirmationInput;
use crate::db::DbPool;
use crate::events::EventSender;
use crate::workers::sync_scheduler::SyncScheduler;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbPool>,
    pub event_sender: Arc<EventSender>,
    pub config: Arc<AppConfig>,
    pub sync_scheduler: Arc<SyncScheduler>,
    pub started_at: std::time::Instant,
}

/// Pulls `confirm`/`confirm_token` out of the query string, into a half-built
/// [`ConfirmationInput`]. Handlers fill in the payload/header sides themselves since those
/// differ per endpoint.
pub fn confirmation_from_query(params: &std::collections::HashMap<String, String>) -> ConfirmationInput {
    ConfirmationInput {
        query_confirm_token: params.get("confirm_token").cloned(),
        query_confirm: params.get("confirm").map(|v| Value::String(v.clone())),
        ..Default::default()
    }
}

pub fn merge_header_confirmation(input: &mut ConfirmationInput, headers: &HeaderMap) {
    if let Some(value) = headers.get("x-confirm-token").and_then(|v| v.to_str().ok()) {
        input.header_confirm_token = Some(value.to_string());
    }
    if let Some(value) = headers.get("x-confirm").and_then(|v| v.to_str().ok()) {
        input.header_confirm = Some(Value::String(value.to_string()));
    }
}

/// Extracts the tenant id from the `X-Tenant-Id` header. There is no session/auth layer in this
/// service; every request is trusted to carry its own tenant scope, the way an internal
/// service-to-service caller would.
pub struct TenantId(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for TenantId
where
    S: Send + Sync,
{
    type Rejection = crate::errors::AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get("x-tenant-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.trim().is_empty())
            .map(|v| TenantId(v.to_string()))
            .ok_or_else(|| crate::errors::AppError::validation("tenant_required"))
    }
}

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new()
        .merge(purchase_requests::routes())
        .merge(rfqs::routes())
        .merge(purchase_orders::routes())
        .merge(supplier_portal::routes())
        .merge(integrations::routes())
        .merge(contract_health::routes())
        .merge(health::routes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn confirmation_from_query_reads_confirm_and_confirm_token() {
        let mut params = std::collections::HashMap::new();
        params.insert("confirm_token".to_string(), "abc123".to_string());
        params.insert("confirm".to_string(), "true".to_string());

        let input = confirmation_from_query(&params);
        assert_eq!(input.query_confirm_token.as_deref(), Some("abc123"));
        assert_eq!(input.query_confirm, Some(Value::String("true".to_string())));
        assert!(input.header_confirm_token.is_none());
    }

    #[test]
    fn merge_header_confirmation_reads_x_confirm_headers() {
        let mut input = ConfirmationInput::default();
        let mut headers = HeaderMap::new();
        headers.insert("x-confirm-token", HeaderValue::from_static("tok-1"));
        headers.insert("x-confirm", HeaderValue::from_static("yes"));

        merge_header_confirmation(&mut input, &headers);

        assert_eq!(input.header_confirm_token.as_deref(), Some("tok-1"));
        assert_eq!(input.header_confirm, Some(Value::String("yes".to_string())));
    }

    #[tokio::test]
    async fn tenant_id_extractor_rejects_missing_header() {
        let request = axum::http::Request::builder()
            .uri("/")
            .body(axum::body::Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let result = TenantId::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tenant_id_extractor_rejects_blank_header() {
        let request = axum::http::Request::builder()
            .uri("/")
            .header("x-tenant-id", "   ")
            .body(axum::body::Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let result = TenantId::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn tenant_id_extractor_accepts_header() {
        let request = axum::http::Request::builder()
            .uri("/")
            .header("x-tenant-id", "tenant-acme")
            .body(axum::body::Body::empty())
            .unwrap();
        let (mut parts, _) = request.into_parts();

        let TenantId(tenant_id) = TenantId::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(tenant_id, "tenant-acme");
    }
}
