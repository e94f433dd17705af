//! Router-level tests (C11): drive the actual `axum::Router` through `tower::ServiceExt::oneshot`
//! instead of calling commands directly, so a routing mistake (wrong method, wrong path, a missing
//! `X-Tenant-Id` extractor) would actually fail a test.

mod common;

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use procurement_orchestrator::config::{AppConfig, SyncSchedulerConfig};
use procurement_orchestrator::entities::purchase_request_item;
use procurement_orchestrator::erp::mock::MockErpGateway;
use procurement_orchestrator::erp::ErpGateway;
use procurement_orchestrator::handlers::{self, AppState};
use procurement_orchestrator::workers::sync_scheduler::SyncScheduler;
use sea_orm::EntityTrait;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::TestDb;

async fn test_app(db: &TestDb) -> axum::Router {
    let gateway: Arc<dyn ErpGateway> = Arc::new(MockErpGateway::new());
    let sync_scheduler = Arc::new(SyncScheduler::new(
        db.pool.clone(),
        gateway,
        SyncSchedulerConfig::default(),
    ));
    let state = AppState {
        db: db.pool.clone(),
        event_sender: db.event_sender.clone(),
        config: Arc::new(AppConfig::default()),
        sync_scheduler,
        started_at: std::time::Instant::now(),
    };
    handlers::routes().with_state(state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read response body");
    serde_json::from_slice(&bytes).expect("response body is valid json")
}

#[tokio::test]
async fn creating_a_purchase_request_without_tenant_header_is_rejected() {
    let db = TestDb::new().await;
    let app = test_app(&db).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/procurement/solicitacoes")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "number": "PR-ROUTER-1",
                "priority": "medium",
                "items": [{"description": "Monitors", "quantity": 2, "uom": "unit"}],
            })
            .to_string(),
        ))
        .unwrap();

    let response = app.oneshot(request).await.expect("request completes");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn full_procurement_flow_through_the_http_router() {
    let db = TestDb::new().await;
    let app = test_app(&db).await;

    let create_pr = Request::builder()
        .method("POST")
        .uri("/api/procurement/solicitacoes")
        .header("content-type", "application/json")
        .header("x-tenant-id", "tenant-router")
        .body(Body::from(
            json!({
                "number": "PR-ROUTER-2",
                "priority": "medium",
                "items": [{"description": "Monitors", "quantity": 2, "uom": "unit"}],
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create_pr).await.expect("request completes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let pr_body = body_json(response).await;
    let pr_id = pr_body["id"].as_i64().expect("purchase request id");
    assert_eq!(pr_body["status"], "pending_rfq");

    let item_id = purchase_request_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query item")
        .expect("one item exists")
        .id;

    let create_rfq = Request::builder()
        .method("POST")
        .uri("/api/procurement/rfqs")
        .header("content-type", "application/json")
        .header("x-tenant-id", "tenant-router")
        .body(Body::from(
            json!({
                "purchase_request_id": pr_id,
                "title": "Monitor RFQ",
                "purchase_request_item_ids": [item_id],
            })
            .to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(create_rfq).await.expect("request completes");
    assert_eq!(response.status(), StatusCode::CREATED);
    let rfq_body = body_json(response).await;
    assert_eq!(rfq_body["status"], "open");

    let cancel = Request::builder()
        .method("DELETE")
        .uri(format!("/api/procurement/solicitacoes/{pr_id}?confirm=true"))
        .header("content-type", "application/json")
        .header("x-tenant-id", "tenant-router")
        .body(Body::from(json!({ "reason": "duplicate_request" }).to_string()))
        .unwrap();
    let response = app.clone().oneshot(cancel).await.expect("request completes");
    assert_eq!(response.status(), StatusCode::OK);
    let cancel_body = body_json(response).await;
    assert_eq!(cancel_body["status"], "cancelled");
}
