mod common;

use procurement_orchestrator::circuit_breaker::CircuitBreaker;
use procurement_orchestrator::commands::procurement::award_rfq::AwardRfqCommand;
use procurement_orchestrator::commands::procurement::create_purchase_order_from_award::CreatePurchaseOrderFromAwardCommand;
use procurement_orchestrator::commands::procurement::create_purchase_request::{
    CreatePurchaseRequestCommand, CreatePurchaseRequestItem,
};
use procurement_orchestrator::commands::procurement::create_rfq::CreateRfqCommand;
use procurement_orchestrator::commands::procurement::enqueue_erp_push::EnqueueErpPushCommand;
use procurement_orchestrator::commands::procurement::invite_suppliers::InviteSuppliersCommand;
use procurement_orchestrator::commands::procurement::submit_supplier_quote::{
    SubmitQuoteItemInput, SubmitSupplierQuoteCommand,
};
use procurement_orchestrator::commands::Command;
use procurement_orchestrator::config::{ErpCircuitConfig, ErpOutboxConfig};
use procurement_orchestrator::critical_actions::ConfirmationInput;
use procurement_orchestrator::entities::purchase_order::{self, PurchaseOrderStatus};
use procurement_orchestrator::entities::purchase_request::Priority;
use procurement_orchestrator::erp::mock::MockErpGateway;
use procurement_orchestrator::erp::ErpGateway;
use procurement_orchestrator::workers::erp_outbox_worker::ErpOutboxWorker;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};
use std::sync::Arc;

use common::TestDb;

fn confirmed() -> ConfirmationInput {
    ConfirmationInput {
        query_confirm_token: Some("confirmed-by-test".to_string()),
        ..Default::default()
    }
}

/// Drives a purchase order all the way to an ERP push enqueue, then runs the outbox worker
/// against the mock gateway and checks the order lands as accepted with an external id stamped.
#[tokio::test]
async fn outbox_worker_accepts_a_well_formed_push() {
    let db = TestDb::new().await;
    let tenant_id = "tenant-outbox".to_string();

    let pr = CreatePurchaseRequestCommand {
        tenant_id: tenant_id.clone(),
        number: "PR-9001".to_string(),
        priority: Priority::High,
        requested_by: None,
        department: None,
        needed_at: None,
        items: vec![CreatePurchaseRequestItem {
            description: "Server racks".to_string(),
            quantity: 2,
            uom: "unit".to_string(),
            category: None,
        }],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("purchase request creation should succeed");

    let item_id = procurement_orchestrator::entities::purchase_request_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query item")
        .expect("item exists")
        .id;

    let rfq = CreateRfqCommand {
        tenant_id: tenant_id.clone(),
        purchase_request_id: pr.id,
        title: "Server rack RFQ".to_string(),
        purchase_request_item_ids: vec![item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("rfq creation should succeed");

    let rfq_item_id = procurement_orchestrator::entities::rfq_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query rfq item")
        .expect("rfq item exists")
        .id;

    let invited = InviteSuppliersCommand {
        tenant_id: tenant_id.clone(),
        rfq_id: rfq.id,
        supplier_ids: vec![1],
        rfq_item_ids: vec![rfq_item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("invite should succeed");

    let quote = SubmitSupplierQuoteCommand {
        invite_token: invited.invites[0].token.clone(),
        currency: "USD".to_string(),
        items: vec![SubmitQuoteItemInput {
            rfq_item_id,
            unit_price: Decimal::new(500000, 2),
            lead_time_days: Some(30),
        }],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("quote submission should succeed");

    let quote_item_id = procurement_orchestrator::entities::quote_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query quote item")
        .expect("quote item exists")
        .id;
    assert_eq!(quote.rfq_id, rfq.id);

    let award = AwardRfqCommand {
        tenant_id: tenant_id.clone(),
        rfq_id: rfq.id,
        supplier_name: "Rack Supplier Inc".to_string(),
        reason: "only_bidder".to_string(),
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("award should succeed");

    let po = CreatePurchaseOrderFromAwardCommand {
        tenant_id: tenant_id.clone(),
        award_id: award.award_id,
        quote_item_ids: vec![quote_item_id],
        currency: "USD".to_string(),
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("purchase order creation should succeed");

    EnqueueErpPushCommand {
        tenant_id: tenant_id.clone(),
        purchase_order_id: po.purchase_order_id,
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("erp enqueue should succeed");

    let gateway: Arc<dyn ErpGateway> = Arc::new(MockErpGateway::new());
    let circuit = CircuitBreaker::new(ErpCircuitConfig::default());
    let worker = ErpOutboxWorker::new(
        db.pool.clone(),
        gateway,
        circuit,
        ErpOutboxConfig::default(),
        db.event_sender.clone(),
    );

    let stats = worker
        .run_once(Some(tenant_id.as_str()), 10)
        .await
        .expect("outbox worker run should succeed");

    assert_eq!(stats.processed, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(stats.dead_lettered, 0);

    let updated_po = purchase_order::Entity::find_by_id(po.purchase_order_id)
        .one(db.pool.as_ref())
        .await
        .expect("query purchase order")
        .expect("purchase order exists");

    assert_eq!(updated_po.status, PurchaseOrderStatus::ErpAccepted);
    assert!(updated_po.external_id.as_deref().unwrap_or("").starts_with("SENIOR-OC-"));
}

/// A purchase order with no lines fails the canonical envelope's schema check and is
/// dead-lettered on the first attempt rather than retried.
#[tokio::test]
async fn outbox_worker_dead_letters_a_po_with_no_lines() {
    let db = TestDb::new().await;
    let tenant_id = "tenant-empty-po".to_string();
    let now = chrono::Utc::now();

    let po = purchase_order::ActiveModel {
        tenant_id: Set(tenant_id.clone()),
        number: Set("PO-EMPTY-1".to_string()),
        award_id: Set(None),
        supplier_name: Set("Nobody".to_string()),
        status: Set(PurchaseOrderStatus::Draft),
        currency: Set("USD".to_string()),
        total_amount: Set(Decimal::ZERO),
        erp_last_error: Set(None),
        external_id: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db.pool.as_ref())
    .await
    .expect("seed an empty purchase order");

    let canonical = procurement_orchestrator::events::outbox::CanonicalPurchaseOrder::new(&tenant_id, &po, &[]);
    procurement_orchestrator::events::outbox::enqueue_purchase_order_push(
        db.pool.as_ref(),
        &tenant_id,
        po.id,
        canonical,
    )
    .await
    .expect("enqueue should succeed even for a doomed payload");

    let gateway: Arc<dyn ErpGateway> = Arc::new(MockErpGateway::new());
    let circuit = CircuitBreaker::new(ErpCircuitConfig::default());
    let worker = ErpOutboxWorker::new(
        db.pool.clone(),
        gateway,
        circuit,
        ErpOutboxConfig::default(),
        db.event_sender.clone(),
    );

    let stats = worker
        .run_once(Some(tenant_id.as_str()), 10)
        .await
        .expect("outbox worker run should succeed");

    assert_eq!(stats.dead_lettered, 1);
    assert_eq!(stats.succeeded, 0);

    let updated_po = purchase_order::Entity::find_by_id(po.id)
        .one(db.pool.as_ref())
        .await
        .expect("query purchase order")
        .expect("purchase order exists");
    assert_eq!(updated_po.status, PurchaseOrderStatus::ErpError);
}
