mod common;

use procurement_orchestrator::commands::procurement::award_rfq::AwardRfqCommand;
use procurement_orchestrator::commands::procurement::cancel_purchase_request::CancelPurchaseRequestCommand;
use procurement_orchestrator::commands::procurement::create_purchase_order_from_award::CreatePurchaseOrderFromAwardCommand;
use procurement_orchestrator::commands::procurement::create_purchase_request::{
    CreatePurchaseRequestCommand, CreatePurchaseRequestItem,
};
use procurement_orchestrator::commands::procurement::create_rfq::CreateRfqCommand;
use procurement_orchestrator::commands::procurement::delete_supplier_proposal::DeleteSupplierProposalCommand;
use procurement_orchestrator::commands::procurement::enqueue_erp_push::EnqueueErpPushCommand;
use procurement_orchestrator::commands::procurement::invite_suppliers::InviteSuppliersCommand;
use procurement_orchestrator::commands::procurement::submit_supplier_quote::{
    SubmitQuoteItemInput, SubmitSupplierQuoteCommand,
};
use procurement_orchestrator::commands::Command;
use procurement_orchestrator::critical_actions::ConfirmationInput;
use procurement_orchestrator::entities::award::AwardStatus;
use procurement_orchestrator::entities::purchase_order::PurchaseOrderStatus;
use procurement_orchestrator::entities::purchase_request::{Priority, PurchaseRequestStatus};
use procurement_orchestrator::entities::quote::QuoteStatus;
use procurement_orchestrator::entities::rfq::RfqStatus;
use procurement_orchestrator::entities::rfq_supplier_invite::{self, InviteStatus};
use procurement_orchestrator::errors::AppError;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, Set};

use common::TestDb;

fn confirmed() -> ConfirmationInput {
    ConfirmationInput {
        query_confirm_token: Some("confirmed-by-test".to_string()),
        ..Default::default()
    }
}

/// Walks a purchase request through every stage: solicitation, RFQ, supplier invite and quote,
/// award, purchase order, and ERP enqueue — checking status and the flow policy gate at each
/// step the way the handlers do.
#[tokio::test]
async fn full_procurement_flow_reaches_erp_enqueue() {
    let db = TestDb::new().await;
    let tenant_id = "tenant-acme".to_string();

    let pr = CreatePurchaseRequestCommand {
        tenant_id: tenant_id.clone(),
        number: "PR-0001".to_string(),
        priority: Priority::Medium,
        requested_by: Some("alice".to_string()),
        department: Some("engineering".to_string()),
        needed_at: None,
        items: vec![CreatePurchaseRequestItem {
            description: "Laptops".to_string(),
            quantity: 5,
            uom: "unit".to_string(),
            category: Some("hardware".to_string()),
        }],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("purchase request creation should succeed");

    assert_eq!(pr.status, PurchaseRequestStatus::PendingRfq);
    assert_eq!(pr.items_created, 1);

    let item_id = procurement_orchestrator::entities::purchase_request_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query purchase request item")
        .expect("a single purchase request item exists")
        .id;

    let rfq = CreateRfqCommand {
        tenant_id: tenant_id.clone(),
        purchase_request_id: pr.id,
        title: "Laptop RFQ".to_string(),
        purchase_request_item_ids: vec![item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("rfq creation should succeed");

    assert_eq!(rfq.status, RfqStatus::Open);
    assert_eq!(rfq.items_created, 1);

    let pr_after_rfq = procurement_orchestrator::entities::purchase_request::Entity::find_by_id(pr.id)
        .one(db.pool.as_ref())
        .await
        .expect("query purchase request")
        .expect("purchase request exists");
    assert_eq!(pr_after_rfq.status, PurchaseRequestStatus::InRfq);

    let rfq_item_id = procurement_orchestrator::entities::rfq_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query rfq item")
        .expect("a single rfq item exists")
        .id;

    let invited = InviteSuppliersCommand {
        tenant_id: tenant_id.clone(),
        rfq_id: rfq.id,
        supplier_ids: vec![42],
        rfq_item_ids: vec![rfq_item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("supplier invite should succeed");

    assert_eq!(invited.status, RfqStatus::Open);
    assert_eq!(invited.invites.len(), 1);
    let invite_token = invited.invites[0].token.clone();

    // Supplier opens the invite (the portal handler flips pending -> opened inline).
    let invite = rfq_supplier_invite::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query invite")
        .expect("one invite exists");
    assert_eq!(invite.status, InviteStatus::Pending);
    let mut active_invite: rfq_supplier_invite::ActiveModel = invite.into();
    active_invite.status = Set(InviteStatus::Opened);
    active_invite.opened_at = Set(Some(chrono::Utc::now()));
    active_invite.update(db.pool.as_ref()).await.expect("mark invite opened");

    let quote = SubmitSupplierQuoteCommand {
        invite_token,
        currency: "USD".to_string(),
        items: vec![SubmitQuoteItemInput {
            rfq_item_id,
            unit_price: Decimal::new(99900, 2),
            lead_time_days: Some(10),
        }],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("supplier quote submission should succeed");

    assert_eq!(quote.status, QuoteStatus::Submitted);
    assert_eq!(quote.rfq_id, rfq.id);

    let quote_item_id = procurement_orchestrator::entities::quote_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query quote item")
        .expect("one quote item exists")
        .id;

    let award = AwardRfqCommand {
        tenant_id: tenant_id.clone(),
        rfq_id: rfq.id,
        supplier_name: "Acme Supplies".to_string(),
        reason: "best_price".to_string(),
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("award should succeed");

    assert_eq!(award.rfq_status, RfqStatus::Awarded);

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

    assert_eq!(po.status, PurchaseOrderStatus::Draft);
    assert_eq!(po.total_amount, Decimal::new(99900, 2) * Decimal::from(5));

    let awarded_row = procurement_orchestrator::entities::award::Entity::find_by_id(award.award_id)
        .one(db.pool.as_ref())
        .await
        .expect("query award")
        .expect("award exists");
    assert_eq!(awarded_row.status, AwardStatus::ConvertedToPo);

    let enqueued = EnqueueErpPushCommand {
        tenant_id: tenant_id.clone(),
        purchase_order_id: po.purchase_order_id,
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("erp enqueue should succeed");

    assert_eq!(enqueued.status, PurchaseOrderStatus::SentToErp);
    assert!(!enqueued.already_queued);
    assert!(enqueued.sync_run_id.expect("a sync run id is returned for a fresh enqueue") > 0);
}

#[tokio::test]
async fn award_rfq_without_confirmation_is_rejected() {
    let db = TestDb::new().await;
    let tenant_id = "tenant-beta".to_string();

    let pr = CreatePurchaseRequestCommand {
        tenant_id: tenant_id.clone(),
        number: "PR-0002".to_string(),
        priority: Priority::Urgent,
        requested_by: None,
        department: None,
        needed_at: None,
        items: vec![CreatePurchaseRequestItem {
            description: "Chairs".to_string(),
            quantity: 20,
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
        .expect("query purchase request item")
        .expect("item exists")
        .id;

    let rfq = CreateRfqCommand {
        tenant_id: tenant_id.clone(),
        purchase_request_id: pr.id,
        title: "Chairs RFQ".to_string(),
        purchase_request_item_ids: vec![item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("rfq creation should succeed");

    let rfq_item_id = procurement_orchestrator::entities::rfq_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query rfq item")
        .expect("item exists")
        .id;

    InviteSuppliersCommand {
        tenant_id: tenant_id.clone(),
        rfq_id: rfq.id,
        supplier_ids: vec![7],
        rfq_item_ids: vec![rfq_item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("invite should succeed");

    let result = AwardRfqCommand {
        tenant_id,
        rfq_id: rfq.id,
        supplier_name: "Acme Supplies".to_string(),
        reason: "best_price".to_string(),
        confirmation: ConfirmationInput::default(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await;

    match result {
        Err(AppError::Validation { message_key, .. }) => {
            assert_eq!(message_key, "confirmation_required");
        }
        other => panic!("expected a confirmation_required validation error, got {other:?}"),
    }
}

#[tokio::test]
async fn deleting_a_supplier_proposal_reopens_its_invite() {
    let db = TestDb::new().await;
    let tenant_id = "tenant-gamma".to_string();

    let pr = CreatePurchaseRequestCommand {
        tenant_id: tenant_id.clone(),
        number: "PR-0004".to_string(),
        priority: Priority::Low,
        requested_by: None,
        department: None,
        needed_at: None,
        items: vec![CreatePurchaseRequestItem {
            description: "Keyboards".to_string(),
            quantity: 10,
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
        .expect("query purchase request item")
        .expect("item exists")
        .id;

    let rfq = CreateRfqCommand {
        tenant_id: tenant_id.clone(),
        purchase_request_id: pr.id,
        title: "Keyboard RFQ".to_string(),
        purchase_request_item_ids: vec![item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("rfq creation should succeed");

    let rfq_item_id = procurement_orchestrator::entities::rfq_item::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query rfq item")
        .expect("item exists")
        .id;

    InviteSuppliersCommand {
        tenant_id: tenant_id.clone(),
        rfq_id: rfq.id,
        supplier_ids: vec![99],
        rfq_item_ids: vec![rfq_item_id],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("invite should succeed");

    let invite_token = rfq_supplier_invite::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query invite")
        .expect("one invite exists")
        .token;

    let quote = SubmitSupplierQuoteCommand {
        invite_token,
        currency: "USD".to_string(),
        items: vec![SubmitQuoteItemInput {
            rfq_item_id,
            unit_price: Decimal::new(5000, 2),
            lead_time_days: Some(5),
        }],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("supplier quote submission should succeed");

    let deleted = DeleteSupplierProposalCommand {
        tenant_id: tenant_id.clone(),
        quote_id: quote.quote_id,
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("deleting the proposal should succeed");

    assert_eq!(deleted.rfq_id, rfq.id);
    assert!(deleted.invite_id.is_some());

    let remaining_quote = procurement_orchestrator::entities::quote::Entity::find_by_id(quote.quote_id)
        .one(db.pool.as_ref())
        .await
        .expect("query quote");
    assert!(remaining_quote.is_none());

    let invite_after_delete = rfq_supplier_invite::Entity::find()
        .one(db.pool.as_ref())
        .await
        .expect("query invite")
        .expect("invite still exists");
    assert_eq!(invite_after_delete.status, InviteStatus::Opened);
    assert!(invite_after_delete.submitted_at.is_none());
}

#[tokio::test]
async fn cancelling_a_request_from_the_wrong_tenant_is_not_found() {
    let db = TestDb::new().await;

    let pr = CreatePurchaseRequestCommand {
        tenant_id: "tenant-one".to_string(),
        number: "PR-0003".to_string(),
        priority: Priority::Low,
        requested_by: None,
        department: None,
        needed_at: None,
        items: vec![CreatePurchaseRequestItem {
            description: "Monitors".to_string(),
            quantity: 3,
            uom: "unit".to_string(),
            category: None,
        }],
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("purchase request creation should succeed");

    let result = CancelPurchaseRequestCommand {
        tenant_id: "tenant-two".to_string(),
        purchase_request_id: pr.id,
        reason: "no_longer_needed".to_string(),
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await;

    assert!(matches!(result, Err(AppError::NotFound { .. })));

    let cancelled = CancelPurchaseRequestCommand {
        tenant_id: "tenant-one".to_string(),
        purchase_request_id: pr.id,
        reason: "no_longer_needed".to_string(),
        confirmation: confirmed(),
    }
    .execute(db.pool.clone(), db.event_sender.clone())
    .await
    .expect("cancelling from the owning tenant should succeed");

    assert_eq!(cancelled.status, PurchaseRequestStatus::Cancelled);
}
