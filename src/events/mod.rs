//! Domain events (C5): every status transition and ERP push outcome is published here so that
//! auditing, notification, and future integrations can react without the command layer knowing
//! about them directly.

pub mod outbox;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("failed to send event: {e}"))
    }
}

/// Every status-changing thing the procurement core does. `reason` mirrors the controlled
/// vocabulary stored on the corresponding `StatusEvent` row (C4), not free text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    PurchaseRequestStatusChanged {
        tenant_id: String,
        purchase_request_id: i64,
        from_status: Option<String>,
        to_status: String,
        reason: String,
    },
    RfqStatusChanged {
        tenant_id: String,
        rfq_id: i64,
        from_status: Option<String>,
        to_status: String,
        reason: String,
    },
    SupplierInviteOpened {
        tenant_id: String,
        invite_id: i64,
        rfq_id: i64,
    },
    SupplierQuoteSubmitted {
        tenant_id: String,
        invite_id: i64,
        quote_id: i64,
        rfq_id: i64,
    },
    SupplierQuoteWithdrawn {
        tenant_id: String,
        invite_id: i64,
        quote_id: i64,
        rfq_id: i64,
    },
    AwardRecorded {
        tenant_id: String,
        award_id: i64,
        rfq_id: i64,
        supplier_name: String,
    },
    PurchaseOrderStatusChanged {
        tenant_id: String,
        purchase_order_id: i64,
        from_status: Option<String>,
        to_status: String,
        reason: String,
    },
    PurchaseOrderPushQueued {
        tenant_id: String,
        purchase_order_id: i64,
        sync_run_id: i64,
    },
    PurchaseOrderPushSucceeded {
        tenant_id: String,
        purchase_order_id: i64,
        sync_run_id: i64,
        external_id: String,
    },
    PurchaseOrderPushFailed {
        tenant_id: String,
        purchase_order_id: i64,
        sync_run_id: i64,
        definitive: bool,
        details: String,
    },
    ReceiptRecorded {
        tenant_id: String,
        purchase_order_id: i64,
        external_receipt_id: String,
    },
}

/// Registered listeners process events asynchronously off the command path; a failure here is
/// logged but never unwinds the transition that produced the event.
#[async_trait::async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle_event(&self, event: Event) -> Result<(), String>;
}

pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("starting procurement event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::PurchaseRequestStatusChanged { purchase_request_id, to_status, .. } => {
                info!(purchase_request_id, to_status, "purchase request status changed");
            }
            Event::RfqStatusChanged { rfq_id, to_status, .. } => {
                info!(rfq_id, to_status, "rfq status changed");
            }
            Event::SupplierInviteOpened { invite_id, rfq_id, .. } => {
                info!(invite_id, rfq_id, "supplier invite opened");
            }
            Event::SupplierQuoteSubmitted { invite_id, quote_id, .. } => {
                info!(invite_id, quote_id, "supplier quote submitted");
            }
            Event::SupplierQuoteWithdrawn { invite_id, quote_id, rfq_id, .. } => {
                info!(invite_id, quote_id, rfq_id, "supplier quote withdrawn");
            }
            Event::AwardRecorded { award_id, rfq_id, supplier_name, .. } => {
                info!(award_id, rfq_id, supplier = %supplier_name, "award recorded");
            }
            Event::PurchaseOrderStatusChanged { purchase_order_id, to_status, .. } => {
                info!(purchase_order_id, to_status, "purchase order status changed");
            }
            Event::PurchaseOrderPushQueued { purchase_order_id, sync_run_id, .. } => {
                info!(purchase_order_id, sync_run_id, "purchase order erp push enqueued");
            }
            Event::PurchaseOrderPushSucceeded { purchase_order_id, sync_run_id, external_id, .. } => {
                info!(purchase_order_id, sync_run_id, external_id, "purchase order erp push succeeded");
            }
            Event::PurchaseOrderPushFailed { purchase_order_id, sync_run_id, definitive, details, .. } => {
                if *definitive {
                    error!(purchase_order_id, sync_run_id, details, "purchase order erp push rejected");
                } else {
                    error!(purchase_order_id, sync_run_id, details, "purchase order erp push failed, will retry");
                }
            }
            Event::ReceiptRecorded { purchase_order_id, external_receipt_id, .. } => {
                info!(purchase_order_id, external_receipt_id, "receipt recorded");
            }
        }
    }
}
