//! Procurement commands (C4): one struct per transition, each following the same protocol —
//! load the aggregate in a transaction, check it isn't ERP-managed read-only, ask the flow
//! policy engine (C1) whether the action is allowed from the current status, ask the critical
//! action gate (C2) for confirmation when the action demands it, mutate and append a
//! `StatusEvent`, then commit and publish the resulting domain event.

pub mod award_rfq;
pub mod cancel_purchase_request;
pub mod create_purchase_order_from_award;
pub mod create_purchase_request;
pub mod create_rfq;
pub mod delete_supplier_proposal;
pub mod enqueue_erp_push;
pub mod invite_suppliers;
pub mod submit_supplier_quote;

use chrono::Utc;
use sea_orm::{ActiveModelTrait, ConnectionTrait, Set};

use crate::critical_actions::{get_critical_action, resolve_confirmation, ConfirmationInput};
use crate::entities::status_event::{self, is_critical_reason, EntityKind};
use crate::errors::{AppError, FlowPolicyContext};
use crate::flow_policy;

/// Refuses the action unless flow policy allows it from the aggregate's current status.
pub fn ensure_action_allowed(stage: &str, status: &str, action: &str) -> Result<(), AppError> {
    if flow_policy::action_allowed(stage, Some(status), action) {
        return Ok(());
    }
    Err(AppError::flow_policy_denied(
        action,
        FlowPolicyContext {
            allowed_actions: flow_policy::allowed_actions(stage, Some(status)),
            primary_action: flow_policy::primary_action(stage, Some(status)),
        },
    ))
}

/// Refuses a critical action unless the caller supplied a confirmation signal. On success,
/// appends a `tracing::info!` audit line naming the action, the aggregate it was confirmed
/// against, the confirming tenant, and which confirmation signal won — there is no separate
/// audit log table, so this line is the record.
pub fn ensure_confirmed(
    action_key: &str,
    tenant_id: &str,
    entity: EntityKind,
    entity_id: i64,
    input: &ConfirmationInput,
) -> Result<(), AppError> {
    if get_critical_action(action_key).is_none() {
        return Ok(());
    }
    let (confirmed, mode) = resolve_confirmation(input);
    if confirmed {
        tracing::info!(
            action = action_key,
            entity = ?entity,
            entity_id,
            tenant_id,
            confirmation_mode = mode.as_str(),
            "critical action confirmed"
        );
        Ok(())
    } else {
        Err(AppError::confirmation_required())
    }
}

/// Appends an audit row for a status transition. `reason` is the controlled vocabulary key for
/// the transition (e.g. `rfq_cancelled`), never free text.
pub async fn record_status_event(
    db: &impl ConnectionTrait,
    tenant_id: &str,
    entity: EntityKind,
    entity_id: i64,
    from_status: Option<String>,
    to_status: impl Into<String>,
    reason: impl Into<String>,
) -> Result<(), AppError> {
    let reason = reason.into();
    status_event::ActiveModel {
        tenant_id: Set(tenant_id.to_string()),
        entity: Set(entity),
        entity_id: Set(entity_id),
        from_status: Set(from_status),
        to_status: Set(to_status.into()),
        reason: Set(reason.clone()),
        occurred_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    if is_critical_reason(&reason) {
        tracing::warn!(
            entity = ?entity,
            entity_id,
            reason,
            tenant_id,
            "governance-sensitive status transition recorded"
        );
    }
    Ok(())
}
