//! Flow policy engine (in-memory, no persistence): for a given `(stage, status)` pair, which
//! actions the caller is allowed to take and which one the UI should treat as primary.
//!
//! This is consulted by every transition command before it mutates an aggregate (C4) and by the
//! handlers that render a resource's `flow` block. The five stages here (`solicitacao`,
//! `cotacao`, `decisao`, `ordem_compra`, `fornecedor`) are a finer partition than the four-plus-one
//! `PROCESS_STAGES` sequence used for the visual tracker below: `fornecedor` covers the public
//! supplier-invite portal, which the tracker folds into `cotacao`/`erp` rather than giving its own
//! step. Keep both tables — they answer different questions.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStage {
    pub key: &'static str,
    pub label: &'static str,
}

pub static PROCESS_STAGES: &[ProcessStage] = &[
    ProcessStage { key: "solicitacao", label: "Solicitacao" },
    ProcessStage { key: "cotacao", label: "Cotacao" },
    ProcessStage { key: "decisao", label: "Decisao" },
    ProcessStage { key: "ordem_compra", label: "Ordem" },
    ProcessStage { key: "erp", label: "ERP" },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Completed,
    Current,
    Future,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProcessStep {
    pub key: &'static str,
    pub label: &'static str,
    pub state: StepState,
}

#[derive(Debug, Clone, Default)]
struct StatusPolicy {
    allowed_actions: &'static [&'static str],
    primary_action: Option<&'static str>,
}

static FLOW_POLICY: Lazy<HashMap<&'static str, HashMap<&'static str, StatusPolicy>>> = Lazy::new(|| {
    let mut stages = HashMap::new();

    let mut solicitacao = HashMap::new();
    solicitacao.insert("pending_rfq", StatusPolicy {
        allowed_actions: &[
            "edit_request", "update_request_status", "add_request_item", "edit_request_item",
            "delete_request_item", "cancel_request", "open_rfq", "view_inbox",
        ],
        primary_action: Some("open_rfq"),
    });
    solicitacao.insert("in_rfq", StatusPolicy {
        allowed_actions: &["edit_request", "update_request_status", "cancel_request", "view_quotes", "view_inbox"],
        primary_action: Some("view_quotes"),
    });
    solicitacao.insert("awarded", StatusPolicy {
        allowed_actions: &["view_quotes", "view_decision", "view_inbox", "view_history"],
        primary_action: Some("view_decision"),
    });
    solicitacao.insert("ordered", StatusPolicy {
        allowed_actions: &["view_order", "view_history", "view_inbox"],
        primary_action: Some("view_order"),
    });
    solicitacao.insert("partially_received", StatusPolicy {
        allowed_actions: &["view_order", "track_receipt", "view_history"],
        primary_action: Some("track_receipt"),
    });
    solicitacao.insert("received", StatusPolicy {
        allowed_actions: &["view_history"],
        primary_action: Some("view_history"),
    });
    solicitacao.insert("cancelled", StatusPolicy {
        allowed_actions: &["view_history"],
        primary_action: Some("view_history"),
    });
    stages.insert("solicitacao", solicitacao);

    let mut cotacao = HashMap::new();
    cotacao.insert("draft", StatusPolicy {
        allowed_actions: &["edit_rfq", "update_rfq_status", "invite_supplier", "cancel_rfq", "view_quotes"],
        primary_action: Some("invite_supplier"),
    });
    cotacao.insert("open", StatusPolicy {
        allowed_actions: &[
            "edit_rfq", "update_rfq_status", "invite_supplier", "manage_item_supplier",
            "reopen_invite", "extend_invite", "cancel_invite", "save_supplier_quote",
            "delete_supplier_proposal", "award_rfq", "cancel_rfq", "view_quotes",
        ],
        primary_action: Some("invite_supplier"),
    });
    cotacao.insert("collecting_quotes", StatusPolicy {
        allowed_actions: &[
            "edit_rfq", "update_rfq_status", "invite_supplier", "manage_item_supplier",
            "reopen_invite", "extend_invite", "cancel_invite", "save_supplier_quote",
            "delete_supplier_proposal", "award_rfq", "cancel_rfq", "view_quotes",
        ],
        primary_action: Some("award_rfq"),
    });
    cotacao.insert("closed", StatusPolicy {
        allowed_actions: &["update_rfq_status", "award_rfq", "cancel_rfq", "view_quotes"],
        primary_action: Some("award_rfq"),
    });
    cotacao.insert("awarded", StatusPolicy {
        allowed_actions: &["view_award", "create_purchase_order", "view_quotes"],
        primary_action: Some("create_purchase_order"),
    });
    cotacao.insert("cancelled", StatusPolicy {
        allowed_actions: &["view_history"],
        primary_action: Some("view_history"),
    });
    stages.insert("cotacao", cotacao);

    let mut decisao = HashMap::new();
    decisao.insert("awarded", StatusPolicy {
        allowed_actions: &["review_decision", "create_purchase_order", "view_quotes"],
        primary_action: Some("create_purchase_order"),
    });
    decisao.insert("converted_to_po", StatusPolicy {
        allowed_actions: &["review_decision", "view_order"],
        primary_action: Some("view_order"),
    });
    decisao.insert("cancelled", StatusPolicy {
        allowed_actions: &["review_decision", "view_history"],
        primary_action: Some("view_history"),
    });
    stages.insert("decisao", decisao);

    let mut ordem_compra = HashMap::new();
    ordem_compra.insert("draft", StatusPolicy {
        allowed_actions: &["view_order", "edit_order", "cancel_order", "push_to_erp"],
        primary_action: Some("push_to_erp"),
    });
    ordem_compra.insert("approved", StatusPolicy {
        allowed_actions: &["view_order", "edit_order", "cancel_order", "push_to_erp"],
        primary_action: Some("push_to_erp"),
    });
    ordem_compra.insert("sent_to_erp", StatusPolicy {
        allowed_actions: &["view_order", "refresh_order"],
        primary_action: Some("refresh_order"),
    });
    ordem_compra.insert("erp_error", StatusPolicy {
        allowed_actions: &["view_order", "edit_order", "cancel_order", "push_to_erp"],
        primary_action: Some("push_to_erp"),
    });
    ordem_compra.insert("erp_accepted", StatusPolicy {
        allowed_actions: &["view_order", "track_receipt", "view_history"],
        primary_action: Some("track_receipt"),
    });
    ordem_compra.insert("partially_received", StatusPolicy {
        allowed_actions: &["view_order", "track_receipt", "view_history"],
        primary_action: Some("track_receipt"),
    });
    ordem_compra.insert("received", StatusPolicy {
        allowed_actions: &["view_order", "view_history"],
        primary_action: Some("view_history"),
    });
    ordem_compra.insert("cancelled", StatusPolicy {
        allowed_actions: &["view_history"],
        primary_action: Some("view_history"),
    });
    stages.insert("ordem_compra", ordem_compra);

    let mut fornecedor = HashMap::new();
    fornecedor.insert("pending", StatusPolicy {
        allowed_actions: &["open_invite_portal", "extend_invite", "cancel_invite", "reopen_invite"],
        primary_action: Some("open_invite_portal"),
    });
    fornecedor.insert("opened", StatusPolicy {
        allowed_actions: &["submit_quote", "extend_invite", "cancel_invite", "reopen_invite"],
        primary_action: Some("submit_quote"),
    });
    fornecedor.insert("submitted", StatusPolicy {
        allowed_actions: &["reopen_invite", "view_history"],
        primary_action: Some("view_history"),
    });
    fornecedor.insert("expired", StatusPolicy {
        allowed_actions: &["reopen_invite", "cancel_invite"],
        primary_action: Some("reopen_invite"),
    });
    fornecedor.insert("cancelled", StatusPolicy {
        allowed_actions: &["reopen_invite", "view_history"],
        primary_action: Some("view_history"),
    });
    stages.insert("fornecedor", fornecedor);

    stages
});

fn status_policy(stage: &str, status: Option<&str>) -> StatusPolicy {
    let status = match status {
        Some(s) if !s.is_empty() => s,
        _ => return StatusPolicy::default(),
    };
    FLOW_POLICY
        .get(stage)
        .and_then(|statuses| statuses.get(status))
        .cloned()
        .unwrap_or_default()
}

pub fn allowed_actions(stage: &str, status: Option<&str>) -> Vec<String> {
    status_policy(stage, status)
        .allowed_actions
        .iter()
        .map(|s| s.to_string())
        .collect()
}

pub fn primary_action(stage: &str, status: Option<&str>) -> Option<String> {
    status_policy(stage, status).primary_action.map(str::to_string)
}

pub fn action_allowed(stage: &str, status: Option<&str>, action: &str) -> bool {
    if action.is_empty() {
        return false;
    }
    status_policy(stage, status).allowed_actions.contains(&action)
}

fn stage_index(stage: &str) -> usize {
    PROCESS_STAGES.iter().position(|s| s.key == stage).unwrap_or(0)
}

pub fn process_steps(current_stage: &str) -> Vec<ProcessStep> {
    let current_idx = stage_index(current_stage);
    PROCESS_STAGES
        .iter()
        .enumerate()
        .map(|(idx, stage)| ProcessStep {
            key: stage.key,
            label: stage.label,
            state: if idx < current_idx {
                StepState::Completed
            } else if idx == current_idx {
                StepState::Current
            } else {
                StepState::Future
            },
        })
        .collect()
}

pub fn stage_for_purchase_request_status(status: Option<&str>) -> &'static str {
    match status.unwrap_or("").trim() {
        "pending_rfq" => "solicitacao",
        "in_rfq" => "cotacao",
        "awarded" => "decisao",
        "ordered" => "ordem_compra",
        "partially_received" | "received" => "erp",
        _ => "solicitacao",
    }
}

pub fn stage_for_rfq_status(status: Option<&str>) -> &'static str {
    match status.unwrap_or("").trim() {
        "awarded" => "decisao",
        "draft" | "open" | "collecting_quotes" | "closed" | "cancelled" => "cotacao",
        _ => "cotacao",
    }
}

pub fn stage_for_award_status(status: Option<&str>) -> &'static str {
    match status.unwrap_or("").trim() {
        "converted_to_po" => "ordem_compra",
        "awarded" | "cancelled" => "decisao",
        _ => "decisao",
    }
}

pub fn stage_for_purchase_order_status(status: Option<&str>) -> &'static str {
    match status.unwrap_or("").trim() {
        "erp_accepted" | "partially_received" | "received" => "erp",
        _ => "ordem_compra",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_rfq_allows_open_rfq_as_primary() {
        assert_eq!(primary_action("solicitacao", Some("pending_rfq")), Some("open_rfq".to_string()));
        assert!(action_allowed("solicitacao", Some("pending_rfq"), "cancel_request"));
        assert!(!action_allowed("solicitacao", Some("pending_rfq"), "push_to_erp"));
    }

    #[test]
    fn unknown_status_falls_back_to_empty_policy() {
        assert!(allowed_actions("solicitacao", Some("nonexistent")).is_empty());
        assert_eq!(primary_action("solicitacao", None), None);
    }

    #[test]
    fn process_steps_mark_current_and_completed() {
        let steps = process_steps("decisao");
        assert_eq!(steps[0].state, StepState::Completed);
        assert_eq!(steps[1].state, StepState::Completed);
        assert_eq!(steps[2].state, StepState::Current);
        assert_eq!(steps[3].state, StepState::Future);
        assert_eq!(steps[4].state, StepState::Future);
    }

    #[test]
    fn collecting_quotes_allows_deleting_a_supplier_proposal() {
        assert!(action_allowed("cotacao", Some("open"), "delete_supplier_proposal"));
        assert!(action_allowed("cotacao", Some("collecting_quotes"), "delete_supplier_proposal"));
        assert!(!action_allowed("cotacao", Some("awarded"), "delete_supplier_proposal"));
    }

    #[test]
    fn purchase_order_erp_accepted_maps_to_erp_stage() {
        assert_eq!(stage_for_purchase_order_status(Some("erp_accepted")), "erp");
        assert_eq!(stage_for_purchase_order_status(Some("draft")), "ordem_compra");
    }
}
