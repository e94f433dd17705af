//! The critical-action confirmation gate (C2): a small fixed set of actions that must never
//! execute as a side effect of an innocuous request. Handlers collect whatever confirmation
//! signal the caller sent (JSON body, query string, form body, header) into a
//! [`ConfirmationInput`] and ask [`resolve_confirmation`] whether it counts.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde_json::Value;

#[derive(Debug, Clone, Copy)]
pub struct CriticalAction {
    pub action_key: &'static str,
    pub confirm_message_key: &'static str,
    pub impact_text_key: &'static str,
}

static CRITICAL_ACTIONS: Lazy<HashMap<&'static str, CriticalAction>> = Lazy::new(|| {
    HashMap::from([
        ("cancel_request", CriticalAction {
            action_key: "cancel_request",
            confirm_message_key: "cancel_request",
            impact_text_key: "impact.cancel_request",
        }),
        ("cancel_rfq", CriticalAction {
            action_key: "cancel_rfq",
            confirm_message_key: "cancel_quote",
            impact_text_key: "impact.cancel_rfq",
        }),
        ("cancel_order", CriticalAction {
            action_key: "cancel_order",
            confirm_message_key: "cancel_order",
            impact_text_key: "impact.cancel_order",
        }),
        ("cancel_invite", CriticalAction {
            action_key: "cancel_invite",
            confirm_message_key: "cancel_invite",
            impact_text_key: "impact.cancel_invite",
        }),
        ("push_to_erp", CriticalAction {
            action_key: "push_to_erp",
            confirm_message_key: "push_order_erp",
            impact_text_key: "impact.push_to_erp",
        }),
        ("award_rfq", CriticalAction {
            action_key: "award_rfq",
            confirm_message_key: "award_rfq",
            impact_text_key: "impact.award_rfq",
        }),
        ("create_purchase_order", CriticalAction {
            action_key: "create_purchase_order",
            confirm_message_key: "create_purchase_order",
            impact_text_key: "impact.create_purchase_order",
        }),
        ("delete_supplier_proposal", CriticalAction {
            action_key: "delete_supplier_proposal",
            confirm_message_key: "delete_supplier_proposal",
            impact_text_key: "impact.delete_supplier_proposal",
        }),
    ])
});

pub fn get_critical_action(action_key: &str) -> Option<CriticalAction> {
    let trimmed = action_key.trim();
    if trimmed.is_empty() {
        return None;
    }
    CRITICAL_ACTIONS.get(trimmed).copied()
}

pub fn is_critical_action(action_key: &str) -> bool {
    get_critical_action(action_key).is_some()
}

const TRUE_TEXT_VALUES: &[&str] = &["1", "true", "yes", "on"];

fn is_explicit_true(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f == 1.0).unwrap_or(false),
        Value::String(s) => TRUE_TEXT_VALUES.contains(&s.trim().to_lowercase().as_str()),
        _ => false,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationMode {
    ConfirmToken,
    ConfirmFlag,
    MissingConfirmation,
}

impl ConfirmationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ConfirmationMode::ConfirmToken => "confirm_token",
            ConfirmationMode::ConfirmFlag => "confirm_flag",
            ConfirmationMode::MissingConfirmation => "missing_confirmation",
        }
    }
}

/// Every place a caller might have supplied a confirmation signal, gathered by the handler
/// before the command layer ever runs. Fields are checked in priority order:
/// payload -> query -> form -> header.
#[derive(Debug, Clone, Default)]
pub struct ConfirmationInput {
    pub payload_confirm_token: Option<String>,
    pub query_confirm_token: Option<String>,
    pub form_confirm_token: Option<String>,
    pub header_confirm_token: Option<String>,
    pub payload_confirm: Option<Value>,
    pub query_confirm: Option<Value>,
    pub form_confirm: Option<Value>,
    pub header_confirm: Option<Value>,
}

/// Resolves `(confirmed, mode)` for a critical action request. Any non-empty confirm token wins
/// outright; otherwise falls back to an explicit-true confirm flag; otherwise unconfirmed.
pub fn resolve_confirmation(input: &ConfirmationInput) -> (bool, ConfirmationMode) {
    let token = input
        .payload_confirm_token
        .as_deref()
        .or(input.query_confirm_token.as_deref())
        .or(input.form_confirm_token.as_deref())
        .or(input.header_confirm_token.as_deref());
    if let Some(token) = token {
        if !token.trim().is_empty() {
            return (true, ConfirmationMode::ConfirmToken);
        }
    }

    let confirm_value = input
        .payload_confirm
        .as_ref()
        .or(input.query_confirm.as_ref())
        .or(input.form_confirm.as_ref())
        .or(input.header_confirm.as_ref());

    if let Some(value) = confirm_value {
        if is_explicit_true(value) {
            return (true, ConfirmationMode::ConfirmFlag);
        }
    }

    (false, ConfirmationMode::MissingConfirmation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn known_critical_actions_resolve() {
        assert!(is_critical_action("push_to_erp"));
        assert!(!is_critical_action("view_order"));
        assert!(!is_critical_action(""));
        assert!(!is_critical_action("  "));
    }

    #[test]
    fn non_empty_confirm_token_wins_regardless_of_flag() {
        let input = ConfirmationInput {
            query_confirm_token: Some("abc123".to_string()),
            payload_confirm: Some(json!(false)),
            ..Default::default()
        };
        let (confirmed, mode) = resolve_confirmation(&input);
        assert!(confirmed);
        assert_eq!(mode, ConfirmationMode::ConfirmToken);
    }

    #[test]
    fn blank_token_falls_through_to_flag() {
        let input = ConfirmationInput {
            header_confirm_token: Some("   ".to_string()),
            form_confirm: Some(json!("yes")),
            ..Default::default()
        };
        let (confirmed, mode) = resolve_confirmation(&input);
        assert!(confirmed);
        assert_eq!(mode, ConfirmationMode::ConfirmFlag);
    }

    #[test]
    fn numeric_and_string_truthy_flags_are_explicit_true_only() {
        assert!(is_explicit_true(&json!(1)));
        assert!(!is_explicit_true(&json!(2)));
        assert!(is_explicit_true(&json!("On")));
        assert!(!is_explicit_true(&json!("nah")));
    }

    #[test]
    fn nothing_present_is_missing_confirmation() {
        let (confirmed, mode) = resolve_confirmation(&ConfirmationInput::default());
        assert!(!confirmed);
        assert_eq!(mode, ConfirmationMode::MissingConfirmation);
    }
}
