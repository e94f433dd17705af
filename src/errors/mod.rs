//! Crate-wide error taxonomy for the procurement core.
//!
//! Every domain service returns `Result<T, AppError>`. The HTTP adapter (C11) is the only
//! place that turns a variant into a response; nothing upstream formats HTTP status codes or
//! renders user-facing text directly.

pub mod messages;

use std::fmt;

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use once_cell::sync::Lazy;
use regex::Regex;
use sea_orm::DbErr;
use serde_json::{json, Value};

use messages::error_message;

/// The actions in `allowed_actions` and the optional `primary_action` a flow-policy denial
/// reports back to the caller, taken verbatim from the flow policy engine (C1).
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct FlowPolicyContext {
    pub allowed_actions: Vec<String>,
    pub primary_action: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("validation error: {message_key}")]
    Validation {
        code: String,
        message_key: String,
        payload: Value,
    },
    #[error("permission denied")]
    Permission { message_key: String, http_status: u16 },
    #[error("flow policy denied: {action_attempted}")]
    FlowPolicy {
        action_attempted: String,
        context: FlowPolicyContext,
    },
    #[error("not found")]
    NotFound { message_key: String },
    #[error("erp managed readonly")]
    ErpManagedReadonly { message_key: String },
    #[error("integration error: {message_key}")]
    Integration {
        code: String,
        message_key: String,
        http_status: u16,
        definitive: bool,
    },
    #[error("system error: {details}")]
    System { details: String },
}

impl AppError {
    pub fn validation(message_key: impl Into<String>) -> Self {
        AppError::Validation {
            code: "validation_error".to_string(),
            message_key: message_key.into(),
            payload: json!({}),
        }
    }

    pub fn validation_with_payload(message_key: impl Into<String>, payload: Value) -> Self {
        AppError::Validation {
            code: "validation_error".to_string(),
            message_key: message_key.into(),
            payload,
        }
    }

    pub fn confirmation_required() -> Self {
        Self::validation("confirmation_required")
    }

    pub fn permission_denied() -> Self {
        AppError::Permission {
            message_key: "permission_denied".to_string(),
            http_status: 403,
        }
    }

    pub fn not_found() -> Self {
        AppError::NotFound {
            message_key: "not_found".to_string(),
        }
    }

    pub fn erp_managed_readonly(message_key: impl Into<String>) -> Self {
        AppError::ErpManagedReadonly {
            message_key: message_key.into(),
        }
    }

    pub fn flow_policy_denied(action_attempted: impl Into<String>, context: FlowPolicyContext) -> Self {
        AppError::FlowPolicy {
            action_attempted: action_attempted.into(),
            context,
        }
    }

    pub fn system(details: impl fmt::Display) -> Self {
        AppError::System {
            details: details.to_string(),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            AppError::Validation { code, .. } => code,
            AppError::Permission { .. } => "permission_denied",
            AppError::FlowPolicy { .. } => "action_not_allowed_for_status",
            AppError::NotFound { .. } => "not_found",
            AppError::ErpManagedReadonly { .. } => "erp_managed_readonly",
            AppError::Integration { code, .. } => code,
            AppError::System { .. } => "system_error",
        }
    }

    pub fn message_key(&self) -> &str {
        match self {
            AppError::Validation { message_key, .. } => message_key,
            AppError::Permission { message_key, .. } => message_key,
            AppError::FlowPolicy { .. } => "action_not_allowed_for_status",
            AppError::NotFound { message_key } => message_key,
            AppError::ErpManagedReadonly { message_key } => message_key,
            AppError::Integration { message_key, .. } => message_key,
            AppError::System { .. } => "unexpected_error",
        }
    }

    pub fn http_status(&self) -> StatusCode {
        let code = match self {
            AppError::Validation { .. } => 400,
            AppError::Permission { http_status, .. } => *http_status,
            AppError::FlowPolicy { .. } => 409,
            AppError::NotFound { .. } => 404,
            AppError::ErpManagedReadonly { .. } => 409,
            AppError::Integration { http_status, .. } => *http_status,
            AppError::System { .. } => 500,
        };
        StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Critical errors are logged at `error!`; non-critical ones at `warn!`.
    pub fn critical(&self) -> bool {
        matches!(self, AppError::System { .. })
    }

    pub fn user_message(&self) -> String {
        error_message(self.message_key(), &messages::unexpected_error_message())
    }

    pub fn to_response_payload(&self, request_id: &str) -> Value {
        let mut payload = json!({
            "error": self.code(),
            "message": self.user_message(),
            "request_id": request_id,
        });
        match self {
            AppError::Validation { payload: extra, .. } => {
                if let (Some(obj), Value::Object(extra)) = (payload.as_object_mut(), extra) {
                    obj.extend(extra.clone());
                }
            }
            AppError::FlowPolicy { context, .. } => {
                if let Some(obj) = payload.as_object_mut() {
                    obj.insert("allowed_actions".into(), json!(context.allowed_actions));
                    obj.insert("primary_action".into(), json!(context.primary_action));
                }
            }
            _ => {}
        }
        payload
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.critical() {
            tracing::error!(error = %self, code = self.code(), "request failed");
        } else {
            tracing::warn!(error = %self, code = self.code(), "request rejected");
        }
        let request_id = uuid::Uuid::new_v4().to_string();
        let payload = self.to_response_payload(&request_id);
        (self.http_status(), Json(payload)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::system(err)
    }
}

impl From<JsonRejection> for AppError {
    fn from(err: JsonRejection) -> Self {
        AppError::validation_with_payload("status_invalid", json!({ "details": err.body_text() }))
    }
}

static ERP_HTTP_CODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)erp http\s+(\d{3})").unwrap());

const REJECTION_MARKERS: &[&str] = &["recusou", "rejeitou", "invalid", "invalido", "rejected"];

/// Classifies a raw ERP gateway failure into `(code, message_key, http_status, definitive)`,
/// driving the outbox worker's retry-vs-dead-letter decision (C7 step d/e/f).
pub fn classify_erp_failure(details: &str) -> (&'static str, &'static str, u16, bool) {
    let normalized = details.to_lowercase();

    if let Some(caps) = ERP_HTTP_CODE_PATTERN.captures(&normalized) {
        if let Ok(http_code) = caps[1].parse::<u16>() {
            if (400..500).contains(&http_code) && http_code != 408 && http_code != 429 {
                return ("erp_order_rejected", "erp_order_rejected", 422, true);
            }
        }
    }

    if REJECTION_MARKERS.iter().any(|marker| normalized.contains(marker)) {
        return ("erp_order_rejected", "erp_order_rejected", 422, true);
    }

    ("erp_temporarily_unavailable", "erp_temporarily_unavailable", 502, false)
}

pub fn integration_error_from_erp_failure(details: &str) -> AppError {
    let (code, message_key, http_status, definitive) = classify_erp_failure(details);
    AppError::Integration {
        code: code.to_string(),
        message_key: message_key.to_string(),
        http_status,
        definitive,
    }
}

const DISPLAY_REJECTION_HINTS: &[&str] = &["rejeit", "recus", "reject", "invalid", "inval", "422"];

/// The coarse, user-facing ERP status classification surfaced on PurchaseOrder/PurchaseRequest
/// payloads — distinct from the push-time retry classification above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErpStatusKey {
    NaoEnviado,
    Enviado,
    Aceito,
    Rejeitado,
    ReenvioNecessario,
}

impl fmt::Display for ErpStatusKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErpStatusKey::NaoEnviado => "nao_enviado",
            ErpStatusKey::Enviado => "enviado",
            ErpStatusKey::Aceito => "aceito",
            ErpStatusKey::Rejeitado => "rejeitado",
            ErpStatusKey::ReenvioNecessario => "reenvio_necessario",
        };
        f.write_str(s)
    }
}

/// Maps a purchase order's technical status plus its `erp_last_error` into the display
/// classification shown on the order's ERP status chip.
pub fn erp_status_key(technical_status: &str, erp_last_error: Option<&str>) -> ErpStatusKey {
    match technical_status {
        "draft" | "approved" | "cancelled" => ErpStatusKey::NaoEnviado,
        "sent_to_erp" => ErpStatusKey::Enviado,
        "erp_accepted" | "partially_received" | "received" => ErpStatusKey::Aceito,
        _ => {
            if let Some(err) = erp_last_error {
                let normalized = err.to_lowercase();
                if DISPLAY_REJECTION_HINTS.iter().any(|hint| normalized.contains(hint)) {
                    ErpStatusKey::Rejeitado
                } else {
                    ErpStatusKey::ReenvioNecessario
                }
            } else {
                ErpStatusKey::NaoEnviado
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_definitive_http_4xx_as_rejection() {
        let (code, _, status, definitive) = classify_erp_failure("ERP HTTP 422: numero de pedido invalido");
        assert_eq!(code, "erp_order_rejected");
        assert_eq!(status, 422);
        assert!(definitive);
    }

    #[test]
    fn treats_408_and_429_as_temporary() {
        let (_, _, status, definitive) = classify_erp_failure("ERP HTTP 429: too many requests");
        assert_eq!(status, 502);
        assert!(!definitive);
    }

    #[test]
    fn marker_without_http_code_is_definitive() {
        let (code, _, _, definitive) = classify_erp_failure("pedido rejeitado pelo fornecedor");
        assert_eq!(code, "erp_order_rejected");
        assert!(definitive);
    }

    #[test]
    fn unknown_failure_is_temporary() {
        let (code, _, status, definitive) = classify_erp_failure("connection reset by peer");
        assert_eq!(code, "erp_temporarily_unavailable");
        assert_eq!(status, 502);
        assert!(!definitive);
    }

    #[test]
    fn erp_status_key_matches_rejection_display_hints() {
        assert_eq!(
            erp_status_key("erp_error", Some("ERP rejeitou o pedido")),
            ErpStatusKey::Rejeitado
        );
        assert_eq!(
            erp_status_key("erp_error", Some("timeout esperando resposta")),
            ErpStatusKey::ReenvioNecessario
        );
        assert_eq!(erp_status_key("sent_to_erp", None), ErpStatusKey::Enviado);
        assert_eq!(erp_status_key("erp_accepted", None), ErpStatusKey::Aceito);
    }

    #[test]
    fn classify_erp_failure_always_returns_a_422_or_502() {
        assert_matches::assert_matches!(
            classify_erp_failure("ERP HTTP 422: numero de pedido invalido"),
            ("erp_order_rejected", "erp_order_rejected", 422, true)
        );
        assert_matches::assert_matches!(
            classify_erp_failure("connection reset by peer"),
            ("erp_temporarily_unavailable", "erp_temporarily_unavailable", 502, false)
        );
    }

    use test_case::test_case;

    #[test_case("draft", None => ErpStatusKey::NaoEnviado)]
    #[test_case("approved", None => ErpStatusKey::NaoEnviado)]
    #[test_case("cancelled", None => ErpStatusKey::NaoEnviado)]
    #[test_case("sent_to_erp", None => ErpStatusKey::Enviado)]
    #[test_case("erp_accepted", None => ErpStatusKey::Aceito)]
    #[test_case("partially_received", None => ErpStatusKey::Aceito)]
    #[test_case("received", None => ErpStatusKey::Aceito)]
    #[test_case("erp_error", None => ErpStatusKey::NaoEnviado)]
    fn erp_status_key_covers_each_technical_status(
        technical_status: &str,
        erp_last_error: Option<&str>,
    ) -> ErpStatusKey {
        erp_status_key(technical_status, erp_last_error)
    }
}
