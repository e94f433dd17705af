//! User-safe message catalog. Every error response and a handful of success payloads render
//! their `message` field through here, keyed by a stable `message_key` — raw internal text and
//! raw ERP response bodies never reach a client.

use std::collections::HashMap;

use once_cell::sync::Lazy;

static CATALOG: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("unexpected_error", "Nao foi possivel concluir a operacao."),
        ("action_invalid", "Acao invalida para este recurso."),
        ("status_invalid", "Dados invalidos para a operacao solicitada."),
        ("permission_denied", "Voce nao tem permissao para executar esta acao."),
        (
            "action_not_allowed_for_status",
            "Esta acao nao e permitida para o status atual.",
        ),
        (
            "confirmation_required",
            "Esta acao exige confirmacao explicita antes de prosseguir.",
        ),
        ("items_required", "Informe ao menos um item valido."),
        ("invite_expired", "O convite do fornecedor expirou."),
        (
            "supplier_not_invited_for_items",
            "O fornecedor nao foi convidado para alguns dos itens informados.",
        ),
        (
            "erp_managed_purchase_request_readonly",
            "Esta solicitacao ja esta integrada ao ERP e nao pode ser alterada por aqui.",
        ),
        (
            "erp_managed_purchase_order_readonly",
            "Este pedido ja esta integrado ao ERP e nao pode ser alterado por aqui.",
        ),
        (
            "erp_order_rejected",
            "O ERP recusou o envio deste pedido.",
        ),
        (
            "erp_temporarily_unavailable",
            "O ERP esta temporariamente indisponivel; o envio sera tentado novamente.",
        ),
        ("erp_rejected", "O ERP recusou este pedido."),
        ("erp_send_queued", "Envio ao ERP enfileirado com sucesso."),
        ("order_sent_to_erp", "Pedido enviado ao ERP."),
        ("not_found", "Recurso nao encontrado."),
    ])
});

/// Resolve `message_key` to its catalog text, falling back to `fallback` when the key is
/// unknown. Mirrors the reference implementation's `error_message(key, fallback)` helper.
pub fn error_message(message_key: &str, fallback: &str) -> String {
    CATALOG
        .get(message_key)
        .map(|s| s.to_string())
        .unwrap_or_else(|| fallback.to_string())
}

pub fn unexpected_error_message() -> String {
    error_message("unexpected_error", "Nao foi possivel concluir a operacao.")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_key_resolves_from_catalog() {
        assert_eq!(
            error_message("confirmation_required", "fallback"),
            "Esta acao exige confirmacao explicita antes de prosseguir."
        );
    }

    #[test]
    fn unknown_key_falls_back() {
        assert_eq!(error_message("totally_unknown_key", "fallback text"), "fallback text");
    }
}
