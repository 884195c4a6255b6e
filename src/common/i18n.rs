// src/common/i18n.rs

use std::collections::HashMap;
use std::sync::Arc;

pub const DEFAULT_LANGUAGE: &str = "en";

// Catálogo de mensagens de erro: (idioma, código) -> texto
const MESSAGES: &[(&str, &str, &str)] = &[
    ("en", "validation_failed", "One or more fields are invalid."),
    ("pt", "validation_failed", "Um ou mais campos são inválidos."),
    ("en", "invalid_input", "The request is invalid."),
    ("pt", "invalid_input", "A requisição é inválida."),
    ("en", "not_found", "The requested resource was not found."),
    ("pt", "not_found", "O recurso solicitado não foi encontrado."),
    ("en", "forbidden", "You are not allowed to perform this action."),
    ("pt", "forbidden", "Você não tem permissão para realizar esta ação."),
    ("en", "state_conflict", "The operation is not allowed in the current state."),
    ("pt", "state_conflict", "A operação não é permitida no estado atual."),
    ("en", "resource_exhausted", "No nearby pharmacy has enough stock for this request."),
    ("pt", "resource_exhausted", "Nenhuma farmácia próxima tem estoque suficiente para este pedido."),
    ("en", "invalid_token", "Invalid or missing authentication token."),
    ("pt", "invalid_token", "Token de autenticação inválido ou ausente."),
    ("en", "concurrent_update", "The resource is being updated by another request, try again."),
    ("pt", "concurrent_update", "O recurso está sendo alterado por outra requisição, tente novamente."),
    ("en", "internal_error", "An unexpected error occurred."),
    ("pt", "internal_error", "Ocorreu um erro inesperado."),
];

fn message_key(lang: &str, code: &str) -> String {
    format!("{lang}:{code}")
}

/// Mensagens traduzidas, compartilhadas via `AppState`.
#[derive(Clone)]
pub struct I18nStore {
    messages: Arc<HashMap<String, &'static str>>,
}

impl Default for I18nStore {
    fn default() -> Self {
        let messages = MESSAGES
            .iter()
            .map(|(lang, code, text)| (message_key(lang, code), *text))
            .collect();
        Self { messages: Arc::new(messages) }
    }
}

impl I18nStore {
    /// Traduz o código; idiomas desconhecidos caem para o inglês.
    pub fn translate(&self, lang: &str, code: &str) -> String {
        self.messages
            .get(&message_key(lang, code))
            .or_else(|| self.messages.get(&message_key(DEFAULT_LANGUAGE, code)))
            .map(|text| text.to_string())
            .unwrap_or_else(|| code.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_language_falls_back_to_english() {
        let store = I18nStore::default();
        assert_eq!(
            store.translate("de", "not_found"),
            store.translate("en", "not_found")
        );
    }

    #[test]
    fn unknown_code_is_returned_verbatim() {
        let store = I18nStore::default();
        assert_eq!(store.translate("pt", "something_else"), "something_else");
    }

    #[test]
    fn every_code_has_both_languages() {
        let store = I18nStore::default();
        for (_, code, _) in MESSAGES {
            assert_ne!(store.translate("pt", code), store.translate("en", code), "{code}");
        }
    }
}
