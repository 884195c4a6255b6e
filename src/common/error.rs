// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;

use crate::common::i18n::I18nStore;
use crate::middleware::i18n::Locale;

// Códigos do Postgres que indicam disputa de lock (vale tentar de novo)
const PG_LOCK_NOT_AVAILABLE: &str = "55P03";
const PG_DEADLOCK_DETECTED: &str = "40P01";
const PG_SERIALIZATION_FAILURE: &str = "40001";

// Nosso tipo de erro de domínio, com `thiserror` para melhor ergonomia.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    // Entrada semanticamente inválida (auto-transferência, quantidade zero...)
    #[error("Entrada inválida: {0}")]
    InvalidInput(String),

    #[error("Recurso não encontrado: {0}")]
    ResourceNotFound(String),

    #[error("Ação não permitida: {0}")]
    Forbidden(String),

    // A transição pedida viola o estado atual (ex: cancelar após envio)
    #[error("Conflito de estado: {0}")]
    StateConflict(String),

    // O produto existe, mas nenhuma farmácia tem estoque suficiente
    #[error("Estoque indisponível: {0}")]
    ResourceExhausted(String),

    #[error("Token inválido")]
    InvalidToken,

    #[error("Erro de banco de dados")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),

    #[error("Erro interno do servidor")]
    InternalServerError(#[from] anyhow::Error),
}

/// Corpo de erro devolvido ao cliente, já traduzido.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl AppError {
    /// Chave do catálogo de mensagens (ver `I18nStore`).
    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "validation_failed",
            AppError::InvalidInput(_) => "invalid_input",
            AppError::ResourceNotFound(_) => "not_found",
            AppError::Forbidden(_) => "forbidden",
            AppError::StateConflict(_) => "state_conflict",
            AppError::ResourceExhausted(_) => "resource_exhausted",
            AppError::InvalidToken | AppError::JwtError(_) => "invalid_token",
            AppError::DatabaseError(_) if self.is_retryable() => "concurrent_update",
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => "internal_error",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::StateConflict(_) => StatusCode::CONFLICT,
            AppError::ResourceExhausted(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::InvalidToken | AppError::JwtError(_) => StatusCode::UNAUTHORIZED,
            AppError::DatabaseError(_) if self.is_retryable() => StatusCode::CONFLICT,
            AppError::DatabaseError(_) | AppError::InternalServerError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Lock timeout, deadlock ou falha de serialização: o cliente pode repetir.
    pub fn is_retryable(&self) -> bool {
        match self {
            AppError::DatabaseError(sqlx::Error::Database(db_err)) => matches!(
                db_err.code().as_deref(),
                Some(PG_LOCK_NOT_AVAILABLE | PG_DEADLOCK_DETECTED | PG_SERIALIZATION_FAILURE)
            ),
            _ => false,
        }
    }

    fn details(&self) -> Option<Value> {
        match self {
            AppError::ValidationError(errors) => {
                let mut details = serde_json::Map::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), json!(messages));
                }
                Some(Value::Object(details))
            }
            AppError::InvalidInput(reason)
            | AppError::ResourceNotFound(reason)
            | AppError::Forbidden(reason)
            | AppError::StateConflict(reason)
            | AppError::ResourceExhausted(reason) => Some(json!({ "reason": reason })),
            _ => None,
        }
    }

    /// Converte o erro de domínio na resposta HTTP no idioma do cliente.
    pub fn to_api_error(&self, locale: &Locale, i18n_store: &I18nStore) -> ApiError {
        let status = self.status();
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            // O `tracing` loga a mensagem detalhada; o cliente recebe só a genérica.
            tracing::error!("Erro Interno do Servidor: {:?}", self);
        }

        ApiError {
            status,
            error: i18n_store.translate(&locale.0, self.code()),
            details: self.details(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

// Usado quando não há Locale disponível (ex: rejeição de extratores).
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default(), &I18nStore::default())
            .into_response()
    }
}
