// src/models/stock.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "stock_mutation_status", rename_all = "lowercase")] // Banco
#[serde(rename_all = "SCREAMING_SNAKE_CASE")] // JSON
pub enum MutationStatus {
    Pending,
    Accepted,
    Declined,
}

// --- Mutação de Estoque (transferência entre farmácias) ---
// order_id nulo = pedido manual entre admins; preenchido = gerada pelo pedido.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMutation {
    pub id: Uuid,
    pub from_pharmacy_product_id: Uuid,
    pub to_pharmacy_product_id: Uuid,
    #[schema(example = 2)]
    pub quantity: i32,
    pub status: MutationStatus,
    pub order_id: Option<Uuid>,
    pub mutated_at: DateTime<Utc>,
}

// --- Registro de Estoque (livro-razão, só inserção) ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockRecord {
    pub id: Uuid,
    pub pharmacy_product_id: Uuid,
    #[schema(example = 2)]
    pub quantity: i32,
    pub is_reduction: bool,
    pub change_at: DateTime<Utc>,
}

/// Mutação vista por um admin, com os nomes das duas pontas.
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockMutationView {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub mutation: StockMutation,
    pub product_name: String,
    pub from_pharmacy_id: Uuid,
    pub from_pharmacy_name: String,
    pub to_pharmacy_id: Uuid,
    pub to_pharmacy_name: String,
    /// true quando o admin é o dono da origem (é ele quem decide)
    pub is_request: bool,
}

// Linha do relatório mensal de estoque
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockReportEntry {
    pub pharmacy_product_id: Uuid,
    pub product_name: String,
    pub pharmacy_name: String,
    #[schema(example = 3)]
    pub month: i32,
    pub additions: i64,
    pub deductions: i64,
    pub final_stock: i64,
}
