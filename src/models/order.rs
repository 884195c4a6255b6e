// src/models/order.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::common::error::AppError;
use crate::models::stock::StockMutation;

// --- Status do Pedido ---
// Guardado como SMALLINT; a ordem dos códigos é a ordem do ciclo de vida.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
    ToSchema,
)]
#[repr(i16)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    WaitingForPayment = 1,
    WaitingForPaymentConfirmation = 2,
    Processed = 3,
    Sent = 4,
    OrderConfirmed = 5,
    Canceled = 6,
}

/// Quem está pedindo a transição.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Initiator {
    Customer,
    PharmacyAdmin,
    Scheduler,
}

impl OrderStatus {
    pub fn code(self) -> i16 {
        self as i16
    }

    /// Tabela de transições do pedido. Não toca em nada: só diz se pode.
    pub fn check_transition(self, target: OrderStatus, initiator: Initiator) -> Result<(), AppError> {
        use OrderStatus::*;

        let allowed = match (initiator, target) {
            // Envio de comprovante
            (Initiator::Customer, WaitingForPaymentConfirmation) => self < WaitingForPaymentConfirmation,
            (Initiator::Customer, OrderConfirmed) => self == Sent,
            (Initiator::Customer, Canceled) => self < WaitingForPaymentConfirmation,

            (Initiator::PharmacyAdmin, Processed) => self == WaitingForPaymentConfirmation,
            (Initiator::PharmacyAdmin, Sent) => self == Processed,
            (Initiator::PharmacyAdmin, Canceled) => self < Sent,

            // Pedidos expirados e confirmação automática
            (Initiator::Scheduler, Canceled) => self == WaitingForPayment,
            (Initiator::Scheduler, OrderConfirmed) => self == Sent,

            _ => {
                return Err(AppError::InvalidInput(format!(
                    "status de destino {:?} não pode ser solicitado aqui",
                    target
                )));
            }
        };

        if !allowed {
            return Err(AppError::StateConflict(format!(
                "não é possível mudar o pedido de {:?} para {:?}",
                self, target
            )));
        }
        Ok(())
    }
}

// --- Pedido ---
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductOrder {
    pub id: Uuid,
    pub user_id: Uuid,
    pub address_id: Uuid,
    pub status: OrderStatus,
    pub ordered_at: DateTime<Utc>,
    pub expired_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    #[schema(example = "JNE")]
    pub shipping_name: String,
    #[schema(example = "9000.00")]
    pub shipping_price: Decimal,
    #[schema(example = "2-3 dias")]
    pub shipping_eta: String,
    pub payment_method: String,
    #[schema(example = "71500.00")]
    pub total_payment: Decimal,
    pub item_order_qty: i32,
    pub payment_proof: Option<String>,
    #[serde(skip_serializing)]
    #[schema(ignore)]
    pub proof_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub pharmacy_product_id: Uuid,
    #[schema(example = 5)]
    pub quantity: i32,
    #[schema(example = "62500.00")]
    pub sub_total: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Item ainda não persistido, saída do resolvedor de alocação.
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NewOrderItem {
    pub pharmacy_product_id: Uuid,
    pub pharmacy_id: Uuid,
    pub product_id: Uuid,
    #[schema(example = 5)]
    pub quantity: i32,
    #[schema(example = "12500.00")]
    pub unit_price: Decimal,
    #[schema(example = "62500.00")]
    pub sub_total: Decimal,
}

/// Prévia do checkout: o que cada farmácia atenderia e o total sem frete.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutPreview {
    pub address_id: Uuid,
    #[schema(example = "62500.00")]
    pub total: Decimal,
    pub items: Vec<NewOrderItem>,
}

/// Dados de frete escolhidos no checkout.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShippingChoice {
    pub name: String,
    pub price: Decimal,
    pub eta: String,
}

/// Item do pedido com a farmácia (e o admin) que o atende, usado no processamento e no estorno.
#[derive(Debug, Clone, FromRow)]
pub struct FulfillmentLine {
    pub order_item_id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub product_id: Uuid,
    pub pharmacy_id: Uuid,
    pub admin_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemDetail {
    pub id: Uuid,
    pub pharmacy_product_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub pharmacy_id: Uuid,
    pub pharmacy_name: String,
    pub quantity: i32,
    pub sub_total: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderDetail {
    #[serde(flatten)]
    pub header: ProductOrder,
    pub items: Vec<OrderItemDetail>,
    pub stock_mutations: Vec<StockMutation>,
}

/// Filtro da listagem de pedidos.
#[derive(Debug, Clone, Copy)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub limit: i64,
    pub offset: i64,
}
