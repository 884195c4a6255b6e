// src/db/order_repo.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::ReadMode, error::AppError},
    models::order::{
        FulfillmentLine, NewOrderItem, OrderFilter, OrderItem, OrderItemDetail, OrderStatus,
        ProductOrder, ShippingChoice,
    },
};

const SELECT_ORDER: &str = r#"
    SELECT
        o.id, o.user_id, o.address_id, o.status, o.ordered_at, o.expired_at, o.sent_at,
        o.shipping_name, o.shipping_price, o.shipping_eta, o.payment_method,
        o.total_payment, o.item_order_qty, o.payment_proof, o.proof_key, o.updated_at
    FROM product_orders o
"#;

#[derive(Clone)]
pub struct OrderRepository {
    pool: PgPool,
}

impl OrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Escrita (sempre dentro da transação do serviço)
    // ---
    #[allow(clippy::too_many_arguments)]
    pub async fn create_order<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        address_id: Uuid,
        expired_at: DateTime<Utc>,
        shipping: &ShippingChoice,
        payment_method: &str,
        total_payment: Decimal,
        item_order_qty: i32,
    ) -> Result<ProductOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, ProductOrder>(
            r#"
            INSERT INTO product_orders (
                user_id, address_id, status, expired_at,
                shipping_name, shipping_price, shipping_eta,
                payment_method, total_payment, item_order_qty
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING
                id, user_id, address_id, status, ordered_at, expired_at, sent_at,
                shipping_name, shipping_price, shipping_eta, payment_method,
                total_payment, item_order_qty, payment_proof, proof_key, updated_at
            "#,
        )
            .bind(user_id)
            .bind(address_id)
            .bind(OrderStatus::WaitingForPayment)
            .bind(expired_at)
            .bind(&shipping.name)
            .bind(shipping.price)
            .bind(&shipping.eta)
            .bind(payment_method)
            .bind(total_payment)
            .bind(item_order_qty)
            .fetch_one(executor)
            .await?;

        Ok(order)
    }

    pub async fn add_order_item<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        item: &NewOrderItem,
    ) -> Result<OrderItem, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order_item = sqlx::query_as::<_, OrderItem>(
            r#"
            INSERT INTO order_items (order_id, pharmacy_product_id, quantity, sub_total)
            VALUES ($1, $2, $3, $4)
            RETURNING id, order_id, pharmacy_product_id, quantity, sub_total, created_at
            "#,
        )
            .bind(order_id)
            .bind(item.pharmacy_product_id)
            .bind(item.quantity)
            .bind(item.sub_total)
            .fetch_one(executor)
            .await?;

        Ok(order_item)
    }

    /// Muda o status. `sent_at` só é gravado quando informado (transição para Sent).
    pub async fn update_status<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        status: OrderStatus,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<ProductOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, ProductOrder>(
            r#"
            UPDATE product_orders
            SET status = $2, sent_at = COALESCE($3, sent_at), updated_at = NOW()
            WHERE id = $1
            RETURNING
                id, user_id, address_id, status, ordered_at, expired_at, sent_at,
                shipping_name, shipping_price, shipping_eta, payment_method,
                total_payment, item_order_qty, payment_proof, proof_key, updated_at
            "#,
        )
            .bind(order_id)
            .bind(status)
            .bind(sent_at)
            .fetch_one(executor)
            .await?;

        Ok(order)
    }

    pub async fn update_payment_proof<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        proof_url: &str,
        proof_key: &str,
    ) -> Result<ProductOrder, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let order = sqlx::query_as::<_, ProductOrder>(
            r#"
            UPDATE product_orders
            SET payment_proof = $2, proof_key = $3, status = $4, updated_at = NOW()
            WHERE id = $1
            RETURNING
                id, user_id, address_id, status, ordered_at, expired_at, sent_at,
                shipping_name, shipping_price, shipping_eta, payment_method,
                total_payment, item_order_qty, payment_proof, proof_key, updated_at
            "#,
        )
            .bind(order_id)
            .bind(proof_url)
            .bind(proof_key)
            .bind(OrderStatus::WaitingForPaymentConfirmation)
            .fetch_one(executor)
            .await?;

        Ok(order)
    }

    // ---
    // Leitura
    // ---
    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
        mode: ReadMode,
    ) -> Result<Option<ProductOrder>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE o.id = $1{}", SELECT_ORDER, mode.lock_clause("o"));

        let order = sqlx::query_as::<_, ProductOrder>(&sql)
            .bind(order_id)
            .fetch_optional(executor)
            .await?;

        Ok(order)
    }

    /// Itens do pedido com a farmácia que atende cada um.
    pub async fn list_fulfillment_lines<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Vec<FulfillmentLine>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let lines = sqlx::query_as::<_, FulfillmentLine>(
            r#"
            SELECT
                oi.id AS order_item_id,
                oi.pharmacy_product_id,
                pp.product_id,
                pp.pharmacy_id,
                ph.admin_id,
                oi.quantity
            FROM order_items oi
            JOIN pharmacy_products pp ON pp.id = oi.pharmacy_product_id
            JOIN pharmacies ph ON ph.id = pp.pharmacy_id
            WHERE oi.order_id = $1
            ORDER BY oi.pharmacy_product_id ASC, oi.id ASC
            "#,
        )
            .bind(order_id)
            .fetch_all(executor)
            .await?;

        Ok(lines)
    }

    pub async fn list_item_details(&self, order_id: Uuid) -> Result<Vec<OrderItemDetail>, AppError> {
        let items = sqlx::query_as::<_, OrderItemDetail>(
            r#"
            SELECT
                oi.id, oi.pharmacy_product_id, pp.product_id, p.name AS product_name,
                pp.pharmacy_id, ph.name AS pharmacy_name, oi.quantity, oi.sub_total
            FROM order_items oi
            JOIN pharmacy_products pp ON pp.id = oi.pharmacy_product_id
            JOIN products p ON p.id = pp.product_id
            JOIN pharmacies ph ON ph.id = pp.pharmacy_id
            WHERE oi.order_id = $1
            ORDER BY ph.name ASC, p.name ASC
            "#,
        )
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(items)
    }

    pub async fn list_for_user(
        &self,
        user_id: Uuid,
        filter: OrderFilter,
    ) -> Result<Vec<ProductOrder>, AppError> {
        let sql = format!(
            "{} WHERE o.user_id = $1 AND ($2::SMALLINT IS NULL OR o.status = $2) \
             ORDER BY o.ordered_at DESC LIMIT $3 OFFSET $4",
            SELECT_ORDER
        );

        let orders = sqlx::query_as::<_, ProductOrder>(&sql)
            .bind(user_id)
            .bind(filter.status)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    /// Pedidos com pelo menos um item atendido por uma farmácia do admin.
    pub async fn list_for_admin(
        &self,
        admin_id: Uuid,
        filter: OrderFilter,
    ) -> Result<Vec<ProductOrder>, AppError> {
        let sql = format!(
            r#"{} WHERE EXISTS (
                SELECT 1 FROM order_items oi
                JOIN pharmacy_products pp ON pp.id = oi.pharmacy_product_id
                JOIN pharmacies ph ON ph.id = pp.pharmacy_id
                WHERE oi.order_id = o.id AND ph.admin_id = $1
            )
            AND ($2::SMALLINT IS NULL OR o.status = $2)
            ORDER BY o.ordered_at DESC LIMIT $3 OFFSET $4"#,
            SELECT_ORDER
        );

        let orders = sqlx::query_as::<_, ProductOrder>(&sql)
            .bind(admin_id)
            .bind(filter.status)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(orders)
    }

    // ---
    // Varreduras do agendador
    // ---
    pub async fn find_expired_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM product_orders WHERE status = $1 AND expired_at < $2 ORDER BY id",
        )
            .bind(OrderStatus::WaitingForPayment)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    pub async fn find_sent_before_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        let ids = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM product_orders WHERE status = $1 AND sent_at < $2 ORDER BY id",
        )
            .bind(OrderStatus::Sent)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }
}
