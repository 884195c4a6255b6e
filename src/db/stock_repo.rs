// src/db/stock_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::ReadMode, error::AppError},
    models::stock::{MutationStatus, StockMutation, StockMutationView, StockRecord, StockReportEntry},
};

const MUTATION_COLUMNS: &str =
    "id, from_pharmacy_product_id, to_pharmacy_product_id, quantity, status, order_id, mutated_at";

// Visão de um admin: `$1` é sempre o id do admin (define `is_request`).
const SELECT_MUTATION_VIEW: &str = r#"
    SELECT
        sm.id, sm.from_pharmacy_product_id, sm.to_pharmacy_product_id, sm.quantity,
        sm.status, sm.order_id, sm.mutated_at,
        p.name AS product_name,
        fph.id AS from_pharmacy_id, fph.name AS from_pharmacy_name,
        tph.id AS to_pharmacy_id, tph.name AS to_pharmacy_name,
        (fph.admin_id = $1) AS is_request
    FROM stock_mutations sm
    JOIN pharmacy_products fpp ON fpp.id = sm.from_pharmacy_product_id
    JOIN pharmacies fph ON fph.id = fpp.pharmacy_id
    JOIN pharmacy_products tpp ON tpp.id = sm.to_pharmacy_product_id
    JOIN pharmacies tph ON tph.id = tpp.pharmacy_id
    JOIN products p ON p.id = tpp.product_id
    WHERE (fph.admin_id = $1 OR tph.admin_id = $1)
"#;

#[derive(Clone)]
pub struct StockRepository {
    pool: PgPool,
}

impl StockRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    // ---
    // Mutações
    // ---
    pub async fn create_mutation<'e, E>(
        &self,
        executor: E,
        from_pharmacy_product_id: Uuid,
        to_pharmacy_product_id: Uuid,
        quantity: i32,
        status: MutationStatus,
        order_id: Option<Uuid>,
    ) -> Result<StockMutation, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            INSERT INTO stock_mutations
                (from_pharmacy_product_id, to_pharmacy_product_id, quantity, status, order_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {}
            "#,
            MUTATION_COLUMNS
        );

        let mutation = sqlx::query_as::<_, StockMutation>(&sql)
            .bind(from_pharmacy_product_id)
            .bind(to_pharmacy_product_id)
            .bind(quantity)
            .bind(status)
            .bind(order_id)
            .fetch_one(executor)
            .await?;

        Ok(mutation)
    }

    pub async fn find_mutation<'e, E>(
        &self,
        executor: E,
        mutation_id: Uuid,
        mode: ReadMode,
    ) -> Result<Option<StockMutation>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM stock_mutations sm WHERE sm.id = $1{}",
            MUTATION_COLUMNS,
            mode.lock_clause("sm")
        );

        let mutation = sqlx::query_as::<_, StockMutation>(&sql)
            .bind(mutation_id)
            .fetch_optional(executor)
            .await?;

        Ok(mutation)
    }

    pub async fn update_mutation_status<'e, E>(
        &self,
        executor: E,
        mutation_id: Uuid,
        status: MutationStatus,
    ) -> Result<StockMutation, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "UPDATE stock_mutations SET status = $2, mutated_at = NOW() WHERE id = $1 RETURNING {}",
            MUTATION_COLUMNS
        );

        let mutation = sqlx::query_as::<_, StockMutation>(&sql)
            .bind(mutation_id)
            .bind(status)
            .fetch_one(executor)
            .await?;

        Ok(mutation)
    }

    /// Mutações geradas pelo sistema para um pedido, na ordem em que foram criadas.
    pub async fn list_order_mutations<'e, E>(
        &self,
        executor: E,
        order_id: Uuid,
    ) -> Result<Vec<StockMutation>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "SELECT {} FROM stock_mutations WHERE order_id = $1 ORDER BY mutated_at ASC, id ASC",
            MUTATION_COLUMNS
        );

        let mutations = sqlx::query_as::<_, StockMutation>(&sql)
            .bind(order_id)
            .fetch_all(executor)
            .await?;

        Ok(mutations)
    }

    pub async fn list_mutations_for_admin(
        &self,
        admin_id: Uuid,
        status: Option<MutationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StockMutationView>, AppError> {
        let sql = format!(
            "{} AND ($2::stock_mutation_status IS NULL OR sm.status = $2) \
             ORDER BY sm.mutated_at DESC, sm.id ASC LIMIT $3 OFFSET $4",
            SELECT_MUTATION_VIEW
        );

        let mutations = sqlx::query_as::<_, StockMutationView>(&sql)
            .bind(admin_id)
            .bind(status)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(mutations)
    }

    /// Só devolve a mutação se o admin for dono de uma das pontas.
    pub async fn find_mutation_view(
        &self,
        admin_id: Uuid,
        mutation_id: Uuid,
    ) -> Result<Option<StockMutationView>, AppError> {
        let sql = format!("{} AND sm.id = $2", SELECT_MUTATION_VIEW);

        let mutation = sqlx::query_as::<_, StockMutationView>(&sql)
            .bind(admin_id)
            .bind(mutation_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(mutation)
    }

    // ---
    // Registros (livro-razão)
    // ---
    pub async fn create_record<'e, E>(
        &self,
        executor: E,
        pharmacy_product_id: Uuid,
        quantity: i32,
        is_reduction: bool,
    ) -> Result<StockRecord, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let record = sqlx::query_as::<_, StockRecord>(
            r#"
            INSERT INTO stock_records (pharmacy_product_id, quantity, is_reduction)
            VALUES ($1, $2, $3)
            RETURNING id, pharmacy_product_id, quantity, is_reduction, change_at
            "#,
        )
            .bind(pharmacy_product_id)
            .bind(quantity)
            .bind(is_reduction)
            .fetch_one(executor)
            .await?;

        Ok(record)
    }

    pub async fn list_records_for_admin(
        &self,
        admin_id: Uuid,
        pharmacy_product_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StockRecord>, AppError> {
        let records = sqlx::query_as::<_, StockRecord>(
            r#"
            SELECT sr.id, sr.pharmacy_product_id, sr.quantity, sr.is_reduction, sr.change_at
            FROM stock_records sr
            JOIN pharmacy_products pp ON pp.id = sr.pharmacy_product_id
            JOIN pharmacies ph ON ph.id = pp.pharmacy_id
            WHERE ph.admin_id = $1
              AND ($2::UUID IS NULL OR sr.pharmacy_product_id = $2)
            ORDER BY sr.change_at DESC, sr.id ASC
            LIMIT $3 OFFSET $4
            "#,
        )
            .bind(admin_id)
            .bind(pharmacy_product_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;

        Ok(records)
    }

    /// Entradas, saídas e saldo acumulado no fim de cada mês.
    /// O saldo soma todo o histórico do produto, não só o ano pedido.
    pub async fn monthly_report(
        &self,
        admin_id: Uuid,
        year: i32,
        month: Option<i32>,
    ) -> Result<Vec<StockReportEntry>, AppError> {
        let entries = sqlx::query_as::<_, StockReportEntry>(
            r#"
            WITH monthly AS (
                SELECT
                    sr.pharmacy_product_id,
                    date_trunc('month', sr.change_at) AS month_start,
                    SUM(CASE WHEN sr.is_reduction THEN 0 ELSE sr.quantity END)::BIGINT AS additions,
                    SUM(CASE WHEN sr.is_reduction THEN sr.quantity ELSE 0 END)::BIGINT AS deductions
                FROM stock_records sr
                JOIN pharmacy_products pp ON pp.id = sr.pharmacy_product_id
                JOIN pharmacies ph ON ph.id = pp.pharmacy_id
                WHERE ph.admin_id = $1
                GROUP BY sr.pharmacy_product_id, date_trunc('month', sr.change_at)
            ),
            running AS (
                SELECT
                    m.*,
                    SUM(m.additions - m.deductions) OVER (
                        PARTITION BY m.pharmacy_product_id ORDER BY m.month_start
                    )::BIGINT AS final_stock
                FROM monthly m
            )
            SELECT
                r.pharmacy_product_id,
                p.name AS product_name,
                ph.name AS pharmacy_name,
                EXTRACT(MONTH FROM r.month_start)::INT AS month,
                r.additions,
                r.deductions,
                r.final_stock
            FROM running r
            JOIN pharmacy_products pp ON pp.id = r.pharmacy_product_id
            JOIN products p ON p.id = pp.product_id
            JOIN pharmacies ph ON ph.id = pp.pharmacy_id
            WHERE EXTRACT(YEAR FROM r.month_start)::INT = $2
              AND ($3::INT IS NULL OR EXTRACT(MONTH FROM r.month_start)::INT = $3)
            ORDER BY ph.name ASC, p.name ASC, month ASC
            "#,
        )
            .bind(admin_id)
            .bind(year)
            .bind(month)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }
}
