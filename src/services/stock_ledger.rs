// src/services/stock_ledger.rs

use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_unit_of_work, ReadMode},
        error::AppError,
    },
    db::{PharmacyProductRepository, StockRepository},
    models::{
        auth::Actor,
        pharmacy::{NearbyCandidate, PharmacyProduct},
        stock::{MutationStatus, StockMutation, StockRecord, StockReportEntry},
    },
};

// ---
// Aritmética do estoque (pura)
// ---

/// Novo saldo depois de uma alteração. Nunca deixa o saldo negativo.
pub fn apply_change(stock: i32, quantity: i32, is_reduction: bool) -> Result<i32, AppError> {
    if quantity <= 0 {
        return Err(AppError::InvalidInput(
            "a quantidade deve ser maior que zero".into(),
        ));
    }

    if is_reduction {
        if stock < quantity {
            return Err(AppError::ResourceExhausted(format!(
                "estoque {} insuficiente para retirar {}",
                stock, quantity
            )));
        }
        Ok(stock - quantity)
    } else {
        stock
            .checked_add(quantity)
            .ok_or_else(|| AppError::InvalidInput("quantidade excede o limite do estoque".into()))
    }
}

/// Quanto falta no estoque para atender `requested`.
pub fn shortfall(requested: i32, stock: i32) -> i32 {
    (requested - stock).max(0)
}

/// Saldos (origem, destino) depois de mover `quantity`. A soma não muda.
pub fn plan_transfer(source_stock: i32, destination_stock: i32, quantity: i32) -> Result<(i32, i32), AppError> {
    let source = apply_change(source_stock, quantity, true)?;
    let destination = apply_change(destination_stock, quantity, false)?;
    Ok((source, destination))
}

/// Primeiro candidato (mais próximo) que pode cobrir a falta.
/// Ignora a própria farmácia e os produtos já travados pelo chamador.
pub fn pick_transfer_sources<'a>(
    candidates: &'a [NearbyCandidate],
    excluded_pharmacy_id: Uuid,
    excluded_ids: &'a [Uuid],
    missing: i32,
) -> impl Iterator<Item = &'a NearbyCandidate> + 'a {
    candidates.iter().filter(move |c| {
        c.is_active
            && c.pharmacy_id != excluded_pharmacy_id
            && !excluded_ids.contains(&c.pharmacy_product_id)
            && c.stock >= missing
    })
}

// ---
// Livro-razão (escreve estoque + registro juntos)
// ---
#[derive(Clone)]
pub struct StockLedger {
    pool: PgPool,
    pharmacy_repo: PharmacyProductRepository,
    stock_repo: StockRepository,
    lock_timeout_ms: u64,
}

impl StockLedger {
    pub fn new(
        pool: PgPool,
        pharmacy_repo: PharmacyProductRepository,
        stock_repo: StockRepository,
        lock_timeout_ms: u64,
    ) -> Self {
        Self { pool, pharmacy_repo, stock_repo, lock_timeout_ms }
    }

    /// Aplica uma alteração num produto já travado pelo chamador
    /// e grava o registro correspondente. Atualiza `product.stock` em memória.
    pub async fn record_change(
        &self,
        conn: &mut PgConnection,
        product: &mut PharmacyProduct,
        quantity: i32,
        is_reduction: bool,
    ) -> Result<StockRecord, AppError> {
        let new_stock = apply_change(product.stock, quantity, is_reduction)?;

        self.pharmacy_repo.update_stock(&mut *conn, product.id, new_stock).await?;
        let record = self
            .stock_repo
            .create_record(&mut *conn, product.id, quantity, is_reduction)
            .await?;

        product.stock = new_stock;
        Ok(record)
    }

    /// Move estoque entre dois produtos travados: saída na origem, entrada no destino.
    pub async fn transfer(
        &self,
        conn: &mut PgConnection,
        source: &mut PharmacyProduct,
        destination: &mut PharmacyProduct,
        quantity: i32,
    ) -> Result<(), AppError> {
        if source.id == destination.id {
            return Err(AppError::InvalidInput(
                "origem e destino da transferência são o mesmo produto".into(),
            ));
        }
        // Valida as duas pontas antes de escrever qualquer coisa.
        plan_transfer(source.stock, destination.stock, quantity)?;

        self.record_change(&mut *conn, destination, quantity, false).await?;
        self.record_change(&mut *conn, source, quantity, true).await?;
        Ok(())
    }

    /// Transferência gerada pelo sistema para um pedido: já nasce aceita.
    pub async fn transfer_for_order(
        &self,
        conn: &mut PgConnection,
        source: &mut PharmacyProduct,
        destination: &mut PharmacyProduct,
        quantity: i32,
        order_id: Uuid,
    ) -> Result<StockMutation, AppError> {
        self.transfer(&mut *conn, source, destination, quantity).await?;

        let mutation = self
            .stock_repo
            .create_mutation(
                &mut *conn,
                source.id,
                destination.id,
                quantity,
                MutationStatus::Accepted,
                Some(order_id),
            )
            .await?;

        tracing::info!(
            "Transferência de {} unidades de {} para {} (pedido {})",
            quantity, source.id, destination.id, order_id
        );
        Ok(mutation)
    }

    // ---
    // Operações do admin sobre o livro-razão
    // ---

    /// Entrada ou saída manual num produto da farmácia do admin.
    pub async fn record_stock_change(
        &self,
        actor: &Actor,
        pharmacy_product_id: Uuid,
        quantity: i32,
        is_reduction: bool,
    ) -> Result<StockRecord, AppError> {
        require_admin(actor)?;

        let mut tx = begin_unit_of_work(&self.pool, self.lock_timeout_ms).await?;

        let mut product = self
            .pharmacy_repo
            .find_by_id(&mut *tx, pharmacy_product_id, ReadMode::ForUpdate)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("produto da farmácia".into()))?;

        if product.admin_id != actor.id {
            return Err(AppError::Forbidden(
                "o produto não pertence a uma farmácia deste admin".into(),
            ));
        }

        let record = self
            .record_change(&mut tx, &mut product, quantity, is_reduction)
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Estoque de {} ajustado manualmente para {} por {}",
            product.id, product.stock, actor.id
        );
        Ok(record)
    }

    pub async fn list_stock_records(
        &self,
        actor: &Actor,
        pharmacy_product_id: Option<Uuid>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StockRecord>, AppError> {
        require_admin(actor)?;
        self.stock_repo
            .list_records_for_admin(actor.id, pharmacy_product_id, limit, offset)
            .await
    }

    pub async fn stock_report(
        &self,
        actor: &Actor,
        year: i32,
        month: Option<i32>,
    ) -> Result<Vec<StockReportEntry>, AppError> {
        require_admin(actor)?;
        if let Some(m) = month {
            if !(1..=12).contains(&m) {
                return Err(AppError::InvalidInput(format!("mês inválido: {}", m)));
            }
        }
        self.stock_repo.monthly_report(actor.id, year, month).await
    }
}

pub(crate) fn require_admin(actor: &Actor) -> Result<(), AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("apenas admins de farmácia".into()));
    }
    Ok(())
}
