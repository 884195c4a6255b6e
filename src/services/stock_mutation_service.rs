// src/services/stock_mutation_service.rs

use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_unit_of_work, ReadMode},
        error::AppError,
    },
    db::{PharmacyProductRepository, StockRepository},
    models::{
        auth::Actor,
        pharmacy::Pharmacy,
        stock::{MutationStatus, StockMutation, StockMutationView},
    },
    services::stock_ledger::{require_admin, StockLedger},
};

#[derive(Clone)]
pub struct StockMutationService {
    pool: PgPool,
    pharmacy_repo: PharmacyProductRepository,
    stock_repo: StockRepository,
    ledger: StockLedger,
    lock_timeout_ms: u64,
}

impl StockMutationService {
    pub fn new(
        pool: PgPool,
        pharmacy_repo: PharmacyProductRepository,
        stock_repo: StockRepository,
        ledger: StockLedger,
        lock_timeout_ms: u64,
    ) -> Self {
        Self { pool, pharmacy_repo, stock_repo, ledger, lock_timeout_ms }
    }

    // --- CRIAR PEDIDO DE TRANSFERÊNCIA ---
    // O admin do destino pede estoque a outra farmácia; fica pendente até o dono da origem decidir.
    pub async fn request_mutation(
        &self,
        actor: &Actor,
        to_pharmacy_product_id: Uuid,
        from_pharmacy_id: Uuid,
        quantity: i32,
    ) -> Result<StockMutation, AppError> {
        require_admin(actor)?;
        if quantity <= 0 {
            return Err(AppError::InvalidInput(
                "a quantidade deve ser maior que zero".into(),
            ));
        }

        let destination = self
            .pharmacy_repo
            .find_by_id(&self.pool, to_pharmacy_product_id, ReadMode::Plain)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("produto de destino".into()))?;

        if destination.admin_id != actor.id {
            return Err(AppError::Forbidden(
                "o destino não pertence a uma farmácia deste admin".into(),
            ));
        }

        let source = self
            .pharmacy_repo
            .find_sibling(&self.pool, from_pharmacy_id, destination.product_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("produto na farmácia de origem".into()))?;

        if source.id == destination.id {
            return Err(AppError::InvalidInput(
                "não é possível transferir para a mesma farmácia".into(),
            ));
        }

        if source.stock < quantity {
            return Err(AppError::ResourceExhausted(format!(
                "a farmácia de origem tem apenas {} unidades",
                source.stock
            )));
        }

        let mutation = self
            .stock_repo
            .create_mutation(
                &self.pool,
                source.id,
                destination.id,
                quantity,
                MutationStatus::Pending,
                None,
            )
            .await?;

        tracing::info!(
            "Transferência {} solicitada: {} unidades de {} para {}",
            mutation.id, quantity, source.id, destination.id
        );
        Ok(mutation)
    }

    // --- DECIDIR (ACEITAR / RECUSAR) ---
    pub async fn decide_mutation(
        &self,
        actor: &Actor,
        mutation_id: Uuid,
        accept: bool,
    ) -> Result<StockMutation, AppError> {
        require_admin(actor)?;

        let mut tx = begin_unit_of_work(&self.pool, self.lock_timeout_ms).await?;

        let mutation = self
            .stock_repo
            .find_mutation(&mut *tx, mutation_id, ReadMode::ForUpdate)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("transferência".into()))?;

        // Trava as duas pontas (ordem crescente de id)
        let mut locked = self
            .pharmacy_repo
            .lock_many(
                &mut *tx,
                &[mutation.from_pharmacy_product_id, mutation.to_pharmacy_product_id],
            )
            .await?;

        let source_pos = locked
            .iter()
            .position(|p| p.id == mutation.from_pharmacy_product_id)
            .ok_or_else(|| AppError::ResourceNotFound("produto de origem".into()))?;
        let mut source = locked.swap_remove(source_pos);
        let mut destination = locked
            .pop()
            .ok_or_else(|| AppError::ResourceNotFound("produto de destino".into()))?;

        if source.admin_id != actor.id {
            return Err(AppError::Forbidden(
                "só o admin da farmácia de origem pode decidir".into(),
            ));
        }

        if mutation.status != MutationStatus::Pending {
            return Err(AppError::StateConflict(format!(
                "a transferência já está {:?}",
                mutation.status
            )));
        }

        if !accept {
            let declined = self
                .stock_repo
                .update_mutation_status(&mut *tx, mutation.id, MutationStatus::Declined)
                .await?;
            tx.commit().await?;

            tracing::info!("Transferência {} recusada por {}", mutation.id, actor.id);
            return Ok(declined);
        }

        if source.stock < mutation.quantity {
            // Sem estoque na hora de aceitar: recusa automática, gravada antes do erro.
            self.stock_repo
                .update_mutation_status(&mut *tx, mutation.id, MutationStatus::Declined)
                .await?;
            tx.commit().await?;

            tracing::warn!(
                "Transferência {} recusada automaticamente: origem com {} de {}",
                mutation.id, source.stock, mutation.quantity
            );
            return Err(AppError::ResourceExhausted(format!(
                "a farmácia de origem tem apenas {} unidades",
                source.stock
            )));
        }

        self.ledger
            .transfer(&mut tx, &mut source, &mut destination, mutation.quantity)
            .await?;

        let accepted = self
            .stock_repo
            .update_mutation_status(&mut *tx, mutation.id, MutationStatus::Accepted)
            .await?;

        tx.commit().await?;

        tracing::info!(
            "Transferência {} aceita: origem {} -> {}, destino {} -> {}",
            mutation.id,
            source.id,
            source.stock,
            destination.id,
            destination.stock
        );
        Ok(accepted)
    }

    // ---
    // Consultas
    // ---
    pub async fn list_mutations(
        &self,
        actor: &Actor,
        status: Option<MutationStatus>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<StockMutationView>, AppError> {
        require_admin(actor)?;
        self.stock_repo
            .list_mutations_for_admin(actor.id, status, limit, offset)
            .await
    }

    pub async fn mutation_detail(
        &self,
        actor: &Actor,
        mutation_id: Uuid,
    ) -> Result<StockMutationView, AppError> {
        require_admin(actor)?;
        self.stock_repo
            .find_mutation_view(actor.id, mutation_id)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("transferência".into()))
    }

    /// Outras farmácias que têm o mesmo produto, para escolher a origem de uma transferência.
    pub async fn available_pharmacies(
        &self,
        actor: &Actor,
        pharmacy_product_id: Uuid,
    ) -> Result<Vec<Pharmacy>, AppError> {
        require_admin(actor)?;

        let product = self
            .pharmacy_repo
            .find_by_id(&self.pool, pharmacy_product_id, ReadMode::Plain)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("produto da farmácia".into()))?;

        if product.admin_id != actor.id {
            return Err(AppError::Forbidden(
                "o produto não pertence a uma farmácia deste admin".into(),
            ));
        }

        self.pharmacy_repo
            .find_pharmacies_carrying(product.product_id, product.pharmacy_id)
            .await
    }
}
