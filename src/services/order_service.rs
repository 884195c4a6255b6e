// src/services/order_service.rs

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, DurationRound, TimeDelta, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    common::{
        db_utils::{begin_unit_of_work, ReadMode},
        error::AppError,
    },
    db::{CartRepository, OrderRepository, PharmacyProductRepository, StockRepository},
    models::{
        auth::Actor,
        order::{
            CheckoutPreview, FulfillmentLine, Initiator, OrderDetail, OrderFilter, OrderStatus,
            ProductOrder, ShippingChoice,
        },
        pharmacy::PharmacyProduct,
        stock::MutationStatus,
    },
    services::{
        allocation::AllocationService,
        proof_storage::{new_proof_key, ProofStorage},
        stock_ledger::{pick_transfer_sources, shortfall, StockLedger},
    },
};

/// Parâmetros do ciclo de vida do pedido (vêm do `Settings`).
#[derive(Debug, Clone, Copy)]
pub struct OrderPolicy {
    pub lock_timeout_ms: u64,
    pub nearby_radius_meters: f64,
    pub payment_window_hours: i64,
    pub auto_confirm_after_days: i64,
}

/// Prazo de pagamento: agora + janela, truncado na hora, menos um minuto.
pub fn payment_deadline(now: DateTime<Utc>, window_hours: i64) -> Result<DateTime<Utc>, AppError> {
    let window = TimeDelta::try_hours(window_hours)
        .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("janela de pagamento inválida")))?;

    let truncated = (now + window)
        .duration_trunc(TimeDelta::hours(1))
        .map_err(|e| AppError::InternalServerError(anyhow::anyhow!("truncando prazo: {}", e)))?;

    Ok(truncated - TimeDelta::minutes(1))
}

/// O admin precisa ser dono de pelo menos uma farmácia que atende o pedido.
fn ensure_fulfilling_admin(actor: &Actor, lines: &[FulfillmentLine]) -> Result<(), AppError> {
    if !actor.is_admin() {
        return Err(AppError::Forbidden("apenas admins de farmácia".into()));
    }
    if !lines.iter().any(|line| line.admin_id == actor.id) {
        return Err(AppError::Forbidden(
            "nenhuma farmácia deste admin atende o pedido".into(),
        ));
    }
    Ok(())
}

/// Todos os itens consumidos precisam ter sido apagados pelo próprio checkout.
fn ensure_cart_consumed(deleted: u64, consumed: usize) -> Result<(), AppError> {
    if deleted != consumed as u64 {
        return Err(AppError::StateConflict(
            "o carrinho mudou durante o checkout".into(),
        ));
    }
    Ok(())
}

/// Resultado do processamento: ou tudo foi atendido, ou faltou estoque em algum item.
#[derive(Debug)]
enum ProcessOutcome {
    Fulfilled,
    Unsourced { product_id: Uuid, missing: i32 },
}

#[derive(Clone)]
pub struct OrderService {
    pool: PgPool,
    order_repo: OrderRepository,
    cart_repo: CartRepository,
    pharmacy_repo: PharmacyProductRepository,
    stock_repo: StockRepository,
    allocation: AllocationService,
    ledger: StockLedger,
    proof_storage: Arc<dyn ProofStorage>,
    policy: OrderPolicy,
}

impl OrderService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: PgPool,
        order_repo: OrderRepository,
        cart_repo: CartRepository,
        pharmacy_repo: PharmacyProductRepository,
        stock_repo: StockRepository,
        allocation: AllocationService,
        ledger: StockLedger,
        proof_storage: Arc<dyn ProofStorage>,
        policy: OrderPolicy,
    ) -> Self {
        Self {
            pool,
            order_repo,
            cart_repo,
            pharmacy_repo,
            stock_repo,
            allocation,
            ledger,
            proof_storage,
            policy,
        }
    }

    pub fn policy(&self) -> OrderPolicy {
        self.policy
    }

    // --- CHECKOUT ---
    pub async fn create_order(
        &self,
        actor: &Actor,
        address_id: Uuid,
        shipping: &ShippingChoice,
        payment_method: &str,
    ) -> Result<ProductOrder, AppError> {
        if shipping.price.is_sign_negative() {
            return Err(AppError::InvalidInput("o frete não pode ser negativo".into()));
        }

        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let (allocation, address) = self
            .allocation
            .resolve(&mut tx, actor, address_id, ReadMode::ForUpdate)
            .await?;

        let expired_at = payment_deadline(Utc::now(), self.policy.payment_window_hours)?;
        let total_payment = allocation.total + shipping.price;

        let order = self
            .order_repo
            .create_order(
                &mut *tx,
                actor.id,
                address.id,
                expired_at,
                shipping,
                payment_method,
                total_payment,
                allocation.assigned_count(),
            )
            .await?;

        for item in &allocation.items {
            self.order_repo.add_order_item(&mut *tx, order.id, item).await?;
        }

        let deleted = self
            .cart_repo
            .delete_items(&mut *tx, &allocation.consumed_cart_item_ids)
            .await?;
        ensure_cart_consumed(deleted, allocation.consumed_cart_item_ids.len())?;

        tx.commit().await?;

        tracing::info!(
            "Pedido {} criado para {} com {} itens, total {}",
            order.id, actor.id, allocation.items.len(), order.total_payment
        );
        Ok(order)
    }

    /// Mesma alocação do checkout, sem travar nem gravar nada.
    pub async fn preview_order(&self, actor: &Actor, address_id: Uuid) -> Result<CheckoutPreview, AppError> {
        let mut conn = self.pool.acquire().await?;

        let (allocation, address) = self
            .allocation
            .resolve(&mut conn, actor, address_id, ReadMode::Plain)
            .await?;

        Ok(CheckoutPreview {
            address_id: address.id,
            total: allocation.total,
            items: allocation.items,
        })
    }

    // --- CONSULTAS ---
    pub async fn list_orders(&self, actor: &Actor, filter: OrderFilter) -> Result<Vec<ProductOrder>, AppError> {
        if actor.is_admin() {
            self.order_repo.list_for_admin(actor.id, filter).await
        } else {
            self.order_repo.list_for_user(actor.id, filter).await
        }
    }

    pub async fn order_detail(&self, actor: &Actor, order_id: Uuid) -> Result<OrderDetail, AppError> {
        let order = self
            .order_repo
            .find_by_id(&self.pool, order_id, ReadMode::Plain)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("pedido".into()))?;

        if order.user_id != actor.id {
            let lines = self.order_repo.list_fulfillment_lines(&self.pool, order_id).await?;
            // Quem não pode ver o pedido recebe 404, não 403.
            if ensure_fulfilling_admin(actor, &lines).is_err() {
                return Err(AppError::ResourceNotFound("pedido".into()));
            }
        }

        let items = self.order_repo.list_item_details(order_id).await?;
        let stock_mutations = self.stock_repo.list_order_mutations(&self.pool, order_id).await?;

        Ok(OrderDetail {
            header: order,
            items,
            stock_mutations,
        })
    }

    // --- COMPROVANTE DE PAGAMENTO ---
    pub async fn upload_payment_proof(
        &self,
        actor: &Actor,
        order_id: Uuid,
        image: &[u8],
    ) -> Result<ProductOrder, AppError> {
        if image.is_empty() {
            return Err(AppError::InvalidInput("o comprovante está vazio".into()));
        }

        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        if order.user_id != actor.id {
            return Err(AppError::ResourceNotFound("pedido".into()));
        }

        order
            .status
            .check_transition(OrderStatus::WaitingForPaymentConfirmation, Initiator::Customer)?;

        if Utc::now() >= order.expired_at {
            return Err(AppError::StateConflict("o prazo de pagamento expirou".into()));
        }

        // O arquivo só é gravado depois das checagens; daqui em diante uma falha deixa
        // o arquivo sem pedido, e a chave vai para o log.
        let key = order.proof_key.clone().unwrap_or_else(new_proof_key);
        let url = self.proof_storage.upload(&key, image).await?;

        let updated = match self.order_repo.update_payment_proof(&mut *tx, order.id, &url, &key).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!("Comprovante {} gravado, mas o pedido {} não foi atualizado: {}", key, order.id, e);
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!("Comprovante {} gravado, mas o commit do pedido {} falhou: {}", key, order.id, e);
            return Err(e.into());
        }

        tracing::info!("Comprovante do pedido {} recebido ({} bytes)", order.id, image.len());
        Ok(updated)
    }

    // --- TRANSIÇÕES DO CLIENTE ---
    pub async fn user_advance_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<ProductOrder, AppError> {
        if !matches!(target, OrderStatus::OrderConfirmed | OrderStatus::Canceled) {
            return Err(AppError::InvalidInput(format!(
                "o cliente não pode mover o pedido para {:?}",
                target
            )));
        }

        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        if order.user_id != actor.id {
            return Err(AppError::ResourceNotFound("pedido".into()));
        }

        order.status.check_transition(target, Initiator::Customer)?;

        let updated = self.order_repo.update_status(&mut *tx, order.id, target, None).await?;
        tx.commit().await?;

        tracing::info!("Pedido {}: {:?} -> {:?} (cliente)", order.id, order.status, target);
        Ok(updated)
    }

    // --- TRANSIÇÕES DO ADMIN ---
    pub async fn admin_advance_order(
        &self,
        actor: &Actor,
        order_id: Uuid,
        target: OrderStatus,
    ) -> Result<ProductOrder, AppError> {
        if !actor.is_admin() {
            return Err(AppError::Forbidden("apenas admins de farmácia".into()));
        }

        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        let lines = self.order_repo.list_fulfillment_lines(&mut *tx, order.id).await?;
        ensure_fulfilling_admin(actor, &lines)?;

        order.status.check_transition(target, Initiator::PharmacyAdmin)?;

        let updated = match target {
            OrderStatus::Processed => {
                let outcome = self.process_order(&mut tx, &order, &lines).await?;
                match outcome {
                    ProcessOutcome::Fulfilled => {
                        self.order_repo.update_status(&mut *tx, order.id, target, None).await?
                    }
                    ProcessOutcome::Unsourced { product_id, missing } => {
                        // Desfaz tudo o que o processamento escreveu e cancela em outra transação.
                        tx.rollback().await?;
                        self.force_cancel_unprocessable(order.id).await?;

                        return Err(AppError::StateConflict(format!(
                            "faltam {} unidades do produto {} e nenhuma farmácia próxima pode suprir; pedido cancelado",
                            missing, product_id
                        )));
                    }
                }
            }
            OrderStatus::Sent => {
                self.order_repo
                    .update_status(&mut *tx, order.id, target, Some(Utc::now()))
                    .await?
            }
            OrderStatus::Canceled => {
                if order.status == OrderStatus::Processed {
                    self.restore_stock(&mut tx, &order, &lines).await?;
                }
                self.order_repo.update_status(&mut *tx, order.id, target, None).await?
            }
            _ => {
                return Err(AppError::InvalidInput(format!(
                    "o admin não pode mover o pedido para {:?}",
                    target
                )));
            }
        };

        tx.commit().await?;

        tracing::info!(
            "Pedido {}: {:?} -> {:?} (admin {})",
            order.id, order.status, target, actor.id
        );
        Ok(updated)
    }

    // --- TRANSIÇÕES DO AGENDADOR ---

    /// Cancela o pedido se ainda estiver aguardando pagamento e o prazo tiver passado.
    /// Devolve `false` quando o pedido mudou nesse meio tempo.
    pub async fn expire_order(&self, order_id: Uuid, now: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        if order.expired_at >= now
            || order
                .status
                .check_transition(OrderStatus::Canceled, Initiator::Scheduler)
                .is_err()
        {
            return Ok(false);
        }

        self.order_repo
            .update_status(&mut *tx, order.id, OrderStatus::Canceled, None)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    /// Confirma o recebimento de um pedido enviado antes de `cutoff`.
    pub async fn auto_confirm_order(&self, order_id: Uuid, cutoff: DateTime<Utc>) -> Result<bool, AppError> {
        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        let sent_long_ago = order.sent_at.is_some_and(|sent_at| sent_at < cutoff);
        if !sent_long_ago
            || order
                .status
                .check_transition(OrderStatus::OrderConfirmed, Initiator::Scheduler)
                .is_err()
        {
            return Ok(false);
        }

        self.order_repo
            .update_status(&mut *tx, order.id, OrderStatus::OrderConfirmed, None)
            .await?;
        tx.commit().await?;
        Ok(true)
    }

    pub async fn find_expired_order_ids(&self, now: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        self.order_repo.find_expired_ids(now).await
    }

    pub async fn find_sent_order_ids(&self, cutoff: DateTime<Utc>) -> Result<Vec<Uuid>, AppError> {
        self.order_repo.find_sent_before_ids(cutoff).await
    }

    // ---
    // Internos
    // ---
    async fn lock_order(&self, conn: &mut PgConnection, order_id: Uuid) -> Result<ProductOrder, AppError> {
        self.order_repo
            .find_by_id(&mut *conn, order_id, ReadMode::ForUpdate)
            .await?
            .ok_or_else(|| AppError::ResourceNotFound("pedido".into()))
    }

    /// Trava os produtos em ordem crescente de id e indexa por id.
    async fn lock_products(
        &self,
        conn: &mut PgConnection,
        mut ids: Vec<Uuid>,
    ) -> Result<HashMap<Uuid, PharmacyProduct>, AppError> {
        ids.sort();
        ids.dedup();

        let products = self.pharmacy_repo.lock_many(&mut *conn, &ids).await?;
        Ok(products.into_iter().map(|p| (p.id, p)).collect())
    }

    /// Baixa o estoque de cada item. Quando a farmácia não tem o bastante,
    /// traz a diferença da farmácia ativa mais próxima que tenha estoque.
    async fn process_order(
        &self,
        conn: &mut PgConnection,
        order: &ProductOrder,
        lines: &[FulfillmentLine],
    ) -> Result<ProcessOutcome, AppError> {
        let assigned_ids: Vec<Uuid> = lines.iter().map(|line| line.pharmacy_product_id).collect();
        let mut locked = self.lock_products(&mut *conn, assigned_ids.clone()).await?;

        for line in lines {
            let assigned = locked
                .get_mut(&line.pharmacy_product_id)
                .ok_or_else(|| AppError::ResourceNotFound("produto da farmácia do pedido".into()))?;

            let missing = shortfall(line.quantity, assigned.stock);
            if missing > 0 {
                // A busca parte da farmácia que atende o item.
                let origin = assigned.pharmacy_location();
                let candidates = self
                    .pharmacy_repo
                    .find_nearby_candidates(
                        &mut *conn,
                        &[line.product_id],
                        origin,
                        self.policy.nearby_radius_meters,
                    )
                    .await?;

                let mut source: Option<PharmacyProduct> = None;
                for candidate in pick_transfer_sources(&candidates, line.pharmacy_id, &assigned_ids, missing) {
                    // A busca não trava nada; confere de novo com a linha travada.
                    let locked_candidate = self
                        .pharmacy_repo
                        .find_by_id(&mut *conn, candidate.pharmacy_product_id, ReadMode::ForUpdate)
                        .await?;
                    if let Some(product) = locked_candidate {
                        if product.is_active && product.stock >= missing {
                            source = Some(product);
                            break;
                        }
                    }
                }

                let Some(mut source) = source else {
                    tracing::warn!(
                        "Pedido {}: faltam {} do produto {} na farmácia {}",
                        order.id, missing, line.product_id, line.pharmacy_id
                    );
                    return Ok(ProcessOutcome::Unsourced {
                        product_id: line.product_id,
                        missing,
                    });
                };

                self.ledger
                    .transfer_for_order(&mut *conn, &mut source, assigned, missing, order.id)
                    .await?;
            }

            self.ledger
                .record_change(&mut *conn, assigned, line.quantity, true)
                .await?;
        }

        Ok(ProcessOutcome::Fulfilled)
    }

    /// Estorno do cancelamento de um pedido processado: devolve cada item e
    /// desfaz cada transferência do pedido com uma transferência inversa.
    async fn restore_stock(
        &self,
        conn: &mut PgConnection,
        order: &ProductOrder,
        lines: &[FulfillmentLine],
    ) -> Result<(), AppError> {
        let mutations: Vec<_> = self
            .stock_repo
            .list_order_mutations(&mut *conn, order.id)
            .await?
            .into_iter()
            .filter(|m| m.status == MutationStatus::Accepted)
            .collect();

        let mut ids: Vec<Uuid> = lines.iter().map(|line| line.pharmacy_product_id).collect();
        for mutation in &mutations {
            ids.push(mutation.from_pharmacy_product_id);
            ids.push(mutation.to_pharmacy_product_id);
        }
        let mut locked = self.lock_products(&mut *conn, ids).await?;

        // Primeiro devolve os itens: a farmácia do pedido volta a ter o que foi baixado.
        for line in lines {
            let assigned = locked
                .get_mut(&line.pharmacy_product_id)
                .ok_or_else(|| AppError::ResourceNotFound("produto da farmácia do pedido".into()))?;
            self.ledger
                .record_change(&mut *conn, assigned, line.quantity, false)
                .await?;
        }

        // Depois devolve o que veio de outras farmácias.
        for mutation in &mutations {
            let mut source = locked
                .remove(&mutation.to_pharmacy_product_id)
                .ok_or_else(|| AppError::ResourceNotFound("produto da transferência".into()))?;
            let mut destination = locked
                .remove(&mutation.from_pharmacy_product_id)
                .ok_or_else(|| AppError::ResourceNotFound("produto da transferência".into()))?;

            self.ledger
                .transfer_for_order(&mut *conn, &mut source, &mut destination, mutation.quantity, order.id)
                .await?;

            locked.insert(source.id, source);
            locked.insert(destination.id, destination);
        }

        tracing::info!(
            "Pedido {}: estoque de {} itens devolvido, {} transferências desfeitas",
            order.id, lines.len(), mutations.len()
        );
        Ok(())
    }

    /// Cancela (em transação própria) um pedido que não pôde ser processado.
    async fn force_cancel_unprocessable(&self, order_id: Uuid) -> Result<(), AppError> {
        let mut tx = begin_unit_of_work(&self.pool, self.policy.lock_timeout_ms).await?;

        let order = self.lock_order(&mut tx, order_id).await?;
        if order.status != OrderStatus::WaitingForPaymentConfirmation {
            // Outra requisição já mudou o pedido.
            return Ok(());
        }

        self.order_repo
            .update_status(&mut *tx, order.id, OrderStatus::Canceled, None)
            .await?;
        tx.commit().await?;

        tracing::warn!("Pedido {} cancelado: estoque insuficiente no processamento", order_id);
        Ok(())
    }
}
