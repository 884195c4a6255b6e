// src/services/allocation.rs

use std::collections::{HashMap, HashSet};

use rust_decimal::Decimal;
use sqlx::PgConnection;
use uuid::Uuid;

use crate::{
    common::{db_utils::ReadMode, error::AppError},
    db::{CartRepository, PharmacyProductRepository},
    models::{
        auth::Actor,
        cart::{Address, CartItem},
        order::NewOrderItem,
        pharmacy::NearbyCandidate,
    },
};

/// Resultado do checkout: o que vai para cada farmácia e quanto custa.
#[derive(Debug, Clone, PartialEq)]
pub struct Allocation {
    pub items: Vec<NewOrderItem>,
    pub total: Decimal,
    pub consumed_cart_item_ids: Vec<Uuid>,
}

impl Allocation {
    /// Quantidade de produtos de farmácia envolvidos no pedido.
    pub fn assigned_count(&self) -> i32 {
        self.items.len() as i32
    }
}

/// Soma linhas repetidas do mesmo produto, mantendo a ordem do carrinho.
fn aggregate_demand(cart_items: &[CartItem]) -> Result<Vec<(Uuid, i32)>, AppError> {
    let mut demand: Vec<(Uuid, i32)> = Vec::new();

    for item in cart_items {
        if item.quantity <= 0 {
            return Err(AppError::InvalidInput(format!(
                "quantidade inválida no carrinho para o produto {}",
                item.product_id
            )));
        }
        match demand.iter_mut().find(|(product_id, _)| *product_id == item.product_id) {
            Some((_, quantity)) => {
                *quantity = quantity.checked_add(item.quantity).ok_or_else(|| {
                    AppError::InvalidInput("quantidade do carrinho excede o limite".into())
                })?;
            }
            None => demand.push((item.product_id, item.quantity)),
        }
    }

    Ok(demand)
}

/// Decide qual farmácia atende cada produto do carrinho.
///
/// `candidates` vem da busca geoespacial, já ordenado do mais perto para o
/// mais longe. Um candidato só serve se estiver ativo e tiver estoque para a
/// quantidade pedida. Entre as farmácias, escolhe gulosamente a que cobre mais
/// produtos ainda sem dono (empate: a mais próxima) até cobrir tudo.
/// Tudo ou nada: se sobrar produto sem farmácia, nada é alocado.
pub fn resolve_allocation(
    cart_items: &[CartItem],
    candidates: &[NearbyCandidate],
) -> Result<Allocation, AppError> {
    if cart_items.is_empty() {
        return Err(AppError::StateConflict("não há itens no carrinho".into()));
    }

    let demand = aggregate_demand(cart_items)?;
    let requested: HashMap<Uuid, i32> = demand.iter().copied().collect();

    // Farmácias na ordem em que aparecem (= distância), com o candidato elegível de cada produto.
    let mut pharmacy_order: Vec<Uuid> = Vec::new();
    let mut eligible: HashMap<Uuid, HashMap<Uuid, &NearbyCandidate>> = HashMap::new();

    for candidate in candidates {
        if !pharmacy_order.contains(&candidate.pharmacy_id) {
            pharmacy_order.push(candidate.pharmacy_id);
        }
        let Some(&quantity) = requested.get(&candidate.product_id) else {
            continue;
        };
        if !candidate.is_active || candidate.stock < quantity {
            continue;
        }
        eligible
            .entry(candidate.pharmacy_id)
            .or_default()
            .entry(candidate.product_id)
            .or_insert(candidate);
    }

    let mut assignment: HashMap<Uuid, &NearbyCandidate> = HashMap::new();
    let mut unassigned: HashSet<Uuid> = requested.keys().copied().collect();

    while !unassigned.is_empty() {
        let mut best: Option<(Uuid, usize)> = None;
        for pharmacy_id in &pharmacy_order {
            let covered = eligible
                .get(pharmacy_id)
                .map(|products| products.keys().filter(|p| unassigned.contains(*p)).count())
                .unwrap_or(0);
            // `>` estrito: no empate fica a farmácia mais próxima.
            if covered > best.map(|(_, count)| count).unwrap_or(0) {
                best = Some((*pharmacy_id, covered));
            }
        }

        let Some((pharmacy_id, _)) = best else {
            // Reporta o primeiro produto pendente na ordem do carrinho.
            let missing = demand
                .iter()
                .map(|(product_id, _)| product_id)
                .find(|product_id| unassigned.contains(*product_id))
                .copied()
                .unwrap_or_default();
            return Err(AppError::ResourceExhausted(format!(
                "nenhuma farmácia próxima tem estoque do produto {}",
                missing
            )));
        };

        if let Some(products) = eligible.get(&pharmacy_id) {
            for (product_id, candidate) in products {
                if unassigned.remove(product_id) {
                    assignment.insert(*product_id, *candidate);
                }
            }
        }
    }

    let mut items = Vec::with_capacity(demand.len());
    let mut total = Decimal::ZERO;
    for (product_id, quantity) in &demand {
        let candidate = assignment
            .get(product_id)
            .ok_or_else(|| AppError::InternalServerError(anyhow::anyhow!("produto sem alocação")))?;
        let sub_total = candidate.price * Decimal::from(*quantity);
        total += sub_total;

        items.push(NewOrderItem {
            pharmacy_product_id: candidate.pharmacy_product_id,
            pharmacy_id: candidate.pharmacy_id,
            product_id: *product_id,
            quantity: *quantity,
            unit_price: candidate.price,
            sub_total,
        });
    }

    Ok(Allocation {
        items,
        total,
        consumed_cart_item_ids: cart_items.iter().map(|item| item.id).collect(),
    })
}

// ---
// Serviço (lê carrinho, endereço e candidatos próximos)
// ---
#[derive(Clone)]
pub struct AllocationService {
    pharmacy_repo: PharmacyProductRepository,
    cart_repo: CartRepository,
    radius_meters: f64,
}

impl AllocationService {
    pub fn new(
        pharmacy_repo: PharmacyProductRepository,
        cart_repo: CartRepository,
        radius_meters: f64,
    ) -> Self {
        Self { pharmacy_repo, cart_repo, radius_meters }
    }

    /// Não altera nada. `cart_mode` decide se os itens do carrinho ficam
    /// travados (checkout) ou não (prévia).
    pub async fn resolve(
        &self,
        conn: &mut PgConnection,
        actor: &Actor,
        address_id: Uuid,
        cart_mode: ReadMode,
    ) -> Result<(Allocation, Address), AppError> {
        let address = self
            .cart_repo
            .find_address(&mut *conn, address_id)
            .await?
            .filter(|address| address.user_id == actor.id)
            .ok_or_else(|| AppError::ResourceNotFound("endereço".into()))?;

        let cart_items = self.cart_repo.list_checked_items(&mut *conn, actor.id, cart_mode).await?;
        if cart_items.is_empty() {
            return Err(AppError::StateConflict("não há itens no carrinho".into()));
        }

        let mut product_ids: Vec<Uuid> = cart_items.iter().map(|item| item.product_id).collect();
        product_ids.sort();
        product_ids.dedup();

        let candidates = self
            .pharmacy_repo
            .find_nearby_candidates(&mut *conn, &product_ids, address.location(), self.radius_meters)
            .await?;

        tracing::debug!(
            "{} candidatos próximos para {} produtos do usuário {}",
            candidates.len(), product_ids.len(), actor.id
        );

        let allocation = resolve_allocation(&cart_items, &candidates)?;
        Ok((allocation, address))
    }
}
