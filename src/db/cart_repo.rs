// src/db/cart_repo.rs

use sqlx::{Executor, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::ReadMode, error::AppError},
    models::cart::{Address, CartItem},
};

// Carrinho e endereços são escritos por outros fluxos; aqui só lemos e limpamos.
// Sem pool própria: toda chamada roda na transação do checkout.
#[derive(Clone, Default)]
pub struct CartRepository;

impl CartRepository {
    pub fn new() -> Self {
        Self
    }

    /// Itens marcados do carrinho. No checkout são lidos com `ForUpdate`:
    /// um segundo checkout simultâneo espera e encontra o carrinho já vazio.
    pub async fn list_checked_items<'e, E>(
        &self,
        executor: E,
        user_id: Uuid,
        mode: ReadMode,
    ) -> Result<Vec<CartItem>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            r#"
            SELECT ci.id, ci.user_id, ci.product_id, ci.quantity, ci.is_checked
            FROM cart_items ci
            WHERE ci.user_id = $1 AND ci.is_checked = TRUE
            ORDER BY ci.id ASC{}
            "#,
            mode.lock_clause("ci")
        );

        let items = sqlx::query_as::<_, CartItem>(&sql)
            .bind(user_id)
            .fetch_all(executor)
            .await?;

        Ok(items)
    }

    pub async fn find_address<'e, E>(
        &self,
        executor: E,
        address_id: Uuid,
    ) -> Result<Option<Address>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let address = sqlx::query_as::<_, Address>(
            r#"
            SELECT
                id, user_id, label,
                ST_Y(location::geometry) AS latitude,
                ST_X(location::geometry) AS longitude
            FROM addresses
            WHERE id = $1
            "#,
        )
            .bind(address_id)
            .fetch_optional(executor)
            .await?;

        Ok(address)
    }

    pub async fn delete_items<'e, E>(&self, executor: E, ids: &[Uuid]) -> Result<u64, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let result = sqlx::query("DELETE FROM cart_items WHERE id = ANY($1)")
            .bind(ids)
            .execute(executor)
            .await?;

        Ok(result.rows_affected())
    }
}
