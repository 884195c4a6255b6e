// src/db/pharmacy_repo.rs

use sqlx::{Executor, PgPool, Postgres};
use uuid::Uuid;

use crate::{
    common::{db_utils::ReadMode, error::AppError},
    models::pharmacy::{Coordinate, NearbyCandidate, Pharmacy, PharmacyProduct},
};

// Produto da farmácia sempre junto com o admin e a localização da farmácia.
const SELECT_PHARMACY_PRODUCT: &str = r#"
    SELECT
        pp.id, pp.product_id, pp.pharmacy_id, pp.stock, pp.price, pp.is_active, pp.updated_at,
        ph.admin_id,
        ST_Y(ph.location::geometry) AS latitude,
        ST_X(ph.location::geometry) AS longitude
    FROM pharmacy_products pp
    JOIN pharmacies ph ON ph.id = pp.pharmacy_id
"#;

#[derive(Clone)]
pub struct PharmacyProductRepository {
    pool: PgPool,
}

impl PharmacyProductRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_id<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        mode: ReadMode,
    ) -> Result<Option<PharmacyProduct>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!("{} WHERE pp.id = $1{}", SELECT_PHARMACY_PRODUCT, mode.lock_clause("pp"));

        let product = sqlx::query_as::<_, PharmacyProduct>(&sql)
            .bind(id)
            .fetch_optional(executor)
            .await?;

        Ok(product)
    }

    /// Trava várias linhas de uma vez, sempre em ordem crescente de id
    /// (duas transações concorrentes nunca travam na ordem inversa).
    pub async fn lock_many<'e, E>(
        &self,
        executor: E,
        ids: &[Uuid],
    ) -> Result<Vec<PharmacyProduct>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE pp.id = ANY($1) ORDER BY pp.id{}",
            SELECT_PHARMACY_PRODUCT,
            ReadMode::ForUpdate.lock_clause("pp")
        );

        let products = sqlx::query_as::<_, PharmacyProduct>(&sql)
            .bind(ids)
            .fetch_all(executor)
            .await?;

        Ok(products)
    }

    /// O "irmão" de um produto em outra farmácia (mesmo produto, farmácia dada).
    pub async fn find_sibling<'e, E>(
        &self,
        executor: E,
        pharmacy_id: Uuid,
        product_id: Uuid,
    ) -> Result<Option<PharmacyProduct>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let sql = format!(
            "{} WHERE pp.pharmacy_id = $1 AND pp.product_id = $2",
            SELECT_PHARMACY_PRODUCT
        );

        let product = sqlx::query_as::<_, PharmacyProduct>(&sql)
            .bind(pharmacy_id)
            .bind(product_id)
            .fetch_optional(executor)
            .await?;

        Ok(product)
    }

    // ---
    // Busca geoespacial (PostGIS)
    // ---
    /// Produtos de farmácias num raio de `radius_meters` da origem,
    /// do mais perto para o mais longe.
    pub async fn find_nearby_candidates<'e, E>(
        &self,
        executor: E,
        product_ids: &[Uuid],
        origin: Coordinate,
        radius_meters: f64,
    ) -> Result<Vec<NearbyCandidate>, AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        let candidates = sqlx::query_as::<_, NearbyCandidate>(
            r#"
            WITH origin AS (
                SELECT ST_SetSRID(ST_MakePoint($2, $3), 4326)::geography AS point
            )
            SELECT
                pp.id AS pharmacy_product_id,
                pp.pharmacy_id,
                pp.product_id,
                pp.stock,
                pp.price,
                pp.is_active,
                ST_Distance(ph.location, origin.point) AS distance
            FROM pharmacy_products pp
            JOIN pharmacies ph ON ph.id = pp.pharmacy_id
            CROSS JOIN origin
            WHERE pp.product_id = ANY($1)
              AND ST_DWithin(ph.location, origin.point, $4)
            ORDER BY distance ASC, pp.id ASC
            "#,
        )
            .bind(product_ids)
            .bind(origin.longitude)
            .bind(origin.latitude)
            .bind(radius_meters)
            .fetch_all(executor)
            .await?;

        Ok(candidates)
    }

    pub async fn update_stock<'e, E>(
        &self,
        executor: E,
        id: Uuid,
        stock: i32,
    ) -> Result<(), AppError>
    where
        E: Executor<'e, Database = Postgres>,
    {
        sqlx::query("UPDATE pharmacy_products SET stock = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(stock)
            .execute(executor)
            .await?;

        Ok(())
    }

    /// Outras farmácias que têm o mesmo produto (origem possível de uma transferência).
    pub async fn find_pharmacies_carrying(
        &self,
        product_id: Uuid,
        except_pharmacy_id: Uuid,
    ) -> Result<Vec<Pharmacy>, AppError> {
        let pharmacies = sqlx::query_as::<_, Pharmacy>(
            r#"
            SELECT ph.id, ph.name, ph.admin_id
            FROM pharmacy_products pp
            JOIN pharmacies ph ON ph.id = pp.pharmacy_id
            WHERE pp.product_id = $1 AND pp.pharmacy_id <> $2
            ORDER BY ph.name ASC
            "#,
        )
            .bind(product_id)
            .bind(except_pharmacy_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(pharmacies)
    }
}
