// src/models/pharmacy.rs

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

// Ponto geográfico (WGS84)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Coordinate {
    #[schema(example = -6.2)]
    pub latitude: f64,
    #[schema(example = 106.816666)]
    pub longitude: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Pharmacy {
    pub id: Uuid,
    pub name: String,
    pub admin_id: Uuid,
}

// --- Produto da Farmácia ---
// Par (farmácia, produto) com estoque e preço próprios.
// Sempre lido junto com a farmácia dona (admin e localização).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PharmacyProduct {
    pub id: Uuid,
    pub product_id: Uuid,
    pub pharmacy_id: Uuid,
    #[schema(example = 10)]
    pub stock: i32,
    #[schema(example = "12500.00")]
    pub price: Decimal,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,

    // Da farmácia
    #[schema(ignore)]
    pub admin_id: Uuid,
    pub latitude: f64,
    pub longitude: f64,
}

impl PharmacyProduct {
    pub fn pharmacy_location(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}

/// Resultado da busca geoespacial, ordenado pela distância à origem.
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct NearbyCandidate {
    pub pharmacy_product_id: Uuid,
    pub pharmacy_id: Uuid,
    pub product_id: Uuid,
    pub stock: i32,
    pub price: Decimal,
    pub is_active: bool,
    pub distance: f64, // metros
}
