// src/models/cart.rs

use sqlx::FromRow;
use uuid::Uuid;

use crate::models::pharmacy::Coordinate;

// Linha do carrinho (só leitura e remoção no checkout)
#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct CartItem {
    pub id: Uuid,
    pub user_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i32,
    pub is_checked: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct Address {
    pub id: Uuid,
    pub user_id: Uuid,
    pub label: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Address {
    pub fn location(&self) -> Coordinate {
        Coordinate {
            latitude: self.latitude,
            longitude: self.longitude,
        }
    }
}
