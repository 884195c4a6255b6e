pub mod auth;
pub mod cart;
pub mod order;
pub mod pharmacy;
pub mod stock;
