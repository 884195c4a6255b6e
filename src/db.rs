pub mod cart_repo;
pub use cart_repo::CartRepository;
pub mod order_repo;
pub use order_repo::OrderRepository;
pub mod pharmacy_repo;
pub use pharmacy_repo::PharmacyProductRepository;
pub mod stock_repo;
pub use stock_repo::StockRepository;
