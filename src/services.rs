pub mod allocation;
pub mod order_service;
pub mod proof_storage;
pub mod scheduler;
pub mod stock_ledger;
pub mod stock_mutation_service;
