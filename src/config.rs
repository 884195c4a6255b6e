// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::{
    common::i18n::I18nStore,
    db::{CartRepository, OrderRepository, PharmacyProductRepository, StockRepository},
    services::{
        allocation::AllocationService,
        order_service::{OrderPolicy, OrderService},
        proof_storage::LocalProofStorage,
        stock_ledger::StockLedger,
        stock_mutation_service::StockMutationService,
    },
};

// --- Configuração lida do ambiente (.env) ---
#[derive(Clone)]
pub struct Settings {
    pub database_url: String,
    pub jwt_secret: String,
    pub bind_addr: String,
    pub db_max_connections: u32,
    pub lock_timeout_ms: u64,
    pub nearby_radius_meters: f64,
    pub payment_window_hours: i64,
    pub auto_confirm_after_days: i64,
    pub proof_storage_dir: String,
    pub proof_base_url: String,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> anyhow::Result<String> {
    lookup(key).with_context(|| format!("{} deve ser definida", key))
}

fn parsed_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("{} inválida: {:?}", key, raw)),
        None => Ok(default),
    }
}

impl Settings {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Monta a configuração a partir de qualquer fonte chave -> valor.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let settings = Self {
            database_url: required(&lookup, "DATABASE_URL")?,
            jwt_secret: required(&lookup, "JWT_SECRET")?,
            bind_addr: lookup("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:3000".to_string()),
            db_max_connections: parsed_or(&lookup, "DB_MAX_CONNECTIONS", 5)?,
            lock_timeout_ms: parsed_or(&lookup, "LOCK_TIMEOUT_MS", 3000)?,
            nearby_radius_meters: parsed_or(&lookup, "NEARBY_RADIUS_METERS", 25_000.0)?,
            payment_window_hours: parsed_or(&lookup, "PAYMENT_WINDOW_HOURS", 24)?,
            auto_confirm_after_days: parsed_or(&lookup, "AUTO_CONFIRM_AFTER_DAYS", 7)?,
            proof_storage_dir: lookup("PROOF_STORAGE_DIR").unwrap_or_else(|| "./uploads".to_string()),
            proof_base_url: lookup("PROOF_BASE_URL").unwrap_or_else(|| "/uploads".to_string()),
        };

        anyhow::ensure!(settings.nearby_radius_meters > 0.0, "NEARBY_RADIUS_METERS deve ser positiva");
        anyhow::ensure!(settings.payment_window_hours > 0, "PAYMENT_WINDOW_HOURS deve ser positiva");
        anyhow::ensure!(settings.auto_confirm_after_days > 0, "AUTO_CONFIRM_AFTER_DAYS deve ser positiva");

        Ok(settings)
    }

    pub fn order_policy(&self) -> OrderPolicy {
        OrderPolicy {
            lock_timeout_ms: self.lock_timeout_ms,
            nearby_radius_meters: self.nearby_radius_meters,
            payment_window_hours: self.payment_window_hours,
            auto_confirm_after_days: self.auto_confirm_after_days,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub settings: Arc<Settings>,
    pub i18n_store: I18nStore,
    pub order_service: OrderService,
    pub stock_mutation_service: StockMutationService,
    pub stock_ledger: StockLedger,
}

impl AppState {
    pub async fn new() -> anyhow::Result<Self> {
        let settings = Settings::from_env()?;

        let db_pool = PgPoolOptions::new()
            .max_connections(settings.db_max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(&settings.database_url)
            .await
            .context("conectando ao banco de dados")?;

        tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

        Ok(Self::from_parts(db_pool, settings))
    }

    // --- Monta o gráfico de dependências ---
    pub fn from_parts(db_pool: PgPool, settings: Settings) -> Self {
        let policy = settings.order_policy();

        let pharmacy_repo = PharmacyProductRepository::new(db_pool.clone());
        let stock_repo = StockRepository::new(db_pool.clone());
        let order_repo = OrderRepository::new(db_pool.clone());
        let cart_repo = CartRepository::new();

        let stock_ledger = StockLedger::new(
            db_pool.clone(),
            pharmacy_repo.clone(),
            stock_repo.clone(),
            settings.lock_timeout_ms,
        );
        let allocation = AllocationService::new(
            pharmacy_repo.clone(),
            cart_repo.clone(),
            settings.nearby_radius_meters,
        );
        let proof_storage = Arc::new(LocalProofStorage::new(
            settings.proof_storage_dir.clone(),
            settings.proof_base_url.clone(),
        ));

        let order_service = OrderService::new(
            db_pool.clone(),
            order_repo,
            cart_repo,
            pharmacy_repo.clone(),
            stock_repo.clone(),
            allocation,
            stock_ledger.clone(),
            proof_storage,
            policy,
        );
        let stock_mutation_service = StockMutationService::new(
            db_pool.clone(),
            pharmacy_repo,
            stock_repo,
            stock_ledger.clone(),
            settings.lock_timeout_ms,
        );

        Self {
            db_pool,
            settings: Arc::new(settings),
            i18n_store: I18nStore::default(),
            order_service,
            stock_mutation_service,
            stock_ledger,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_only_required_keys_are_set() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/pharmacy"),
            ("JWT_SECRET", "segredo"),
        ]))
        .unwrap();

        assert_eq!(settings.bind_addr, "0.0.0.0:3000");
        assert_eq!(settings.db_max_connections, 5);
        assert_eq!(settings.lock_timeout_ms, 3000);
        assert_eq!(settings.nearby_radius_meters, 25_000.0);
        assert_eq!(settings.payment_window_hours, 24);
        assert_eq!(settings.auto_confirm_after_days, 7);
        assert_eq!(settings.proof_base_url, "/uploads");
    }

    #[test]
    fn missing_secret_is_an_error() {
        let result = Settings::from_lookup(lookup_from(&[("DATABASE_URL", "postgres://localhost/x")]));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_numbers_are_reported_with_the_key() {
        let err = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "s"),
            ("LOCK_TIMEOUT_MS", "três segundos"),
        ]))
        .err()
        .unwrap();

        assert!(format!("{:#}", err).contains("LOCK_TIMEOUT_MS"));
    }

    #[test]
    fn overrides_are_parsed() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://localhost/x"),
            ("JWT_SECRET", "s"),
            ("NEARBY_RADIUS_METERS", "5000"),
            ("PAYMENT_WINDOW_HOURS", "2"),
        ]))
        .unwrap();

        assert_eq!(settings.nearby_radius_meters, 5000.0);
        assert_eq!(settings.order_policy().payment_window_hours, 2);
    }
}
