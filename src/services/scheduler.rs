// src/services/scheduler.rs

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::{common::error::AppError, services::order_service::OrderService};

const EXPIRY_SWEEP_EVERY: Duration = Duration::from_secs(60 * 60);
const AUTO_CONFIRM_SWEEP_EVERY: Duration = Duration::from_secs(24 * 60 * 60);

/// Data limite do envio para a confirmação automática.
pub fn auto_confirm_cutoff(now: DateTime<Utc>, after_days: i64) -> DateTime<Utc> {
    now - TimeDelta::days(after_days)
}

/// Cancela os pedidos cujo prazo de pagamento passou. Devolve quantos foram cancelados.
pub async fn run_expiry_sweep(orders: &OrderService, now: DateTime<Utc>) -> Result<usize, AppError> {
    let ids = orders.find_expired_order_ids(now).await?;
    let mut canceled = 0;

    for order_id in ids {
        // Um pedido com problema não impede os outros.
        match orders.expire_order(order_id, now).await {
            Ok(true) => canceled += 1,
            Ok(false) => tracing::debug!("Pedido {} mudou antes de expirar", order_id),
            Err(e) => tracing::warn!("Falha ao expirar pedido {}: {}", order_id, e),
        }
    }

    Ok(canceled)
}

/// Confirma os pedidos enviados há mais tempo que a janela configurada.
pub async fn run_auto_confirm_sweep(orders: &OrderService, now: DateTime<Utc>) -> Result<usize, AppError> {
    let cutoff = auto_confirm_cutoff(now, orders.policy().auto_confirm_after_days);
    let ids = orders.find_sent_order_ids(cutoff).await?;
    let mut confirmed = 0;

    for order_id in ids {
        match orders.auto_confirm_order(order_id, cutoff).await {
            Ok(true) => confirmed += 1,
            Ok(false) => tracing::debug!("Pedido {} mudou antes da confirmação automática", order_id),
            Err(e) => tracing::warn!("Falha ao confirmar pedido {}: {}", order_id, e),
        }
    }

    Ok(confirmed)
}

/// Sobe as duas tarefas periódicas. A primeira execução acontece um período depois da subida.
pub fn spawn(orders: OrderService) -> Vec<JoinHandle<()>> {
    let expiry_orders = orders.clone();
    let expiry = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + EXPIRY_SWEEP_EVERY, EXPIRY_SWEEP_EVERY);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_expiry_sweep(&expiry_orders, Utc::now()).await {
                Ok(count) => tracing::info!("⏰ Pedidos expirados cancelados: {}", count),
                Err(e) => tracing::error!("Falha na varredura de pedidos expirados: {:?}", e),
            }
        }
    });

    let auto_confirm = tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + AUTO_CONFIRM_SWEEP_EVERY, AUTO_CONFIRM_SWEEP_EVERY);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match run_auto_confirm_sweep(&orders, Utc::now()).await {
                Ok(count) => tracing::info!("⏰ Pedidos confirmados automaticamente: {}", count),
                Err(e) => tracing::error!("Falha na confirmação automática: {:?}", e),
            }
        }
    });

    vec![expiry, auto_confirm]
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn cutoff_goes_back_the_configured_days() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
        assert_eq!(
            auto_confirm_cutoff(now, 7),
            Utc.with_ymd_and_hms(2024, 3, 3, 12, 0, 0).unwrap()
        );
    }
}
