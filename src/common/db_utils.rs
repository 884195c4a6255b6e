// src/common/db_utils.rs

use sqlx::{PgPool, Postgres, Transaction};

use crate::common::error::AppError;

/// Como a linha deve ser lida: leitura simples ou travada até o fim da transação.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadMode {
    Plain,
    ForUpdate,
}

impl ReadMode {
    /// Sufixo SQL aplicado à consulta (`FOR UPDATE` trava apenas a tabela principal).
    pub(crate) fn lock_clause(self, table_alias: &str) -> String {
        match self {
            ReadMode::Plain => String::new(),
            ReadMode::ForUpdate => format!(" FOR UPDATE OF {}", table_alias),
        }
    }
}

// ---
// Unidade de Trabalho
// ---
/// Abre uma transação com `lock_timeout` local.
/// Commit é explícito; se a transação sair de escopo sem commit, o sqlx faz rollback.
pub async fn begin_unit_of_work(
    pool: &PgPool,
    lock_timeout_ms: u64,
) -> Result<Transaction<'static, Postgres>, AppError> {
    let mut tx = pool.begin().await?;

    // SET LOCAL não aceita parâmetros; set_config(..., true) tem o mesmo escopo.
    sqlx::query("SELECT set_config('lock_timeout', $1, true)")
        .bind(format!("{}ms", lock_timeout_ms))
        .execute(&mut *tx)
        .await?;

    Ok(tx)
}
