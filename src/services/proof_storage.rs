// src/services/proof_storage.rs

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use uuid::Uuid;

use crate::common::error::AppError;

const PROOF_KEY_PREFIX: &str = "payment-proof-";

/// Onde os comprovantes de pagamento ficam guardados.
#[async_trait]
pub trait ProofStorage: Send + Sync {
    /// Grava os bytes sob `key` e devolve a URL pública do arquivo.
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, AppError>;
}

/// Nova chave `payment-proof-<aleatório>`.
pub fn new_proof_key() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}{}", PROOF_KEY_PREFIX, &random[..12])
}

/// Guarda os arquivos num diretório local, servidos sob `base_url`.
pub struct LocalProofStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalProofStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl ProofStorage for LocalProofStorage {
    async fn upload(&self, key: &str, bytes: &[u8]) -> Result<String, AppError> {
        // A chave vira nome de arquivo; nada de subdiretórios.
        if key.is_empty() || key.contains(['/', '\\']) || key.starts_with('.') {
            return Err(AppError::InvalidInput(format!("chave de arquivo inválida: {}", key)));
        }

        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("criando diretório {}", self.root.display()))?;

        let path = self.root.join(key);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("gravando comprovante em {}", path.display()))?;

        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}
