// Bearer token persisted between runs, sealed at rest.

use anyhow::{Context, Result};
use log::{info, warn};
use std::path::{Path, PathBuf};

use super::crypto::token_fingerprint;
use super::secret_protector::{default_key_path, SecretProtector};

const TOKEN_FILE: &str = "session.token";

#[derive(Debug)]
pub struct TokenStore {
    path: PathBuf,
    protector: SecretProtector,
}

impl TokenStore {
    pub fn new(data_folder: &Path) -> Self {
        Self {
            path: data_folder.join(TOKEN_FILE),
            protector: SecretProtector::new(default_key_path(data_folder)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn save(&self, token: &str) -> Result<()> {
        let token = token.trim();
        if token.is_empty() {
            anyhow::bail!("Refusing to store an empty token");
        }
        let sealed = self.protector.seal(token).await?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        tokio::fs::write(&self.path, sealed)
            .await
            .with_context(|| format!("Failed to write token file {:?}", self.path))?;
        info!(
            "[PHASE: auth] [STEP: token_store] Stored session token (fingerprint {})",
            token_fingerprint(token)
        );
        Ok(())
    }

    /// `None` when no token has been stored (or it was cleared).
    pub async fn load(&self) -> Result<Option<String>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(None);
        }
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read token file {:?}", self.path))?;
        if !self.protector.is_sealed(raw.trim()) {
            warn!("[PHASE: auth] [STEP: token_store] Token file is not sealed; it will be re-sealed on next login");
        }
        let token = self.protector.open(raw.trim()).await?;
        if token.is_empty() {
            return Ok(None);
        }
        Ok(Some(token))
    }

    /// Logout. Returns whether a token was removed.
    pub async fn clear(&self) -> Result<bool> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("[PHASE: auth] [STEP: token_store] Session token cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e).with_context(|| format!("Failed to remove {:?}", self.path)),
        }
    }
}
