// AES-256-GCM sealing for values written to disk.
//
// Sealed values carry a version prefix so plaintext left over from older
// builds can still be read. The master key lives next to the data it protects
// (`<data folder>/secrets/`) and is created on first use.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use log::{debug, warn};
use ring::rand::{SecureRandom, SystemRandom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::OnceCell;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

const SEALED_PREFIX: &str = "PORTALv1:";
const KEY_BYTES: usize = 32;
const NONCE_BYTES: usize = 12;

#[derive(Debug)]
pub struct SecretProtector {
    key_path: PathBuf,
    key: OnceCell<[u8; KEY_BYTES]>,
}

impl SecretProtector {
    pub fn new(key_path: PathBuf) -> Self {
        Self {
            key_path,
            key: OnceCell::new(),
        }
    }

    pub fn key_path(&self) -> &Path {
        &self.key_path
    }

    pub fn is_sealed(&self, value: &str) -> bool {
        value.starts_with(SEALED_PREFIX)
    }

    pub async fn seal(&self, plaintext: &str) -> Result<String> {
        if plaintext.is_empty() {
            return Ok(SEALED_PREFIX.to_string());
        }

        let cipher = self.cipher().await?;
        let mut nonce_bytes = [0u8; NONCE_BYTES];
        SystemRandom::new()
            .fill(&mut nonce_bytes)
            .map_err(|_| anyhow::anyhow!("Failed to generate nonce"))?;

        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|_| anyhow::anyhow!("Encryption failed"))?;

        // nonce || ciphertext+tag
        let mut blob = Vec::with_capacity(NONCE_BYTES + ciphertext.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&ciphertext);

        Ok(format!("{}{}", SEALED_PREFIX, STANDARD.encode(blob)))
    }

    /// Unprefixed input is returned as-is.
    pub async fn open(&self, value: &str) -> Result<String> {
        let Some(encoded) = value.strip_prefix(SEALED_PREFIX) else {
            return Ok(value.to_string());
        };
        if encoded.is_empty() {
            return Ok(String::new());
        }

        let blob = STANDARD
            .decode(encoded.trim())
            .context("Sealed value is not valid base64")?;
        if blob.len() < NONCE_BYTES {
            anyhow::bail!("Sealed value is too short");
        }
        let (nonce_bytes, ciphertext) = blob.split_at(NONCE_BYTES);

        let plaintext = self
            .cipher()
            .await?
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|_| anyhow::anyhow!("Decryption failed (wrong key or corrupted value)"))?;
        String::from_utf8(plaintext).context("Decrypted value is not valid UTF-8")
    }

    async fn cipher(&self) -> Result<Aes256Gcm> {
        let key = self.get_or_init_key().await?;
        Aes256Gcm::new_from_slice(key)
            .map_err(|_| anyhow::anyhow!("Internal error: invalid AES-256 key length"))
    }

    async fn get_or_init_key(&self) -> Result<&[u8; KEY_BYTES]> {
        self.key
            .get_or_try_init(|| async {
                if tokio::fs::try_exists(&self.key_path).await.unwrap_or(false) {
                    return self.read_key().await;
                }

                if let Some(parent) = self.key_path.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .with_context(|| format!("Failed to create key directory {:?}", parent))?;
                }

                let mut key = [0u8; KEY_BYTES];
                SystemRandom::new()
                    .fill(&mut key)
                    .map_err(|_| anyhow::anyhow!("Failed to generate master key"))?;

                let encoded = STANDARD.encode(key);
                let write_key = || async {
                    let mut file = tokio::fs::OpenOptions::new()
                        .write(true)
                        .create_new(true)
                        .open(&self.key_path)
                        .await
                        .with_context(|| format!("Failed to create key file {:?}", self.key_path))?;
                    file.write_all(encoded.as_bytes()).await?;
                    file.flush().await?;
                    Ok::<(), anyhow::Error>(())
                };

                let strategy = ExponentialBackoff::from_millis(50)
                    .factor(2)
                    .max_delay(Duration::from_millis(750))
                    .take(3)
                    .map(jitter);

                let written = RetryIf::spawn(strategy, write_key, is_transient_io_error).await;
                let Err(e) = written else {
                    debug!(
                        "[PHASE: security] [STEP: key] Created master key at {:?}",
                        self.key_path
                    );
                    return Ok(key);
                };
                // Another process won the create_new race; use its key.
                if tokio::fs::try_exists(&self.key_path).await.unwrap_or(false) {
                    return self.read_key().await;
                }
                warn!(
                    "[PHASE: security] [STEP: key] Master key not persisted ({}); sealed values will not survive a restart",
                    e
                );
                Ok(key)
            })
            .await
    }

    async fn read_key(&self) -> Result<[u8; KEY_BYTES]> {
        let bytes = tokio::fs::read(&self.key_path)
            .await
            .with_context(|| format!("Failed to read key file {:?}", self.key_path))?;
        let text = String::from_utf8(bytes).context("Key file is not valid UTF-8")?;
        let decoded = STANDARD
            .decode(text.trim())
            .context("Key file is not valid base64")?;
        if decoded.len() != KEY_BYTES {
            anyhow::bail!("Key file has invalid length (expected {KEY_BYTES} bytes)");
        }
        let mut key = [0u8; KEY_BYTES];
        key.copy_from_slice(&decoded);
        Ok(key)
    }
}

fn is_transient_io_error(err: &anyhow::Error) -> bool {
    let text = err.to_string().to_ascii_lowercase();
    ["used by another process", "access is denied", "sharing violation", "resource busy"]
        .iter()
        .any(|needle| text.contains(needle))
}

pub fn default_key_path(data_folder: &Path) -> PathBuf {
    data_folder.join("secrets").join("portal_master_key.b64")
}
