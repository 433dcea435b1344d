use std::path::Path;

use aes_gcm::aead::{rand_core::RngCore, OsRng};
use argon2::{Algorithm, Argon2, Params, Version};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, warn};

use crate::crypto::EncryptionKey;
use crate::errors::{StoreError, StoreResult};
use crate::secret::SecretProvider;

const META_FILE: &str = "meta.json";
const SALT_LEN: usize = 16;
const PASSPHRASE_PROMPT: &str = "Enter the passphrase protecting stored credentials";

// Argon2id, 19 MiB, 2 passes, 1 lane
const ARGON2_MEMORY_KIB: u32 = 19 * 1024;
const ARGON2_ITERATIONS: u32 = 2;

/// Where the file store's encryption key comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeySource {
    /// Random key kept in the OS keyring, passphrase if the keyring is unusable
    #[cfg(feature = "keyring-support")]
    Keyring,

    /// Key derived from a passphrase with Argon2id
    #[default]
    Passphrase,
}

/// Persisted key-derivation metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyMeta {
    pub version: u32,
    pub created_at: DateTime<Utc>,
    /// Base64 salt for Argon2id, present once a passphrase key was derived
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub passphrase_salt: Option<String>,
}

impl Default for KeyMeta {
    fn default() -> Self {
        Self {
            version: 1,
            created_at: Utc::now(),
            passphrase_salt: None,
        }
    }
}

/// Resolves the encryption key for a storage directory
pub struct KeyManager {
    meta: KeyMeta,
    key: EncryptionKey,
}

impl KeyManager {
    pub async fn open(
        storage_dir: &Path,
        source: KeySource,
        secret_provider: &dyn SecretProvider,
    ) -> StoreResult<Self> {
        let meta_path = storage_dir.join(META_FILE);
        let mut meta = if fs::try_exists(&meta_path).await? {
            let content = fs::read_to_string(&meta_path).await?;
            serde_json::from_str(&content).map_err(|_| StoreError::Corrupted)?
        } else {
            KeyMeta::default()
        };

        let key = match source {
            #[cfg(feature = "keyring-support")]
            KeySource::Keyring => match keyring_key::load_or_create().await {
                Ok(key) => {
                    debug!("Using file store key from OS keyring");
                    key
                }
                Err(e) => {
                    warn!("Keyring unavailable ({}), falling back to passphrase", e);
                    Self::derive_from_passphrase(&mut meta, secret_provider).await?
                }
            },
            KeySource::Passphrase => Self::derive_from_passphrase(&mut meta, secret_provider).await?,
        };

        let meta_json = serde_json::to_string_pretty(&meta)?;
        fs::write(&meta_path, meta_json).await?;

        Ok(Self { meta, key })
    }

    pub fn key(&self) -> &EncryptionKey {
        &self.key
    }

    pub fn meta(&self) -> &KeyMeta {
        &self.meta
    }

    async fn derive_from_passphrase(
        meta: &mut KeyMeta,
        secret_provider: &dyn SecretProvider,
    ) -> StoreResult<EncryptionKey> {
        let salt = match &meta.passphrase_salt {
            Some(encoded) => STANDARD.decode(encoded).map_err(|_| StoreError::Corrupted)?,
            None => {
                let mut salt = vec![0u8; SALT_LEN];
                OsRng.fill_bytes(&mut salt);
                meta.passphrase_salt = Some(STANDARD.encode(&salt));
                salt
            }
        };

        let passphrase = secret_provider
            .passphrase(PASSPHRASE_PROMPT)
            .await
            .ok_or(StoreError::PassphraseUnavailable)?;

        let params = Params::new(ARGON2_MEMORY_KIB, ARGON2_ITERATIONS, 1, Some(32))
            .map_err(|e| StoreError::Crypto(format!("Invalid Argon2 params: {}", e)))?;
        let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

        // CPU-bound for tens of milliseconds
        tokio::task::spawn_blocking(move || -> StoreResult<EncryptionKey> {
            let mut key = [0u8; 32];
            argon2
                .hash_password_into(passphrase.as_bytes(), &salt, &mut key)
                .map_err(|e| StoreError::Crypto(format!("Key derivation failed: {}", e)))?;
            Ok(EncryptionKey::from_bytes(key))
        })
        .await?
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("meta", &self.meta)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[cfg(feature = "keyring-support")]
mod keyring_key {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use keyring::Entry;

    use crate::config::DEFAULT_KEYRING_SERVICE;
    use crate::crypto::EncryptionKey;
    use crate::errors::{StoreError, StoreResult};

    const KEY_ACCOUNT: &str = "file-store-key:v1";

    pub(super) async fn load_or_create() -> StoreResult<EncryptionKey> {
        tokio::task::spawn_blocking(|| -> StoreResult<EncryptionKey> {
            let entry = Entry::new(DEFAULT_KEYRING_SERVICE, KEY_ACCOUNT)
                .map_err(|e| StoreError::Keyring(e.to_string()))?;

            match entry.get_password() {
                Ok(encoded) => {
                    let bytes = STANDARD.decode(encoded).map_err(|_| StoreError::Corrupted)?;
                    let key: [u8; 32] = bytes.try_into().map_err(|_| StoreError::Corrupted)?;
                    Ok(EncryptionKey::from_bytes(key))
                }
                Err(keyring::Error::NoEntry) => {
                    let key = EncryptionKey::generate();
                    entry
                        .set_password(&STANDARD.encode(key.as_bytes()))
                        .map_err(|e| StoreError::Keyring(e.to_string()))?;
                    Ok(key)
                }
                Err(e) => Err(StoreError::Keyring(e.to_string())),
            }
        })
        .await?
    }
}
