use zeroize::Zeroizing;

/// Source of the passphrase that unlocks an encrypted [`FileCredentialStore`]
///
/// [`FileCredentialStore`]: crate::file_store::FileCredentialStore
#[async_trait::async_trait]
pub trait SecretProvider: Send + Sync {
    /// Return `None` when no passphrase is available or the user declines
    async fn passphrase(&self, prompt: &str) -> Option<Zeroizing<String>>;
}

/// Provider that never yields a passphrase (keyring-only setups)
#[derive(Debug, Clone, Default)]
pub struct NoSecretProvider;

#[async_trait::async_trait]
impl SecretProvider for NoSecretProvider {
    async fn passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        None
    }
}

/// Fixed passphrase, e.g. read once from an environment variable
#[derive(Clone)]
pub struct StaticSecretProvider {
    passphrase: Zeroizing<String>,
}

impl StaticSecretProvider {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self {
            passphrase: Zeroizing::new(passphrase.into()),
        }
    }
}

impl std::fmt::Debug for StaticSecretProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StaticSecretProvider([REDACTED])")
    }
}

#[async_trait::async_trait]
impl SecretProvider for StaticSecretProvider {
    async fn passphrase(&self, _prompt: &str) -> Option<Zeroizing<String>> {
        Some(self.passphrase.clone())
    }
}
