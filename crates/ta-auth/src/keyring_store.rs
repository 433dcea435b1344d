use std::sync::Arc;

use keyring::Entry;
use tracing::{debug, warn};

use crate::config::DEFAULT_KEYRING_SERVICE;
use crate::errors::{StoreError, StoreResult};
use crate::store::{CredentialSlot, CredentialStore};

/// Credential store backed by the OS keyring
///
/// Each slot is one keyring entry under a shared service name (macOS
/// Keychain, Windows Credential Manager, Linux kernel keyring). Values are
/// written as a JSON string envelope.
#[derive(Clone)]
pub struct KeyringCredentialStore {
    service: String,
    access: Arc<Entry>,
    refresh: Arc<Entry>,
}

impl KeyringCredentialStore {
    /// Open the entries for `service`
    pub fn new(service: impl Into<String>) -> StoreResult<Self> {
        let service = service.into();
        let open = |slot: CredentialSlot| {
            Entry::new(&service, slot.key())
                .map(Arc::new)
                .map_err(|e| StoreError::Keyring(format!("Failed to access keyring: {}", e)))
        };
        let access = open(CredentialSlot::Access)?;
        let refresh = open(CredentialSlot::Refresh)?;

        Ok(Self {
            service,
            access,
            refresh,
        })
    }

    /// Open the entries under [`DEFAULT_KEYRING_SERVICE`]
    pub fn with_default_service() -> StoreResult<Self> {
        Self::new(DEFAULT_KEYRING_SERVICE)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    fn entry(&self, slot: CredentialSlot) -> Arc<Entry> {
        match slot {
            CredentialSlot::Access => Arc::clone(&self.access),
            CredentialSlot::Refresh => Arc::clone(&self.refresh),
        }
    }
}

impl std::fmt::Debug for KeyringCredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyringCredentialStore")
            .field("service", &self.service)
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn get(&self, slot: CredentialSlot) -> StoreResult<Option<String>> {
        let entry = self.entry(slot);
        let stored = tokio::task::spawn_blocking(move || entry.get_password()).await?;

        let envelope = match stored {
            Ok(envelope) => envelope,
            Err(keyring::Error::NoEntry) => return Ok(None),
            Err(e) => {
                return Err(StoreError::Keyring(format!(
                    "Failed to read {} slot: {}",
                    slot, e
                )));
            }
        };

        match serde_json::from_str::<String>(&envelope) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!("Discarding undecodable {} slot envelope: {}", slot, e);
                Ok(None)
            }
        }
    }

    async fn set(&self, slot: CredentialSlot, value: Option<&str>) -> StoreResult<()> {
        let entry = self.entry(slot);

        let Some(value) = value else {
            let deleted = tokio::task::spawn_blocking(move || entry.delete_credential()).await?;
            return match deleted {
                Ok(()) | Err(keyring::Error::NoEntry) => {
                    debug!("Cleared {} slot", slot);
                    Ok(())
                }
                Err(e) => Err(StoreError::Keyring(format!(
                    "Failed to clear {} slot: {}",
                    slot, e
                ))),
            };
        };

        let envelope = serde_json::to_string(value)?;
        tokio::task::spawn_blocking(move || entry.set_password(&envelope))
            .await?
            .map_err(|e| StoreError::Keyring(format!("Failed to write {} slot: {}", slot, e)))?;

        debug!("Wrote {} slot", slot);
        Ok(())
    }
}
