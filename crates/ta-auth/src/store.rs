use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::errors::{StoreError, StoreResult};

/// The two logical slots of a credential pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CredentialSlot {
    Access,
    Refresh,
}

impl CredentialSlot {
    pub const ALL: [CredentialSlot; 2] = [CredentialSlot::Access, CredentialSlot::Refresh];

    /// Stable key used by persistent backends
    pub fn key(&self) -> &'static str {
        match self {
            Self::Access => "key_access_token",
            Self::Refresh => "key_refresh_token",
        }
    }
}

impl std::fmt::Display for CredentialSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Access => f.write_str("access"),
            Self::Refresh => f.write_str("refresh"),
        }
    }
}

/// Durable storage for the access and refresh tokens
///
/// Each call is atomic for its slot. Writing `None` clears the slot;
/// clearing an empty slot is not an error.
#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Read a slot
    async fn get(&self, slot: CredentialSlot) -> StoreResult<Option<String>>;

    /// Write or clear a slot
    async fn set(&self, slot: CredentialSlot, value: Option<&str>) -> StoreResult<()>;
}

/// In-memory credential store for testing and ephemeral sessions
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStore {
    slots: Arc<RwLock<HashMap<CredentialSlot, String>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-seeded with a credential pair
    pub fn with_pair(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        let store = Self::new();
        if let Ok(mut slots) = store.slots.write() {
            slots.insert(CredentialSlot::Access, access.into());
            slots.insert(CredentialSlot::Refresh, refresh.into());
        }
        store
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn get(&self, slot: CredentialSlot) -> StoreResult<Option<String>> {
        let slots = self.slots.read().map_err(|_| StoreError::Poisoned)?;
        Ok(slots.get(&slot).cloned())
    }

    async fn set(&self, slot: CredentialSlot, value: Option<&str>) -> StoreResult<()> {
        let mut slots = self.slots.write().map_err(|_| StoreError::Poisoned)?;
        match value {
            Some(value) => slots.insert(slot, value.to_string()),
            None => slots.remove(&slot),
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_and_get() {
        let store = MemoryCredentialStore::new();
        assert_eq!(store.get(CredentialSlot::Access).await.unwrap(), None);

        store.set(CredentialSlot::Access, Some("A1")).await.unwrap();
        assert_eq!(
            store.get(CredentialSlot::Access).await.unwrap().as_deref(),
            Some("A1")
        );
        assert_eq!(store.get(CredentialSlot::Refresh).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_clear_is_idempotent() {
        let store = MemoryCredentialStore::with_pair("A1", "R1");

        store.set(CredentialSlot::Refresh, None).await.unwrap();
        store.set(CredentialSlot::Refresh, None).await.unwrap();

        assert_eq!(store.get(CredentialSlot::Refresh).await.unwrap(), None);
        assert_eq!(
            store.get(CredentialSlot::Access).await.unwrap().as_deref(),
            Some("A1")
        );
    }

    #[tokio::test]
    async fn test_clones_share_slots() {
        let store = MemoryCredentialStore::new();
        let clone = store.clone();

        clone.set(CredentialSlot::Refresh, Some("R1")).await.unwrap();
        assert_eq!(
            store.get(CredentialSlot::Refresh).await.unwrap().as_deref(),
            Some("R1")
        );
    }

    #[test]
    fn test_slot_keys() {
        assert_eq!(CredentialSlot::Access.key(), "key_access_token");
        assert_eq!(CredentialSlot::Refresh.key(), "key_refresh_token");
        assert_eq!(CredentialSlot::Access.to_string(), "access");
    }
}
