use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use tokio::fs;
use tracing::{debug, error};

use crate::crypto::{self, EncryptedBlob, EncryptionKey};
use crate::errors::{StoreError, StoreResult};
use crate::key_manager::{KeyManager, KeySource};
use crate::secret::SecretProvider;
use crate::store::{CredentialSlot, CredentialStore};

/// File-based encrypted credential store
///
/// Each slot is an AES-256-GCM encrypted file. Writes go through a temp
/// file and a rename under an advisory lock, so a reader sees either the
/// old or the new value.
///
/// # Directory Structure
/// ```text
/// ~/.config/ta-auth/
/// ├── meta.json                  # Key derivation metadata
/// ├── lock                       # Advisory lock file
/// └── slots/
///     ├── key_access_token.json
///     └── key_refresh_token.json
/// ```
#[derive(Debug)]
pub struct FileCredentialStore {
    slots_dir: PathBuf,
    lock_file: PathBuf,
    key: EncryptionKey,
}

impl FileCredentialStore {
    /// Open a store whose key is derived from the provider's passphrase
    pub async fn new(
        storage_dir: impl AsRef<Path>,
        secret_provider: &dyn SecretProvider,
    ) -> StoreResult<Self> {
        Self::with_key_source(storage_dir, KeySource::Passphrase, secret_provider).await
    }

    pub async fn with_key_source(
        storage_dir: impl AsRef<Path>,
        source: KeySource,
        secret_provider: &dyn SecretProvider,
    ) -> StoreResult<Self> {
        let storage_dir = storage_dir.as_ref().to_path_buf();
        let slots_dir = storage_dir.join("slots");
        let lock_file = storage_dir.join("lock");

        fs::create_dir_all(&slots_dir).await?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            fs::set_permissions(&storage_dir, perms.clone()).await?;
            fs::set_permissions(&slots_dir, perms).await?;
        }

        let key_manager = KeyManager::open(&storage_dir, source, secret_provider).await?;
        debug!("Opened credential store at {}", storage_dir.display());

        Ok(Self {
            slots_dir,
            lock_file,
            key: key_manager.key().clone(),
        })
    }

    /// Platform config directory for the store
    pub fn default_storage_dir() -> StoreResult<PathBuf> {
        let project_dirs =
            directories::ProjectDirs::from("", "", "ta-auth").ok_or(StoreError::NoStorageDir)?;
        Ok(project_dirs.config_dir().to_path_buf())
    }

    fn slot_path(&self, slot: CredentialSlot) -> PathBuf {
        self.slots_dir.join(format!("{}.json", slot.key()))
    }
}

// Runs on a blocking thread: fs2 locks and fsync are synchronous.
fn write_locked(lock_file: &Path, path: &Path, contents: Option<&[u8]>) -> StoreResult<()> {
    let lock = std::fs::OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_file)?;
    FileExt::lock_exclusive(&lock)?;

    let result = match contents {
        Some(contents) => {
            let temp_path = path.with_extension("tmp");
            let mut file = std::fs::File::create(&temp_path)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
            }
            file.write_all(contents)?;
            file.sync_all()?;
            std::fs::rename(&temp_path, path)
        }
        None => match std::fs::remove_file(path) {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            other => other,
        },
    };

    FileExt::unlock(&lock)?;
    Ok(result?)
}

#[async_trait::async_trait]
impl CredentialStore for FileCredentialStore {
    async fn get(&self, slot: CredentialSlot) -> StoreResult<Option<String>> {
        let path = self.slot_path(slot);

        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let blob: EncryptedBlob = serde_json::from_str(&content).map_err(|e| {
            error!("Invalid encrypted blob for {} slot: {}", slot, e);
            StoreError::Corrupted
        })?;
        let value = crypto::decrypt(&self.key, &blob, slot)?;

        Ok(Some(value.as_str().to_owned()))
    }

    async fn set(&self, slot: CredentialSlot, value: Option<&str>) -> StoreResult<()> {
        let path = self.slot_path(slot);
        let lock_file = self.lock_file.clone();

        let contents = match value {
            Some(value) => {
                let blob = crypto::encrypt(&self.key, value, slot)?;
                Some(serde_json::to_vec_pretty(&blob)?)
            }
            None => None,
        };

        tokio::task::spawn_blocking(move || write_locked(&lock_file, &path, contents.as_deref()))
            .await??;

        debug!("Updated {} slot on disk", slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::StaticSecretProvider;
    use tempfile::TempDir;

    async fn create_test_store() -> (FileCredentialStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let provider = StaticSecretProvider::new("test-passphrase");
        let store = FileCredentialStore::new(temp_dir.path(), &provider)
            .await
            .unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _temp) = create_test_store().await;

        store.set(CredentialSlot::Access, Some("A1")).await.unwrap();
        store.set(CredentialSlot::Refresh, Some("R1")).await.unwrap();

        assert_eq!(
            store.get(CredentialSlot::Access).await.unwrap().as_deref(),
            Some("A1")
        );
        assert_eq!(
            store.get(CredentialSlot::Refresh).await.unwrap().as_deref(),
            Some("R1")
        );
    }

    #[tokio::test]
    async fn test_values_are_not_plaintext_on_disk() {
        let (store, temp) = create_test_store().await;
        store
            .set(CredentialSlot::Refresh, Some("very-secret-refresh"))
            .await
            .unwrap();

        let raw = std::fs::read_to_string(
            temp.path().join("slots").join("key_refresh_token.json"),
        )
        .unwrap();
        assert!(!raw.contains("very-secret-refresh"));
    }

    #[tokio::test]
    async fn test_clear() {
        let (store, _temp) = create_test_store().await;

        store.set(CredentialSlot::Access, Some("A1")).await.unwrap();
        store.set(CredentialSlot::Access, None).await.unwrap();
        assert_eq!(store.get(CredentialSlot::Access).await.unwrap(), None);

        // Clearing a missing slot is not an error
        store.set(CredentialSlot::Access, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_reopen_with_same_passphrase() {
        let temp = TempDir::new().unwrap();
        let provider = StaticSecretProvider::new("pw");

        let store = FileCredentialStore::new(temp.path(), &provider).await.unwrap();
        store.set(CredentialSlot::Access, Some("A1")).await.unwrap();
        drop(store);

        let reopened = FileCredentialStore::new(temp.path(), &provider).await.unwrap();
        assert_eq!(
            reopened.get(CredentialSlot::Access).await.unwrap().as_deref(),
            Some("A1")
        );
    }

    #[tokio::test]
    async fn test_wrong_passphrase_reads_corrupted() {
        let temp = TempDir::new().unwrap();

        let store = FileCredentialStore::new(temp.path(), &StaticSecretProvider::new("right"))
            .await
            .unwrap();
        store.set(CredentialSlot::Access, Some("A1")).await.unwrap();

        let other = FileCredentialStore::new(temp.path(), &StaticSecretProvider::new("wrong"))
            .await
            .unwrap();
        assert!(matches!(
            other.get(CredentialSlot::Access).await,
            Err(StoreError::Corrupted)
        ));
    }

    #[tokio::test]
    async fn test_swapped_slot_files_are_rejected() {
        let (store, temp) = create_test_store().await;
        store.set(CredentialSlot::Access, Some("A1")).await.unwrap();

        let slots = temp.path().join("slots");
        std::fs::rename(
            slots.join("key_access_token.json"),
            slots.join("key_refresh_token.json"),
        )
        .unwrap();

        assert!(matches!(
            store.get(CredentialSlot::Refresh).await,
            Err(StoreError::Corrupted)
        ));
    }
}
