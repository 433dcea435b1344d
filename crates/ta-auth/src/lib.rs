//! Client-side session manager for a token-based auth backend
//!
//! Signs a user in with a username and password, keeps the resulting
//! access/refresh pair in secure storage, and hands out an identity token
//! on demand, refreshing it lazily when it has expired.
//!
//! # Lifecycle
//!
//! 1. [`SessionManager::sign_in`] exchanges credentials for a token pair
//! 2. [`SessionManager::get_identity_token`] returns the stored access token,
//!    refreshing it first if its `exp` claim has passed
//! 3. [`SessionManager::refresh`] forces a refresh
//! 4. [`SessionManager::sign_out`] clears both tokens
//!
//! All mutations of the pair are serialized, and concurrent lookups that
//! find an expired token share a single refresh call.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ta_auth::{AuthConfig, MemoryCredentialStore, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AuthConfig::from_base_url("https://auth.example.com/api/")?;
//!     let manager = SessionManager::from_config(&config, Arc::new(MemoryCredentialStore::new()))?;
//!
//!     manager.sign_in("alice", "secret").await?;
//!
//!     // Refreshes transparently once the access token has expired
//!     let token = manager.get_identity_token(false).await?;
//!     println!("Authorization: Bearer {}", token);
//!
//!     manager.sign_out().await;
//!     Ok(())
//! }
//! ```
//!
//! # Credential Storage
//!
//! The manager persists tokens through the [`CredentialStore`] trait.
//!
//! ## In-Memory Storage (Testing)
//!
//! ```
//! use ta_auth::{CredentialSlot, CredentialStore, MemoryCredentialStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = MemoryCredentialStore::new();
//! store.set(CredentialSlot::Refresh, Some("R1")).await?;
//!
//! assert_eq!(store.get(CredentialSlot::Refresh).await?.as_deref(), Some("R1"));
//! assert_eq!(store.get(CredentialSlot::Access).await?, None);
//! # Ok(())
//! # }
//! # tokio_test::block_on(example()).unwrap();
//! ```
//!
//! ## OS Keyring (Production)
//!
//! ```no_run
//! # #[cfg(feature = "keyring-support")]
//! # async fn example() -> anyhow::Result<()> {
//! use std::sync::Arc;
//! use ta_auth::{AuthConfig, KeyringCredentialStore, SessionManager};
//!
//! // macOS Keychain, Windows Credential Manager, Linux kernel keyring
//! let store = KeyringCredentialStore::with_default_service()?;
//! let config = AuthConfig::from_base_url("https://auth.example.com/api/")?;
//! let manager = SessionManager::from_config(&config, Arc::new(store))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## File-Based Encrypted Storage
//!
//! ```no_run
//! use ta_auth::{FileCredentialStore, StaticSecretProvider};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let storage_dir = FileCredentialStore::default_storage_dir()?;
//! let provider = StaticSecretProvider::new("correct horse battery staple");
//!
//! // Slots are encrypted with AES-256-GCM under an Argon2id-derived key
//! let store = FileCredentialStore::new(storage_dir, &provider).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Important Notes
//!
//! - Token signatures are never verified locally; only `exp` is read
//! - Tokens and passwords are never logged
//! - A refresh that returns the already-stored access token fails with
//!   [`AuthError::RefreshDidNotAdvance`]

pub mod client;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod file_store;
pub mod key_manager;
#[cfg(feature = "keyring-support")]
pub mod keyring_store;
pub mod models;
pub mod secret;
pub mod session;
pub mod store;
pub mod token;

// Re-export main types
pub use client::{AuthEndpoint, HttpAuthEndpoint};
pub use config::{AuthConfig, HttpTimeouts};
pub use errors::{ApiError, AuthError, Result, StoreError};
pub use file_store::FileCredentialStore;
pub use key_manager::KeySource;
#[cfg(feature = "keyring-support")]
pub use keyring_store::KeyringCredentialStore;
pub use models::TokenPair;
pub use secret::{NoSecretProvider, SecretProvider, StaticSecretProvider};
pub use session::{SessionManager, SessionState};
pub use store::{CredentialSlot, CredentialStore, MemoryCredentialStore};
pub use token::{decode_expiry, MalformedToken};

#[cfg(test)]
pub(crate) fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}
