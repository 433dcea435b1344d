use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::client::{AuthEndpoint, HttpAuthEndpoint};
use crate::config::AuthConfig;
use crate::errors::{AuthError, Result};
use crate::store::{CredentialSlot, CredentialStore};
use crate::token;

/// Session state derived from the stored pair and the current time
///
/// Never persisted; recomputed from the store on every call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No credential pair is stored
    SignedOut,
    /// Both tokens are stored and the access token is unexpired
    SignedIn,
    /// A refresh token is stored but the access token is expired, unreadable
    /// or missing after a failed refresh
    NeedsRefresh,
}

/// Owns the sign-in / refresh / sign-out lifecycle of one credential pair
///
/// Cloning is cheap and clones share the same pair lock. Mutations run as
/// spawned tasks, so dropping the future returned by [`sign_in`],
/// [`refresh`] or [`sign_out`] does not leave the store half-written.
///
/// [`sign_in`]: SessionManager::sign_in
/// [`refresh`]: SessionManager::refresh
/// [`sign_out`]: SessionManager::sign_out
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: Arc<dyn AuthEndpoint>,
    store: Arc<dyn CredentialStore>,
    expiry_skew: chrono::Duration,
    /// Serializes every mutation of the pair
    pair_lock: Mutex<()>,
    /// Bumped after each refresh that stored a new access token
    refreshes: AtomicU64,
}

impl SessionManager {
    pub fn new(endpoint: Arc<dyn AuthEndpoint>, store: Arc<dyn CredentialStore>) -> Self {
        Self::with_expiry_skew(endpoint, store, std::time::Duration::ZERO)
    }

    /// Like [`new`](Self::new), treating access tokens as expired `skew`
    /// before their `exp` claim
    pub fn with_expiry_skew(
        endpoint: Arc<dyn AuthEndpoint>,
        store: Arc<dyn CredentialStore>,
        skew: std::time::Duration,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                store,
                expiry_skew: chrono::Duration::from_std(skew).unwrap_or(chrono::Duration::MAX),
                pair_lock: Mutex::new(()),
                refreshes: AtomicU64::new(0),
            }),
        }
    }

    /// Build a manager talking HTTP to `config.base_url`
    pub fn from_config(config: &AuthConfig, store: Arc<dyn CredentialStore>) -> Result<Self> {
        let endpoint = HttpAuthEndpoint::new(config)?;
        Ok(Self::with_expiry_skew(
            Arc::new(endpoint),
            store,
            config.expiry_skew,
        ))
    }

    /// Sign in with a username and password
    ///
    /// Fails with [`AuthError::AlreadySignedIn`] if either token is stored.
    /// Nothing is written unless the server accepts the credentials.
    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<()> {
        let username = username.to_owned();
        let password = zeroize::Zeroizing::new(password.to_owned());

        self.run_owned(move |inner| async move { inner.sign_in(&username, &password).await })
            .await
    }

    /// Current identity (access) token, refreshing it when needed
    ///
    /// An unexpired stored token is returned without any network call unless
    /// `force_refresh` is set.
    #[instrument(skip(self))]
    pub async fn get_identity_token(&self, force_refresh: bool) -> Result<String> {
        let store = &self.inner.store;
        let observed = self.inner.refreshes.load(Ordering::Acquire);

        let Some(access) = store.get(CredentialSlot::Access).await? else {
            // An empty access slot next to a refresh token is what a failed
            // or interrupted refresh leaves behind.
            if store.get(CredentialSlot::Refresh).await?.is_none() {
                return Err(AuthError::NotSignedIn);
            }
            debug!("Access token missing, retrying refresh");
            let observed = if force_refresh { None } else { Some(observed) };
            return self.refresh_with(observed).await;
        };

        let expired = token::is_expired(&access, Utc::now(), self.inner.expiry_skew)
            .map_err(|e| {
                warn!("Stored access token is unreadable: {}", e);
                AuthError::NotSignedIn
            })?;

        if force_refresh {
            debug!("Forced refresh requested");
            return self.refresh_with(None).await;
        }
        if !expired {
            return Ok(access);
        }

        debug!("Access token expired, refreshing");
        self.refresh_with(Some(observed)).await
    }

    /// Exchange the stored refresh token for a new pair
    ///
    /// Always calls the endpoint. Fails with [`AuthError::RefreshDidNotAdvance`]
    /// (restoring the previous access token) if the server hands back the
    /// access token that was already stored.
    #[instrument(skip(self))]
    pub async fn refresh(&self) -> Result<String> {
        self.refresh_with(None).await
    }

    /// Clear both tokens. Idempotent; storage failures are logged, not returned.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        let outcome = self
            .run_owned(|inner| async move {
                inner.sign_out().await;
                Ok(())
            })
            .await;
        if let Err(e) = outcome {
            warn!("Sign-out task failed: {}", e);
        }
    }

    /// Derive the session state from the store
    pub async fn session_state(&self) -> Result<SessionState> {
        let store = &self.inner.store;
        let access = store.get(CredentialSlot::Access).await?;
        let refresh = store.get(CredentialSlot::Refresh).await?;

        Ok(match (access, refresh) {
            (None, None) => SessionState::SignedOut,
            (Some(access), _) => {
                match token::is_expired(&access, Utc::now(), self.inner.expiry_skew) {
                    Ok(false) => SessionState::SignedIn,
                    _ => SessionState::NeedsRefresh,
                }
            }
            (None, Some(_)) => SessionState::NeedsRefresh,
        })
    }

    /// Whether an access token is stored, regardless of its expiry
    pub async fn is_signed_in(&self) -> Result<bool> {
        Ok(self
            .inner
            .store
            .get(CredentialSlot::Access)
            .await?
            .is_some())
    }

    async fn refresh_with(&self, observed: Option<u64>) -> Result<String> {
        self.run_owned(move |inner| async move { inner.refresh(observed).await })
            .await
    }

    /// Run `op` on a task that owns a handle to the shared state
    async fn run_owned<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnOnce(Arc<Inner>) -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let task = tokio::spawn(op(Arc::clone(&self.inner)));
        match task.await {
            Ok(result) => result,
            Err(e) => Err(AuthError::Unknown(Box::new(e))),
        }
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("expiry_skew", &self.inner.expiry_skew)
            .finish_non_exhaustive()
    }
}

impl Inner {
    async fn sign_in(&self, username: &str, password: &str) -> Result<()> {
        let _pair = self.pair_lock.lock().await;

        let access = self.store.get(CredentialSlot::Access).await?;
        let refresh = self.store.get(CredentialSlot::Refresh).await?;
        if access.is_some() || refresh.is_some() {
            return Err(AuthError::AlreadySignedIn);
        }

        let pair = self.endpoint.sign_in(username, password).await?;

        self.store
            .set(CredentialSlot::Access, Some(&pair.access))
            .await?;
        if let Err(e) = self
            .store
            .set(CredentialSlot::Refresh, Some(&pair.refresh))
            .await
        {
            self.clear_slot(CredentialSlot::Access).await;
            return Err(e.into());
        }

        info!("Signed in as {}", username);
        Ok(())
    }

    /// `observed` is the refresh counter a caller saw before deciding its
    /// token was stale; `None` forces a network call.
    async fn refresh(&self, observed: Option<u64>) -> Result<String> {
        let _pair = self.pair_lock.lock().await;

        if let Some(observed) = observed {
            if self.refreshes.load(Ordering::Acquire) != observed {
                if let Some(access) = self.store.get(CredentialSlot::Access).await? {
                    if let Ok(false) = token::is_expired(&access, Utc::now(), self.expiry_skew) {
                        debug!("Joined a refresh that completed while waiting");
                        return Ok(access);
                    }
                }
            }
        }

        let refresh_token = self
            .store
            .get(CredentialSlot::Refresh)
            .await?
            .ok_or(AuthError::NotSignedIn)?;
        let previous = self.store.get(CredentialSlot::Access).await?;

        // Cleared while the request is in flight
        self.store.set(CredentialSlot::Access, None).await?;

        let pair = match self.endpoint.refresh(&refresh_token).await {
            Ok(pair) => pair,
            Err(e) => {
                let err = AuthError::from(e);
                if err.is_declined() {
                    warn!("Refresh token declined, signing out");
                    self.clear_slot(CredentialSlot::Refresh).await;
                } else {
                    warn!("Refresh failed: {}", err);
                }
                return Err(err);
            }
        };

        if previous.as_deref() == Some(pair.access.as_str()) {
            warn!("Refresh returned the previous access token, restoring it");
            self.store
                .set(CredentialSlot::Access, previous.as_deref())
                .await?;
            return Err(AuthError::RefreshDidNotAdvance);
        }

        // Refresh slot first; a failed access write then leaves an empty
        // access slot next to the new refresh token.
        self.store
            .set(CredentialSlot::Refresh, Some(&pair.refresh))
            .await?;
        self.store
            .set(CredentialSlot::Access, Some(&pair.access))
            .await?;
        self.refreshes.fetch_add(1, Ordering::AcqRel);

        info!("Access token refreshed");
        Ok(pair.access)
    }

    async fn sign_out(&self) {
        let _pair = self.pair_lock.lock().await;
        for slot in CredentialSlot::ALL {
            self.clear_slot(slot).await;
        }
        info!("Signed out");
    }

    async fn clear_slot(&self, slot: CredentialSlot) {
        if let Err(e) = self.store.set(slot, None).await {
            warn!("Failed to clear {} slot: {}", slot, e);
        }
    }
}
