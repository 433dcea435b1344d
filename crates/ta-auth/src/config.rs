use std::time::Duration;

use url::Url;

use crate::errors::{ApiError, Result};

/// Remote auth endpoint paths, relative to the configured base URL
pub mod endpoints {
    pub const SIGN_IN: &str = "v1/users/sign-in";
    pub const REFRESH: &str = "v1/users/refresh";
}

/// Keyring service the default secure store files its entries under
pub const DEFAULT_KEYRING_SERVICE: &str = "ta-auth.secret";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub request: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            request: Duration::from_secs(20),
        }
    }
}

/// Configuration for the HTTP auth endpoint and the session manager
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// Base URL of the backend, e.g. `https://api.example.com/`
    pub base_url: Url,

    /// HTTP client timeouts
    pub http_timeouts: HttpTimeouts,

    /// Custom user agent (optional)
    pub user_agent: Option<String>,

    /// Treat access tokens as expired this long before their `exp` claim
    pub expiry_skew: Duration,
}

impl AuthConfig {
    pub fn new(base_url: Url) -> Self {
        Self {
            base_url,
            http_timeouts: HttpTimeouts::default(),
            user_agent: Some(concat!("ta-auth/", env!("CARGO_PKG_VERSION")).to_string()),
            expiry_skew: Duration::ZERO,
        }
    }

    /// Parse the base URL and build a config with default timeouts
    pub fn from_base_url(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url).map_err(ApiError::from)?;
        Ok(Self::new(base_url))
    }

    pub fn with_expiry_skew(mut self, skew: Duration) -> Self {
        self.expiry_skew = skew;
        self
    }

    /// Resolve an endpoint path against the base URL
    ///
    /// A base without a trailing slash is treated as a directory, so
    /// `https://host/api` and `https://host/api/` resolve identically.
    pub fn endpoint(&self, path: &str) -> std::result::Result<Url, ApiError> {
        let mut base = self.base_url.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        Ok(base.join(path)?)
    }
}
