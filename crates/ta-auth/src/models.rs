use serde::{Deserialize, Serialize};

/// Credential pair returned by both sign-in and refresh
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
        }
    }
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access", &"[REDACTED]")
            .field("refresh", &"[REDACTED]")
            .finish()
    }
}

/// `POST /v1/users/sign-in` request body
#[derive(Serialize)]
pub struct SignInRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// `POST /v1/users/refresh` request body
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}
