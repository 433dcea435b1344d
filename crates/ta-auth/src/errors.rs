use reqwest::StatusCode;
use thiserror::Error;

/// Errors surfaced by the session manager
///
/// Transport failures are translated into this taxonomy before they reach
/// the caller, so no [`ApiError`] ever escapes the manager.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("A credential pair is already stored - sign out first")]
    AlreadySignedIn,

    #[error("No usable credentials are stored")]
    NotSignedIn,

    #[error("Refresh returned the same access token that was already stored")]
    RefreshDidNotAdvance,

    #[error("Connection failure: {0}")]
    ConnectionFailure(String),

    #[error("Request could not be built: {0}")]
    RequestFailure(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Credentials declined by the server")]
    DeclinedCredentials { body: Option<serde_json::Value> },

    #[error("Unacceptable status code {0}")]
    UnacceptableStatus(u16),

    #[error("Unexpected response body: {0}")]
    UnexpectedBody(String),

    #[error("Credential storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Unknown error: {0}")]
    Unknown(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl AuthError {
    /// Whether the server rejected the credentials themselves
    pub fn is_declined(&self) -> bool {
        matches!(self, Self::DeclinedCredentials { .. })
    }
}

impl From<ApiError> for AuthError {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Connection(e) => Self::ConnectionFailure(e.to_string()),
            ApiError::Request(e) => Self::RequestFailure(e.to_string()),
            ApiError::InvalidBaseUrl(e) => Self::RequestFailure(e.to_string()),
            ApiError::MalformedResponse(e) => Self::MalformedResponse(e.to_string()),
            ApiError::Declined { body, .. } => Self::DeclinedCredentials { body },
            ApiError::UnacceptableStatus(status) => Self::UnacceptableStatus(status.as_u16()),
            ApiError::UnexpectedBody(e) => Self::UnexpectedBody(e.to_string()),
            other => Self::Unknown(Box::new(other)),
        }
    }
}

/// Transport-layer failures of the remote auth endpoint
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Connection error: {0}")]
    Connection(#[source] reqwest::Error),

    #[error("Request error: {0}")]
    Request(#[source] reqwest::Error),

    #[error("Invalid endpoint URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),

    #[error("Malformed response: {0}")]
    MalformedResponse(#[source] reqwest::Error),

    #[error("Request declined with status {status}")]
    Declined {
        status: StatusCode,
        body: Option<serde_json::Value>,
    },

    #[error("Unacceptable status code {0}")]
    UnacceptableStatus(StatusCode),

    #[error("Unexpected response body: {0}")]
    UnexpectedBody(#[from] serde_json::Error),

    #[error("Unclassified transport error: {0}")]
    Other(#[source] reqwest::Error),
}

impl ApiError {
    /// Classify a reqwest error by the stage it failed at
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_builder() {
            Self::Request(err)
        } else if err.is_connect() || err.is_timeout() || err.is_request() {
            Self::Connection(err)
        } else if err.is_body() || err.is_decode() || err.is_redirect() {
            Self::MalformedResponse(err)
        } else {
            Self::Other(err)
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::from_reqwest(err)
    }
}

/// Failures of a [`CredentialStore`](crate::store::CredentialStore) backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Slot envelope could not be encoded: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Keyring error: {0}")]
    Keyring(String),

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Stored credentials are corrupted or were encrypted with another key")]
    Corrupted,

    #[error("No passphrase was provided for the credential store")]
    PassphraseUnavailable,

    #[error("Could not determine a storage directory for this platform")]
    NoStorageDir,

    #[error("Storage lock poisoned")]
    Poisoned,

    #[error("Background storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, AuthError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;
