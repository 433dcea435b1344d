use reqwest::{header, Client, Response, StatusCode};
use serde::Serialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::config::{endpoints, AuthConfig};
use crate::errors::ApiError;
use crate::models::{RefreshRequest, SignInRequest, TokenPair};

/// The remote side of the session: exchanges credentials for token pairs
#[async_trait::async_trait]
pub trait AuthEndpoint: Send + Sync {
    /// Exchange a username and password for a fresh credential pair
    async fn sign_in(&self, username: &str, password: &str) -> Result<TokenPair, ApiError>;

    /// Exchange a refresh token for a new credential pair
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError>;
}

/// HTTP implementation of [`AuthEndpoint`]
#[derive(Debug, Clone)]
pub struct HttpAuthEndpoint {
    http: Client,
    sign_in_url: Url,
    refresh_url: Url,
}

impl HttpAuthEndpoint {
    pub fn new(config: &AuthConfig) -> Result<Self, ApiError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .connect_timeout(config.http_timeouts.connect)
            .timeout(config.http_timeouts.request)
            .user_agent(config.user_agent.as_deref().unwrap_or("ta-auth"))
            .default_headers(headers)
            .build()
            .map_err(ApiError::Request)?;

        Ok(Self {
            http,
            sign_in_url: config.endpoint(endpoints::SIGN_IN)?,
            refresh_url: config.endpoint(endpoints::REFRESH)?,
        })
    }

    async fn post<B: Serialize + ?Sized>(&self, url: &Url, body: &B) -> Result<TokenPair, ApiError> {
        let response = self
            .http
            .post(url.clone())
            .json(body)
            .send()
            .await
            .map_err(ApiError::from_reqwest)?;

        let response = check_status(response).await?;
        let bytes = response.bytes().await.map_err(ApiError::MalformedResponse)?;

        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Pass 2xx responses through; turn everything else into an [`ApiError`]
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    if status == StatusCode::BAD_REQUEST {
        // The error body is informative only; a non-JSON body still means declined.
        let body = match response.bytes().await {
            Ok(bytes) => serde_json::from_slice(&bytes).ok(),
            Err(e) => {
                warn!("Failed to read 400 response body: {}", e);
                None
            }
        };
        return Err(ApiError::Declined { status, body });
    }

    warn!("Auth endpoint answered with status {}", status);
    Err(ApiError::UnacceptableStatus(status))
}

#[async_trait::async_trait]
impl AuthEndpoint for HttpAuthEndpoint {
    #[instrument(skip(self, password))]
    async fn sign_in(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        debug!("Requesting sign-in");
        self.post(&self.sign_in_url, &SignInRequest { username, password })
            .await
    }

    #[instrument(skip_all)]
    async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, ApiError> {
        debug!("Requesting token refresh");
        self.post(
            &self.refresh_url,
            &RefreshRequest {
                refresh: refresh_token,
            },
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header as header_eq, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn endpoint_for(server: &MockServer) -> HttpAuthEndpoint {
        let config = AuthConfig::from_base_url(&server.uri()).unwrap();
        HttpAuthEndpoint::new(&config).unwrap()
    }

    #[tokio::test]
    async fn test_sign_in_posts_credentials() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/users/sign-in"))
            .and(header_eq("content-type", "application/json"))
            .and(header_eq("accept", "application/json"))
            .and(body_json(json!({"username": "alice", "password": "secret"})))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access": "A1", "refresh": "R1"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let pair = endpoint_for(&server).sign_in("alice", "secret").await.unwrap();
        assert_eq!(pair, TokenPair::new("A1", "R1"));
    }

    #[tokio::test]
    async fn test_refresh_posts_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/users/refresh"))
            .and(body_json(json!({"refresh": "R1"})))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({"access": "A2", "refresh": "R2"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let pair = endpoint_for(&server).refresh("R1").await.unwrap();
        assert_eq!(pair, TokenPair::new("A2", "R2"));
    }

    #[tokio::test]
    async fn test_bad_request_is_declined_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/users/sign-in"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"detail": "No active account found"})),
            )
            .mount(&server)
            .await;

        let err = endpoint_for(&server)
            .sign_in("alice", "wrong")
            .await
            .unwrap_err();
        match err {
            ApiError::Declined { status, body } => {
                assert_eq!(status, StatusCode::BAD_REQUEST);
                assert_eq!(body, Some(json!({"detail": "No active account found"})));
            }
            other => panic!("Expected Declined, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_bad_request_with_plain_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_string("nope"))
            .mount(&server)
            .await;

        let err = endpoint_for(&server).refresh("R1").await.unwrap_err();
        assert!(matches!(err, ApiError::Declined { body: None, .. }));
    }

    #[tokio::test]
    async fn test_other_status_is_unacceptable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"detail": "expired"})))
            .mount(&server)
            .await;

        let err = endpoint_for(&server).refresh("R1").await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::UnacceptableStatus(StatusCode::UNAUTHORIZED)
        ));
    }

    #[tokio::test]
    async fn test_success_with_wrong_shape_is_unexpected_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "A1"})))
            .mount(&server)
            .await;

        let err = endpoint_for(&server).sign_in("a", "b").await.unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedBody(_)));
    }

    #[tokio::test]
    async fn test_unreachable_host_is_connection_error() {
        // Bind then drop a listener to get a port nothing listens on
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let config = AuthConfig::from_base_url(&format!("http://127.0.0.1:{}", port)).unwrap();

        let err = HttpAuthEndpoint::new(&config)
            .unwrap()
            .refresh("R1")
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Connection(_)));
    }
}
