//! HTTP implementation of [`VaultApi`].

use async_trait::async_trait;
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use bwcli_common::{Error, Result};

use crate::handler::SessionExpiredHandler;
use crate::models::{PreloginResponse, SyncResponse, TokenRequest, TokenResponse};
use crate::VaultApi;

/// Source of the bearer token for authenticated requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// Current access token, if logged in.
    async fn access_token(&self) -> Result<Option<String>>;
}

/// Source of the server base URLs.
#[async_trait]
pub trait ServerUrls: Send + Sync {
    /// Base URL of the API server.
    async fn api_url(&self) -> String;

    /// Base URL of the identity server.
    async fn identity_url(&self) -> String;
}

/// How a non-success response is reported.
#[derive(Debug, PartialEq, Eq)]
enum Failure {
    /// The access token is no longer accepted.
    Expired,
    /// The request itself was rejected.
    Rejected,
    /// Anything else; possibly transient.
    Other,
}

fn classify(status: StatusCode, authenticated: bool) -> Failure {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN if authenticated => Failure::Expired,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Failure::Rejected
        }
        _ => Failure::Other,
    }
}

fn endpoint(base: &str, path: &str) -> Result<Url> {
    let raw = format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'));
    Url::parse(&raw).map_err(|e| Error::InvalidInput(format!("Invalid server URL '{}': {}", raw, e)))
}

/// Vault server client over HTTPS.
pub struct HttpApiService {
    http: Client,
    tokens: Arc<dyn TokenSource>,
    urls: Arc<dyn ServerUrls>,
    on_expired: SessionExpiredHandler,
}

impl HttpApiService {
    /// Create a client. Performs no I/O.
    pub fn new(
        tokens: Arc<dyn TokenSource>,
        urls: Arc<dyn ServerUrls>,
        on_expired: SessionExpiredHandler,
        user_agent: &str,
    ) -> Self {
        let http = Client::builder()
            .user_agent(user_agent)
            .build()
            .unwrap_or_else(|e| {
                warn!("Falling back to default HTTP client: {}", e);
                Client::new()
            });

        Self {
            http,
            tokens,
            urls,
            on_expired,
        }
    }

    async fn auth_header(&self) -> Result<String> {
        let token = self
            .tokens
            .access_token()
            .await?
            .ok_or(Error::Unauthenticated)?;
        Ok(format!("Bearer {}", token))
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        authenticated: bool,
    ) -> Result<T> {
        let status = response.status();
        if status.is_success() {
            return response
                .json::<T>()
                .await
                .map_err(|e| Error::Serialization(format!("Invalid server response: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        match classify(status, authenticated) {
            Failure::Expired => {
                debug!(%status, "Server rejected access token");
                (self.on_expired)().await;
                Err(Error::SessionExpired)
            }
            Failure::Rejected => Err(Error::NotPermitted(format!(
                "Server rejected request ({}): {}",
                status, body
            ))),
            Failure::Other => Err(Error::Network(format!(
                "Server returned {}: {}",
                status, body
            ))),
        }
    }
}

#[async_trait]
impl VaultApi for HttpApiService {
    async fn post_prelogin(&self, email: &str) -> Result<PreloginResponse> {
        let url = endpoint(&self.urls.identity_url().await, "accounts/prelogin")?;
        let response = self
            .http
            .post(url)
            .json(&serde_json::json!({ "email": email }))
            .send()
            .await
            .map_err(|e| Error::Network(format!("Prelogin failed: {}", e)))?;

        self.handle_response(response, false).await
    }

    async fn post_identity_token(&self, request: &TokenRequest) -> Result<TokenResponse> {
        let url = endpoint(&self.urls.identity_url().await, "connect/token")?;
        let response = self
            .http
            .post(url)
            .header(header::ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Network(format!("Login request failed: {}", e)))?;

        self.handle_response(response, false).await
    }

    async fn get_sync(&self) -> Result<SyncResponse> {
        let url = endpoint(&self.urls.api_url().await, "sync")?;
        let auth = self.auth_header().await?;
        let response = self
            .http
            .get(url)
            .header(header::AUTHORIZATION, auth)
            .query(&[("excludeDomains", "false")])
            .send()
            .await
            .map_err(|e| Error::Network(format!("Sync request failed: {}", e)))?;

        self.handle_response(response, true).await
    }
}
