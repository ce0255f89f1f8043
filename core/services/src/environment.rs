//! Server URL configuration.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use bwcli_api::ServerUrls;
use bwcli_common::{Error, Result};
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::ENVIRONMENT_URLS_KEY;

pub const DEFAULT_API_URL: &str = "https://api.bitwarden.com";
pub const DEFAULT_IDENTITY_URL: &str = "https://identity.bitwarden.com";
pub const DEFAULT_WEB_VAULT_URL: &str = "https://vault.bitwarden.com";

/// Persisted server URLs. A `base` URL implies the others unless they are
/// set explicitly (self-hosted layout: `<base>/api`, `<base>/identity`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentUrls {
    #[serde(default)]
    pub base: Option<String>,
    #[serde(default)]
    pub api: Option<String>,
    #[serde(default)]
    pub identity: Option<String>,
    #[serde(default)]
    pub web_vault: Option<String>,
}

impl EnvironmentUrls {
    /// URLs of a self-hosted server at `base`.
    pub fn self_hosted(base: impl Into<String>) -> Self {
        Self {
            base: Some(base.into()),
            ..Self::default()
        }
    }

    fn normalized(self) -> Result<Self> {
        Ok(Self {
            base: normalize(self.base)?,
            api: normalize(self.api)?,
            identity: normalize(self.identity)?,
            web_vault: normalize(self.web_vault)?,
        })
    }
}

/// Trim, drop trailing slashes and default the scheme to https.
fn normalize(url: Option<String>) -> Result<Option<String>> {
    let Some(url) = url else {
        return Ok(None);
    };
    let trimmed = url.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Ok(None);
    }
    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };
    url::Url::parse(&with_scheme)
        .map_err(|e| Error::InvalidInput(format!("Invalid URL '{}': {}", with_scheme, e)))?;
    Ok(Some(with_scheme))
}

/// Resolves and persists the server URLs.
pub struct EnvironmentService {
    storage: Arc<dyn StorageService>,
    urls: RwLock<EnvironmentUrls>,
}

impl EnvironmentService {
    /// Create a service pointing at the default cloud server.
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self {
            storage,
            urls: RwLock::new(EnvironmentUrls::default()),
        }
    }

    /// Load persisted URLs; keep the defaults when none are stored.
    pub async fn set_urls_from_storage(&self) -> Result<()> {
        let stored: Option<EnvironmentUrls> = self.storage.get_as(ENVIRONMENT_URLS_KEY).await?;
        let mut urls = self.urls.write().await;
        *urls = stored.unwrap_or_default();
        debug!(base = ?urls.base, "Environment URLs loaded");
        Ok(())
    }

    /// Validate, persist and apply new URLs.
    pub async fn set_urls(&self, urls: EnvironmentUrls) -> Result<EnvironmentUrls> {
        let urls = urls.normalized()?;
        self.storage.save_as(ENVIRONMENT_URLS_KEY, &urls).await?;
        *self.urls.write().await = urls.clone();
        Ok(urls)
    }

    /// Currently applied URLs.
    pub async fn urls(&self) -> EnvironmentUrls {
        self.urls.read().await.clone()
    }

    pub async fn web_vault_url(&self) -> String {
        let urls = self.urls.read().await;
        urls.web_vault
            .clone()
            .or_else(|| urls.base.clone())
            .unwrap_or_else(|| DEFAULT_WEB_VAULT_URL.to_string())
    }
}

#[async_trait]
impl ServerUrls for EnvironmentService {
    async fn api_url(&self) -> String {
        let urls = self.urls.read().await;
        urls.api
            .clone()
            .or_else(|| urls.base.as_ref().map(|b| format!("{}/api", b)))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string())
    }

    async fn identity_url(&self) -> String {
        let urls = self.urls.read().await;
        urls.identity
            .clone()
            .or_else(|| urls.base.as_ref().map(|b| format!("{}/identity", b)))
            .unwrap_or_else(|| DEFAULT_IDENTITY_URL.to_string())
    }
}
