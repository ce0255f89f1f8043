//! Access token service.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use bwcli_api::TokenSource;
use bwcli_common::Result;
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::ACCESS_TOKEN_KEY;

/// Holds the bearer token for API requests.
pub struct TokenService {
    storage: Arc<dyn StorageService>,
    token: RwLock<Option<String>>,
}

impl TokenService {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self {
            storage,
            token: RwLock::new(None),
        }
    }

    pub async fn set_token(&self, token: impl Into<String>) -> Result<()> {
        let token = token.into();
        let mut slot = self.token.write().await;
        self.storage.save_as(ACCESS_TOKEN_KEY, &token).await?;
        *slot = Some(token);
        Ok(())
    }

    pub async fn get_token(&self) -> Result<Option<String>> {
        if let Some(token) = self.token.read().await.as_ref() {
            return Ok(Some(token.clone()));
        }
        let mut slot = self.token.write().await;
        if slot.is_none() {
            *slot = self.storage.get_as(ACCESS_TOKEN_KEY).await?;
        }
        Ok(slot.clone())
    }

    /// Discard the token. Succeeds when no token is held.
    pub async fn clear_token(&self) -> Result<()> {
        let mut slot = self.token.write().await;
        *slot = None;
        self.storage.remove(ACCESS_TOKEN_KEY).await
    }
}

#[async_trait]
impl TokenSource for TokenService {
    async fn access_token(&self) -> Result<Option<String>> {
        self.get_token().await
    }
}
