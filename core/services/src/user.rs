//! Current user identity.

use std::sync::Arc;
use tokio::sync::RwLock;

use bwcli_common::{Result, UserId};
use bwcli_crypto::KdfParams;
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::{KDF_PARAMS_KEY, USER_EMAIL_KEY, USER_ID_KEY};
use crate::token::TokenService;

/// Holds the identifier and profile of the logged-in user.
pub struct UserService {
    storage: Arc<dyn StorageService>,
    tokens: Arc<TokenService>,
    user_id: RwLock<Option<UserId>>,
}

impl UserService {
    pub fn new(storage: Arc<dyn StorageService>, tokens: Arc<TokenService>) -> Self {
        Self {
            storage,
            tokens,
            user_id: RwLock::new(None),
        }
    }

    /// Record the identity returned by a successful login.
    pub async fn set_information(
        &self,
        user_id: UserId,
        email: &str,
        kdf: &KdfParams,
    ) -> Result<()> {
        let mut slot = self.user_id.write().await;
        self.storage.save_as(USER_ID_KEY, &user_id).await?;
        self.storage.save_as(USER_EMAIL_KEY, &email).await?;
        self.storage.save_as(KDF_PARAMS_KEY, kdf).await?;
        *slot = Some(user_id);
        Ok(())
    }

    pub async fn get_user_id(&self) -> Result<Option<UserId>> {
        if let Some(id) = self.user_id.read().await.as_ref() {
            return Ok(Some(id.clone()));
        }
        let mut slot = self.user_id.write().await;
        if slot.is_none() {
            *slot = self.storage.get_as(USER_ID_KEY).await?;
        }
        Ok(slot.clone())
    }

    pub async fn get_email(&self) -> Result<Option<String>> {
        self.storage.get_as(USER_EMAIL_KEY).await
    }

    pub async fn get_kdf(&self) -> Result<Option<KdfParams>> {
        self.storage.get_as(KDF_PARAMS_KEY).await
    }

    /// Logged in: both an access token and a user id are present.
    pub async fn is_authenticated(&self) -> Result<bool> {
        Ok(self.tokens.get_token().await?.is_some() && self.get_user_id().await?.is_some())
    }

    /// Discard the identity. Every key is attempted even if one fails.
    pub async fn clear(&self) -> Result<()> {
        let mut slot = self.user_id.write().await;
        *slot = None;
        let id = self.storage.remove(USER_ID_KEY).await;
        let email = self.storage.remove(USER_EMAIL_KEY).await;
        let kdf = self.storage.remove(KDF_PARAMS_KEY).await;
        id.and(email).and(kdf)
    }
}
