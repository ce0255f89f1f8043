//! Per-user account settings.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use bwcli_api::Domains;
use bwcli_common::{Error, Result, UserId};
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::SETTINGS_PREFIX;
use crate::user::UserService;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSettings {
    #[serde(default)]
    pub equivalent_domains: Vec<Vec<String>>,
}

pub struct SettingsService {
    storage: Arc<dyn StorageService>,
    user: Arc<UserService>,
    cached: RwLock<Option<AccountSettings>>,
}

impl SettingsService {
    pub fn new(storage: Arc<dyn StorageService>, user: Arc<UserService>) -> Self {
        Self {
            storage,
            user,
            cached: RwLock::new(None),
        }
    }

    async fn key(&self) -> Result<String> {
        let user_id = self.user.get_user_id().await?.ok_or(Error::Unauthenticated)?;
        Ok(user_id.scoped_key(SETTINGS_PREFIX))
    }

    pub async fn set_equivalent_domains(&self, domains: Domains) -> Result<()> {
        let key = self.key().await?;
        let mut cached = self.cached.write().await;
        let settings = AccountSettings {
            equivalent_domains: domains.equivalent_domains,
        };
        self.storage.save_as(&key, &settings).await?;
        *cached = Some(settings);
        Ok(())
    }

    pub async fn get_equivalent_domains(&self) -> Result<Vec<Vec<String>>> {
        if let Some(settings) = self.cached.read().await.as_ref() {
            return Ok(settings.equivalent_domains.clone());
        }
        let key = self.key().await?;
        let settings: AccountSettings = self.storage.get_as(&key).await?.unwrap_or_default();
        let domains = settings.equivalent_domains.clone();
        *self.cached.write().await = Some(settings);
        Ok(domains)
    }

    /// Drop cached settings and the persisted settings of `user_id`.
    pub async fn clear(&self, user_id: Option<&UserId>) -> Result<()> {
        let mut cached = self.cached.write().await;
        *cached = None;
        match user_id {
            Some(id) => self.storage.remove(&id.scoped_key(SETTINGS_PREFIX)).await,
            None => Ok(()),
        }
    }
}
