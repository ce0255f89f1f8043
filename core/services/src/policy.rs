//! Organization policies of the current user.

use std::sync::Arc;
use tokio::sync::RwLock;

use bwcli_api::PolicyRecord;
use bwcli_common::{Error, Result, UserId};
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::POLICIES_PREFIX;
use crate::user::UserService;

/// Policy type that constrains the password generator.
pub const PASSWORD_GENERATOR_POLICY: &str = "passwordGenerator";

pub struct PolicyService {
    storage: Arc<dyn StorageService>,
    user: Arc<UserService>,
    cached: RwLock<Option<Vec<PolicyRecord>>>,
}

impl PolicyService {
    pub fn new(storage: Arc<dyn StorageService>, user: Arc<UserService>) -> Self {
        Self {
            storage,
            user,
            cached: RwLock::new(None),
        }
    }

    pub async fn replace(&self, policies: Vec<PolicyRecord>) -> Result<()> {
        let user_id = self.user.get_user_id().await?.ok_or(Error::Unauthenticated)?;
        let mut cached = self.cached.write().await;
        self.storage
            .save_as(&user_id.scoped_key(POLICIES_PREFIX), &policies)
            .await?;
        *cached = Some(policies);
        Ok(())
    }

    /// All policies. Empty when nobody is logged in.
    pub async fn get_all(&self) -> Result<Vec<PolicyRecord>> {
        if let Some(policies) = self.cached.read().await.as_ref() {
            return Ok(policies.clone());
        }
        let Some(user_id) = self.user.get_user_id().await? else {
            return Ok(Vec::new());
        };
        let policies: Vec<PolicyRecord> = self
            .storage
            .get_as(&user_id.scoped_key(POLICIES_PREFIX))
            .await?
            .unwrap_or_default();
        *self.cached.write().await = Some(policies.clone());
        Ok(policies)
    }

    /// Enabled policies of one type.
    pub async fn get_by_type(&self, policy_type: &str) -> Result<Vec<PolicyRecord>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|p| p.enabled && p.policy_type == policy_type)
            .collect())
    }

    pub async fn clear(&self, user_id: Option<&UserId>) -> Result<()> {
        let mut cached = self.cached.write().await;
        *cached = None;
        match user_id {
            Some(id) => self.storage.remove(&id.scoped_key(POLICIES_PREFIX)).await,
            None => Ok(()),
        }
    }
}
