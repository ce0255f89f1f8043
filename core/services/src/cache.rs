//! Per-user caches of encrypted vault entities.
//!
//! Each cache persists the encrypted records of the current user under
//! `<prefix>_<userId>` and keeps the decrypted views in memory until the
//! records change or the cache is cleared.

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use bwcli_api::EncryptedRecord;
use bwcli_common::{Error, Result, UserId};
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::{CIPHERS_PREFIX, COLLECTIONS_PREFIX, FOLDERS_PREFIX, SENDS_PREFIX};
use crate::crypto::CryptoService;
use crate::models::{CipherView, CollectionView, FolderView, SendView};
use crate::user::UserService;

/// Encrypted records keyed by entity id.
pub type RecordMap = BTreeMap<String, EncryptedRecord>;

/// Cache of one entity type, scoped by user id.
pub struct VaultCache<T> {
    prefix: &'static str,
    storage: Arc<dyn StorageService>,
    crypto: Arc<CryptoService>,
    user: Arc<UserService>,
    decrypted: RwLock<Option<Vec<T>>>,
    _view: PhantomData<fn() -> T>,
}

pub type CipherService = VaultCache<CipherView>;
pub type FolderService = VaultCache<FolderView>;
pub type CollectionService = VaultCache<CollectionView>;
pub type SendService = VaultCache<SendView>;

impl<T> VaultCache<T>
where
    T: DeserializeOwned + Clone + Send + Sync,
{
    pub fn new(
        prefix: &'static str,
        storage: Arc<dyn StorageService>,
        crypto: Arc<CryptoService>,
        user: Arc<UserService>,
    ) -> Self {
        Self {
            prefix,
            storage,
            crypto,
            user,
            decrypted: RwLock::new(None),
            _view: PhantomData,
        }
    }

    /// Storage key prefix of this cache.
    pub fn prefix(&self) -> &'static str {
        self.prefix
    }

    async fn current_user(&self) -> Result<UserId> {
        self.user.get_user_id().await?.ok_or(Error::Unauthenticated)
    }

    /// Replace every record of the current user.
    pub async fn replace(&self, records: Vec<EncryptedRecord>) -> Result<()> {
        let user_id = self.current_user().await?;
        let map: RecordMap = records.into_iter().map(|r| (r.id.clone(), r)).collect();
        let mut decrypted = self.decrypted.write().await;
        self.storage
            .save_as(&user_id.scoped_key(self.prefix), &map)
            .await?;
        *decrypted = None;
        debug!(cache = self.prefix, count = map.len(), "Cache replaced");
        Ok(())
    }

    /// Encrypted records of the current user.
    pub async fn get_all_encrypted(&self) -> Result<RecordMap> {
        let user_id = self.current_user().await?;
        Ok(self
            .storage
            .get_as(&user_id.scoped_key(self.prefix))
            .await?
            .unwrap_or_default())
    }

    /// Decrypted views of the current user, in id order.
    ///
    /// # Errors
    /// - `Error::Locked` if the user key is unavailable
    pub async fn get_all_decrypted(&self) -> Result<Vec<T>> {
        if let Some(views) = self.decrypted.read().await.as_ref() {
            return Ok(views.clone());
        }

        let records = self.get_all_encrypted().await?;
        let mut views = Vec::with_capacity(records.len());
        for record in records.values() {
            let plaintext = self.crypto.decrypt(&record.data).await?;
            views.push(serde_json::from_slice::<T>(&plaintext)?);
        }

        *self.decrypted.write().await = Some(views.clone());
        Ok(views)
    }

    /// Drop the decrypted views and the persisted records of `user_id`.
    ///
    /// Without a user id only the in-memory views are dropped.
    pub async fn clear(&self, user_id: Option<&UserId>) -> Result<()> {
        let mut decrypted = self.decrypted.write().await;
        *decrypted = None;
        match user_id {
            Some(id) => self.storage.remove(&id.scoped_key(self.prefix)).await,
            None => Ok(()),
        }
    }

    /// Whether decrypted views are held in memory.
    pub async fn has_decrypted(&self) -> bool {
        self.decrypted.read().await.is_some()
    }
}

impl CipherService {
    pub fn ciphers(
        storage: Arc<dyn StorageService>,
        crypto: Arc<CryptoService>,
        user: Arc<UserService>,
    ) -> Self {
        Self::new(CIPHERS_PREFIX, storage, crypto, user)
    }
}

impl FolderService {
    pub fn folders(
        storage: Arc<dyn StorageService>,
        crypto: Arc<CryptoService>,
        user: Arc<UserService>,
    ) -> Self {
        Self::new(FOLDERS_PREFIX, storage, crypto, user)
    }
}

impl CollectionService {
    pub fn collections(
        storage: Arc<dyn StorageService>,
        crypto: Arc<CryptoService>,
        user: Arc<UserService>,
    ) -> Self {
        Self::new(COLLECTIONS_PREFIX, storage, crypto, user)
    }
}

impl SendService {
    pub fn sends(
        storage: Arc<dyn StorageService>,
        crypto: Arc<CryptoService>,
        user: Arc<UserService>,
    ) -> Self {
        Self::new(SENDS_PREFIX, storage, crypto, user)
    }
}
