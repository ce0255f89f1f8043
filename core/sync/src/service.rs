//! Full sync against the vault server.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use bwcli_api::{SessionExpiredHandler, VaultApi};
use bwcli_common::{Error, Result, UserId};
use bwcli_services::constants::LAST_SYNC_PREFIX;
use bwcli_services::{
    CipherService, CollectionService, FolderService, PolicyService, SendService,
    SettingsService, UserService,
};
use bwcli_storage::{StorageExt, StorageService};

use crate::retry::RetryExecutor;

/// Caches a full sync writes into.
pub struct SyncCaches {
    pub settings: Arc<SettingsService>,
    pub ciphers: Arc<CipherService>,
    pub folders: Arc<FolderService>,
    pub collections: Arc<CollectionService>,
    pub policies: Arc<PolicyService>,
    pub sends: Arc<SendService>,
}

pub struct SyncService {
    api: Arc<dyn VaultApi>,
    storage: Arc<dyn StorageService>,
    user: Arc<UserService>,
    caches: SyncCaches,
    on_expired: SessionExpiredHandler,
    retry: RetryExecutor,
    /// Unforced syncs within this window of the last one are skipped.
    min_interval: Duration,
    in_progress: AtomicBool,
}

/// Clears the in-progress flag however the sync ends.
struct InProgress<'a>(&'a AtomicBool);

impl Drop for InProgress<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncService {
    pub fn new(
        api: Arc<dyn VaultApi>,
        storage: Arc<dyn StorageService>,
        user: Arc<UserService>,
        caches: SyncCaches,
        on_expired: SessionExpiredHandler,
    ) -> Self {
        Self {
            api,
            storage,
            user,
            caches,
            on_expired,
            retry: RetryExecutor::default(),
            min_interval: Duration::seconds(30),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    /// Time of the last completed sync of the current user.
    pub async fn get_last_sync(&self) -> Result<Option<DateTime<Utc>>> {
        let Some(user_id) = self.user.get_user_id().await? else {
            return Ok(None);
        };
        self.storage
            .get_as(&user_id.scoped_key(LAST_SYNC_PREFIX))
            .await
    }

    /// Record the last sync time of the current user.
    pub async fn set_last_sync(&self, at: DateTime<Utc>) -> Result<()> {
        let user_id = self.user.get_user_id().await?;
        self.set_last_sync_for(user_id.as_ref(), at).await
    }

    /// Record the last sync time of `user_id`. Nothing to record without a
    /// user.
    pub async fn set_last_sync_for(
        &self,
        user_id: Option<&UserId>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        match user_id {
            Some(id) => {
                self.storage
                    .save_as(&id.scoped_key(LAST_SYNC_PREFIX), &at)
                    .await
            }
            None => Ok(()),
        }
    }

    /// Pull the vault and replace every cache with it.
    ///
    /// Returns `false` when the sync was skipped: another one is running, or
    /// `force` is unset and the last sync is recent.
    ///
    /// # Errors
    /// - `Error::Unauthenticated` if nobody is logged in
    /// - `Error::SessionExpired` if the server rejected the session; logout
    ///   has already run when this is returned
    pub async fn full_sync(&self, force: bool) -> Result<bool> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync already in progress");
            return Ok(false);
        }
        let _guard = InProgress(&self.in_progress);

        let user_id = self.user.get_user_id().await?.ok_or(Error::Unauthenticated)?;
        if !force {
            if let Some(last) = self.get_last_sync().await? {
                if Utc::now() - last < self.min_interval {
                    debug!(%last, "Vault synced recently, skipping");
                    return Ok(false);
                }
            }
        }

        let response = self.retry.execute(|| self.api.get_sync()).await?;

        if response.profile.id != user_id.as_str() {
            warn!("Sync returned another account, ending session");
            (self.on_expired)().await;
            return Err(Error::SessionExpired);
        }

        let caches = &self.caches;
        caches.folders.replace(response.folders).await?;
        caches.collections.replace(response.collections).await?;
        caches.ciphers.replace(response.ciphers).await?;
        caches.sends.replace(response.sends).await?;
        caches.policies.replace(response.policies).await?;
        caches
            .settings
            .set_equivalent_domains(response.domains.unwrap_or_default())
            .await?;

        self.set_last_sync(Utc::now()).await?;
        info!("Sync complete");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryConfig;
    use async_trait::async_trait;
    use bwcli_api::{
        EncryptedRecord, PolicyRecord, PreloginResponse, Profile, SyncResponse, TokenRequest,
        TokenResponse,
    };
    use bwcli_common::MemorySessionEnv;
    use bwcli_crypto::{EncString, KdfParams, SymmetricKey};
    use bwcli_services::{CryptoService, FolderView, TokenService};
    use bwcli_storage::{MemoryStorage, SecureStorage, SessionCipher};
    use futures::FutureExt;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Server whose `/sync` answers are scripted per call.
    struct ScriptedApi {
        answers: Mutex<Vec<Result<SyncResponse>>>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl VaultApi for ScriptedApi {
        async fn post_prelogin(&self, _email: &str) -> Result<PreloginResponse> {
            Err(Error::NotFound("prelogin".to_string()))
        }

        async fn post_identity_token(&self, _request: &TokenRequest) -> Result<TokenResponse> {
            Err(Error::NotFound("token".to_string()))
        }

        async fn get_sync(&self) -> Result<SyncResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let answer = self.answers.lock().unwrap().remove(0);
            answer
        }
    }

    struct Fixture {
        sync: SyncService,
        api: Arc<ScriptedApi>,
        storage: Arc<MemoryStorage>,
        folders: Arc<FolderService>,
        expired: Arc<AtomicUsize>,
        key: SymmetricKey,
    }

    fn response(user: &str, key: &SymmetricKey) -> SyncResponse {
        let folder = FolderView {
            id: "f1".to_string(),
            name: "Work".to_string(),
        };
        SyncResponse {
            profile: Profile {
                id: user.to_string(),
                email: "u@example.com".to_string(),
            },
            folders: vec![EncryptedRecord {
                id: "f1".to_string(),
                revision_date: Utc::now(),
                data: EncString::encrypt(key, &serde_json::to_vec(&folder).unwrap()).unwrap(),
            }],
            collections: Vec::new(),
            ciphers: Vec::new(),
            sends: Vec::new(),
            policies: vec![PolicyRecord {
                id: "p1".to_string(),
                organization_id: "o1".to_string(),
                policy_type: "passwordGenerator".to_string(),
                enabled: true,
                data: None,
            }],
            domains: None,
        }
    }

    async fn fixture(answers: Vec<Result<SyncResponse>>) -> Fixture {
        let storage = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let cipher: Arc<dyn SessionCipher> = Arc::new(CryptoService::new(
            storage.clone(),
            Arc::new(MemoryStorage::new()),
        ));
        let secure = Arc::new(SecureStorage::new(
            storage.clone(),
            env,
            Box::new(move || Some(cipher.clone())),
        ));
        let crypto = Arc::new(CryptoService::new(storage.clone(), secure));
        let key = SymmetricKey::generate();
        crypto.set_key(key.clone()).await.unwrap();

        let tokens = Arc::new(TokenService::new(storage.clone()));
        let user = Arc::new(UserService::new(storage.clone(), tokens));
        user.set_information(UserId::new("u1").unwrap(), "u@example.com", &KdfParams::moderate())
            .await
            .unwrap();

        let folders = Arc::new(FolderService::folders(
            storage.clone(),
            crypto.clone(),
            user.clone(),
        ));
        let caches = SyncCaches {
            settings: Arc::new(SettingsService::new(storage.clone(), user.clone())),
            ciphers: Arc::new(CipherService::ciphers(storage.clone(), crypto.clone(), user.clone())),
            folders: folders.clone(),
            collections: Arc::new(CollectionService::collections(
                storage.clone(),
                crypto.clone(),
                user.clone(),
            )),
            policies: Arc::new(PolicyService::new(storage.clone(), user.clone())),
            sends: Arc::new(SendService::sends(storage.clone(), crypto, user.clone())),
        };

        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();
        let on_expired: SessionExpiredHandler = Arc::new(move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
            .boxed()
        });

        let api = Arc::new(ScriptedApi {
            answers: Mutex::new(answers),
            calls: AtomicUsize::new(0),
        });
        let sync = SyncService::new(api.clone(), storage.clone(), user, caches, on_expired)
            .with_retry(RetryExecutor::new(
                RetryConfig::new(2)
                    .with_initial_delay(std::time::Duration::from_millis(1))
                    .with_jitter(false),
            ));

        Fixture {
            sync,
            api,
            storage,
            folders,
            expired,
            key,
        }
    }

    #[tokio::test]
    async fn test_full_sync_writes_caches() {
        let mut f = fixture(Vec::new()).await;
        f.api.answers.lock().unwrap().push(Ok(response("u1", &f.key)));

        assert!(f.sync.full_sync(true).await.unwrap());
        assert!(f.storage.contains("folders_u1").await);
        assert!(f.storage.contains("policies_u1").await);
        assert!(f.storage.contains("settings_u1").await);
        assert!(f.sync.get_last_sync().await.unwrap().is_some());

        let folders = f.folders.get_all_decrypted().await.unwrap();
        assert_eq!(folders[0].name, "Work");
        f.sync = f.sync.with_min_interval(Duration::hours(1));
        assert!(!f.sync.full_sync(false).await.unwrap());
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let f = fixture(Vec::new()).await;
        {
            let mut answers = f.api.answers.lock().unwrap();
            answers.push(Err(Error::Network("reset".to_string())));
            answers.push(Ok(response("u1", &f.key)));
        }

        assert!(f.sync.full_sync(true).await.unwrap());
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_session_expired_is_not_retried() {
        let f = fixture(vec![Err(Error::SessionExpired)]).await;

        assert!(matches!(
            f.sync.full_sync(true).await,
            Err(Error::SessionExpired)
        ));
        assert_eq!(f.api.calls.load(Ordering::SeqCst), 1);
        assert!(f.sync.get_last_sync().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_profile_routes_to_expiry_handler() {
        let f = fixture(Vec::new()).await;
        f.api.answers.lock().unwrap().push(Ok(response("someone-else", &f.key)));

        assert!(matches!(
            f.sync.full_sync(true).await,
            Err(Error::SessionExpired)
        ));
        assert_eq!(f.expired.load(Ordering::SeqCst), 1);
        assert!(!f.storage.contains("folders_u1").await);
    }

    #[tokio::test]
    async fn test_last_sync_without_user_is_noop() {
        let f = fixture(Vec::new()).await;
        f.sync
            .set_last_sync_for(None, DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap();
        f.sync
            .set_last_sync_for(Some(&UserId::new("u1").unwrap()), DateTime::<Utc>::UNIX_EPOCH)
            .await
            .unwrap();
        assert_eq!(
            f.sync.get_last_sync().await.unwrap(),
            Some(DateTime::<Utc>::UNIX_EPOCH)
        );
    }
}
