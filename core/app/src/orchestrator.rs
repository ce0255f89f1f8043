//! Session orchestrator: service wiring, initialization and logout.

use chrono::{DateTime, Utc};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use std::sync::{Arc, OnceLock, Weak};
use tracing::{debug, error, info, warn};

use bwcli_api::{HttpApiService, ServerUrls, SessionExpiredHandler, TokenSource, VaultApi};
use bwcli_common::{Platform, ProcessSessionEnv, Result, SessionEnv};
use bwcli_services::constants::{INSTALLED_VERSION_KEY, LOCALE_KEY};
use bwcli_services::{
    AppIdService, AuthService, CipherService, CollectionService, CryptoService,
    EnvironmentService, FolderService, I18nService, PasswordGenerationService, PolicyService,
    SendService, SettingsService, TokenService, UserService,
};
use bwcli_storage::{JsonFileStorage, SecureStorage, SessionCipher, StorageExt, StorageService};
use bwcli_sync::{SyncCaches, SyncService};

use crate::data_dir::resolve_data_dir;
use crate::error::{AppError, ClearFailure, ClearTarget, InitStep, LogoutError};

/// What the request layer is built from.
pub struct ApiContext {
    pub tokens: Arc<dyn TokenSource>,
    pub urls: Arc<dyn ServerUrls>,
    pub on_expired: SessionExpiredHandler,
    pub user_agent: String,
}

/// Builds the request layer once the services it reads from exist.
pub type ApiFactory = Box<dyn FnOnce(ApiContext) -> Arc<dyn VaultApi> + Send>;

/// Factory for the HTTPS client.
pub fn http_api_factory() -> ApiFactory {
    Box::new(|ctx: ApiContext| {
        Arc::new(HttpApiService::new(
            ctx.tokens,
            ctx.urls,
            ctx.on_expired,
            &ctx.user_agent,
        )) as Arc<dyn VaultApi>
    })
}

/// Everything the orchestrator takes from outside the service graph.
pub struct Collaborators {
    pub platform: Arc<dyn Platform>,
    pub storage: Arc<dyn StorageService>,
    pub session_env: Arc<dyn SessionEnv>,
    pub api: ApiFactory,
}

impl Collaborators {
    /// Collaborators of a real CLI process: a JSON store in the resolved
    /// data directory, the `BW_SESSION` mirror and the HTTPS client.
    pub fn for_process(platform: Arc<dyn Platform>) -> std::result::Result<Self, AppError> {
        let data_dir = resolve_data_dir(platform.as_ref())?;
        debug!(path = %data_dir.display(), "Data directory resolved");
        Ok(Self {
            platform,
            storage: Arc::new(JsonFileStorage::new(data_dir)),
            session_env: Arc::new(ProcessSessionEnv::default()),
            api: http_api_factory(),
        })
    }
}

/// The constructed service graph.
pub struct Services {
    pub storage: Arc<dyn StorageService>,
    pub secure_storage: Arc<dyn StorageService>,
    pub crypto: Arc<CryptoService>,
    pub tokens: Arc<TokenService>,
    pub user: Arc<UserService>,
    pub app_id: Arc<AppIdService>,
    pub environment: Arc<EnvironmentService>,
    pub i18n: Arc<I18nService>,
    pub api: Arc<dyn VaultApi>,
    pub settings: Arc<SettingsService>,
    pub ciphers: Arc<CipherService>,
    pub folders: Arc<FolderService>,
    pub collections: Arc<CollectionService>,
    pub policies: Arc<PolicyService>,
    pub sends: Arc<SendService>,
    pub password_generation: Arc<PasswordGenerationService>,
    pub sync: Arc<SyncService>,
    pub auth: Arc<AuthService>,
}

/// Owns the service graph, the startup sequence and the logout protocol.
pub struct SessionOrchestrator {
    platform: Arc<dyn Platform>,
    session_env: Arc<dyn SessionEnv>,
    services: Services,
}

impl SessionOrchestrator {
    /// Construct every service once, leaves first. No I/O happens here.
    ///
    /// Secure storage reaches the crypto service, and the request layer
    /// reaches this orchestrator, only through weak lookups resolved at call
    /// time.
    pub fn build(collaborators: Collaborators) -> Arc<Self> {
        Arc::new_cyclic(|this| Self::wire(collaborators, this))
    }

    fn wire(collaborators: Collaborators, this: &Weak<Self>) -> Self {
        let Collaborators {
            platform,
            storage,
            session_env,
            api: api_factory,
        } = collaborators;

        let crypto_slot: Arc<OnceLock<Weak<CryptoService>>> = Arc::new(OnceLock::new());
        let lookup = crypto_slot.clone();
        let secure_storage: Arc<dyn StorageService> = Arc::new(SecureStorage::new(
            storage.clone(),
            session_env.clone(),
            Box::new(move || {
                lookup
                    .get()
                    .and_then(Weak::upgrade)
                    .map(|c| c as Arc<dyn SessionCipher>)
            }),
        ));
        let crypto = Arc::new(CryptoService::new(storage.clone(), secure_storage.clone()));
        let _ = crypto_slot.set(Arc::downgrade(&crypto));

        let tokens = Arc::new(TokenService::new(storage.clone()));
        let user = Arc::new(UserService::new(storage.clone(), tokens.clone()));
        let app_id = Arc::new(AppIdService::new(storage.clone()));
        let environment = Arc::new(EnvironmentService::new(storage.clone()));
        let i18n = Arc::new(I18nService::new());

        let on_expired = expiry_handler(this.clone());
        let api = api_factory(ApiContext {
            tokens: tokens.clone(),
            urls: environment.clone(),
            on_expired: on_expired.clone(),
            user_agent: format!("Bitwarden_CLI/{}", platform.app_version()),
        });

        let settings = Arc::new(SettingsService::new(storage.clone(), user.clone()));
        let ciphers = Arc::new(CipherService::ciphers(
            storage.clone(),
            crypto.clone(),
            user.clone(),
        ));
        let folders = Arc::new(FolderService::folders(
            storage.clone(),
            crypto.clone(),
            user.clone(),
        ));
        let collections = Arc::new(CollectionService::collections(
            storage.clone(),
            crypto.clone(),
            user.clone(),
        ));
        let policies = Arc::new(PolicyService::new(storage.clone(), user.clone()));
        let sends = Arc::new(SendService::sends(
            storage.clone(),
            crypto.clone(),
            user.clone(),
        ));
        let password_generation = Arc::new(PasswordGenerationService::new(
            storage.clone(),
            crypto.clone(),
            policies.clone(),
        ));

        let sync = Arc::new(SyncService::new(
            api.clone(),
            storage.clone(),
            user.clone(),
            SyncCaches {
                settings: settings.clone(),
                ciphers: ciphers.clone(),
                folders: folders.clone(),
                collections: collections.clone(),
                policies: policies.clone(),
                sends: sends.clone(),
            },
            on_expired,
        ));
        let auth = Arc::new(AuthService::new(
            api.clone(),
            crypto.clone(),
            tokens.clone(),
            user.clone(),
            app_id.clone(),
            session_env.clone(),
        ));

        Self {
            platform,
            session_env,
            services: Services {
                storage,
                secure_storage,
                crypto,
                tokens,
                user,
                app_id,
                environment,
                i18n,
                api,
                settings,
                ciphers,
                folders,
                collections,
                policies,
                sends,
                password_generation,
                sync,
                auth,
            },
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn platform(&self) -> &dyn Platform {
        self.platform.as_ref()
    }

    /// Run the startup sequence. Safe to call again; every step re-runs.
    ///
    /// # Errors
    /// - `AppError::StorageInit` if the store cannot be opened
    /// - `AppError::Init` if server URLs or the locale cannot be loaded
    pub async fn init(&self) -> std::result::Result<(), AppError> {
        let s = &self.services;

        s.storage.init().await.map_err(AppError::StorageInit)?;

        // Dependents hold the crypto service directly; nothing to publish.
        debug!("Crypto service available to dependents");

        s.environment
            .set_urls_from_storage()
            .await
            .map_err(|source| AppError::Init {
                step: InitStep::Environment,
                source,
            })?;

        let locale: Option<String> =
            s.storage
                .get_as(LOCALE_KEY)
                .await
                .map_err(|source| AppError::Init {
                    step: InitStep::Locale,
                    source,
                })?;
        s.i18n
            .init(locale.as_deref())
            .map_err(|source| AppError::Init {
                step: InitStep::Locale,
                source,
            })?;

        if let Err(e) = s.auth.init().await {
            warn!("Could not restore authentication state: {}", e);
        }

        if let Err(e) = self.mark_installed_version().await {
            warn!("Could not record installed version: {}", e);
        }

        debug!(locale = s.i18n.locale(), "Initialized");
        Ok(())
    }

    /// Persist the running version if it differs from the stored marker.
    async fn mark_installed_version(&self) -> Result<()> {
        let storage = &self.services.storage;
        let current = self.platform.app_version();
        let stored: Option<String> = storage.get_as(INSTALLED_VERSION_KEY).await?;
        if stored.as_deref() == Some(current) {
            return Ok(());
        }
        info!(previous = ?stored, current, "Installed version changed");
        storage.save_as(INSTALLED_VERSION_KEY, &current).await
    }

    /// Tear down every piece of session and cached vault state.
    ///
    /// Every clear is attempted exactly once whatever the others do, except
    /// that the user record is kept when its id could not be read. Keys go
    /// last so no cache is left decryptable after them, and the session
    /// mirror is cleared unconditionally at the very end. Calling this when
    /// logged out succeeds. Takes no lock, so it may run from inside a
    /// request or sync that detected an expired session.
    ///
    /// # Errors
    /// - `LogoutError` listing every target that could not be cleared
    pub async fn logout(&self) -> std::result::Result<(), LogoutError> {
        let s = &self.services;
        let mut failures = Vec::new();

        let user_id = s.user.get_user_id().await;
        let id_unreadable = user_id.is_err();
        let user_id = match user_id {
            Ok(id) => id,
            Err(error) => {
                failures.push(ClearFailure {
                    target: ClearTarget::UserId,
                    error,
                });
                None
            }
        };
        let user_id = user_id.as_ref();
        debug!(user = ?user_id.map(|u| u.as_str()), "Logging out");

        let mut clears: Vec<(ClearTarget, BoxFuture<'_, Result<()>>)> = vec![
            (
                ClearTarget::LastSync,
                s.sync
                    .set_last_sync_for(user_id, DateTime::<Utc>::UNIX_EPOCH)
                    .boxed(),
            ),
            (ClearTarget::Token, s.tokens.clear_token().boxed()),
            (ClearTarget::Settings, s.settings.clear(user_id).boxed()),
            (ClearTarget::Ciphers, s.ciphers.clear(user_id).boxed()),
            (ClearTarget::Folders, s.folders.clear(user_id).boxed()),
            (ClearTarget::Collections, s.collections.clear(user_id).boxed()),
            (ClearTarget::Policies, s.policies.clear(user_id).boxed()),
            (ClearTarget::Sends, s.sends.clear(user_id).boxed()),
            (
                ClearTarget::PasswordGeneration,
                s.password_generation.clear().boxed(),
            ),
        ];
        // The stored id is the only way back to the per-user blobs, so it
        // survives a logout that could not read it.
        if !id_unreadable {
            clears.push((ClearTarget::User, s.user.clear().boxed()));
        }
        let (targets, pending): (Vec<_>, Vec<_>) = clears.into_iter().unzip();
        let results = join_all(pending).await;
        for (target, result) in targets.into_iter().zip(results) {
            if let Err(error) = result {
                failures.push(ClearFailure { target, error });
            }
        }

        if let Err(error) = s.crypto.clear_keys().await {
            failures.push(ClearFailure {
                target: ClearTarget::CryptoKeys,
                error,
            });
        }

        self.session_env.clear();

        if failures.is_empty() {
            info!("Logged out");
            Ok(())
        } else {
            for failure in &failures {
                error!(
                    clear = %failure.target,
                    "Logout could not clear state: {}",
                    failure.error
                );
            }
            Err(LogoutError { failures })
        }
    }
}

/// Callback handed to the request layer and to sync. Runs logout if the
/// orchestrator still exists; repeated calls are harmless.
fn expiry_handler(orchestrator: Weak<SessionOrchestrator>) -> SessionExpiredHandler {
    Arc::new(move || {
        let orchestrator = orchestrator.clone();
        async move {
            let Some(orchestrator) = orchestrator.upgrade() else {
                debug!("Session expired after shutdown");
                return;
            };
            warn!("Session expired, logging out");
            if let Err(e) = orchestrator.logout().await {
                error!("Logout after session expiry failed: {}", e);
            }
        }
        .boxed()
    })
}
