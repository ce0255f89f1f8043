//! Shared fixtures for orchestrator tests.

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bwcli_api::{
    EncryptedRecord, PolicyRecord, PreloginResponse, Profile, SessionExpiredHandler,
    SyncResponse, TokenRequest, TokenResponse, VaultApi,
};
use bwcli_app::{ApiContext, Collaborators, SessionOrchestrator};
use bwcli_common::{Error, MemorySessionEnv, Os, Platform, Result};
use bwcli_crypto::{derive_key, EncString, KdfParams, Salt, SymmetricKey};
use bwcli_storage::{MemoryStorage, StorageService};

pub const EMAIL: &str = "user@example.com";
pub const PASSWORD: &str = "correct horse battery";
pub const USER_ID: &str = "u1";

pub fn cheap_kdf() -> KdfParams {
    KdfParams {
        memory_cost: 8,
        time_cost: 1,
        parallelism: 1,
    }
}

/// Storage that records every write and remove, and can be told to fail
/// removes of keys with a given prefix, or reads and writes of one key.
#[derive(Default)]
pub struct RecordingStorage {
    inner: MemoryStorage,
    saves: Mutex<HashMap<String, usize>>,
    removes: Mutex<HashMap<String, usize>>,
    fail_removes: Mutex<Option<String>>,
    fail_gets: Mutex<Option<String>>,
    fail_saves: Mutex<Option<String>>,
    fail_init: AtomicBool,
}

impl RecordingStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_removes_with_prefix(&self, prefix: &str) {
        *self.fail_removes.lock().unwrap() = Some(prefix.to_string());
    }

    pub fn fail_gets_of(&self, key: &str) {
        *self.fail_gets.lock().unwrap() = Some(key.to_string());
    }

    pub fn fail_saves_of(&self, key: &str) {
        *self.fail_saves.lock().unwrap() = Some(key.to_string());
    }

    pub fn heal(&self) {
        self.fail_removes.lock().unwrap().take();
        self.fail_gets.lock().unwrap().take();
        self.fail_saves.lock().unwrap().take();
    }

    pub fn fail_init(&self) {
        self.fail_init.store(true, Ordering::SeqCst);
    }

    pub fn saves_of(&self, key: &str) -> usize {
        self.saves.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn removes_of(&self, key: &str) -> usize {
        self.removes.lock().unwrap().get(key).copied().unwrap_or(0)
    }

    pub fn operations(&self) -> usize {
        self.saves.lock().unwrap().values().sum::<usize>()
            + self.removes.lock().unwrap().values().sum::<usize>()
    }

    pub fn reset_counts(&self) {
        self.saves.lock().unwrap().clear();
        self.removes.lock().unwrap().clear();
    }

    pub async fn keys(&self) -> Vec<String> {
        self.inner.keys().await
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.inner.contains(key).await
    }
}

#[async_trait]
impl StorageService for RecordingStorage {
    async fn init(&self) -> Result<()> {
        if self.fail_init.load(Ordering::SeqCst) {
            return Err(Error::Storage("disk unavailable".to_string()));
        }
        self.inner.init().await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        if self.fail_gets.lock().unwrap().as_deref() == Some(key) {
            return Err(Error::Storage(format!("cannot read {}", key)));
        }
        self.inner.get(key).await
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        *self.saves.lock().unwrap().entry(key.to_string()).or_default() += 1;
        if self.fail_saves.lock().unwrap().as_deref() == Some(key) {
            return Err(Error::Storage(format!("cannot write {}", key)));
        }
        self.inner.save(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        *self.removes.lock().unwrap().entry(key.to_string()).or_default() += 1;
        let failing = self
            .fail_removes
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|prefix| key.starts_with(prefix.as_str()));
        if failing {
            return Err(Error::Storage(format!("cannot remove {}", key)));
        }
        self.inner.remove(key).await
    }
}

pub struct TestPlatform {
    pub version: String,
}

impl TestPlatform {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
        }
    }
}

impl Platform for TestPlatform {
    fn os(&self) -> Os {
        Os::Other
    }

    fn home_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/home/test"))
    }

    fn env_var(&self, _key: &str) -> Option<String> {
        None
    }

    fn current_exe(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/usr/bin/bw"))
    }

    fn current_dir(&self) -> Option<PathBuf> {
        Some(PathBuf::from("/"))
    }

    fn dir_exists(&self, _path: &Path) -> bool {
        false
    }

    fn app_version(&self) -> &str {
        &self.version
    }
}

/// In-process vault server for one account.
///
/// Once `expire` is set, `/sync` behaves like a server rejecting the token:
/// it runs the expiry handler, then fails with `SessionExpired`.
pub struct StubServer {
    pub user_key: SymmetricKey,
    pub expire: AtomicBool,
    pub on_expired: OnceLock<SessionExpiredHandler>,
    pub user_agent: OnceLock<String>,
}

impl StubServer {
    pub fn new() -> Self {
        Self {
            user_key: SymmetricKey::generate(),
            expire: AtomicBool::new(false),
            on_expired: OnceLock::new(),
            user_agent: OnceLock::new(),
        }
    }

    fn seal(&self, view: Value) -> EncString {
        EncString::encrypt(&self.user_key, &serde_json::to_vec(&view).unwrap()).unwrap()
    }

    fn record(&self, id: &str, view: Value) -> EncryptedRecord {
        EncryptedRecord {
            id: id.to_string(),
            revision_date: chrono::Utc::now(),
            data: self.seal(view),
        }
    }
}

#[async_trait]
impl VaultApi for StubServer {
    async fn post_prelogin(&self, _email: &str) -> Result<PreloginResponse> {
        Ok(PreloginResponse { kdf: cheap_kdf() })
    }

    async fn post_identity_token(&self, request: &TokenRequest) -> Result<TokenResponse> {
        let master = derive_key(PASSWORD.as_bytes(), &Salt::from_email(EMAIL), &cheap_kdf())?;
        if request.master_password_hash != master.password_hash(PASSWORD.as_bytes()) {
            return Err(Error::NotPermitted("Username or password is incorrect".to_string()));
        }
        Ok(TokenResponse {
            access_token: "access-token".to_string(),
            expires_in: 3600,
            user_id: USER_ID.to_string(),
            email: EMAIL.to_string(),
            key: EncString::encrypt(&master.stretch(), self.user_key.as_bytes())?,
            kdf: cheap_kdf(),
        })
    }

    async fn get_sync(&self) -> Result<SyncResponse> {
        if self.expire.load(Ordering::SeqCst) {
            if let Some(handler) = self.on_expired.get() {
                handler().await;
            }
            return Err(Error::SessionExpired);
        }

        Ok(SyncResponse {
            profile: Profile {
                id: USER_ID.to_string(),
                email: EMAIL.to_string(),
            },
            folders: vec![self.record("f1", json!({ "id": "f1", "name": "Work" }))],
            collections: vec![self.record(
                "c1",
                json!({ "id": "c1", "organizationId": "o1", "name": "Shared" }),
            )],
            ciphers: vec![self.record(
                "x1",
                json!({
                    "id": "x1",
                    "name": "Mail",
                    "type": "login",
                    "folderId": "f1",
                    "login": { "username": "me", "password": "hunter2", "uris": [] }
                }),
            )],
            sends: vec![self.record("s1", json!({ "id": "s1", "name": "Note", "text": "hi" }))],
            policies: vec![PolicyRecord {
                id: "p1".to_string(),
                organization_id: "o1".to_string(),
                policy_type: "passwordGenerator".to_string(),
                enabled: true,
                data: Some(json!({ "minLength": 20 })),
            }],
            domains: None,
        })
    }
}

pub struct Harness {
    pub orchestrator: Arc<SessionOrchestrator>,
    pub storage: Arc<RecordingStorage>,
    pub env: Arc<MemorySessionEnv>,
    pub server: Arc<StubServer>,
}

pub fn harness_with(storage: Arc<RecordingStorage>, version: &str) -> Harness {
    let env = Arc::new(MemorySessionEnv::new());
    let server = Arc::new(StubServer::new());
    let for_factory = server.clone();
    let orchestrator = SessionOrchestrator::build(Collaborators {
        platform: Arc::new(TestPlatform::new(version)),
        storage: storage.clone(),
        session_env: env.clone(),
        api: Box::new(move |ctx: ApiContext| {
            let _ = for_factory.on_expired.set(ctx.on_expired);
            let _ = for_factory.user_agent.set(ctx.user_agent);
            for_factory as Arc<dyn VaultApi>
        }),
    });
    Harness {
        orchestrator,
        storage,
        env,
        server,
    }
}

pub fn harness() -> Harness {
    harness_with(Arc::new(RecordingStorage::new()), "2024.1.0")
}

/// Initialize, log in, sync and generate a password, leaving state in
/// every store logout is responsible for.
pub async fn logged_in() -> Harness {
    let h = harness();
    populate(&h).await;
    h
}

pub async fn populate(h: &Harness) {
    let s = h.orchestrator.services();
    h.orchestrator.init().await.unwrap();
    s.auth.log_in(EMAIL, PASSWORD).await.unwrap();
    assert!(s.sync.full_sync(true).await.unwrap());
    let options = s.password_generation.get_options().await.unwrap();
    s.password_generation.generate(&options).await.unwrap();
}

/// Keys that must not survive logout.
pub fn session_keys() -> Vec<String> {
    let mut keys: Vec<String> = [
        "accessToken",
        "userId",
        "userEmail",
        "kdfParams",
        "key",
        "encKey",
        "generatedPasswordHistory",
    ]
    .iter()
    .map(|k| k.to_string())
    .collect();
    for prefix in ["settings", "ciphers", "folders", "collections", "policies", "sends"] {
        keys.push(format!("{}_{}", prefix, USER_ID));
    }
    keys
}
