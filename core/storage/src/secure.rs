//! Secure storage facade.
//!
//! Values are sealed with the session key exported through the session
//! mirror, so a secret persisted by one invocation can only be read back by
//! an invocation that inherited the same session.
//!
//! The cipher comes from the crypto service, which itself persists its key
//! through this facade. The facade therefore never owns the crypto service:
//! it holds a [`CryptoLookup`] that is resolved on every call.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::service::StorageService;
use bwcli_common::{Error, Result, SessionEnv};
use bwcli_crypto::{EncString, SymmetricKey};

/// Cipher capability the facade borrows from the crypto service.
pub trait SessionCipher: Send + Sync {
    /// Seal `plaintext` under `session_key`.
    fn seal(&self, session_key: &SymmetricKey, plaintext: &[u8]) -> Result<EncString>;

    /// Open a value sealed by [`SessionCipher::seal`].
    fn open(&self, session_key: &SymmetricKey, sealed: &EncString) -> Result<Vec<u8>>;
}

/// Deferred lookup of the cipher; `None` once the provider is gone.
pub type CryptoLookup = Box<dyn Fn() -> Option<Arc<dyn SessionCipher>> + Send + Sync>;

/// Storage facade encrypting values with the session key.
pub struct SecureStorage {
    storage: Arc<dyn StorageService>,
    session_env: Arc<dyn SessionEnv>,
    crypto: CryptoLookup,
}

impl SecureStorage {
    /// Wrap `storage`. `crypto` is not called until the first read or write.
    pub fn new(
        storage: Arc<dyn StorageService>,
        session_env: Arc<dyn SessionEnv>,
        crypto: CryptoLookup,
    ) -> Self {
        Self {
            storage,
            session_env,
            crypto,
        }
    }

    /// The exported session key. A mirror that does not decode counts as
    /// no session.
    fn session_key(&self) -> Option<SymmetricKey> {
        let encoded = self.session_env.get()?;
        match SymmetricKey::from_base64(&encoded) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Ignoring malformed session key: {}", e);
                None
            }
        }
    }

    fn cipher(&self) -> Result<Arc<dyn SessionCipher>> {
        (self.crypto)().ok_or_else(|| Error::Crypto("Crypto service is not available".to_string()))
    }
}

#[async_trait]
impl StorageService for SecureStorage {
    /// The wrapped store is initialized by its owner.
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let Some(session_key) = self.session_key() else {
            debug!(key, "No session key, secure value unavailable");
            return Ok(None);
        };

        let Some(raw) = self.storage.get(key).await? else {
            return Ok(None);
        };
        let sealed = raw
            .as_str()
            .ok_or_else(|| Error::Storage(format!("Secure value '{}' is not a string", key)))
            .and_then(EncString::parse)?;

        let plaintext = self.cipher()?.open(&session_key, &sealed)?;
        Ok(Some(serde_json::from_slice(&plaintext)?))
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let session_key = self.session_key().ok_or(Error::Locked)?;
        let plaintext = serde_json::to_vec(&value)?;
        let sealed = self.cipher()?.seal(&session_key, &plaintext)?;
        self.storage
            .save(key, Value::String(sealed.as_str().to_string()))
            .await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.storage.remove(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use bwcli_common::MemorySessionEnv;

    struct TestCipher;

    impl SessionCipher for TestCipher {
        fn seal(&self, key: &SymmetricKey, plaintext: &[u8]) -> Result<EncString> {
            EncString::encrypt(key, plaintext)
        }

        fn open(&self, key: &SymmetricKey, sealed: &EncString) -> Result<Vec<u8>> {
            sealed.decrypt(key)
        }
    }

    fn lookup() -> CryptoLookup {
        Box::new(|| Some(Arc::new(TestCipher) as Arc<dyn SessionCipher>))
    }

    #[tokio::test]
    async fn test_values_are_sealed_at_rest() {
        let inner = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let secure = SecureStorage::new(inner.clone(), env, lookup());

        secure.save("key", Value::from("user-key")).await.unwrap();

        let raw = inner.get("key").await.unwrap().unwrap();
        assert!(raw.as_str().unwrap().starts_with("7."));
        assert_eq!(secure.get("key").await.unwrap(), Some(Value::from("user-key")));
    }

    #[tokio::test]
    async fn test_without_session_key_reads_nothing_and_refuses_writes() {
        let inner = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let secure = SecureStorage::new(inner.clone(), env.clone(), lookup());
        secure.save("key", Value::from(1)).await.unwrap();

        env.clear();
        assert_eq!(secure.get("key").await.unwrap(), None);
        assert!(matches!(secure.save("key", Value::from(2)).await, Err(Error::Locked)));
    }

    #[tokio::test]
    async fn test_malformed_session_key_counts_as_no_session() {
        let inner = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let secure = SecureStorage::new(inner.clone(), env.clone(), lookup());
        secure.save("key", Value::from(1)).await.unwrap();

        env.set("not-base64!!");
        assert_eq!(secure.get("key").await.unwrap(), None);
        assert!(matches!(secure.save("key", Value::from(2)).await, Err(Error::Locked)));
    }

    #[tokio::test]
    async fn test_other_session_cannot_open() {
        let inner = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let secure = SecureStorage::new(inner.clone(), env.clone(), lookup());
        secure.save("key", Value::from(1)).await.unwrap();

        env.set(&SymmetricKey::generate().to_base64());
        assert!(secure.get("key").await.is_err());
    }

    #[tokio::test]
    async fn test_lookup_is_deferred() {
        let inner = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let secure = SecureStorage::new(inner, env, Box::new(|| None));

        // Construction and removal never need the cipher.
        secure.remove("key").await.unwrap();
        assert!(matches!(secure.save("key", Value::from(1)).await, Err(Error::Crypto(_))));
    }
}
