//! Crypto service: owner of the user key.
//!
//! The key lives in memory for the current invocation and is persisted
//! sealed in secure storage so that invocations sharing a session can load
//! it back. Nothing outside this service ever holds the key.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use bwcli_common::{Error, Result};
use bwcli_crypto::{EncString, SymmetricKey};
use bwcli_storage::{SessionCipher, StorageExt, StorageService};

use crate::constants::{ENC_KEY_KEY, KEY_KEY};

/// Holds the user key and performs vault encryption with it.
pub struct CryptoService {
    storage: Arc<dyn StorageService>,
    secure_storage: Arc<dyn StorageService>,
    key: RwLock<Option<SymmetricKey>>,
}

impl CryptoService {
    /// Create a service with no key loaded.
    pub fn new(storage: Arc<dyn StorageService>, secure_storage: Arc<dyn StorageService>) -> Self {
        Self {
            storage,
            secure_storage,
            key: RwLock::new(None),
        }
    }

    /// Install the user key for this and later invocations of the session.
    ///
    /// # Errors
    /// - `Error::Locked` if no session key has been exported yet
    pub async fn set_key(&self, key: SymmetricKey) -> Result<()> {
        let mut slot = self.key.write().await;
        self.secure_storage
            .save_as(KEY_KEY, &key.to_base64())
            .await?;
        *slot = Some(key);
        Ok(())
    }

    /// Current user key, loading it from secure storage if needed.
    pub async fn get_key(&self) -> Result<Option<SymmetricKey>> {
        if let Some(key) = self.key.read().await.as_ref() {
            return Ok(Some(key.clone()));
        }

        // Loading under the write lock serializes with `clear_keys`, so a
        // load racing a clear can never resurrect the key.
        let mut slot = self.key.write().await;
        if let Some(key) = slot.as_ref() {
            return Ok(Some(key.clone()));
        }
        let Some(encoded) = self.secure_storage.get_as::<String>(KEY_KEY).await? else {
            return Ok(None);
        };
        let key = SymmetricKey::from_base64(&encoded)?;
        debug!("User key loaded from secure storage");
        *slot = Some(key.clone());
        Ok(Some(key))
    }

    /// Whether a user key is available.
    pub async fn has_key(&self) -> Result<bool> {
        Ok(self.get_key().await?.is_some())
    }

    /// Persist the user key as encrypted by the master key.
    pub async fn set_enc_key(&self, enc_key: &EncString) -> Result<()> {
        self.storage.save_as(ENC_KEY_KEY, enc_key).await
    }

    /// User key as encrypted by the master key.
    pub async fn get_enc_key(&self) -> Result<Option<EncString>> {
        self.storage.get_as(ENC_KEY_KEY).await
    }

    /// Encrypt vault data with the user key.
    pub async fn encrypt(&self, plaintext: &[u8]) -> Result<EncString> {
        let key = self.get_key().await?.ok_or(Error::Locked)?;
        EncString::encrypt(&key, plaintext)
    }

    /// Decrypt vault data with the user key.
    ///
    /// # Errors
    /// - `Error::Locked` once keys have been cleared
    pub async fn decrypt(&self, enc: &EncString) -> Result<Vec<u8>> {
        let key = self.get_key().await?.ok_or(Error::Locked)?;
        enc.decrypt(&key)
    }

    /// Drop the in-memory and session-sealed key, keeping the encrypted
    /// user key so the vault can be unlocked again.
    pub async fn lock(&self) -> Result<()> {
        let mut slot = self.key.write().await;
        *slot = None;
        self.secure_storage.remove(KEY_KEY).await
    }

    /// Discard all key material. Safe to call when nothing is loaded.
    pub async fn clear_keys(&self) -> Result<()> {
        let mut slot = self.key.write().await;
        *slot = None;
        let sealed = self.secure_storage.remove(KEY_KEY).await;
        let encrypted = self.storage.remove(ENC_KEY_KEY).await;
        sealed.and(encrypted)
    }
}

impl SessionCipher for CryptoService {
    fn seal(&self, session_key: &SymmetricKey, plaintext: &[u8]) -> Result<EncString> {
        EncString::encrypt(session_key, plaintext)
    }

    fn open(&self, session_key: &SymmetricKey, sealed: &EncString) -> Result<Vec<u8>> {
        sealed.decrypt(session_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bwcli_common::{MemorySessionEnv, SessionEnv};
    use bwcli_storage::{MemoryStorage, SecureStorage};
    use std::sync::{OnceLock, Weak};

    fn build() -> (Arc<CryptoService>, Arc<MemoryStorage>, Arc<MemorySessionEnv>) {
        let storage = Arc::new(MemoryStorage::new());
        let env = Arc::new(MemorySessionEnv::with_value(SymmetricKey::generate().to_base64()));
        let slot: Arc<OnceLock<Weak<CryptoService>>> = Arc::new(OnceLock::new());
        let lookup_slot = slot.clone();
        let secure = Arc::new(SecureStorage::new(
            storage.clone(),
            env.clone(),
            Box::new(move || {
                lookup_slot
                    .get()
                    .and_then(Weak::upgrade)
                    .map(|c| c as Arc<dyn SessionCipher>)
            }),
        ));
        let crypto = Arc::new(CryptoService::new(storage.clone(), secure));
        slot.set(Arc::downgrade(&crypto)).unwrap();
        (crypto, storage, env)
    }

    #[tokio::test]
    async fn test_encrypt_requires_key() {
        let (crypto, _, _) = build();
        assert!(matches!(crypto.encrypt(b"x").await, Err(Error::Locked)));

        crypto.set_key(SymmetricKey::generate()).await.unwrap();
        let enc = crypto.encrypt(b"x").await.unwrap();
        assert_eq!(crypto.decrypt(&enc).await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_key_reloads_from_secure_storage() {
        let (crypto, storage, env) = build();
        let key = SymmetricKey::generate();
        crypto.set_key(key.clone()).await.unwrap();

        // A fresh service over the same store and session sees the key.
        let secure = Arc::new(SecureStorage::new(
            storage.clone(),
            env.clone(),
            Box::new({
                let crypto = crypto.clone();
                move || Some(crypto.clone() as Arc<dyn SessionCipher>)
            }),
        ));
        let fresh = CryptoService::new(storage, secure);
        let loaded = fresh.get_key().await.unwrap().unwrap();
        assert_eq!(loaded.as_bytes(), key.as_bytes());
    }

    #[tokio::test]
    async fn test_clear_keys_is_idempotent_and_final() {
        let (crypto, storage, _) = build();
        crypto.set_key(SymmetricKey::generate()).await.unwrap();
        let enc = crypto.encrypt(b"secret").await.unwrap();
        crypto
            .set_enc_key(&EncString::encrypt(&SymmetricKey::generate(), b"k").unwrap())
            .await
            .unwrap();

        crypto.clear_keys().await.unwrap();
        crypto.clear_keys().await.unwrap();

        assert!(!crypto.has_key().await.unwrap());
        assert!(matches!(crypto.decrypt(&enc).await, Err(Error::Locked)));
        assert!(storage.keys().await.is_empty());
    }

    #[tokio::test]
    async fn test_lock_keeps_encrypted_key() {
        let (crypto, storage, env) = build();
        crypto.set_key(SymmetricKey::generate()).await.unwrap();
        crypto
            .set_enc_key(&EncString::encrypt(&SymmetricKey::generate(), b"k").unwrap())
            .await
            .unwrap();

        crypto.lock().await.unwrap();
        env.clear();

        assert!(!crypto.has_key().await.unwrap());
        assert!(crypto.get_enc_key().await.unwrap().is_some());
        assert!(!storage.contains(KEY_KEY).await);
    }
}
