//! Storage service trait definition.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use bwcli_common::Result;

/// Key/value persistence used by every stateful service.
///
/// Values are JSON documents. Removing a missing key is not an error, so
/// that clears stay idempotent.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Open or create the backing store.
    ///
    /// # Errors
    /// - Backing store cannot be created or parsed. Callers treat this as
    ///   fatal.
    async fn init(&self) -> Result<()>;

    /// Read a value.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Write a value, replacing any previous one.
    async fn save(&self, key: &str, value: Value) -> Result<()>;

    /// Delete a value. Succeeds when the key is absent.
    async fn remove(&self, key: &str) -> Result<()>;
}

/// Typed helpers over [`StorageService`].
#[async_trait]
pub trait StorageExt: StorageService {
    /// Read and deserialize a value.
    async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key).await? {
            Some(Value::Null) | None => Ok(None),
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    /// Serialize and write a value.
    async fn save_as<T: Serialize + Sync>(&self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.save(key, value).await
    }
}

impl<S: StorageService + ?Sized> StorageExt for S {}
