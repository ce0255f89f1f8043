//! JSON file storage in the data directory.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::debug;

use crate::service::StorageService;
use bwcli_common::{Error, Result};

/// Name of the document holding all persisted state.
pub const DATA_FILENAME: &str = "data.json";

/// Storage backed by one JSON document, `<dir>/data.json`.
///
/// The whole document is kept in memory after `init()` and rewritten on
/// every change through a temporary file and a rename, so a crash never
/// leaves a half-written store behind.
pub struct JsonFileStorage {
    dir: PathBuf,
    /// `None` until `init()` has loaded the document.
    data: RwLock<Option<Map<String, Value>>>,
}

impl JsonFileStorage {
    /// Create a store rooted at `dir`. Touches nothing on disk.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            data: RwLock::new(None),
        }
    }

    /// Directory holding the document.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Full path of the document.
    pub fn file_path(&self) -> PathBuf {
        self.dir.join(DATA_FILENAME)
    }

    async fn load(&self) -> Result<Map<String, Value>> {
        let path = self.file_path();
        if !fs::try_exists(&path).await? {
            return Ok(Map::new());
        }

        let raw = fs::read(&path).await?;
        if raw.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Map::new());
        }

        match serde_json::from_slice::<Value>(&raw) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(Error::Storage(format!(
                "{} does not contain a JSON object",
                path.display()
            ))),
            Err(e) => Err(Error::Storage(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            ))),
        }
    }

    async fn persist(&self, data: &Map<String, Value>) -> Result<()> {
        let path = self.file_path();
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(data)?;

        fs::write(&tmp, &bytes).await?;
        restrict_permissions(&tmp).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }
}

#[cfg(unix)]
async fn restrict_permissions(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).await?;
    Ok(())
}

#[cfg(not(unix))]
async fn restrict_permissions(_path: &Path) -> Result<()> {
    Ok(())
}

fn not_initialized() -> Error {
    Error::Storage("Storage used before init()".to_string())
}

#[async_trait]
impl StorageService for JsonFileStorage {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.dir).await.map_err(|e| {
            Error::Storage(format!(
                "Cannot create data directory {}: {}",
                self.dir.display(),
                e
            ))
        })?;

        let map = self.load().await?;
        if !fs::try_exists(self.file_path()).await? {
            self.persist(&map).await?;
        }

        debug!(path = %self.file_path().display(), entries = map.len(), "Storage initialized");
        *self.data.write().await = Some(map);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let data = self.data.read().await;
        let map = data.as_ref().ok_or_else(not_initialized)?;
        Ok(map.get(key).cloned())
    }

    async fn save(&self, key: &str, value: Value) -> Result<()> {
        let mut data = self.data.write().await;
        let map = data.as_mut().ok_or_else(not_initialized)?;
        map.insert(key.to_string(), value);
        self.persist(map).await
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut data = self.data.write().await;
        let map = data.as_mut().ok_or_else(not_initialized)?;
        if map.remove(key).is_some() {
            self.persist(map).await?;
        }
        Ok(())
    }
}
