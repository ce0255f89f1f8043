//! Installation identifier.

use std::sync::Arc;
use uuid::Uuid;

use bwcli_common::Result;
use bwcli_storage::{StorageExt, StorageService};

use crate::constants::APP_ID_KEY;

/// Stable identifier of this installation, sent as the device identifier.
///
/// Survives logout; it describes the device, not the user.
pub struct AppIdService {
    storage: Arc<dyn StorageService>,
}

impl AppIdService {
    pub fn new(storage: Arc<dyn StorageService>) -> Self {
        Self { storage }
    }

    /// Existing identifier, or a new one persisted on first use.
    pub async fn get_app_id(&self) -> Result<String> {
        if let Some(id) = self.storage.get_as::<String>(APP_ID_KEY).await? {
            return Ok(id);
        }
        let id = Uuid::new_v4().to_string();
        self.storage.save_as(APP_ID_KEY, &id).await?;
        Ok(id)
    }
}
