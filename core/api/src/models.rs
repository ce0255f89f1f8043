//! Request and response bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bwcli_crypto::{EncString, KdfParams};

/// Response to a prelogin request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreloginResponse {
    pub kdf: KdfParams,
}

/// Password grant sent to the identity server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRequest {
    pub email: String,
    /// Hash of the master key, never the password itself.
    pub master_password_hash: String,
    pub device_identifier: String,
    pub device_name: String,
}

/// Successful login.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    pub user_id: String,
    pub email: String,
    /// User key, encrypted under the stretched master key.
    pub key: EncString,
    pub kdf: KdfParams,
}

/// Owner of the synced vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: String,
    pub email: String,
}

/// An encrypted vault entity: cipher, folder, collection or send.
///
/// `data` holds the JSON of the decrypted view, sealed with the user key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedRecord {
    pub id: String,
    pub revision_date: DateTime<Utc>,
    pub data: EncString,
}

/// Organization policy. Policies are not encrypted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub id: String,
    pub organization_id: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub enabled: bool,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

/// Equivalent-domain settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Domains {
    #[serde(default)]
    pub equivalent_domains: Vec<Vec<String>>,
}

/// Full vault state of the authenticated user.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncResponse {
    pub profile: Profile,
    #[serde(default)]
    pub folders: Vec<EncryptedRecord>,
    #[serde(default)]
    pub collections: Vec<EncryptedRecord>,
    #[serde(default)]
    pub ciphers: Vec<EncryptedRecord>,
    #[serde(default)]
    pub sends: Vec<EncryptedRecord>,
    #[serde(default)]
    pub policies: Vec<PolicyRecord>,
    #[serde(default)]
    pub domains: Option<Domains>,
}
