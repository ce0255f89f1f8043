//! Storage keys.
//!
//! Keys ending in a prefix (`*_PREFIX`) are per-user and always combined
//! with a user id through [`UserId::scoped_key`](bwcli_common::UserId::scoped_key).

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const USER_ID_KEY: &str = "userId";
pub const USER_EMAIL_KEY: &str = "userEmail";
pub const KDF_PARAMS_KEY: &str = "kdfParams";

/// User key, sealed in secure storage.
pub const KEY_KEY: &str = "key";
/// User key encrypted under the stretched master key.
pub const ENC_KEY_KEY: &str = "encKey";

pub const APP_ID_KEY: &str = "appId";
pub const LOCALE_KEY: &str = "locale";
pub const INSTALLED_VERSION_KEY: &str = "installedVersion";
pub const ENVIRONMENT_URLS_KEY: &str = "environmentUrls";

pub const PASSWORD_GENERATION_OPTIONS_KEY: &str = "passwordGenerationOptions";
pub const GENERATED_PASSWORD_HISTORY_KEY: &str = "generatedPasswordHistory";

pub const LAST_SYNC_PREFIX: &str = "lastSync";
pub const SETTINGS_PREFIX: &str = "settings";
pub const CIPHERS_PREFIX: &str = "ciphers";
pub const FOLDERS_PREFIX: &str = "folders";
pub const COLLECTIONS_PREFIX: &str = "collections";
pub const POLICIES_PREFIX: &str = "policies";
pub const SENDS_PREFIX: &str = "sends";
