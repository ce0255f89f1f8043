//! Stateful client services.
//!
//! Every service owns its own state behind its own lock and persists through
//! a [`StorageService`](bwcli_storage::StorageService). Services are built
//! once per process without I/O; state is loaded lazily or by `init`.

pub mod app_id;
pub mod auth;
pub mod cache;
pub mod constants;
pub mod crypto;
pub mod environment;
pub mod i18n;
pub mod models;
pub mod password_generation;
pub mod policy;
pub mod settings;
pub mod token;
pub mod user;

pub use app_id::AppIdService;
pub use auth::{AuthService, AuthStatus};
pub use cache::{CipherService, CollectionService, FolderService, SendService, VaultCache};
pub use crypto::CryptoService;
pub use environment::{EnvironmentService, EnvironmentUrls};
pub use i18n::I18nService;
pub use models::{CipherType, CipherView, CollectionView, FolderView, LoginView, SendView};
pub use password_generation::{
    generate_password, GeneratedPassword, PasswordGenerationOptions, PasswordGenerationService,
};
pub use policy::PolicyService;
pub use settings::{AccountSettings, SettingsService};
pub use token::TokenService;
pub use user::UserService;
