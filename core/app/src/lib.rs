//! Session lifecycle of the vault CLI.
//!
//! Resolves the data directory, wires every service in dependency order,
//! runs the startup sequence and owns the logout protocol that tears all
//! session state down, whether the user asks for it or the server reports
//! the session as expired.

pub mod data_dir;
pub mod error;
pub mod orchestrator;

pub use data_dir::{resolve_data_dir, APPDATA_DIR_ENV, APP_NAME, PORTABLE_DIR};
pub use error::{AppError, ClearFailure, ClearTarget, InitStep, LogoutError};
pub use orchestrator::{
    http_api_factory, ApiContext, ApiFactory, Collaborators, Services, SessionOrchestrator,
};
