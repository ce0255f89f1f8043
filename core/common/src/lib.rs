//! Common utilities and types shared across the vault client crates.
//!
//! This module provides the error taxonomy, identifier types, and the two
//! process-facing surfaces the runtime depends on: the platform query
//! surface and the session token mirror.

pub mod error;
pub mod platform;
pub mod session;
pub mod types;

pub use error::{Error, Result};
pub use platform::{Os, Platform, ProcessPlatform};
pub use session::{MemorySessionEnv, ProcessSessionEnv, SessionEnv, SESSION_ENV_VAR};
pub use types::UserId;
