//! Session token mirror.
//!
//! After login the session key is exported into the environment so that
//! later invocations of the CLI inherit an unlocked session. The mirror is
//! the only piece of session state that lives outside storage.

use std::sync::RwLock;

/// Environment variable carrying the session key between invocations.
pub const SESSION_ENV_VAR: &str = "BW_SESSION";

/// Read/write access to the session token mirror.
pub trait SessionEnv: Send + Sync {
    /// Current mirrored value, if any.
    fn get(&self) -> Option<String>;

    /// Publish a new value.
    fn set(&self, value: &str);

    /// Remove the mirrored value. Must succeed when nothing is set.
    fn clear(&self);
}

/// Mirror backed by a process environment variable.
#[derive(Debug, Clone)]
pub struct ProcessSessionEnv {
    var: String,
}

impl ProcessSessionEnv {
    /// Mirror stored in `var`.
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl Default for ProcessSessionEnv {
    fn default() -> Self {
        Self::new(SESSION_ENV_VAR)
    }
}

impl SessionEnv for ProcessSessionEnv {
    fn get(&self) -> Option<String> {
        std::env::var(&self.var).ok().filter(|v| !v.is_empty())
    }

    fn set(&self, value: &str) {
        std::env::set_var(&self.var, value);
    }

    fn clear(&self) {
        std::env::remove_var(&self.var);
    }
}

/// In-process mirror, for tests and embedders that manage the environment
/// themselves.
#[derive(Debug, Default)]
pub struct MemorySessionEnv {
    value: RwLock<Option<String>>,
}

impl MemorySessionEnv {
    /// Create an empty mirror.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mirror that already holds `value`.
    pub fn with_value(value: impl Into<String>) -> Self {
        Self {
            value: RwLock::new(Some(value.into())),
        }
    }
}

impl SessionEnv for MemorySessionEnv {
    fn get(&self) -> Option<String> {
        self.value.read().map(|v| v.clone()).unwrap_or(None)
    }

    fn set(&self, value: &str) {
        if let Ok(mut slot) = self.value.write() {
            *slot = Some(value.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.value.write() {
            *slot = None;
        }
    }
}
