//! Platform query surface.
//!
//! The runtime never reads process globals directly; it asks a [`Platform`]
//! so that data-directory resolution and version checks can be exercised
//! against any OS and environment combination in tests.

use std::path::{Path, PathBuf};

/// Operating system family, as far as directory layout is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Os {
    MacOs,
    Windows,
    /// Linux and every other Unix-like system.
    Other,
}

impl Os {
    /// OS family of the running binary.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Os::MacOs
        } else if cfg!(target_os = "windows") {
            Os::Windows
        } else {
            Os::Other
        }
    }
}

/// Read-only view of the process environment.
pub trait Platform: Send + Sync {
    /// Operating system family.
    fn os(&self) -> Os;

    /// Home directory of the current user, if one can be determined.
    fn home_dir(&self) -> Option<PathBuf>;

    /// Value of an environment variable. Empty values count as unset.
    fn env_var(&self, key: &str) -> Option<String>;

    /// Path of the running executable.
    fn current_exe(&self) -> Option<PathBuf>;

    /// Working directory, used to absolutize relative paths.
    fn current_dir(&self) -> Option<PathBuf>;

    /// Whether a directory exists at `path`.
    fn dir_exists(&self, path: &Path) -> bool;

    /// Version string of the running application.
    fn app_version(&self) -> &str;
}

/// [`Platform`] backed by the real process.
#[derive(Debug, Clone)]
pub struct ProcessPlatform {
    version: String,
}

impl ProcessPlatform {
    /// Create a platform reporting `version` as the application version.
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
        }
    }
}

impl Platform for ProcessPlatform {
    fn os(&self) -> Os {
        Os::current()
    }

    fn home_dir(&self) -> Option<PathBuf> {
        dirs::home_dir()
    }

    fn env_var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }

    fn current_exe(&self) -> Option<PathBuf> {
        std::env::current_exe().ok()
    }

    fn current_dir(&self) -> Option<PathBuf> {
        std::env::current_dir().ok()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn app_version(&self) -> &str {
        &self.version
    }
}
