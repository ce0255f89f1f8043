//! Data directory resolution.
//!
//! First match wins:
//! 1. a `bw-data` directory next to the executable (portable mode),
//! 2. `BITWARDENCLI_APPDATA_DIR`, made absolute against the working directory,
//! 3. the per-OS application data directory.

use std::path::PathBuf;

use bwcli_common::{Os, Platform};

use crate::error::AppError;

pub const APP_NAME: &str = "Bitwarden CLI";
pub const PORTABLE_DIR: &str = "bw-data";
pub const APPDATA_DIR_ENV: &str = "BITWARDENCLI_APPDATA_DIR";

/// Resolve the root directory for persisted state.
///
/// The only I/O is the existence check of the portable directory.
///
/// # Errors
/// - `AppError::DataDir` if the OS default is needed but the home directory
///   (or `%APPDATA%` on Windows) is unknown
pub fn resolve_data_dir(platform: &dyn Platform) -> Result<PathBuf, AppError> {
    if let Some(portable) = portable_dir(platform) {
        return Ok(portable);
    }

    if let Some(dir) = platform.env_var(APPDATA_DIR_ENV) {
        let dir = PathBuf::from(dir);
        if dir.is_absolute() {
            return Ok(dir);
        }
        let cwd = platform.current_dir().ok_or_else(|| {
            AppError::DataDir(format!(
                "{} is relative and the working directory is unknown",
                APPDATA_DIR_ENV
            ))
        })?;
        return Ok(cwd.join(dir));
    }

    os_default_dir(platform)
}

fn portable_dir(platform: &dyn Platform) -> Option<PathBuf> {
    let exe = platform.current_exe()?;
    let candidate = exe.parent()?.join(PORTABLE_DIR);
    platform.dir_exists(&candidate).then_some(candidate)
}

fn os_default_dir(platform: &dyn Platform) -> Result<PathBuf, AppError> {
    let home = || {
        platform
            .home_dir()
            .ok_or_else(|| AppError::DataDir("home directory is unknown".to_string()))
    };

    match platform.os() {
        Os::MacOs => Ok(home()?
            .join("Library")
            .join("Application Support")
            .join(APP_NAME)),
        Os::Windows => platform
            .env_var("APPDATA")
            .map(|appdata| PathBuf::from(appdata).join(APP_NAME))
            .ok_or_else(|| AppError::DataDir("APPDATA is not set".to_string())),
        Os::Other => match platform.env_var("XDG_CONFIG_HOME") {
            Some(config) => Ok(PathBuf::from(config).join(APP_NAME)),
            None => Ok(home()?.join(".config").join(APP_NAME)),
        },
    }
}
