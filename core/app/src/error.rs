//! Orchestrator errors.

use std::fmt;
use thiserror::Error;

use bwcli_common::Error;

/// Initialization step whose failure aborts startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStep {
    Environment,
    Locale,
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStep::Environment => write!(f, "loading server URLs"),
            InitStep::Locale => write!(f, "loading locale"),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    /// No data directory can be determined. Fatal.
    #[error("Cannot determine data directory: {0}")]
    DataDir(String),

    /// The backing store cannot be opened or created. Fatal.
    #[error("Failed to initialize storage: {0}")]
    StorageInit(#[source] Error),

    #[error("Initialization failed while {step}: {source}")]
    Init {
        step: InitStep,
        #[source]
        source: Error,
    },

    #[error(transparent)]
    Logout(#[from] LogoutError),
}

/// State torn down by logout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClearTarget {
    /// Reading the user id to clear by.
    UserId,
    LastSync,
    Token,
    User,
    Settings,
    Ciphers,
    Folders,
    Collections,
    Policies,
    Sends,
    PasswordGeneration,
    CryptoKeys,
}

impl fmt::Display for ClearTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ClearTarget::UserId => "user id",
            ClearTarget::LastSync => "last sync",
            ClearTarget::Token => "token",
            ClearTarget::User => "user",
            ClearTarget::Settings => "settings",
            ClearTarget::Ciphers => "ciphers",
            ClearTarget::Folders => "folders",
            ClearTarget::Collections => "collections",
            ClearTarget::Policies => "policies",
            ClearTarget::Sends => "sends",
            ClearTarget::PasswordGeneration => "password generation",
            ClearTarget::CryptoKeys => "keys",
        };
        f.write_str(name)
    }
}

#[derive(Debug)]
pub struct ClearFailure {
    pub target: ClearTarget,
    pub error: Error,
}

/// Logout ran to completion but some state could not be cleared.
#[derive(Debug, Error)]
#[error("Logout incomplete: {}", describe(.failures))]
pub struct LogoutError {
    pub failures: Vec<ClearFailure>,
}

impl LogoutError {
    /// Targets that failed, in the order they were recorded.
    pub fn targets(&self) -> Vec<ClearTarget> {
        self.failures.iter().map(|f| f.target).collect()
    }
}

fn describe(failures: &[ClearFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("{} ({})", f.target, f.error))
        .collect::<Vec<_>>()
        .join(", ")
}
