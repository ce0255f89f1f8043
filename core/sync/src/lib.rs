//! Vault synchronization.
//!
//! Pulls the full vault of the logged-in user from the server and replaces
//! every local cache with it. Transient network failures are retried with
//! backoff; a rejected session never is.

pub mod retry;
pub mod service;

pub use retry::{is_transient, RetryConfig, RetryExecutor};
pub use service::{SyncCaches, SyncService};
