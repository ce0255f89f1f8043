//! Key/value storage for the vault client.
//!
//! This module provides the storage contract every service persists
//! through, and its implementations:
//! - [`JsonFileStorage`]: a single JSON document in the data directory
//! - [`MemoryStorage`]: volatile storage for tests and dry runs
//! - [`SecureStorage`]: a facade that encrypts values with the session key
//!
//! # Design Principles
//! - Flat namespace: per-user entries carry the user id in their key
//! - Async operations: every read and write may suspend
//! - No I/O before `init()`

pub mod local;
pub mod memory;
pub mod secure;
pub mod service;

pub use local::JsonFileStorage;
pub use memory::MemoryStorage;
pub use secure::{CryptoLookup, SecureStorage, SessionCipher};
pub use service::{StorageExt, StorageService};
