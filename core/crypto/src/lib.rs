//! Cryptographic primitives for the vault client.
//!
//! This module provides:
//! - Master key derivation using Argon2id
//! - Authenticated encryption using XChaCha20-Poly1305
//! - Key types with automatic zeroization
//!
//! # Security Guarantees
//! - All key material is automatically zeroized on drop
//! - No plaintext or key material is ever logged

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, encrypt, EncString};
pub use kdf::{derive_key, KdfParams};
pub use keys::{MasterKey, Salt, SymmetricKey};
