//! Key types with secure memory handling.
//!
//! All key types zeroize their memory on drop so that logout and lock can
//! rely on dropping a key to destroy it.

use base64::{engine::general_purpose::STANDARD, Engine};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use bwcli_common::{Error, Result};

/// Length of encryption keys in bytes (256-bit).
pub const KEY_LENGTH: usize = 32;

fn blake2_32(parts: &[&[u8]]) -> [u8; KEY_LENGTH] {
    let mut hasher = Blake2b::<U32>::new();
    for part in parts {
        hasher.update(part);
    }
    let mut out = [0u8; KEY_LENGTH];
    out.copy_from_slice(&hasher.finalize());
    out
}

/// Master key derived from the user's master password.
///
/// Never leaves the process. It is stretched into an encryption key that
/// unwraps the user key, and hashed into the credential sent to the server.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    key: [u8; KEY_LENGTH],
}

impl MasterKey {
    /// Create a master key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Stretch into the symmetric key protecting the user key.
    pub fn stretch(&self) -> SymmetricKey {
        SymmetricKey::from_bytes(blake2_32(&[&self.key[..], &b"enc"[..]]))
    }

    /// Hash proving knowledge of the password to the server.
    ///
    /// The server only ever sees this value, never the master key.
    pub fn password_hash(&self, password: &[u8]) -> String {
        STANDARD.encode(blake2_32(&[&self.key[..], password, &b"auth"[..]]))
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey([REDACTED])")
    }
}

/// Symmetric key used for vault data and for the session key.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    key: [u8; KEY_LENGTH],
}

impl SymmetricKey {
    /// Create a key from raw bytes.
    pub fn from_bytes(key: [u8; KEY_LENGTH]) -> Self {
        Self { key }
    }

    /// Create a key from a slice.
    ///
    /// # Errors
    /// - Returns error if the slice is not KEY_LENGTH bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| {
            Error::Crypto(format!(
                "Invalid key length: expected {}, got {}",
                KEY_LENGTH,
                bytes.len()
            ))
        })?;
        Ok(Self { key })
    }

    /// Get the key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Generate a random key.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut key = [0u8; KEY_LENGTH];
        rand::thread_rng().fill_bytes(&mut key);
        Self { key }
    }

    /// Encode as base64, the form exported through the session mirror.
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.key)
    }

    /// Decode from base64.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        let mut bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| Error::Crypto(format!("Invalid key encoding: {}", e)))?;
        let key = Self::from_slice(&bytes);
        bytes.zeroize();
        key
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SymmetricKey([REDACTED])")
    }
}

/// Salt for master key derivation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Salt(pub [u8; 32]);

impl Salt {
    /// Salt derived from the account email.
    ///
    /// The email is trimmed and lowercased so that every client derives the
    /// same master key for the same account.
    pub fn from_email(email: &str) -> Self {
        let normalized = email.trim().to_lowercase();
        Self(blake2_32(&[normalized.as_bytes(), &b"salt"[..]]))
    }

    /// Create from bytes.
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the salt bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}
