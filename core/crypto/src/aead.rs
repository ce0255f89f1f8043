//! Authenticated encryption using XChaCha20-Poly1305.
//!
//! XChaCha20-Poly1305 provides both confidentiality and authenticity,
//! with a 24-byte nonce that is safe for random generation.

use base64::{engine::general_purpose::STANDARD, Engine};
use chacha20poly1305::{
    aead::{generic_array::GenericArray, Aead, AeadCore, KeyInit, OsRng},
    XChaCha20Poly1305,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::keys::SymmetricKey;
use bwcli_common::{Error, Result};

/// Nonce size for XChaCha20-Poly1305 (24 bytes).
pub const NONCE_SIZE: usize = 24;

/// Authentication tag size (16 bytes).
pub const TAG_SIZE: usize = 16;

/// Encryption type tag prefixed to every [`EncString`].
const ENC_TYPE: &str = "7";

/// Encrypt plaintext using XChaCha20-Poly1305.
///
/// # Postconditions
/// - Returns nonce || ciphertext || tag
/// - The nonce is randomly generated
pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));
    let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| Error::Crypto(format!("Encryption failed: {}", e)))?;

    let mut result = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    result.extend_from_slice(&nonce);
    result.extend_from_slice(&ciphertext);

    Ok(result)
}

/// Decrypt ciphertext produced by [`encrypt`].
///
/// # Errors
/// - Returns error if ciphertext is too short
/// - Returns error if authentication fails (wrong key or tampered data)
pub fn decrypt(key: &SymmetricKey, ciphertext: &[u8]) -> Result<Vec<u8>> {
    if ciphertext.len() < NONCE_SIZE + TAG_SIZE {
        return Err(Error::Crypto("Ciphertext too short".to_string()));
    }

    let (nonce_bytes, encrypted) = ciphertext.split_at(NONCE_SIZE);
    let nonce = GenericArray::from_slice(nonce_bytes);

    let cipher = XChaCha20Poly1305::new(GenericArray::from_slice(key.as_bytes()));

    cipher
        .decrypt(nonce, encrypted)
        .map_err(|e| Error::Crypto(format!("Decryption failed: {}", e)))
}

/// Printable encrypted value, `<type>.<base64(nonce || ciphertext || tag)>`.
///
/// This is the form in which encrypted values are persisted and exchanged
/// with the server.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EncString(String);

impl EncString {
    /// Encrypt `plaintext` under `key`.
    pub fn encrypt(key: &SymmetricKey, plaintext: &[u8]) -> Result<Self> {
        let sealed = encrypt(key, plaintext)?;
        Ok(Self(format!("{}.{}", ENC_TYPE, STANDARD.encode(sealed))))
    }

    /// Decrypt under `key`.
    pub fn decrypt(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        decrypt(key, &self.payload()?)
    }

    /// Parse a printable value.
    pub fn parse(value: &str) -> Result<Self> {
        let enc = Self(value.to_string());
        enc.payload()?;
        Ok(enc)
    }

    /// Get the printable form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn payload(&self) -> Result<Vec<u8>> {
        let (kind, data) = self
            .0
            .split_once('.')
            .ok_or_else(|| Error::Crypto("Malformed encrypted string".to_string()))?;
        if kind != ENC_TYPE {
            return Err(Error::Crypto(format!("Unsupported encryption type: {}", kind)));
        }
        STANDARD
            .decode(data)
            .map_err(|e| Error::Crypto(format!("Malformed encrypted string: {}", e)))
    }
}

impl TryFrom<String> for EncString {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<EncString> for String {
    fn from(value: EncString) -> Self {
        value.0
    }
}

impl fmt::Debug for EncString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncString({} chars)", self.0.len())
    }
}
