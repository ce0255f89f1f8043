//! Outbound request layer for the vault server.
//!
//! The rest of the client talks to the server only through [`VaultApi`].
//! Whenever the server rejects the access token, the implementation invokes
//! the [`SessionExpiredHandler`] it was constructed with before returning
//! [`Error::SessionExpired`](bwcli_common::Error::SessionExpired).

pub mod client;
pub mod handler;
pub mod models;

use async_trait::async_trait;

use bwcli_common::Result;

pub use client::{HttpApiService, ServerUrls, TokenSource};
pub use handler::{noop_handler, SessionExpiredHandler};
pub use models::{
    Domains, EncryptedRecord, PolicyRecord, PreloginResponse, Profile, SyncResponse,
    TokenRequest, TokenResponse,
};

/// Requests the client makes against the vault server.
#[async_trait]
pub trait VaultApi: Send + Sync {
    /// Fetch the KDF parameters of an account.
    async fn post_prelogin(&self, email: &str) -> Result<PreloginResponse>;

    /// Exchange credentials for an access token.
    async fn post_identity_token(&self, request: &TokenRequest) -> Result<TokenResponse>;

    /// Fetch the complete vault of the authenticated user.
    async fn get_sync(&self) -> Result<SyncResponse>;
}
