//! Authentication: login, unlock and lock.

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use bwcli_api::{TokenRequest, VaultApi};
use bwcli_common::{Error, Result, SessionEnv, UserId};
use bwcli_crypto::{derive_key, EncString, MasterKey, Salt, SymmetricKey};

use crate::app_id::AppIdService;
use crate::crypto::CryptoService;
use crate::token::TokenService;
use crate::user::UserService;

/// Device name reported to the identity server.
pub const DEVICE_NAME: &str = "bwcli";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStatus {
    Unauthenticated,
    Locked,
    Unlocked,
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthStatus::Unauthenticated => write!(f, "unauthenticated"),
            AuthStatus::Locked => write!(f, "locked"),
            AuthStatus::Unlocked => write!(f, "unlocked"),
        }
    }
}

pub struct AuthService {
    api: Arc<dyn VaultApi>,
    crypto: Arc<CryptoService>,
    tokens: Arc<TokenService>,
    user: Arc<UserService>,
    app_id: Arc<AppIdService>,
    session_env: Arc<dyn SessionEnv>,
}

impl AuthService {
    pub fn new(
        api: Arc<dyn VaultApi>,
        crypto: Arc<CryptoService>,
        tokens: Arc<TokenService>,
        user: Arc<UserService>,
        app_id: Arc<AppIdService>,
        session_env: Arc<dyn SessionEnv>,
    ) -> Self {
        Self {
            api,
            crypto,
            tokens,
            user,
            app_id,
            session_env,
        }
    }

    /// Restore the authentication state left by earlier invocations.
    ///
    /// Loads the token, the user id and, when a session is exported, the
    /// user key, so that later calls find them in memory.
    pub async fn init(&self) -> Result<AuthStatus> {
        let status = self.status().await?;
        debug!(%status, "Authentication state restored");
        Ok(status)
    }

    /// Derive the state from the persisted token, user and key.
    pub async fn status(&self) -> Result<AuthStatus> {
        if !self.user.is_authenticated().await? {
            return Ok(AuthStatus::Unauthenticated);
        }
        if self.crypto.has_key().await? {
            Ok(AuthStatus::Unlocked)
        } else {
            Ok(AuthStatus::Locked)
        }
    }

    /// Log in with the master password and return the session key to
    /// export.
    ///
    /// # Errors
    /// - `Error::NotPermitted` if a user is already logged in
    /// - `Error::InvalidInput` if the password is empty
    /// - Any API error, including `Error::SessionExpired`
    pub async fn log_in(&self, email: &str, password: &str) -> Result<String> {
        if let Some(existing) = self.user.get_email().await? {
            if self.user.is_authenticated().await? {
                return Err(Error::NotPermitted(format!(
                    "Already logged in as {}",
                    existing
                )));
            }
        }

        let email = email.trim().to_lowercase();
        let prelogin = self.api.post_prelogin(&email).await?;
        let master = derive_key(password.as_bytes(), &Salt::from_email(&email), &prelogin.kdf)?;

        let request = TokenRequest {
            email: email.clone(),
            master_password_hash: master.password_hash(password.as_bytes()),
            device_identifier: self.app_id.get_app_id().await?,
            device_name: DEVICE_NAME.to_string(),
        };
        let response = self.api.post_identity_token(&request).await?;
        let user_key = unwrap_user_key(&master, &response.key)?;

        self.tokens.set_token(response.access_token).await?;
        self.user
            .set_information(UserId::new(response.user_id)?, &response.email, &response.kdf)
            .await?;
        self.crypto.set_enc_key(&response.key).await?;

        let session = self.start_session(user_key).await?;
        info!("Logged in");
        Ok(session)
    }

    /// Unlock the vault of the logged-in user and return a fresh session key.
    ///
    /// # Errors
    /// - `Error::Unauthenticated` if nobody is logged in
    /// - `Error::InvalidInput` if the master password is wrong
    pub async fn unlock(&self, password: &str) -> Result<String> {
        if !self.user.is_authenticated().await? {
            return Err(Error::Unauthenticated);
        }
        let email = self.user.get_email().await?.ok_or(Error::Unauthenticated)?;
        let kdf = self.user.get_kdf().await?.unwrap_or_default();
        let enc_key = self.crypto.get_enc_key().await?.ok_or(Error::Unauthenticated)?;

        let master = derive_key(password.as_bytes(), &Salt::from_email(&email), &kdf)?;
        let user_key = unwrap_user_key(&master, &enc_key)
            .map_err(|_| Error::InvalidInput("Invalid master password".to_string()))?;

        let session = self.start_session(user_key).await?;
        info!("Vault unlocked");
        Ok(session)
    }

    /// Forget the user key and the session, keeping the login.
    pub async fn lock(&self) -> Result<()> {
        self.crypto.lock().await?;
        self.session_env.clear();
        Ok(())
    }

    /// Export a new session key, then seal the user key under it.
    async fn start_session(&self, user_key: SymmetricKey) -> Result<String> {
        let session_key = SymmetricKey::generate().to_base64();
        self.session_env.set(&session_key);
        if let Err(e) = self.crypto.set_key(user_key).await {
            self.session_env.clear();
            return Err(e);
        }
        Ok(session_key)
    }
}

fn unwrap_user_key(master: &MasterKey, enc_key: &EncString) -> Result<SymmetricKey> {
    let bytes = enc_key.decrypt(&master.stretch())?;
    SymmetricKey::from_slice(&bytes)
}
