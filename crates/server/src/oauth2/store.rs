//! Collaborator interfaces consumed by the token engine and the user-info path.
//!
//! Everything durable lives behind these traits. The token store is the only
//! synchronization point: code redemption and refresh rotation must each let
//! exactly one concurrent caller through.

use crate::entity::oauth2_user::UserStatus;
use crate::entity::{api_key, oauth2_authorization, oauth2_client, oauth2_token, oauth2_user};
use crate::error::StoreError;
use crate::oauth2::secret::verify_secret;
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;

/// A registered third-party application.
#[derive(Clone, Debug, PartialEq)]
pub struct Client {
    pub id: String,
    pub name: String,
    pub secret_hash: String,
    pub redirect_uris: Vec<String>,
}

impl Client {
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.redirect_uris.iter().any(|allowed| allowed == uri)
    }

    pub fn default_redirect_uri(&self) -> Option<&str> {
        self.redirect_uris.first().map(String::as_str)
    }

    pub fn verify_secret(&self, secret: &str) -> bool {
        verify_secret(secret, &self.secret_hash)
    }
}

impl From<oauth2_client::Model> for Client {
    fn from(model: oauth2_client::Model) -> Self {
        let redirect_uris = model.redirect_uris_list();
        Client {
            id: model.id,
            name: model.name,
            secret_hash: model.secret_hash,
            redirect_uris,
        }
    }
}

/// A single-use authorization code and what it was granted for.
#[derive(Clone, Debug, PartialEq)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

impl AuthorizationCode {
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        self.expires_at <= now
    }
}

impl From<oauth2_authorization::Model> for AuthorizationCode {
    fn from(model: oauth2_authorization::Model) -> Self {
        AuthorizationCode {
            code: model.code,
            client_id: model.client_id,
            user_id: model.user_id,
            redirect_uri: model.redirect_uri,
            scope: model.scope,
            created_at: model.created_at,
            expires_at: model.expires_at,
        }
    }
}

/// Lookup key for an access token: base64url SHA-256 of the presented value.
pub fn access_token_hash(access_token: &str) -> String {
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(Sha256::digest(access_token.as_bytes()))
}

/// An issued access token with its optional refresh companion.
#[derive(Clone, Debug, PartialEq)]
pub struct TokenInfo {
    pub id: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    /// [`access_token_hash`] of the issued access token; the token itself is never stored.
    pub access_token_hash: String,
    pub access_expires_at: Option<OffsetDateTime>,
    pub refresh_token: Option<String>,
    pub refresh_expires_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub revoked_at: Option<OffsetDateTime>,
}

impl TokenInfo {
    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }

    pub fn is_access_expired(&self, now: OffsetDateTime) -> bool {
        self.access_expires_at.is_some_and(|t| t <= now)
    }

    pub fn is_refresh_expired(&self, now: OffsetDateTime) -> bool {
        match (&self.refresh_token, self.refresh_expires_at) {
            (Some(_), Some(t)) => t <= now,
            (Some(_), None) => false,
            (None, _) => true,
        }
    }

    /// Seconds until the access token expires, zero for unbounded tokens.
    pub fn expires_in(&self) -> i64 {
        self.access_expires_at
            .map(|t| (t - self.created_at).whole_seconds().max(0))
            .unwrap_or(0)
    }
}

impl From<oauth2_token::Model> for TokenInfo {
    fn from(model: oauth2_token::Model) -> Self {
        TokenInfo {
            id: model.id,
            client_id: model.client_id,
            user_id: model.user_id,
            scope: model.scope,
            access_token_hash: model.access_token_hash,
            access_expires_at: model.access_token_expires_at,
            refresh_token: model.refresh_token,
            refresh_expires_at: model.refresh_token_expires_at,
            created_at: model.created_at,
            revoked_at: model.revoked_at,
        }
    }
}

/// Current account state as seen by the directory.
#[derive(Clone, Debug, PartialEq)]
pub struct User {
    pub id: String,
    pub email: String,
    pub email_verified: bool,
    pub status: UserStatus,
}

impl User {
    pub fn is_active(&self) -> bool {
        self.status == UserStatus::Active
    }
}

impl From<oauth2_user::Model> for User {
    fn from(model: oauth2_user::Model) -> Self {
        User {
            id: model.id,
            email: model.email,
            email_verified: model.email_verified,
            status: model.status,
        }
    }
}

/// A root delegation key for one user in one project.
#[derive(Clone)]
pub struct RootKey {
    pub id: String,
    pub project_id: String,
    pub user_id: String,
    pub secret: Vec<u8>,
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootKey")
            .field("id", &self.id)
            .field("project_id", &self.project_id)
            .field("user_id", &self.user_id)
            .finish_non_exhaustive()
    }
}

impl TryFrom<api_key::Model> for RootKey {
    type Error = StoreError;

    fn try_from(model: api_key::Model) -> Result<Self, Self::Error> {
        let secret = base64::engine::general_purpose::URL_SAFE_NO_PAD
            .decode(&model.secret)
            .map_err(|e| StoreError::Corrupt(format!("api_key {}: {e}", model.id)))?;
        Ok(RootKey {
            id: model.id,
            project_id: model.project_id,
            user_id: model.user_id,
            secret,
        })
    }
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn lookup(&self, client_id: &str) -> Result<Option<Client>, StoreError>;
}

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn save_code(&self, code: &AuthorizationCode) -> Result<(), StoreError>;

    /// Look up an unexpired code without consuming it.
    async fn get_by_code(
        &self,
        code: &str,
        now: OffsetDateTime,
    ) -> Result<Option<AuthorizationCode>, StoreError>;

    /// Consume `code` and persist `token` in one atomic step.
    ///
    /// Returns `false` (and stores nothing) when the code was already consumed.
    async fn redeem_code(&self, code: &str, token: &TokenInfo) -> Result<bool, StoreError>;

    async fn save_token(&self, token: &TokenInfo) -> Result<(), StoreError>;

    /// Look up a live (unrevoked, unexpired) access token.
    async fn get_by_access(
        &self,
        access_token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<TokenInfo>, StoreError>;

    /// Look up a live refresh token.
    async fn get_by_refresh(
        &self,
        refresh_token: &str,
        now: OffsetDateTime,
    ) -> Result<Option<TokenInfo>, StoreError>;

    /// Revoke the row holding `old_refresh` and persist `token` in one atomic step.
    ///
    /// Returns `false` (and stores nothing) when the refresh token was already used.
    async fn rotate_refresh(
        &self,
        old_refresh: &str,
        token: &TokenInfo,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;

    /// Revoke the access or refresh token `token` if it belongs to `client_id`.
    async fn revoke(
        &self,
        token: &str,
        client_id: &str,
        prefer_refresh: bool,
        now: OffsetDateTime,
    ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn get_user(&self, user_id: &str) -> Result<Option<User>, StoreError>;

    async fn is_project_member(&self, project_id: &str, user_id: &str)
    -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RootKeyStore: Send + Sync {
    /// Fetch the caller's root key for a project, creating one on first use.
    async fn get_or_create(
        &self,
        project_id: &str,
        user_id: &str,
        now: OffsetDateTime,
    ) -> Result<RootKey, StoreError>;

    async fn get(&self, key_id: &str) -> Result<Option<RootKey>, StoreError>;
}
