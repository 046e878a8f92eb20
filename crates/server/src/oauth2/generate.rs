//! Authorization code and access token generation strategies.
//!
//! The [`Manager`](super::manager::Manager) decides *when* to mint; these
//! types decide *what* gets minted.

use crate::error::GenerateError;
use crate::oauth2::capability::{Capability, Caveat};
use crate::oauth2::scope::Scope;
use crate::oauth2::secret::generate_token;
use crate::oauth2::store::{RootKeyStore, UserDirectory};
use async_trait::async_trait;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

/// `start + lifetime`, or [`GenerateError::ExpiryOverflow`] past the representable range.
pub fn expires_at(start: OffsetDateTime, lifetime: Duration) -> Result<OffsetDateTime, GenerateError> {
    start
        .checked_add(lifetime)
        .ok_or(GenerateError::ExpiryOverflow(start, lifetime))
}

/// The facts a grant is made of: who, for whom, what, and when.
#[derive(Clone, Debug, PartialEq)]
pub struct GenerateBasic {
    pub client_id: String,
    pub user_id: String,
    /// Canonical encoded scope.
    pub scope: String,
    pub created_at: OffsetDateTime,
}

/// A freshly minted token pair.
#[derive(Clone, Debug)]
pub struct GeneratedTokens {
    pub access: String,
    pub access_expires_at: Option<OffsetDateTime>,
    pub refresh: Option<String>,
}

#[async_trait]
pub trait AuthorizeGenerate: Send + Sync {
    async fn code(&self, basic: &GenerateBasic) -> Result<String, GenerateError>;
}

#[async_trait]
pub trait AccessGenerate: Send + Sync {
    async fn token(
        &self,
        basic: &GenerateBasic,
        generate_refresh: bool,
    ) -> Result<GeneratedTokens, GenerateError>;
}

/// Codes are 256 random bits; their binding to user and scope lives in the store.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomAuthorizeGenerate;

#[async_trait]
impl AuthorizeGenerate for RandomAuthorizeGenerate {
    async fn code(&self, _basic: &GenerateBasic) -> Result<String, GenerateError> {
        Ok(generate_token()?)
    }
}

/// Mints access tokens as capabilities attenuated from the user's root key
/// for the scope's project.
#[derive(Clone)]
pub struct CapabilityAccessGenerate {
    users: Arc<dyn UserDirectory>,
    root_keys: Arc<dyn RootKeyStore>,
    access_lifetime: Duration,
}

impl CapabilityAccessGenerate {
    /// A zero `access_lifetime` mints tokens without a time bound.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        root_keys: Arc<dyn RootKeyStore>,
        access_lifetime: Duration,
    ) -> Self {
        Self {
            users,
            root_keys,
            access_lifetime,
        }
    }
}

#[async_trait]
impl AccessGenerate for CapabilityAccessGenerate {
    #[tracing::instrument(skip(self, basic), fields(client_id = %basic.client_id, user_id = %basic.user_id))]
    async fn token(
        &self,
        basic: &GenerateBasic,
        generate_refresh: bool,
    ) -> Result<GeneratedTokens, GenerateError> {
        let scope = Scope::decode(&basic.scope)?;

        let user = self
            .users
            .get_user(&basic.user_id)
            .await?
            .ok_or(GenerateError::UserNotFound)?;
        if !user.is_active() {
            return Err(GenerateError::UserInactive);
        }
        if !self
            .users
            .is_project_member(&scope.project, &user.id)
            .await?
        {
            return Err(GenerateError::ScopeEncoding(format!(
                "user is not a member of project {}",
                scope.project
            )));
        }

        let root = self
            .root_keys
            .get_or_create(&scope.project, &user.id, basic.created_at)
            .await?;

        let access_expires_at = if self.access_lifetime > Duration::ZERO {
            Some(expires_at(basic.created_at, self.access_lifetime)?)
        } else {
            None
        };
        let caveat = Caveat::for_scope(&scope, access_expires_at).with_nonce(generate_token()?);
        let access = Capability::new(&root.secret, root.id.as_bytes())
            .restrict(&caveat)?
            .serialize();

        let refresh = if generate_refresh {
            Some(generate_token()?)
        } else {
            None
        };

        tracing::debug!(project = %scope.project, key_id = %root.id, "minted access capability");
        Ok(GeneratedTokens {
            access,
            access_expires_at,
            refresh,
        })
    }
}
