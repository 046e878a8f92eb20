//! Bearer token to restricted identity view.
//!
//! Every failure collapses into [`UserInfoError::Unauthenticated`]; the
//! [`RejectReason`] is for logs only.

use crate::clock::Clock;
use crate::error::{RejectReason, UserInfoError};
use crate::oauth2::capability::Capability;
use crate::oauth2::scope::Scope;
use crate::oauth2::store::{RootKeyStore, TokenStore, UserDirectory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use utoipa::ToSchema;

/// OpenID Connect user-info document, restricted to the consented scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct UserInfo {
    pub sub: String,
    pub email: String,
    pub email_verified: bool,
    pub project: String,
    pub buckets: Vec<String>,
    /// Encrypted key-sharing payload, empty when none was granted
    pub cubbyhole: String,
}

/// Extract the token from `Authorization: Bearer <token>`. The prefix is case-sensitive.
pub fn bearer_token(authorization: Option<&str>) -> Option<&str> {
    authorization
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[derive(Clone)]
pub struct UserInfoResolver {
    tokens: Arc<dyn TokenStore>,
    users: Arc<dyn UserDirectory>,
    root_keys: Arc<dyn RootKeyStore>,
    clock: Arc<dyn Clock>,
}

impl UserInfoResolver {
    pub fn new(
        tokens: Arc<dyn TokenStore>,
        users: Arc<dyn UserDirectory>,
        root_keys: Arc<dyn RootKeyStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tokens,
            users,
            root_keys,
            clock,
        }
    }

    pub async fn resolve(&self, authorization: Option<&str>) -> Result<UserInfo, UserInfoError> {
        use UserInfoError::Unauthenticated;

        let access = bearer_token(authorization).ok_or(Unauthenticated(RejectReason::MissingBearer))?;
        let now = self.clock.now();

        let token = self
            .tokens
            .get_by_access(access, now)
            .await?
            .ok_or(Unauthenticated(RejectReason::UnknownToken))?;

        let scope = Scope::decode(&token.scope)
            .map_err(|_| Unauthenticated(RejectReason::MalformedScope))?;

        let capability = Capability::parse(access)
            .map_err(|_| Unauthenticated(RejectReason::InvalidCapability))?;
        let key_id = capability
            .key_id()
            .ok_or(Unauthenticated(RejectReason::InvalidCapability))?;
        let root = self
            .root_keys
            .get(key_id)
            .await?
            .filter(|k| k.user_id == token.user_id && k.project_id == scope.project)
            .ok_or(Unauthenticated(RejectReason::InvalidCapability))?;
        capability
            .verify_bound(&root.secret, &scope.project, now)
            .map_err(|_| Unauthenticated(RejectReason::InvalidCapability))?;

        let user = self
            .users
            .get_user(&token.user_id)
            .await?
            .ok_or(Unauthenticated(RejectReason::UnknownUser))?;
        if !user.is_active() {
            return Err(Unauthenticated(RejectReason::InactiveUser));
        }
        if !self.users.is_project_member(&scope.project, &user.id).await? {
            return Err(Unauthenticated(RejectReason::ProjectAccessRevoked));
        }

        Ok(UserInfo {
            sub: user.id,
            email: user.email,
            email_verified: user.email_verified,
            project: scope.project,
            buckets: scope.buckets,
            cubbyhole: scope.cubbyhole.unwrap_or_default(),
        })
    }
}
