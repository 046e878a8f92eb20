//! Authorization-code grant state machine.
//!
//! Parses and validates protocol requests, then drives the injected stores and
//! generators. It holds no mutable state; everything durable goes through the
//! [`TokenStore`], which arbitrates concurrent redemption and rotation.

use crate::clock::Clock;
use crate::config::OAuth2Config;
use crate::error::OAuthError;
use crate::oauth2::generate::{
    AccessGenerate, AuthorizeGenerate, GenerateBasic, GeneratedTokens, expires_at,
};
use crate::oauth2::scope::Scope;
use crate::oauth2::store::{
    AuthorizationCode, Client, ClientStore, TokenInfo, TokenStore, access_token_hash,
};
use axum::{
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use url::Url;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

/// Authorization request parameters (RFC 6749 section 4.1.1).
#[derive(Debug, Clone, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    /// Must be `code`
    pub response_type: String,
    /// Client identifier issued during registration
    pub client_id: String,
    /// Must match a registered redirect URI. Defaults to the first one.
    pub redirect_uri: Option<String>,
    /// Encoded consent scope, e.g. `object:read project:P bucket:b1`
    pub scope: Option<String>,
    /// Opaque value returned unchanged in the redirect
    pub state: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TokenRequest {
    pub grant_type: String,
    pub code: Option<String>,
    pub redirect_uri: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RevokeRequest {
    pub token: String,
    pub token_type_hint: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    /// Seconds until the access token expires; 0 when it is not time bound
    pub expires_in: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    pub scope: String,
}

impl IntoResponse for TokenResponse {
    fn into_response(self) -> Response {
        (
            StatusCode::OK,
            [(header::CACHE_CONTROL, "no-store")],
            axum::Json(self),
        )
            .into_response()
    }
}

/// Client id and secret as presented on the token or revoke endpoint.
#[derive(Clone, Default)]
pub struct ClientCredentials {
    pub id: Option<String>,
    pub secret: Option<String>,
}

impl ClientCredentials {
    /// HTTP Basic takes precedence over form fields.
    pub fn from_request(
        headers: &HeaderMap,
        form_id: Option<&str>,
        form_secret: Option<&str>,
    ) -> Self {
        if let Some(auth) = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
            && let Ok(decoded) = base64::engine::general_purpose::STANDARD.decode(auth.trim())
            && let Ok(creds) = String::from_utf8(decoded)
            && let Some((id, secret)) = creds.split_once(':')
        {
            return ClientCredentials {
                id: urlencoding::decode(id).ok().map(|s| s.into_owned()),
                secret: urlencoding::decode(secret).ok().map(|s| s.into_owned()),
            };
        }

        ClientCredentials {
            id: form_id.map(String::from),
            secret: form_secret.map(String::from),
        }
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("id", &self.id)
            .finish_non_exhaustive()
    }
}

/// How an authorize request fails.
#[derive(Debug)]
pub enum AuthorizeRejection {
    /// The client or redirect URI cannot be trusted; answer the user agent directly.
    Direct(OAuthError),
    /// Error redirect back to the validated redirect URI.
    Redirect(Url),
}

impl From<OAuthError> for AuthorizeRejection {
    fn from(err: OAuthError) -> Self {
        AuthorizeRejection::Direct(err)
    }
}

impl IntoResponse for AuthorizeRejection {
    fn into_response(self) -> Response {
        match self {
            AuthorizeRejection::Direct(err) => err.into_response(),
            AuthorizeRejection::Redirect(url) => found(&url),
        }
    }
}

/// 302 to `url`.
pub fn found(url: &Url) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, url.as_str())]).into_response()
}

#[derive(Clone, Copy, Debug)]
pub struct ManagerConfig {
    pub code_lifetime: Duration,
    /// Zero issues tokens without a time bound.
    pub access_lifetime: Duration,
    /// Zero disables refresh tokens.
    pub refresh_lifetime: Duration,
}

impl ManagerConfig {
    pub fn issues_refresh_tokens(&self) -> bool {
        self.refresh_lifetime > Duration::ZERO
    }
}

impl From<&OAuth2Config> for ManagerConfig {
    fn from(config: &OAuth2Config) -> Self {
        ManagerConfig {
            code_lifetime: Duration::seconds(config.code_lifetime),
            access_lifetime: Duration::seconds(config.access_token_lifetime),
            refresh_lifetime: Duration::seconds(config.refresh_token_lifetime),
        }
    }
}

#[derive(Clone)]
pub struct Manager {
    clients: Arc<dyn ClientStore>,
    tokens: Arc<dyn TokenStore>,
    authorizer: Arc<dyn AuthorizeGenerate>,
    issuer: Arc<dyn AccessGenerate>,
    clock: Arc<dyn Clock>,
    config: ManagerConfig,
}

impl Manager {
    pub fn new(
        clients: Arc<dyn ClientStore>,
        tokens: Arc<dyn TokenStore>,
        authorizer: Arc<dyn AuthorizeGenerate>,
        issuer: Arc<dyn AccessGenerate>,
        clock: Arc<dyn Clock>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            clients,
            tokens,
            authorizer,
            issuer,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Issue an authorization code for `user_id` and build the success redirect.
    pub async fn authorize(
        &self,
        user_id: &str,
        request: &AuthorizeRequest,
    ) -> Result<Url, AuthorizeRejection> {
        let client = self
            .clients
            .lookup(&request.client_id)
            .await
            .map_err(OAuthError::from)?
            .ok_or(OAuthError::InvalidClient)?;

        let redirect_uri = match request.redirect_uri.as_deref() {
            Some(uri) if client.is_redirect_uri_allowed(uri) => uri,
            Some(_) => {
                return Err(OAuthError::InvalidRequest("Invalid redirect_uri".into()).into());
            }
            None => client.default_redirect_uri().ok_or_else(|| {
                OAuthError::InvalidRequest("No redirect_uri configured".into())
            })?,
        };
        let redirect = Url::parse(redirect_uri)
            .map_err(|_| OAuthError::InvalidRequest("Invalid redirect_uri".into()))?;

        let error_redirect = |err: OAuthError| {
            AuthorizeRejection::Redirect(with_error(redirect.clone(), &err, request.state.as_deref()))
        };

        if request.response_type != "code" {
            return Err(error_redirect(OAuthError::UnsupportedResponseType));
        }
        let scope = Scope::decode(request.scope.as_deref().unwrap_or_default())
            .and_then(|scope| scope.encode())
            .map_err(|e| error_redirect(OAuthError::InvalidScope(e.to_string())))?;

        let now = self.clock.now();
        let basic = GenerateBasic {
            client_id: client.id.clone(),
            user_id: user_id.to_string(),
            scope,
            created_at: now,
        };
        let code = self
            .authorizer
            .code(&basic)
            .await
            .map_err(|e| error_redirect(e.into()))?;

        self.tokens
            .save_code(&AuthorizationCode {
                code: code.clone(),
                client_id: basic.client_id,
                user_id: basic.user_id,
                redirect_uri: redirect_uri.to_string(),
                scope: basic.scope,
                created_at: now,
                expires_at: expires_at(now, self.config.code_lifetime)
                    .map_err(|e| error_redirect(e.into()))?,
            })
            .await
            .map_err(|e| error_redirect(e.into()))?;

        let mut success = redirect;
        success.query_pairs_mut().append_pair("code", &code);
        if let Some(state) = &request.state {
            success.query_pairs_mut().append_pair("state", state);
        }
        tracing::debug!(client_id = %client.id, "issued authorization code");
        Ok(success)
    }

    /// Token endpoint: dispatch on `grant_type`.
    pub async fn exchange(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let client = self.authenticate(credentials).await?;
        match request.grant_type.as_str() {
            "authorization_code" => self.exchange_code(&client, request).await,
            "refresh_token" => self.exchange_refresh(&client, request).await,
            _ => Err(OAuthError::UnsupportedGrantType),
        }
    }

    /// RFC 7009 revocation. Unknown or foreign tokens are silently accepted.
    pub async fn revoke(
        &self,
        credentials: &ClientCredentials,
        request: &RevokeRequest,
    ) -> Result<bool, OAuthError> {
        let client = self.authenticate(credentials).await?;
        let prefer_refresh = match request.token_type_hint.as_deref() {
            Some("refresh_token") => true,
            Some("access_token") | None => false,
            Some(other) => {
                tracing::debug!(hint = other, "ignoring unknown token_type_hint");
                false
            }
        };
        Ok(self
            .tokens
            .revoke(&request.token, &client.id, prefer_refresh, self.clock.now())
            .await?)
    }

    async fn authenticate(&self, credentials: &ClientCredentials) -> Result<Client, OAuthError> {
        let id = credentials
            .id
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".into()))?;
        let client = self
            .clients
            .lookup(id)
            .await?
            .ok_or(OAuthError::InvalidClient)?;
        match credentials.secret.as_deref() {
            Some(secret) if client.verify_secret(secret) => Ok(client),
            _ => Err(OAuthError::InvalidClient),
        }
    }

    async fn exchange_code(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let code = request
            .code
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("code is required".into()))?;

        let now = self.clock.now();
        let grant = self
            .tokens
            .get_by_code(code, now)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Authorization code is invalid or expired".into()))?;
        if grant.client_id != client.id {
            return Err(OAuthError::InvalidGrant("Client ID mismatch".into()));
        }
        if let Some(uri) = request.redirect_uri.as_deref()
            && uri != grant.redirect_uri
        {
            return Err(OAuthError::InvalidGrant("Redirect URI mismatch".into()));
        }

        let basic = GenerateBasic {
            client_id: client.id.clone(),
            user_id: grant.user_id,
            scope: grant.scope,
            created_at: now,
        };
        let generated = self
            .issuer
            .token(&basic, self.config.issues_refresh_tokens())
            .await?;
        let info = self.token_info(basic, &generated)?;

        if !self.tokens.redeem_code(code, &info).await? {
            return Err(OAuthError::InvalidGrant("Authorization code already used".into()));
        }
        Ok(response(info, generated.access))
    }

    async fn exchange_refresh(
        &self,
        client: &Client,
        request: &TokenRequest,
    ) -> Result<TokenResponse, OAuthError> {
        let refresh = request
            .refresh_token
            .as_deref()
            .ok_or_else(|| OAuthError::InvalidRequest("refresh_token is required".into()))?;

        let now = self.clock.now();
        let existing = self
            .tokens
            .get_by_refresh(refresh, now)
            .await?
            .ok_or_else(|| OAuthError::InvalidGrant("Refresh token is invalid or expired".into()))?;
        if existing.client_id != client.id {
            return Err(OAuthError::InvalidGrant(
                "Token does not belong to this client".into(),
            ));
        }
        if let Some(requested) = request.scope.as_deref() {
            let requested = Scope::decode(requested)
                .and_then(|scope| scope.encode())
                .map_err(|e| OAuthError::InvalidScope(e.to_string()))?;
            if requested != existing.scope {
                return Err(OAuthError::InvalidScope(
                    "Refresh cannot change the granted scope".into(),
                ));
            }
        }

        let basic = GenerateBasic {
            client_id: client.id.clone(),
            user_id: existing.user_id,
            scope: existing.scope,
            created_at: now,
        };
        let generated = self
            .issuer
            .token(&basic, self.config.issues_refresh_tokens())
            .await?;
        let info = self.token_info(basic, &generated)?;

        if !self.tokens.rotate_refresh(refresh, &info, now).await? {
            return Err(OAuthError::InvalidGrant("Refresh token already used".into()));
        }
        Ok(response(info, generated.access))
    }

    fn token_info(
        &self,
        basic: GenerateBasic,
        generated: &GeneratedTokens,
    ) -> Result<TokenInfo, OAuthError> {
        let refresh_expires_at = match generated.refresh {
            Some(_) => Some(expires_at(basic.created_at, self.config.refresh_lifetime)?),
            None => None,
        };
        Ok(TokenInfo {
            id: Uuid::new_v4().to_string(),
            client_id: basic.client_id,
            user_id: basic.user_id,
            scope: basic.scope,
            access_token_hash: access_token_hash(&generated.access),
            access_expires_at: generated.access_expires_at,
            refresh_token: generated.refresh.clone(),
            refresh_expires_at,
            created_at: basic.created_at,
            revoked_at: None,
        })
    }

    pub fn now(&self) -> OffsetDateTime {
        self.clock.now()
    }
}

fn response(info: TokenInfo, access_token: String) -> TokenResponse {
    TokenResponse {
        expires_in: info.expires_in(),
        access_token,
        token_type: "Bearer".to_string(),
        refresh_token: info.refresh_token,
        scope: info.scope,
    }
}

fn with_error(mut url: Url, err: &OAuthError, state: Option<&str>) -> Url {
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("error", err.code());
        if let Some(description) = err.description() {
            query.append_pair("error_description", &description);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    url
}
