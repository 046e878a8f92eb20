use axum::{
    Json,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use utoipa::ToSchema;

/// Reasons a scope string is rejected by the codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScopeError {
    #[error("Malformed scope: missing project")]
    MissingProject,
    #[error("Malformed scope: duplicate {0} field")]
    DuplicateField(&'static str),
    #[error("Malformed scope: duplicate bucket {0:?}")]
    DuplicateBucket(String),
    #[error("Malformed scope: too many buckets ({count}, max {max})")]
    TooManyBuckets { count: usize, max: usize },
    #[error("Malformed scope: invalid percent-encoding in {0} field")]
    InvalidEncoding(&'static str),
    #[error("Malformed scope: invalid project identifier {0:?}")]
    InvalidProject(String),
    #[error("Malformed scope: invalid bucket name {0:?}")]
    InvalidBucket(String),
    #[error("Malformed scope: unknown object permission {0:?}")]
    UnknownPermission(String),
    #[error("Malformed scope: cubbyhole is not valid base64url")]
    InvalidCubbyhole,
    #[error("Malformed scope: no object operation granted")]
    EmptyPermissions,
}

#[derive(Debug, Error)]
pub enum CapabilityError {
    #[error("Capability is not valid base64url")]
    Encoding(#[from] base64::DecodeError),
    #[error("Capability document is malformed: {0}")]
    Format(#[from] serde_json::Error),
    #[error("Capability signature does not verify")]
    Signature,
    #[error("Capability expired")]
    Expired,
    #[error("Capability does not permit {0}")]
    Denied(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),
    #[error("Stored record is corrupt: {0}")]
    Corrupt(String),
}

/// Failures while minting authorization codes or token pairs.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("Scope cannot be attenuated: {0}")]
    ScopeEncoding(String),
    #[error("User not found")]
    UserNotFound,
    #[error("User is not active")]
    UserInactive,
    #[error("Expiry out of range: {0} + {1}")]
    ExpiryOverflow(OffsetDateTime, time::Duration),
    #[error("Random source failure: {0}")]
    Randomness(#[from] getrandom::Error),
    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ScopeError> for GenerateError {
    fn from(err: ScopeError) -> Self {
        GenerateError::ScopeEncoding(err.to_string())
    }
}

/// OAuth2 error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Protocol-level errors returned by the authorize, token and revoke endpoints.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("invalid_request: {0}")]
    InvalidRequest(String),
    #[error("invalid_client")]
    InvalidClient,
    #[error("invalid_grant: {0}")]
    InvalidGrant(String),
    #[error("invalid_scope: {0}")]
    InvalidScope(String),
    #[error("unsupported_grant_type")]
    UnsupportedGrantType,
    #[error("unsupported_response_type")]
    UnsupportedResponseType,
    #[error("login_required")]
    LoginRequired,
    #[error("server_error")]
    Server(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl OAuthError {
    /// The protocol error code (RFC 6749 section 5.2, OIDC core 3.1.2.6).
    pub fn code(&self) -> &'static str {
        match self {
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidClient => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedGrantType => "unsupported_grant_type",
            OAuthError::UnsupportedResponseType => "unsupported_response_type",
            OAuthError::LoginRequired => "login_required",
            OAuthError::Server(_) => "server_error",
        }
    }

    pub fn description(&self) -> Option<String> {
        match self {
            OAuthError::InvalidRequest(d) | OAuthError::InvalidGrant(d) | OAuthError::InvalidScope(d) => {
                Some(d.clone())
            }
            _ => None,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            OAuthError::LoginRequired => StatusCode::UNAUTHORIZED,
            OAuthError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<StoreError> for OAuthError {
    fn from(err: StoreError) -> Self {
        OAuthError::Server(Box::new(err))
    }
}

impl From<GenerateError> for OAuthError {
    fn from(err: GenerateError) -> Self {
        match err {
            GenerateError::ScopeEncoding(_) | GenerateError::UserNotFound | GenerateError::UserInactive => {
                OAuthError::InvalidGrant(err.to_string())
            }
            other => OAuthError::Server(Box::new(other)),
        }
    }
}

impl IntoResponse for OAuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = ErrorResponse {
            error: self.code().to_string(),
            error_description: self.description(),
        };
        (status, [(header::CACHE_CONTROL, "no-store")], Json(body)).into_response()
    }
}

/// Why a user-info request was refused. The reason never leaves the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingBearer,
    UnknownToken,
    MalformedScope,
    InvalidCapability,
    UnknownUser,
    InactiveUser,
    ProjectAccessRevoked,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingBearer => "missing_bearer",
            RejectReason::UnknownToken => "unknown_token",
            RejectReason::MalformedScope => "malformed_scope",
            RejectReason::InvalidCapability => "invalid_capability",
            RejectReason::UnknownUser => "unknown_user",
            RejectReason::InactiveUser => "inactive_user",
            RejectReason::ProjectAccessRevoked => "project_access_revoked",
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum UserInfoError {
    #[error("Unauthenticated ({0})")]
    Unauthenticated(RejectReason),
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for UserInfoError {
    fn from(err: StoreError) -> Self {
        UserInfoError::Internal(err.to_string())
    }
}

impl IntoResponse for UserInfoError {
    fn into_response(self) -> Response {
        // Both variants answer with an empty body; only the status differs.
        match self {
            UserInfoError::Unauthenticated(_) => StatusCode::UNAUTHORIZED.into_response(),
            UserInfoError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        }
    }
}
