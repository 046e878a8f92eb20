//! OAuth2 HTTP endpoints.
//!
//! Implements the identity provider's HTTP surface:
//! - Discovery document
//! - Authorization endpoint (GET and POST)
//! - Token endpoint
//! - Token revocation
//! - UserInfo (OpenID Connect)

use crate::error::{ErrorResponse, OAuthError, UserInfoError};
use crate::logging::RequestEvent;
use crate::oauth2::manager::{
    AuthorizeRejection, AuthorizeRequest, ClientCredentials, RevokeRequest, TokenRequest,
    TokenResponse, found,
};
use crate::oauth2::state::{AUTHORIZE_PATH, OAuth2State, REVOKE_PATH, TOKEN_PATH, USERINFO_PATH};
use crate::oauth2::userinfo::UserInfo;
use crate::oauth2::OAUTH2_TAG;
use axum::{
    Form, Json,
    extract::{
        Query, State,
        rejection::{FormRejection, QueryRejection},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(openid_configuration))
        .routes(routes!(authorize, authorize_form))
        .routes(routes!(token))
        .routes(routes!(userinfo))
        .routes(routes!(revoke))
        .with_state(state)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub userinfo_endpoint: String,
    pub revocation_endpoint: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Returns the provider metadata: issuer and the authorize, token, user-info and \
                   revocation endpoint URLs derived from the configured external address.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OAuth2State>) -> Json<OpenIdConfiguration> {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
    Json(OpenIdConfiguration {
        issuer: state.issuer_url.clone(),
        authorization_endpoint: state.endpoint(AUTHORIZE_PATH),
        token_endpoint: state.endpoint(TOKEN_PATH),
        userinfo_endpoint: state.endpoint(USERINFO_PATH),
        revocation_endpoint: state.endpoint(REVOKE_PATH),
        response_types_supported: strings(&["code"]),
        grant_types_supported: strings(&["authorization_code", "refresh_token"]),
        subject_types_supported: strings(&["public"]),
        token_endpoint_auth_methods_supported: strings(&[
            "client_secret_basic",
            "client_secret_post",
        ]),
        claims_supported: strings(&[
            "sub",
            "email",
            "email_verified",
            "project",
            "buckets",
            "cubbyhole",
        ]),
    })
}

/// OAuth2 Authorization endpoint.
///
/// The end user must already hold a console session; the consent decision
/// arrives as the `scope` parameter.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    get,
    path = "/oauth/v2/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Issue an authorization code",
    description = "Issues a single-use authorization code for the session's user and redirects \
                   (302) to the client's redirect_uri with `code` and `state`.\n\n\
                   **Session:** `session` cookie or `X-Session-Token` header.\n\n\
                   **Scope:** `object:<op>`... `project:<id>` `bucket:<name>`... `cubbyhole:<payload>`.",
    params(AuthorizeRequest),
    responses(
        (status = 302, description = "Redirect to the client with a code, or with an error"),
        (status = 400, description = "Unknown client or invalid redirect_uri", body = ErrorResponse),
        (status = 401, description = "No authenticated session", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Query<AuthorizeRequest>, QueryRejection>,
) -> Response {
    match params {
        Ok(Query(params)) => handle_authorize(&state, &headers, params).await,
        Err(e) => malformed(&state, "authorize", e.body_text()),
    }
}

/// OAuth2 Authorization endpoint, form-encoded variant.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/v2/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize (form)",
    summary = "Issue an authorization code (form post)",
    description = "Same as the GET variant with parameters in an `application/x-www-form-urlencoded` body.",
    request_body(
        content = AuthorizeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Authorization request parameters"
    ),
    responses(
        (status = 302, description = "Redirect to the client with a code, or with an error"),
        (status = 400, description = "Unknown client or invalid redirect_uri", body = ErrorResponse),
        (status = 401, description = "No authenticated session", body = ErrorResponse),
    )
)]
pub async fn authorize_form(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<AuthorizeRequest>, FormRejection>,
) -> Response {
    match params {
        Ok(Form(params)) => handle_authorize(&state, &headers, params).await,
        Err(e) => malformed(&state, "authorize", e.body_text()),
    }
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/v2/tokens",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange an authorization code or refresh token for tokens",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: redeem a code (single use)\n\
                   - `refresh_token`: rotate a refresh token; the old one stops working\n\n\
                   **Client authentication:** HTTP Basic or `client_id`/`client_secret` in the body.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid, expired or reused grant, or unknown client", body = ErrorResponse),
    )
)]
pub async fn token(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<TokenRequest>, FormRejection>,
) -> Response {
    let Form(params) = match params {
        Ok(p) => p,
        Err(e) => return malformed(&state, "token", e.body_text()),
    };
    let credentials = ClientCredentials::from_request(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    );

    let evt = state.monitor.start("token");
    if let Some(id) = &credentials.id {
        evt.client(id);
    }
    match state.manager.exchange(&credentials, &params).await {
        Ok(response) => {
            evt.succeed();
            response.into_response()
        }
        Err(e) => reject(evt, e),
    }
}

/// Token revocation endpoint (RFC 7009).
#[tracing::instrument(skip(state, headers, params))]
#[utoipa::path(
    post,
    path = "/oauth/v2/revoke",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Revoke Token",
    summary = "Revoke an access or refresh token",
    description = "Revokes a token issued to the authenticated client. Returns 200 even if the \
                   token is unknown or already revoked. `token_type_hint` decides which kind is \
                   looked up first; unknown hints are ignored.",
    request_body(
        content = RevokeRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token revocation request"
    ),
    responses(
        (status = 200, description = "Token revoked (or was already invalid)"),
        (status = 400, description = "Invalid client or missing token", body = ErrorResponse),
    )
)]
pub async fn revoke(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    params: Result<Form<RevokeRequest>, FormRejection>,
) -> Response {
    let Form(params) = match params {
        Ok(p) => p,
        Err(e) => return malformed(&state, "revoke", e.body_text()),
    };
    let credentials = ClientCredentials::from_request(
        &headers,
        params.client_id.as_deref(),
        params.client_secret.as_deref(),
    );

    let evt = state.monitor.start("revoke");
    if let Some(id) = &credentials.id {
        evt.client(id);
    }
    match state.manager.revoke(&credentials, &params).await {
        Ok(revoked) => {
            tracing::debug!(revoked, "revocation processed");
            evt.succeed();
            StatusCode::OK.into_response()
        }
        Err(e) => reject(evt, e),
    }
}

/// OpenID Connect UserInfo endpoint.
#[tracing::instrument(skip(state, headers))]
#[utoipa::path(
    get,
    path = "/oauth/v2/userinfo",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect UserInfo",
    summary = "Resolve an access token to the user's restricted profile",
    description = "Returns the subject, email and the project, buckets and cubbyhole the user \
                   consented to share. Any failure is a 401 with an empty body.\n\n\
                   **Authentication:** `Authorization: Bearer <access_token>`.",
    security(
        ("bearer_auth" = [])
    ),
    responses(
        (status = 200, description = "Restricted user profile", body = UserInfo),
        (status = 401, description = "Missing, invalid or expired token, or inactive account"),
    )
)]
pub async fn userinfo(State(state): State<OAuth2State>, headers: HeaderMap) -> Response {
    let evt = state.monitor.start("userinfo");
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match state.userinfo.resolve(authorization).await {
        Ok(info) => {
            evt.succeed();
            (StatusCode::OK, Json(info)).into_response()
        }
        Err(e) => {
            match &e {
                UserInfoError::Unauthenticated(reason) => evt.reject_quietly(reason),
                UserInfoError::Internal(message) => evt.fail(message),
            }
            e.into_response()
        }
    }
}

async fn handle_authorize(
    state: &OAuth2State,
    headers: &HeaderMap,
    params: AuthorizeRequest,
) -> Response {
    let evt = state.monitor.start("authorize");
    evt.client(&params.client_id);

    let Some(user_id) = state.session.current_user(headers).await else {
        return reject(evt, OAuthError::LoginRequired);
    };

    match state.manager.authorize(&user_id, &params).await {
        Ok(redirect) => {
            evt.succeed();
            found(&redirect)
        }
        Err(AuthorizeRejection::Direct(e)) => reject(evt, e),
        Err(rejection @ AuthorizeRejection::Redirect(_)) => {
            evt.reject("error_redirect", None);
            rejection.into_response()
        }
    }
}

fn reject(evt: RequestEvent, err: OAuthError) -> Response {
    match &err {
        OAuthError::Server(source) => evt.fail(source),
        other => {
            let description = other.description();
            evt.reject(
                other.code(),
                description.as_ref().map(|d| d as &dyn std::fmt::Display),
            );
        }
    }
    err.into_response()
}

fn malformed(state: &OAuth2State, operation: &'static str, detail: String) -> Response {
    reject(
        state.monitor.start(operation),
        OAuthError::InvalidRequest(detail),
    )
}
