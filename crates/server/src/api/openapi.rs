//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::OAUTH2_TAG;
use crate::oauth2::state::{AUTHORIZE_PATH, TOKEN_PATH};
use utoipa::{
    Modify, OpenApi,
    openapi::security::{HttpAuthScheme, HttpBuilder, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let bearer = HttpBuilder::new()
                .scheme(HttpAuthScheme::Bearer)
                .description(Some(
                    "Access token obtained from the token endpoint.",
                ))
                .build();
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(bearer));

            let oauth2 = OAuth2::new([utoipa::openapi::security::Flow::AuthorizationCode(
                utoipa::openapi::security::AuthorizationCode::new(
                    AUTHORIZE_PATH,
                    TOKEN_PATH,
                    Scopes::from_iter([
                        ("object:read", "Read objects"),
                        ("object:write", "Write objects"),
                        ("object:list", "List objects"),
                        ("object:delete", "Delete objects"),
                        ("project:<id>", "Target project (required)"),
                        ("bucket:<name>", "Restrict to a bucket (repeatable)"),
                        ("cubbyhole:<payload>", "Encrypted key-sharing payload"),
                    ]),
                ),
            )]);
            components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
        }
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "OIDC Provider API",
        version = "1.0.0",
        description = "OpenID Connect identity provider issuing scope-restricted capability tokens."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 / OpenID Connect endpoints")
    )
)]
pub struct ApiDoc;
