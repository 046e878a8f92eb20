//! OAuth2 / OpenID Connect identity provider.
//!
//! Issues single-use authorization codes and capability-based access tokens
//! to registered clients, and resolves access tokens back into a restricted
//! view of the user.
//!
//! ## Supported Flows
//!
//! - Authorization Code
//! - Refresh Token (with rotation)
//!
//! ## Endpoints
//!
//! - `GET /.well-known/openid-configuration` - OpenID Connect Discovery
//! - `GET|POST /oauth/v2/authorize` - Authorization endpoint
//! - `POST /oauth/v2/tokens` - Token endpoint
//! - `POST /oauth/v2/revoke` - Token revocation
//! - `GET /oauth/v2/userinfo` - OpenID Connect UserInfo

pub mod capability;
pub mod directory;
pub mod endpoints;
pub mod generate;
pub mod manager;
pub mod registrar;
pub mod scope;
pub mod secret;
pub mod session;
pub mod state;
pub mod store;
pub mod token_store;
pub mod userinfo;

pub use endpoints::router;
pub use scope::Scope;
pub use secret::{generate_token, hash_secret, verify_secret};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";
