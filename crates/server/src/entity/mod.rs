//! SeaORM entities backing the client, token and user stores.

pub mod api_key;
pub mod oauth2_authorization;
pub mod oauth2_client;
pub mod oauth2_token;
pub mod oauth2_user;
pub mod project_member;
