//! An OpenID Connect identity provider issuing scope-restricted capability tokens.
//!
//! Clients obtain single-use authorization codes for an authenticated user,
//! exchange them for attenuated access tokens, and resolve those tokens back
//! into the subset of the user's identity and resources the user consented to share.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;

pub mod api;
pub mod clock;
pub mod config;
pub mod entity;
pub mod error;
pub mod logging;
pub mod oauth2;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
}
