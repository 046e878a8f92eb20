//! OAuth2 state management.
//!
//! Wires the database-backed stores, the generators and the clock into the
//! protocol engine and the user-info resolver.

use crate::clock::{Clock, SystemClock};
use crate::config::OAuth2Config;
use crate::logging::Monitor;
use crate::oauth2::directory::{DbRootKeyStore, DbUserDirectory};
use crate::oauth2::generate::{CapabilityAccessGenerate, RandomAuthorizeGenerate};
use crate::oauth2::manager::{Manager, ManagerConfig};
use crate::oauth2::registrar::DbRegistrar;
use crate::oauth2::session::SessionAuthenticator;
use crate::oauth2::token_store::DbTokenStore;
use crate::oauth2::userinfo::UserInfoResolver;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Route paths, relative to the external address.
pub const AUTHORIZE_PATH: &str = "/oauth/v2/authorize";
pub const TOKEN_PATH: &str = "/oauth/v2/tokens";
pub const USERINFO_PATH: &str = "/oauth/v2/userinfo";
pub const REVOKE_PATH: &str = "/oauth/v2/revoke";

/// OAuth2 state containing all components needed for the authorization server.
#[derive(Clone)]
pub struct OAuth2State {
    pub manager: Manager,
    pub userinfo: UserInfoResolver,
    pub registrar: DbRegistrar,
    pub session: Arc<dyn SessionAuthenticator>,
    pub monitor: Monitor,
    /// External address without a trailing `/`; used as issuer
    pub issuer_url: String,
}

impl OAuth2State {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: &OAuth2Config,
        session: Arc<dyn SessionAuthenticator>,
    ) -> Self {
        Self::with_clock(db, config, session, Arc::new(SystemClock))
    }

    pub fn with_clock(
        db: Arc<DatabaseConnection>,
        config: &OAuth2Config,
        session: Arc<dyn SessionAuthenticator>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let manager_config = ManagerConfig::from(config);
        let registrar = DbRegistrar::new(db.clone());
        let tokens = Arc::new(DbTokenStore::new(db.clone()));
        let users = Arc::new(DbUserDirectory::new(db.clone()));
        let root_keys = Arc::new(DbRootKeyStore::new(db));

        let issuer = Arc::new(CapabilityAccessGenerate::new(
            users.clone(),
            root_keys.clone(),
            manager_config.access_lifetime,
        ));
        let manager = Manager::new(
            Arc::new(registrar.clone()),
            tokens.clone(),
            Arc::new(RandomAuthorizeGenerate),
            issuer,
            clock.clone(),
            manager_config,
        );
        let userinfo = UserInfoResolver::new(tokens, users, root_keys, clock);

        Self {
            manager,
            userinfo,
            registrar,
            session,
            monitor: Monitor::new(),
            issuer_url: config.external_address.trim_end_matches('/').to_string(),
        }
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.issuer_url)
    }
}
