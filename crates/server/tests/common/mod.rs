//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use axum::http::{HeaderName, HeaderValue, header};
use axum_test::{TestResponse, TestServer};
use base64::Engine;
use oidc_provider::{
    AppResources,
    clock::ManualClock,
    config::{AppConfig, OAuth2Config},
    entity::{oauth2_user, oauth2_user::UserStatus, project_member},
    oauth2::{OAuth2State, registrar::DbRegistrar, session::JwtSessionAuthenticator},
};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectOptions, ConnectionTrait, Database,
    DatabaseConnection, DbBackend, EntityTrait, Statement,
};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const T0: i64 = 1_700_000_000;
pub const CLIENT_ID: &str = "C1";
pub const CLIENT_SECRET: &str = "c1-secret";
pub const OTHER_CLIENT_ID: &str = "C2";
pub const OTHER_CLIENT_SECRET: &str = "c2-secret";
pub const REDIRECT_URI: &str = "https://app.example/callback";
pub const OTHER_REDIRECT_URI: &str = "https://other.example/callback";
pub const SESSION_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const CUBBYHOLE: &str = "c2VjcmV0LWtleS1tYXRlcmlhbA";

/// In-memory SQLite with every table the stores use.
pub async fn create_test_db() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1);
    let db = Database::connect(options).await.expect("connect");

    for ddl in [
        r#"CREATE TABLE oauth2_client (
            id TEXT PRIMARY KEY,
            secret_hash TEXT NOT NULL,
            name TEXT NOT NULL,
            redirect_uris TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE oauth2_user (
            id TEXT PRIMARY KEY,
            email TEXT NOT NULL UNIQUE,
            email_verified INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'inactive',
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE project_member (
            project_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            created_at TEXT NOT NULL,
            PRIMARY KEY (project_id, user_id)
        );"#,
        r#"CREATE TABLE api_key (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            secret TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE oauth2_authorization (
            code TEXT PRIMARY KEY,
            client_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            redirect_uri TEXT NOT NULL,
            scope TEXT NOT NULL,
            expires_at TEXT NOT NULL,
            created_at TEXT NOT NULL
        );"#,
        r#"CREATE TABLE oauth2_token (
            id TEXT PRIMARY KEY,
            access_token_hash TEXT NOT NULL UNIQUE,
            refresh_token TEXT UNIQUE,
            client_id TEXT NOT NULL,
            user_id TEXT NOT NULL,
            scope TEXT NOT NULL,
            access_token_expires_at TEXT NULL,
            refresh_token_expires_at TEXT NULL,
            created_at TEXT NOT NULL,
            revoked_at TEXT NULL
        );"#,
    ] {
        db.execute(Statement::from_string(DbBackend::Sqlite, ddl))
            .await
            .expect("create table");
    }

    db
}

pub async fn insert_user(db: &DatabaseConnection, id: &str, status: UserStatus) {
    oauth2_user::ActiveModel {
        id: Set(id.to_string()),
        email: Set(format!("{}@example.com", id.to_lowercase())),
        email_verified: Set(true),
        status: Set(status),
        created_at: Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert user");
}

pub async fn set_status(db: &DatabaseConnection, id: &str, status: UserStatus) {
    let user = oauth2_user::Entity::find_by_id(id)
        .one(db)
        .await
        .expect("query user")
        .expect("user exists");
    let mut active: oauth2_user::ActiveModel = user.into();
    active.status = Set(status);
    active.update(db).await.expect("update user");
}

pub async fn add_member(db: &DatabaseConnection, project: &str, user: &str) {
    project_member::ActiveModel {
        project_id: Set(project.to_string()),
        user_id: Set(user.to_string()),
        created_at: Set(OffsetDateTime::now_utc()),
    }
    .insert(db)
    .await
    .expect("insert membership");
}

pub async fn remove_member(db: &DatabaseConnection, project: &str, user: &str) {
    project_member::Entity::delete_by_id((project.to_string(), user.to_string()))
        .exec(db)
        .await
        .expect("delete membership");
}

pub fn test_oauth2_config(access: i64, refresh: i64) -> OAuth2Config {
    OAuth2Config {
        external_address: "https://id.example.com/".into(),
        code_lifetime: 600,
        access_token_lifetime: access,
        refresh_token_lifetime: refresh,
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<DatabaseConnection>,
    pub clock: Arc<ManualClock>,
    pub state: OAuth2State,
    pub session: JwtSessionAuthenticator,
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with(test_oauth2_config(3600, 604800)).await
}

/// Clients C1 and C2 are registered; U1 is active and a member of project P.
pub async fn spawn_app_with(oauth2: OAuth2Config) -> TestApp {
    let db = Arc::new(create_test_db().await);

    let registrar = DbRegistrar::new(db.clone());
    registrar
        .register(CLIENT_ID, "Client One", CLIENT_SECRET, &[REDIRECT_URI.into()])
        .await
        .expect("register C1");
    registrar
        .register(
            OTHER_CLIENT_ID,
            "Client Two",
            OTHER_CLIENT_SECRET,
            &[OTHER_REDIRECT_URI.into()],
        )
        .await
        .expect("register C2");
    insert_user(&db, "U1", UserStatus::Active).await;
    add_member(&db, "P", "U1").await;

    let config = Arc::new(AppConfig {
        database_url: "sqlite::memory:".into(),
        listen_addr: "127.0.0.1:0".into(),
        session_secret: SESSION_SECRET.into(),
        oauth2,
    });
    let clock = Arc::new(ManualClock::at_unix(T0));
    let session = JwtSessionAuthenticator::new(SESSION_SECRET.as_bytes());
    let state = OAuth2State::with_clock(
        db.clone(),
        &config.oauth2,
        Arc::new(session.clone()),
        clock.clone(),
    );

    let resources = AppResources {
        db: db.clone(),
        config,
    };
    let app = oidc_provider::api::app(state.clone(), resources);
    let server = TestServer::new(app).expect("create test server");

    TestApp {
        server,
        db,
        clock,
        state,
        session,
    }
}

pub fn basic_auth(id: &str, secret: &str) -> (HeaderName, HeaderValue) {
    let encoded = base64::engine::general_purpose::STANDARD.encode(format!("{id}:{secret}"));
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Basic {encoded}")).expect("header value"),
    )
}

pub fn bearer(token: &str) -> (HeaderName, HeaderValue) {
    (
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {token}")).expect("header value"),
    )
}

pub fn query_param(location: &str, name: &str) -> Option<String> {
    url::Url::parse(location)
        .expect("absolute redirect")
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

impl TestApp {
    pub fn session_cookie(&self, user: &str) -> (HeaderName, HeaderValue) {
        let token = self
            .session
            .issue(user, Duration::minutes(15))
            .expect("issue session");
        (
            header::COOKIE,
            HeaderValue::from_str(&format!("session={token}")).expect("header value"),
        )
    }

    pub async fn authorize(&self, user: &str, scope: &str, state: &str) -> TestResponse {
        let (name, value) = self.session_cookie(user);
        self.server
            .get("/oauth/v2/authorize")
            .add_header(name, value)
            .add_query_param("response_type", "code")
            .add_query_param("client_id", CLIENT_ID)
            .add_query_param("redirect_uri", REDIRECT_URI)
            .add_query_param("scope", scope)
            .add_query_param("state", state)
            .await
    }

    /// Run the authorize step for `user` and return the issued code.
    pub async fn obtain_code(&self, user: &str, scope: &str) -> String {
        let response = self.authorize(user, scope, "xyz").await;
        response.assert_status(axum::http::StatusCode::FOUND);
        let location = response.header(header::LOCATION);
        let location = location.to_str().expect("ascii location");
        query_param(location, "code").expect("code in redirect")
    }

    pub async fn exchange_code(&self, code: &str) -> TestResponse {
        let (name, value) = basic_auth(CLIENT_ID, CLIENT_SECRET);
        self.server
            .post("/oauth/v2/tokens")
            .add_header(name, value)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", REDIRECT_URI),
            ])
            .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> TestResponse {
        self.server
            .post("/oauth/v2/tokens")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", CLIENT_ID),
                ("client_secret", CLIENT_SECRET),
            ])
            .await
    }

    pub async fn userinfo(&self, access_token: &str) -> TestResponse {
        let (name, value) = bearer(access_token);
        self.server
            .get("/oauth/v2/userinfo")
            .add_header(name, value)
            .await
    }

    /// Authorize and exchange in one go, returning the token response body.
    pub async fn issue_tokens(&self, user: &str, scope: &str) -> serde_json::Value {
        let code = self.obtain_code(user, scope).await;
        let response = self.exchange_code(&code).await;
        response.assert_status_ok();
        response.json()
    }
}
