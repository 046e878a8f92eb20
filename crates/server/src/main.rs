use oidc_provider::AppResources;
use oidc_provider::api::start_webserver;
use oidc_provider::config::load_config_or_panic;
use oidc_provider::oauth2::OAuth2State;
use oidc_provider::oauth2::session::JwtSessionAuthenticator;
use sea_orm::Database;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_standard_tracing() {
    let default_directives = "oidc_provider=info,tower_http=info,sea_orm=warn";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install().expect("Failed to install `color_eyre::install`");
    // A missing .env is fine; config.yaml and the environment still apply.
    let _ = dotenvy::dotenv();

    initialize_standard_tracing();

    // Load config
    let config = Arc::new(load_config_or_panic());

    // Set up SeaORM database connection
    let db = Arc::new(
        Database::connect(&config.database_url)
            .await
            .expect("Failed to connect to database"),
    );

    let session = Arc::new(JwtSessionAuthenticator::new(
        config.session_secret.as_bytes(),
    ));
    let oauth2_state = OAuth2State::new(db.clone(), &config.oauth2, session);
    tracing::info!(
        issuer = %oauth2_state.issuer_url,
        access_token_lifetime = config.oauth2.access_token_lifetime,
        refresh_token_lifetime = config.oauth2.refresh_token_lifetime,
        "identity provider configuration"
    );

    let resources = AppResources { db, config };
    start_webserver(oauth2_state, resources).await?;
    Ok(())
}
