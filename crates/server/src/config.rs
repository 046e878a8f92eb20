use serde::Deserialize;
use thiserror::Error;

/// Upper bound for every configured lifetime: ten years.
pub const MAX_LIFETIME_SECS: i64 = 10 * 365 * 24 * 3600;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration build error: {0}")]
    Build(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Validation(String),
}

#[derive(Clone, Debug, Deserialize)]
pub struct OAuth2Config {
    /// Public base URL of this provider; the discovery document is built from it.
    pub external_address: String,
    /// Authorization code lifetime in seconds.
    #[serde(default = "default_code_lifetime")]
    pub code_lifetime: i64,
    /// Access token lifetime in seconds. 0 issues tokens without a time bound.
    #[serde(default = "default_access_token_lifetime")]
    pub access_token_lifetime: i64,
    /// Refresh token lifetime in seconds. 0 disables refresh tokens.
    #[serde(default = "default_refresh_token_lifetime")]
    pub refresh_token_lifetime: i64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// HS256 key for session tokens issued by the console.
    pub session_secret: String,
    pub oauth2: OAuth2Config,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_code_lifetime() -> i64 {
    600
}

fn default_access_token_lifetime() -> i64 {
    3600
}

fn default_refresh_token_lifetime() -> i64 {
    7 * 24 * 3600
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_secret.len() < 32 {
            return Err(ConfigError::Validation(
                "session_secret must be at least 32 bytes".into(),
            ));
        }
        if self.oauth2.code_lifetime <= 0 {
            return Err(ConfigError::Validation(
                "oauth2.code_lifetime must be > 0".into(),
            ));
        }
        if self.oauth2.access_token_lifetime < 0 || self.oauth2.refresh_token_lifetime < 0 {
            return Err(ConfigError::Validation(
                "oauth2 token lifetimes must not be negative".into(),
            ));
        }
        for (name, secs) in [
            ("code_lifetime", self.oauth2.code_lifetime),
            ("access_token_lifetime", self.oauth2.access_token_lifetime),
            ("refresh_token_lifetime", self.oauth2.refresh_token_lifetime),
        ] {
            if secs > MAX_LIFETIME_SECS {
                return Err(ConfigError::Validation(format!(
                    "oauth2.{name} must be at most {MAX_LIFETIME_SECS} seconds"
                )));
            }
        }
        url::Url::parse(&self.oauth2.external_address).map_err(|e| {
            ConfigError::Validation(format!("oauth2.external_address is not a URL: {e}"))
        })?;
        Ok(())
    }
}

/// Load application configuration from `config.yaml` + environment overrides.
///
/// Any environment variable matching the key path separated by double
/// underscores (e.g. `OAUTH2__ACCESS_TOKEN_LIFETIME`) overrides the file value.
///
/// Returns a `ConfigError` instead of panicking so the caller can decide how to fail.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    use config::{Config, Environment, File};
    let cfg = Config::builder()
        .add_source(File::with_name("config.yaml").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    let app: AppConfig = cfg.try_deserialize()?;
    app.validate()?;
    Ok(app)
}

/// Convenience helper for binaries wanting the old panic-on-error behaviour.
pub fn load_config_or_panic() -> AppConfig {
    match load_config() {
        Ok(c) => c,
        Err(e) => panic!("Failed to load configuration: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::{Config, File, FileFormat};

    fn parse(yaml: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    const MINIMAL: &str = r#"
database_url: "sqlite::memory:"
session_secret: "0123456789abcdef0123456789abcdef"
oauth2:
  external_address: "https://id.example.com/"
"#;

    #[test]
    fn defaults_apply() {
        let config = parse(MINIMAL);
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.oauth2.code_lifetime, 600);
        assert_eq!(config.oauth2.access_token_lifetime, 3600);
        assert_eq!(config.oauth2.refresh_token_lifetime, 604800);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn short_secret_is_rejected() {
        let mut config = parse(MINIMAL);
        config.session_secret = "short".into();
        assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn lifetimes_are_checked() {
        let mut config = parse(MINIMAL);
        config.oauth2.code_lifetime = 0;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.oauth2.access_token_lifetime = 0;
        config.oauth2.refresh_token_lifetime = 0;
        assert!(config.validate().is_ok());

        config.oauth2.refresh_token_lifetime = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn lifetimes_are_bounded() {
        let mut config = parse(MINIMAL);
        config.oauth2.refresh_token_lifetime = MAX_LIFETIME_SECS;
        assert!(config.validate().is_ok());

        config.oauth2.refresh_token_lifetime = MAX_LIFETIME_SECS + 1;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.oauth2.access_token_lifetime = i64::MAX;
        assert!(config.validate().is_err());

        let mut config = parse(MINIMAL);
        config.oauth2.code_lifetime = i64::MAX / 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn external_address_must_be_a_url() {
        let mut config = parse(MINIMAL);
        config.oauth2.external_address = "not a url".into();
        assert!(config.validate().is_err());
    }
}
