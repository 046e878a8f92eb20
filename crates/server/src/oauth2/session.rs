//! Authenticated-session accessor.
//!
//! The console that owns the login flow hands the browser a signed session
//! token. Authorize requests only need to know whose session it is.

use async_trait::async_trait;
use axum::http::{HeaderMap, header};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::{Duration, OffsetDateTime};

pub const SESSION_COOKIE: &str = "session";
pub const SESSION_HEADER: &str = "x-session-token";

#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    /// Subject id of the authenticated user, `None` when unauthenticated.
    async fn current_user(&self, headers: &HeaderMap) -> Option<String>;
}

#[derive(Debug, Serialize, Deserialize)]
struct SessionClaims {
    sub: String,
    exp: usize,
    iat: usize,
}

/// Validates HS256 session tokens signed with the configured session secret.
#[derive(Clone)]
pub struct JwtSessionAuthenticator {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl JwtSessionAuthenticator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Mint a session token for `subject`, valid for `ttl`.
    pub fn issue(
        &self,
        subject: &str,
        ttl: Duration,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = OffsetDateTime::now_utc();
        let claims = SessionClaims {
            sub: subject.to_string(),
            exp: (now + ttl).unix_timestamp().max(0) as usize,
            iat: now.unix_timestamp().max(0) as usize,
        };
        encode(&Header::default(), &claims, &self.encoding)
    }

    fn subject(&self, token: &str) -> Option<String> {
        let mut validation = Validation::default();
        validation.validate_exp = true;
        match decode::<SessionClaims>(token, &self.decoding, &validation) {
            Ok(data) if !data.claims.sub.is_empty() => Some(data.claims.sub),
            Ok(_) => None,
            Err(e) => {
                tracing::debug!(error = %e, "rejected session token");
                None
            }
        }
    }
}

fn session_token(headers: &HeaderMap) -> Option<&str> {
    if let Some(value) = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(value.trim());
    }
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}

#[async_trait]
impl SessionAuthenticator for JwtSessionAuthenticator {
    async fn current_user(&self, headers: &HeaderMap) -> Option<String> {
        session_token(headers).and_then(|token| self.subject(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    const SECRET: &[u8] = b"test-session-secret-that-is-long-enough";

    #[tokio::test]
    async fn reads_cookie_and_header() {
        let auth = JwtSessionAuthenticator::new(SECRET);
        let token = auth.issue("U1", Duration::minutes(5)).unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(&format!("theme=dark; session={token}")).unwrap(),
        );
        assert_eq!(auth.current_user(&headers).await.as_deref(), Some("U1"));

        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_str(&token).unwrap());
        assert_eq!(auth.current_user(&headers).await.as_deref(), Some("U1"));
    }

    #[tokio::test]
    async fn rejects_missing_foreign_and_expired() {
        let auth = JwtSessionAuthenticator::new(SECRET);
        assert_eq!(auth.current_user(&HeaderMap::new()).await, None);

        let foreign = JwtSessionAuthenticator::new(b"some-other-secret-of-enough-length")
            .issue("U1", Duration::minutes(5))
            .unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_str(&foreign).unwrap());
        assert_eq!(auth.current_user(&headers).await, None);

        // Past the default 60s leeway.
        let expired = auth.issue("U1", Duration::minutes(-5)).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert(SESSION_HEADER, HeaderValue::from_str(&expired).unwrap());
        assert_eq!(auth.current_user(&headers).await, None);
    }
}
