//! Client secret hashing and random token generation.
//!
//! Client secrets are stored as Argon2id PHC strings. Codes, refresh tokens
//! and root keys are 256 bits from the OS random source.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use base64::Engine;

/// Number of random bytes behind every generated token.
pub const TOKEN_BYTES: usize = 32;

/// Hash a client secret using Argon2id.
pub fn hash_secret(secret: &str) -> Result<String, argon2::password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(secret.as_bytes(), &salt)?;
    Ok(hash.to_string())
}

/// Verify a presented client secret against its stored hash.
pub fn verify_secret(secret: &str, hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        return false;
    };
    Argon2::default()
        .verify_password(secret.as_bytes(), &parsed_hash)
        .is_ok()
}

/// Fill a fresh buffer from the OS random source.
pub fn random_bytes() -> Result<[u8; TOKEN_BYTES], getrandom::Error> {
    let mut bytes = [0u8; TOKEN_BYTES];
    getrandom::fill(&mut bytes)?;
    Ok(bytes)
}

/// Generate an opaque URL-safe token.
pub fn generate_token() -> Result<String, getrandom::Error> {
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(random_bytes()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_secret() {
        let secret = "client-secret-123!";
        let hash = hash_secret(secret).expect("Failed to hash secret");

        assert!(hash.starts_with("$argon2"));
        assert!(verify_secret(secret, &hash));
        assert!(!verify_secret("wrong-secret", &hash));
    }

    #[test]
    fn test_hash_produces_different_salts() {
        let hash1 = hash_secret("same").expect("Failed to hash");
        let hash2 = hash_secret("same").expect("Failed to hash");
        assert_ne!(hash1, hash2);
        assert!(verify_secret("same", &hash1));
        assert!(verify_secret("same", &hash2));
    }

    #[test]
    fn test_verify_invalid_hash_format() {
        assert!(!verify_secret("secret", "not-a-valid-hash"));
        assert!(!verify_secret("secret", ""));
        assert!(!verify_secret("secret", "$invalid$hash$format"));
    }

    #[test]
    fn test_generate_token() {
        let token1 = generate_token().unwrap();
        let token2 = generate_token().unwrap();

        assert_ne!(token1, token2);
        assert!(
            token1
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        // 32 bytes base64 encoded without padding
        assert_eq!(token1.len(), 43);
    }
}
