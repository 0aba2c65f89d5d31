//! Signed session tokens (HS256 JWT).
//!
//! A token proves who issued it, not that the session is still open: callers
//! must also consult the session store before trusting one.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::db::{RoleAssignment, User};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub roles: Vec<RoleAssignment>,
    pub iat: i64,
    pub exp: i64,
    /// Unique per token so two logins in the same second never collide
    pub jti: String,
}

/// Signing and verification keys derived from one shared secret.
#[derive(Clone)]
pub struct TokenKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: chrono::Duration,
}

impl std::fmt::Debug for TokenKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenKeys").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenKeys {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl: chrono::Duration::hours(ttl_hours.max(1)),
        }
    }

    /// Mint a token carrying the user's identity and roles.
    pub fn mint(&self, user: &User) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now();
        let claims = Claims {
            id: user.id,
            name: user.name.clone(),
            email: user.email.clone(),
            roles: user.roles.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
    }

    /// Check the signature and expiry and return the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
        decode::<Claims>(token, &self.decoding, &self.validation).map(|data| data.claims)
    }
}

/// The signature segment of a `header.payload.signature` token, or an empty
/// string if the token does not have exactly three segments.
///
/// For diagnostics only.
pub fn token_signature(token: &str) -> &str {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() == 3 {
        parts[2]
    } else {
        ""
    }
}

/// Short, non-secret tag for correlating a token across log lines.
pub fn token_fingerprint(token: &str) -> String {
    token_signature(token).chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;

    fn user() -> User {
        User {
            id: 42,
            name: "A".to_string(),
            email: "a@x.com".to_string(),
            roles: vec![RoleAssignment::diner()],
        }
    }

    #[test]
    fn test_mint_and_verify() {
        let keys = TokenKeys::new("secret", 1);
        let token = keys.mint(&user()).unwrap();

        let pattern = Regex::new(r"^[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+$").unwrap();
        assert!(pattern.is_match(&token));

        let claims = keys.verify(&token).unwrap();
        assert_eq!(claims.id, 42);
        assert_eq!(claims.roles, vec![RoleAssignment::diner()]);
    }

    #[test]
    fn test_tokens_are_unique() {
        let keys = TokenKeys::new("secret", 1);
        assert_ne!(keys.mint(&user()).unwrap(), keys.mint(&user()).unwrap());
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let token = TokenKeys::new("secret", 1).mint(&user()).unwrap();
        assert!(TokenKeys::new("other", 1).verify(&token).is_err());
        assert!(TokenKeys::new("secret", 1).verify("garbage").is_err());
    }

    #[test]
    fn test_token_signature() {
        assert_eq!(token_signature("a.b.c"), "c");
        assert_eq!(token_signature("a.b"), "");
        assert_eq!(token_signature("a.b.c.d"), "");
        assert_eq!(token_signature(""), "");
        assert_eq!(token_fingerprint("h.p.0123456789"), "01234567");
    }
}
