//! Security token service
//!
//! Tokens are signed JWTs. The secret comes from configuration; every bus
//! process that may validate a token issued by a peer must share it. A token
//! always carries an expiry: callers that have no natural expiry get a
//! far-future one so validation stays uniform.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Principal;

#[derive(Debug, Error)]
pub enum SecurityTokenError {
    #[error("failed to sign security token: {0}")]
    Issue(#[source] jsonwebtoken::errors::Error),

    #[error("security token rejected: {0}")]
    Invalid(#[source] jsonwebtoken::errors::Error),
}

/// Capability to issue and validate opaque security tokens.
///
/// `issue` captures a principal into a token that expires no later than
/// `expires`; `validate` reconstitutes the principal. Consumers treat the
/// token as an opaque string.
pub trait SecurityTokenService: Send + Sync {
    fn issue(
        &self,
        principal: &Principal,
        expires: Option<DateTime<Utc>>,
    ) -> Result<String, SecurityTokenError>;

    fn validate(&self, token: &str) -> Result<Principal, SecurityTokenError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    #[serde(default)]
    roles: Vec<String>,
    exp: i64,
}

/// HS256 JWT implementation of `SecurityTokenService`.
pub struct JwtSecurityTokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtSecurityTokenService {
    /// Tokens issued without an explicit expiry last this long.
    const DEFAULT_LIFETIME_DAYS: i64 = 3650;

    pub fn new(secret: &str) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
        }
    }
}

impl SecurityTokenService for JwtSecurityTokenService {
    fn issue(
        &self,
        principal: &Principal,
        expires: Option<DateTime<Utc>>,
    ) -> Result<String, SecurityTokenError> {
        let exp = expires
            .unwrap_or_else(|| Utc::now() + Duration::days(Self::DEFAULT_LIFETIME_DAYS))
            .timestamp();
        let claims = Claims {
            sub: principal.name.clone(),
            roles: principal.roles.clone(),
            exp,
        };
        encode(&Header::default(), &claims, &self.encoding_key).map_err(SecurityTokenError::Issue)
    }

    fn validate(&self, token: &str) -> Result<Principal, SecurityTokenError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(SecurityTokenError::Invalid)?;
        Ok(Principal {
            name: data.claims.sub,
            roles: data.claims.roles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_and_validate_round_trip() {
        let service = JwtSecurityTokenService::new("test-secret");
        let principal = Principal::with_roles("alice", vec!["sender".to_string()]);

        let token = service.issue(&principal, None).unwrap();
        let validated = service.validate(&token).unwrap();
        assert_eq!(validated, principal);
    }

    #[test]
    fn validate_rejects_wrong_secret() {
        let issuer = JwtSecurityTokenService::new("secret-a");
        let verifier = JwtSecurityTokenService::new("secret-b");
        let token = issuer.issue(&Principal::new("alice"), None).unwrap();
        assert!(verifier.validate(&token).is_err());
    }

    #[test]
    fn validate_rejects_expired_token() {
        let service = JwtSecurityTokenService::new("test-secret");
        let expired = Utc::now() - Duration::hours(1);
        let token = service
            .issue(&Principal::new("alice"), Some(expired))
            .unwrap();
        assert!(service.validate(&token).is_err());
    }

    #[test]
    fn validate_rejects_garbage() {
        let service = JwtSecurityTokenService::new("test-secret");
        assert!(service.validate("not-a-token").is_err());
    }
}
