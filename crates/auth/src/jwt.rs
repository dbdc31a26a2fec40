//! Bearer token verification.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use thiserror::Error;

use crate::claims::{JwtClaims, TokenValidationError, validate_claims};

#[derive(Debug, Error)]
pub enum JwtError {
    #[error("malformed or wrongly signed token: {0}")]
    Decode(#[from] jsonwebtoken::errors::Error),

    #[error(transparent)]
    Claims(#[from] TokenValidationError),
}

/// Verifies a raw bearer token and returns its claims.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError>;
}

/// HS256 shared-secret validator.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // The time window is checked against the caller's clock in `validate_claims`.
        validation.validate_exp = false;
        validation.required_spec_claims = HashSet::new();
        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<JwtClaims, JwtError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tradeflow_core::{TenantId, UserId};

    use crate::Role;

    fn mint(secret: &str, claims: &JwtClaims) -> String {
        encode(&Header::new(Algorithm::HS256), claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    fn claims(now: DateTime<Utc>) -> JwtClaims {
        JwtClaims::new(UserId::new(), TenantId::new(), vec![Role::new("purchaser")], now, Duration::minutes(10))
    }

    #[test]
    fn round_trips_a_valid_token() {
        let now = Utc::now();
        let c = claims(now);
        let validator = Hs256JwtValidator::new("secret");
        let decoded = validator.validate(&mint("secret", &c), now).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn rejects_wrong_secret() {
        let now = Utc::now();
        let validator = Hs256JwtValidator::new("secret");
        let err = validator.validate(&mint("other", &claims(now)), now).unwrap_err();
        assert!(matches!(err, JwtError::Decode(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let now = Utc::now();
        let validator = Hs256JwtValidator::new("secret");
        let token = mint("secret", &claims(now));
        let err = validator.validate(&token, now + Duration::minutes(11)).unwrap_err();
        assert!(matches!(err, JwtError::Claims(TokenValidationError::Expired)));
    }

    #[test]
    fn rejects_garbage() {
        let validator = Hs256JwtValidator::new("secret");
        assert!(validator.validate("not-a-token", Utc::now()).is_err());
    }
}
