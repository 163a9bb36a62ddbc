//! Token decoding and signature verification.

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};

use crate::{AuthenticatedUser, JwtClaims, TokenValidationError, validate_claims};

/// Turns a raw bearer token into an authenticated user.
pub trait JwtValidator: Send + Sync {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AuthenticatedUser, TokenValidationError>;
}

/// HS256 shared-secret validator.
///
/// The claim time window is checked by [`validate_claims`] against the caller's
/// clock, so `jsonwebtoken`'s own `exp` handling is switched off.
pub struct Hs256JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl Hs256JwtValidator {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.required_spec_claims.clear();
        validation.validate_exp = false;
        validation.validate_nbf = false;

        Self {
            key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }
}

impl std::fmt::Debug for Hs256JwtValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hs256JwtValidator").finish_non_exhaustive()
    }
}

impl JwtValidator for Hs256JwtValidator {
    fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<AuthenticatedUser, TokenValidationError> {
        let data = decode::<JwtClaims>(token, &self.key, &self.validation).map_err(|e| match e.kind() {
            ErrorKind::InvalidSignature => TokenValidationError::BadSignature,
            other => TokenValidationError::Malformed(format!("{other:?}")),
        })?;

        validate_claims(&data.claims, now)?;
        tracing::trace!(user_id = %data.claims.sub, "token validated");
        Ok(AuthenticatedUser::from(&data.claims))
    }
}
