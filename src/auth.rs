//! Bearer-token validation for stream attachment.
//!
//! The relay does not issue credentials; it only checks them. A client may
//! attach to a stream with a `?token=` query parameter, which is validated
//! here before the channel is bound. Token issuance lives in an external
//! service sharing the HS256 secret.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;

use crate::{AppError, Result};

/// Claims the validator reads from an attach token.
#[derive(Debug, Deserialize)]
struct Claims {
    /// Subject: numeric user id as text.
    sub: String,
    /// Expiry, seconds since the epoch. Checked by `jsonwebtoken`.
    #[allow(dead_code)]
    exp: usize,
}

/// HS256 bearer-token validator.
///
/// Holds the decoding key for the configured signing secret. An empty secret
/// means validation always fails, so a deployment without credentials rejects
/// any attach that presents a token.
pub struct TokenValidator {
    key: Option<DecodingKey>,
    validation: Validation,
}

impl TokenValidator {
    /// Build a validator from the shared HS256 secret.
    #[must_use]
    pub fn new(secret: &str) -> Self {
        let key = if secret.is_empty() {
            None
        } else {
            Some(DecodingKey::from_secret(secret.as_bytes()))
        };
        Self {
            key,
            validation: Validation::new(Algorithm::HS256),
        }
    }

    /// Validate a bearer token and extract the user id it was issued to.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Auth` if no secret is configured, the signature or
    /// expiry check fails, or the subject claim is not a numeric user id.
    pub fn validate(&self, token: &str) -> Result<i64> {
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| AppError::Auth("no signing secret configured".into()))?;
        let data = decode::<Claims>(token, key, &self.validation)
            .map_err(|err| AppError::Auth(err.to_string()))?;
        data.claims
            .sub
            .parse::<i64>()
            .map_err(|_| AppError::Auth("subject claim is not a user id".into()))
    }
}
