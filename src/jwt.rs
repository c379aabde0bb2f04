//! Token codec: claims mapping → signed JWT and back, keyed by a [`Secret`].

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Header, Validation};
use serde_json::{Map, Value};
use tracing::warn;

use crate::claims::TokenClaims;
use crate::error::AuthError;
use crate::secret::Secret;

pub(crate) struct JwtCodec {
    secret: Secret,
    validation: Validation,
}

impl JwtCodec {
    pub(crate) fn new(secret: Secret) -> Self {
        let mut validation = Validation::new(secret.algorithm());
        // `exp` stays required (the default); expiry is checked with no
        // leeway so an elapsed token is rejected immediately.
        validation.leeway = 0;
        // Caller data may carry an `aud` member this codec knows nothing
        // about; audience checking is the caller's business.
        validation.validate_aud = false;
        Self { secret, validation }
    }

    /// Sign a copy of `data` with a computed `exp` (and optional
    /// deduplicated `scopes`).
    pub(crate) fn encode(
        &self,
        data: &Map<String, Value>,
        expires: Duration,
        scopes: Option<&[&str]>,
    ) -> Result<String, AuthError> {
        let mut to_encode = data.clone();

        let exp = Utc::now().timestamp() + expires.as_secs() as i64;
        to_encode.insert("exp".to_string(), Value::from(exp));

        if let Some(scopes) = scopes {
            let unique: BTreeSet<&str> = scopes.iter().copied().collect();
            to_encode.insert(
                "scopes".to_string(),
                Value::from(unique.into_iter().collect::<Vec<_>>()),
            );
        }

        let header = Header::new(self.secret.algorithm());
        jsonwebtoken::encode(&header, &to_encode, self.secret.key_for_signing()).map_err(|e| {
            warn!(error = %e, "failed to sign access token");
            AuthError::Internal
        })
    }

    /// Verify signature and expiry, returning the claims.
    ///
    /// Malformed structure, signature mismatch and elapsed expiry all
    /// collapse into `NotAuthenticated`; the cause is only logged.
    pub(crate) fn decode(&self, token: &str) -> Result<TokenClaims, AuthError> {
        jsonwebtoken::decode::<TokenClaims>(
            token,
            self.secret.key_for_verification(),
            &self.validation,
        )
        .map(|data| data.claims)
        .map_err(|e| {
            warn!(error = %e, "access token verification failed");
            AuthError::NotAuthenticated
        })
    }
}
