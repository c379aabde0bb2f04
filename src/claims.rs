//! Decoded access-token claims.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Claims carried by an access token.
///
/// `sub`, `exp` and `scopes` are the members the manager interprets;
/// everything else the caller put into the token is preserved in `extra`.
///
/// NOTE:
/// - `exp` is always present on tokens the codec creates; a foreign token
///   without it fails verification before this type is ever built.
/// - `sub` may be absent. That is not a decode error, authentication simply
///   fails later when the subject is needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject identifier (application user id, e.g. an email).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// Expiry, seconds since epoch.
    pub exp: i64,

    /// Scopes granted at token creation, deduplicated. Absent when the
    /// token was created without scopes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,

    /// Any further claims the caller stored in the token.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TokenClaims {
    /// Scopes granted to this token; empty when the claim is absent.
    pub fn granted_scopes(&self) -> &[String] {
        self.scopes.as_deref().unwrap_or_default()
    }

    /// True iff every required scope was granted.
    ///
    /// Compared as true sets, so duplicate entries on either side cannot
    /// change the outcome. Scopes are optional per RFC 6749: an empty
    /// `required` always passes.
    pub fn satisfies_scopes(&self, required: &[&str]) -> bool {
        if required.is_empty() {
            return true;
        }
        let granted: HashSet<&str> = self.granted_scopes().iter().map(String::as_str).collect();
        required.iter().all(|scope| granted.contains(scope))
    }
}
