/*
 * Responsibility
 * - Library-wide AuthError definition (the user-visible failure categories)
 * - IntoResponse implementation (HTTP status / JSON error body / challenge header)
 */
use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Failures surfaced by [`LoginManager`](crate::LoginManager).
///
/// Every extraction/decode/resolution failure collapses into
/// `NotAuthenticated`; a token that is valid but lacks a required scope is
/// the only `InsufficientScope` case. The finer-grained cause is logged at
/// `warn` where it happens, never surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Missing, malformed, expired or mis-signed token, missing `sub`
    /// claim, or a subject the user loader could not resolve.
    #[error("invalid credentials")]
    NotAuthenticated,

    /// Token decoded and subject resolved, but the granted scopes do not
    /// cover the scopes the route requires.
    #[error("insufficient scope")]
    InsufficientScope,

    /// Token creation failed (signing backend refused the key material).
    #[error("internal server error")]
    Internal,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        // Reference: https://datatracker.ietf.org/doc/html/rfc6749#section-5.2
        let challenge = [(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"))];
        match self {
            AuthError::NotAuthenticated => (
                StatusCode::UNAUTHORIZED,
                challenge,
                Json(json!({ "detail": "Invalid credentials" })),
            )
                .into_response(),
            AuthError::InsufficientScope => (
                StatusCode::BAD_REQUEST,
                challenge,
                Json(json!({ "detail": "Insufficient scope" })),
            )
                .into_response(),
            AuthError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "detail": "internal server error" })),
            )
                .into_response(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_authenticated_maps_to_401_with_challenge() {
        let response = AuthError::NotAuthenticated.into_response();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }

    #[test]
    fn insufficient_scope_maps_to_400() {
        let response = AuthError::InsufficientScope.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(response.headers().get(WWW_AUTHENTICATE).unwrap(), "Bearer");
    }
}
