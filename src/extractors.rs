//! Handler-side extractors.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    response::Response,
};

use crate::error::AuthError;
use crate::manager::LoginManager;
use crate::middleware::AuthSession;

/// Strict extractor: the authenticated user, or the manager's configured
/// not-authenticated/out-of-scope response.
///
/// When [`attach`](crate::attach) or [`require`](crate::require) already
/// ran, the session they left in the request extensions is reused;
/// otherwise the request is authenticated here, with the manager taken
/// from router state.
pub struct AuthUser<U>(pub U);

impl<S, U> FromRequestParts<S> for AuthUser<U>
where
    S: Send + Sync,
    U: Clone + Send + Sync + 'static,
    Arc<LoginManager<U>>: FromRef<S>,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let manager: Arc<LoginManager<U>> = FromRef::from_ref(state);
        if let Some(AuthSession(session)) = parts.extensions.get::<AuthSession<U>>() {
            return match session {
                Some(user) => Ok(AuthUser(user.clone())),
                None => Err(manager.error_response(AuthError::NotAuthenticated)),
            };
        }
        match manager.authenticate(&parts.headers, &[]).await {
            Ok(user) => Ok(AuthUser(user)),
            Err(err) => Err(manager.error_response(err)),
        }
    }
}

/// Lenient extractor: `Some(user)` or `None`, never a rejection.
pub struct OptionalAuthUser<U>(pub Option<U>);

impl<S, U> FromRequestParts<S> for OptionalAuthUser<U>
where
    S: Send + Sync,
    U: Clone + Send + Sync + 'static,
    Arc<LoginManager<U>>: FromRef<S>,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(AuthSession(session)) = parts.extensions.get::<AuthSession<U>>() {
            return Ok(OptionalAuthUser(session.clone()));
        }
        let manager: Arc<LoginManager<U>> = FromRef::from_ref(state);
        Ok(OptionalAuthUser(
            manager.authenticate_optional(&parts.headers, &[]).await,
        ))
    }
}
