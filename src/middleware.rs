//! Router-level integration: request-decorating middleware and route guards.

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
};

use crate::manager::LoginManager;

/// Per-request principal slot filled by [`attach`] / [`require_scopes`].
///
/// `Some(user)` after successful authentication, `None` when [`attach`]
/// could not authenticate the request.
#[derive(Clone, Debug)]
pub struct AuthSession<U>(pub Option<U>);

/// Run authentication for every request without ever rejecting one.
///
/// Downstream handlers find [`AuthSession`] in the request extensions and
/// decide for themselves how to treat an absent user:
///
/// ```ignore
/// let app = attach(app, manager.clone());
///
/// async fn profile(Extension(AuthSession(user)): Extension<AuthSession<User>>) { ... }
/// ```
pub fn attach<U, S>(router: Router<S>, manager: Arc<LoginManager<U>>) -> Router<S>
where
    U: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(manager, set_user::<U>))
}

async fn set_user<U>(
    State(manager): State<Arc<LoginManager<U>>>,
    mut req: Request<Body>,
    next: Next,
) -> Response
where
    U: Clone + Send + Sync + 'static,
{
    // Runs for every request, so a failure must not abort it here.
    let user = manager.authenticate_optional(req.headers(), &[]).await;
    req.extensions_mut().insert(AuthSession(user));
    next.run(req).await
}

/// Protect a router: unauthenticated requests receive the configured
/// error response, authenticated ones proceed with
/// `AuthSession(Some(user))` inserted for downstream extractors.
pub fn require<U, S>(router: Router<S>, manager: Arc<LoginManager<U>>) -> Router<S>
where
    U: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    require_scopes(router, manager, &[])
}

/// Like [`require`], additionally demanding that the token carries every
/// scope in `scopes`.
pub fn require_scopes<U, S>(
    router: Router<S>,
    manager: Arc<LoginManager<U>>,
    scopes: &'static [&'static str],
) -> Router<S>
where
    U: Clone + Send + Sync + 'static,
    S: Clone + Send + Sync + 'static,
{
    router.layer(middleware::from_fn_with_state(
        (manager, scopes),
        guard::<U>,
    ))
}

async fn guard<U>(
    State((manager, scopes)): State<(Arc<LoginManager<U>>, &'static [&'static str])>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, Response>
where
    U: Clone + Send + Sync + 'static,
{
    match manager.authenticate(req.headers(), scopes).await {
        Ok(user) => {
            // middleware → extractor への受け渡し
            req.extensions_mut().insert(AuthSession(Some(user)));
            Ok(next.run(req).await)
        }
        Err(err) => Err(manager.error_response(err)),
    }
}
