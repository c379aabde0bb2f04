//! User resolution: the pluggable identifier → user callback.

use std::future::Future;

use async_trait::async_trait;
use tokio::task;

/// Resolves a token subject to an application user.
///
/// Implementations may suspend (database lookups, remote calls). Return
/// `None` for "no such user"; the manager turns that into a
/// not-authenticated failure.
///
/// Fixed arguments the callback needs (a connection pool, a table name) are
/// captured by the closure or carried as fields of the implementing type.
#[async_trait]
pub trait UserLoader<U>: Send + Sync {
    async fn load_user(&self, identifier: &str) -> Option<U>;
}

/// Adapter for asynchronous closures, see
/// [`LoginManager::user_loader_fn`](crate::LoginManager::user_loader_fn).
pub(crate) struct FnLoader<F> {
    f: F,
}

impl<F> FnLoader<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<U, F, Fut> UserLoader<U> for FnLoader<F>
where
    U: Send + 'static,
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = Option<U>> + Send,
{
    async fn load_user(&self, identifier: &str) -> Option<U> {
        (self.f)(identifier.to_string()).await
    }
}

/// Adapter for synchronous closures, see
/// [`LoginManager::blocking_user_loader`](crate::LoginManager::blocking_user_loader).
///
/// The callback runs on the blocking pool so a synchronous lookup cannot
/// stall the scheduler driving other requests.
pub(crate) struct BlockingLoader<F> {
    f: F,
}

impl<F> BlockingLoader<F> {
    pub(crate) fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<U, F> UserLoader<U> for BlockingLoader<F>
where
    U: Send + 'static,
    F: Fn(String) -> Option<U> + Clone + Send + Sync + 'static,
{
    async fn load_user(&self, identifier: &str) -> Option<U> {
        let f = self.f.clone();
        let identifier = identifier.to_string();
        match task::spawn_blocking(move || f(identifier)).await {
            Ok(user) => user,
            // A panic inside the callback belongs to the caller.
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            // Runtime shutdown; the request is being torn down anyway.
            Err(_) => None,
        }
    }
}
