//! Bearer-token login management for axum applications.
//!
//! A [`LoginManager`] issues signed access tokens (JWT, HS256 or RS256),
//! finds them again on incoming requests (`Authorization` header and/or a
//! cookie), enforces optional scopes and resolves the token subject to an
//! application user through a pluggable loader.
//!
//! ```ignore
//! use std::sync::Arc;
//! use axum::{Router, routing::get, Json};
//! use axum_login_manager::{AuthUser, LoginManager, Secret};
//!
//! let manager = Arc::new(LoginManager::<User>::new(
//!     Secret::symmetric("super-secret"),
//!     "/auth/token",
//! ));
//! manager.user_loader_fn(|email: String| async move { fetch_user(&email).await });
//!
//! async fn me(AuthUser(user): AuthUser<User>) -> Json<User> {
//!     Json(user)
//! }
//!
//! let app = Router::new()
//!     .route("/me", get(me))
//!     .with_state(manager.clone());
//! ```
//!
//! Handlers can also stay decoupled from the manager entirely: wrap a
//! router with [`attach`] (never rejects, leaves an [`AuthSession`] in the
//! request extensions) or [`require_scopes`] (rejects with the configured
//! error response).

mod claims;
mod error;
mod extract;
mod extractors;
mod jwt;
mod loader;
mod manager;
mod middleware;
mod secret;

pub use claims::TokenClaims;
pub use error::AuthError;
pub use extractors::{AuthUser, OptionalAuthUser};
pub use loader::UserLoader;
pub use manager::{DEFAULT_COOKIE_NAME, DEFAULT_EXPIRY, LoginManager, LoginManagerBuilder};
pub use middleware::{AuthSession, attach, require, require_scopes};
pub use secret::{Secret, SecretError};
