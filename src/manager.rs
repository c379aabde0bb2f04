//! The login manager: configuration plus the end-to-end "authenticate this
//! request" operation.
//!
//! The flow is a fixed pipeline: extract a token from the request headers,
//! decode and verify it, check required scopes, resolve the `sub` claim to
//! a user via the registered loader. Any step failing exits the pipeline
//! with the matching [`AuthError`] category; `authenticate_optional`
//! absorbs every failure into `None` instead.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use axum::http::{
    HeaderMap, HeaderValue,
    header::{InvalidHeaderValue, SET_COOKIE},
};
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value};
use tracing::warn;

use crate::claims::TokenClaims;
use crate::error::AuthError;
use crate::extract;
use crate::jwt::JwtCodec;
use crate::loader::{BlockingLoader, FnLoader, UserLoader};
use crate::secret::Secret;

/// Cookie the token is stored under unless configured otherwise.
pub const DEFAULT_COOKIE_NAME: &str = "access-token";

/// Token lifetime applied when a call does not request one.
pub const DEFAULT_EXPIRY: Duration = Duration::from_secs(15 * 60);

type ErrorResponder = Arc<dyn Fn() -> Response + Send + Sync>;

/// Authenticates requests and issues the tokens it later accepts.
///
/// Built once at application startup (see [`LoginManager::builder`]),
/// wrapped in an [`Arc`] and handed to the router as state; configuration
/// is read-only afterwards. The user loader is the only late-bound piece:
/// register it with [`user_loader_fn`](Self::user_loader_fn) (or one of its
/// siblings) before the first request arrives.
pub struct LoginManager<U> {
    codec: JwtCodec,
    token_url: String,
    use_cookie: bool,
    use_header: bool,
    cookie_name: String,
    default_expiry: Duration,
    scopes: HashMap<String, String>,
    not_authenticated: Option<ErrorResponder>,
    out_of_scope: Option<ErrorResponder>,
    user_loader: RwLock<Option<Arc<dyn UserLoader<U>>>>,
}

/// Builder for [`LoginManager`]. `secret` and `token_url` are mandatory,
/// everything else has the documented default.
pub struct LoginManagerBuilder<U> {
    secret: Secret,
    token_url: String,
    use_cookie: bool,
    use_header: bool,
    cookie_name: String,
    default_expiry: Duration,
    scopes: HashMap<String, String>,
    not_authenticated: Option<ErrorResponder>,
    out_of_scope: Option<ErrorResponder>,
    _user: PhantomData<fn() -> U>,
}

impl<U> LoginManagerBuilder<U> {
    /// Check the named cookie for the token. Off by default.
    pub fn use_cookie(mut self, enabled: bool) -> Self {
        self.use_cookie = enabled;
        self
    }

    /// Check the `Authorization` header for the token. On by default.
    pub fn use_header(mut self, enabled: bool) -> Self {
        self.use_header = enabled;
        self
    }

    /// Name of the token cookie (default [`DEFAULT_COOKIE_NAME`]).
    pub fn cookie_name(mut self, name: impl Into<String>) -> Self {
        self.cookie_name = name.into();
        self
    }

    /// Lifetime applied to tokens created without an explicit expiry
    /// (default [`DEFAULT_EXPIRY`]).
    pub fn default_expiry(mut self, expiry: Duration) -> Self {
        self.default_expiry = expiry;
        self
    }

    /// Scope name → description map. Purely descriptive (OpenAPI metadata);
    /// enforcement only ever uses the scope names a route requires.
    pub fn scopes<I, K, V>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.scopes = scopes
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        self
    }

    /// Replace the default 401 response sent for not-authenticated
    /// failures (e.g. with a redirect to a login page).
    pub fn not_authenticated_response<F>(mut self, responder: F) -> Self
    where
        F: Fn() -> Response + Send + Sync + 'static,
    {
        self.not_authenticated = Some(Arc::new(responder));
        self
    }

    /// Replace the default 400 response sent for insufficient-scope
    /// failures.
    pub fn out_of_scope_response<F>(mut self, responder: F) -> Self
    where
        F: Fn() -> Response + Send + Sync + 'static,
    {
        self.out_of_scope = Some(Arc::new(responder));
        self
    }

    /// Build the manager.
    ///
    /// # Panics
    ///
    /// Panics when both credential sources have been disabled; a manager
    /// that can never find a token is a programming error.
    pub fn build(self) -> LoginManager<U> {
        assert!(
            self.use_cookie || self.use_header,
            "use_cookie and use_header are both disabled; at least one credential source is required"
        );
        LoginManager {
            codec: JwtCodec::new(self.secret),
            token_url: self.token_url,
            use_cookie: self.use_cookie,
            use_header: self.use_header,
            cookie_name: self.cookie_name,
            default_expiry: self.default_expiry,
            scopes: self.scopes,
            not_authenticated: self.not_authenticated,
            out_of_scope: self.out_of_scope,
            user_loader: RwLock::new(None),
        }
    }
}

impl<U> LoginManager<U> {
    /// Start configuring a manager for the given secret. `token_url` is the
    /// route where clients obtain tokens (advertised in OpenAPI metadata,
    /// not interpreted by the manager).
    pub fn builder(secret: Secret, token_url: impl Into<String>) -> LoginManagerBuilder<U> {
        LoginManagerBuilder {
            secret,
            token_url: token_url.into(),
            use_cookie: false,
            use_header: true,
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
            default_expiry: DEFAULT_EXPIRY,
            scopes: HashMap::new(),
            not_authenticated: None,
            out_of_scope: None,
            _user: PhantomData,
        }
    }

    /// A manager with all defaults: header-only extraction, 15 minute
    /// expiry, default error responses.
    pub fn new(secret: Secret, token_url: impl Into<String>) -> Self {
        Self::builder(secret, token_url).build()
    }

    // --- token creation -------------------------------------------------

    /// Sign a copy of `data` into an access token.
    ///
    /// The expiry (`expires`, or the configured default) is stored under
    /// `exp`; `scopes`, when given, are deduplicated and stored under
    /// `scopes`. `data` is never mutated. Storing the user identifier
    /// under `sub` is what later makes authentication succeed.
    pub fn create_access_token(
        &self,
        data: &Map<String, Value>,
        expires: Option<Duration>,
        scopes: Option<&[&str]>,
    ) -> Result<String, AuthError> {
        self.codec
            .encode(data, expires.unwrap_or(self.default_expiry), scopes)
    }

    // --- decoding / scopes ----------------------------------------------

    /// Decode and verify a token. Malformed, mis-signed and expired tokens
    /// all fail with [`AuthError::NotAuthenticated`].
    pub fn decode_token(&self, token: &str) -> Result<TokenClaims, AuthError> {
        self.codec.decode(token)
    }

    /// Advisory scope check: does `token` carry every scope in `required`?
    /// Decode failures yield `false`, never an error.
    pub fn has_scopes(&self, token: &str, required: &[&str]) -> bool {
        self.codec
            .decode(token)
            .map(|claims| claims.satisfies_scopes(required))
            .unwrap_or(false)
    }

    // --- extraction -----------------------------------------------------

    /// Locate the bearer token in the request headers, honoring the
    /// configured sources (cookie strictly before header).
    pub fn token_from_request(&self, headers: &HeaderMap) -> Option<String> {
        extract::extract_token(headers, self.use_cookie, self.use_header, &self.cookie_name)
    }

    // --- user loader ----------------------------------------------------

    /// Register the callback resolving a subject identifier to a user.
    /// Registering again replaces the previous callback.
    pub fn user_loader(&self, loader: impl UserLoader<U> + 'static) {
        *self
            .user_loader
            .write()
            .expect("user loader lock poisoned") = Some(Arc::new(loader));
    }

    /// Register an asynchronous closure as the user loader.
    ///
    /// Anything else the lookup needs is captured by the closure:
    ///
    /// ```ignore
    /// let pool = pool.clone();
    /// manager.user_loader_fn(move |email: String| {
    ///     let pool = pool.clone();
    ///     async move { fetch_user(&pool, &email).await }
    /// });
    /// ```
    pub fn user_loader_fn<F, Fut>(&self, f: F)
    where
        U: Send + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<U>> + Send + 'static,
    {
        self.user_loader(FnLoader::new(f));
    }

    /// Register a synchronous closure as the user loader. The closure runs
    /// on the blocking pool so it cannot stall concurrent requests.
    pub fn blocking_user_loader<F>(&self, f: F)
    where
        U: Send + 'static,
        F: Fn(String) -> Option<U> + Clone + Send + Sync + 'static,
    {
        self.user_loader(BlockingLoader::new(f));
    }

    /// # Panics
    ///
    /// Panics when no loader was registered; authenticating without one is
    /// a programming error, not an authentication failure.
    async fn load_user(&self, identifier: &str) -> Option<U> {
        let loader = self
            .user_loader
            .read()
            .expect("user loader lock poisoned")
            .clone();
        let Some(loader) = loader else {
            panic!("no user loader registered; call user_loader_fn() during startup");
        };
        loader.load_user(identifier).await
    }

    // --- orchestration --------------------------------------------------

    /// Authenticate a request: extract, decode, check scopes, resolve the
    /// subject. Returns the user, or the failure category.
    pub async fn authenticate(
        &self,
        headers: &HeaderMap,
        required_scopes: &[&str],
    ) -> Result<U, AuthError> {
        let token = self
            .token_from_request(headers)
            .ok_or(AuthError::NotAuthenticated)?;
        let claims = self.codec.decode(&token)?;

        if !claims.satisfies_scopes(required_scopes) {
            return Err(AuthError::InsufficientScope);
        }

        let Some(identifier) = claims.sub.as_deref() else {
            warn!("access token carries no 'sub' claim");
            return Err(AuthError::NotAuthenticated);
        };
        match self.load_user(identifier).await {
            Some(user) => Ok(user),
            None => {
                warn!(identifier, "user loader found no user for subject");
                Err(AuthError::NotAuthenticated)
            }
        }
    }

    /// Like [`authenticate`](Self::authenticate), but absorbs every
    /// failure into `None`.
    pub async fn authenticate_optional(
        &self,
        headers: &HeaderMap,
        required_scopes: &[&str],
    ) -> Option<U> {
        self.authenticate(headers, required_scopes).await.ok()
    }

    // --- error translation boundary -------------------------------------

    /// Translate a failure into the response configured for its category
    /// (or the default response when none was configured).
    pub fn error_response(&self, error: AuthError) -> Response {
        let responder = match error {
            AuthError::NotAuthenticated => self.not_authenticated.as_ref(),
            AuthError::InsufficientScope => self.out_of_scope.as_ref(),
            AuthError::Internal => None,
        };
        match responder {
            Some(responder) => responder(),
            None => error.into_response(),
        }
    }

    // --- cookie ---------------------------------------------------------

    /// `Set-Cookie` value storing `token` under the configured cookie name
    /// (`Path=/; HttpOnly; SameSite=Lax`; no `Secure`/`Max-Age` — add a
    /// custom header when those are needed).
    pub fn access_cookie(&self, token: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::from_str(&format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            self.cookie_name, token
        ))
    }

    /// Append the token cookie to response headers.
    pub fn set_cookie(
        &self,
        headers: &mut HeaderMap,
        token: &str,
    ) -> Result<(), InvalidHeaderValue> {
        headers.append(SET_COOKIE, self.access_cookie(token)?);
        Ok(())
    }

    // --- accessors ------------------------------------------------------

    /// Route where clients obtain tokens.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Configured token cookie name.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Expiry applied when token creation does not request one.
    pub fn default_expiry(&self) -> Duration {
        self.default_expiry
    }

    /// Descriptive scope map handed to the builder.
    pub fn scopes(&self) -> &HashMap<String, String> {
        &self.scopes
    }
}

impl<U> fmt::Debug for LoginManager<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print key material
        f.debug_struct("LoginManager")
            .field("token_url", &self.token_url)
            .field("use_cookie", &self.use_cookie)
            .field("use_header", &self.use_header)
            .field("cookie_name", &self.cookie_name)
            .field("default_expiry", &self.default_expiry)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
    use chrono::Utc;
    use serde_json::json;

    #[derive(Debug, Clone, PartialEq)]
    struct TestUser {
        name: &'static str,
    }

    fn data(sub: &str) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("sub".to_string(), json!(sub));
        data
    }

    fn register_test_loader(manager: &LoginManager<TestUser>) {
        manager.user_loader_fn(|identifier: String| async move {
            (identifier == "a@b.com").then_some(TestUser { name: "A" })
        });
    }

    fn manager(secret: &str) -> LoginManager<TestUser> {
        let manager = LoginManager::new(Secret::symmetric(secret), "/auth/token");
        register_test_loader(&manager);
        manager
    }

    fn bearer(token: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}")).unwrap(),
        );
        headers
    }

    #[test]
    fn round_trip_preserves_claims_and_adds_exp() {
        let manager = manager("s3cr3t");
        let mut payload = data("a@b.com");
        payload.insert("role".to_string(), json!("admin"));

        let token = manager
            .create_access_token(&payload, Some(Duration::from_secs(900)), None)
            .unwrap();
        let claims = manager.decode_token(&token).unwrap();

        assert_eq!(claims.sub.as_deref(), Some("a@b.com"));
        assert_eq!(claims.extra.get("role"), Some(&json!("admin")));
        assert!(claims.exp > Utc::now().timestamp());
        // Caller data is copied, not mutated.
        assert!(!payload.contains_key("exp"));
    }

    #[test]
    fn expired_token_is_rejected() {
        let manager = manager("s3cr3t");
        let mut claims = data("a@b.com");
        claims.insert("exp".to_string(), json!(Utc::now().timestamp() - 120));
        let token = jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"s3cr3t"),
        )
        .unwrap();

        assert_eq!(
            manager.decode_token(&token).unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[test]
    fn token_signed_with_another_key_is_rejected() {
        let issuing = manager("s3cr3t");
        let verifying = manager("another-secret");
        let token = issuing
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();

        assert!(issuing.decode_token(&token).is_ok());
        assert_eq!(
            verifying.decode_token(&token).unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let manager = manager("s3cr3t");
        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();

        let parts: Vec<&str> = token.split('.').collect();
        let mut payload: Map<String, Value> =
            serde_json::from_slice(&URL_SAFE_NO_PAD.decode(parts[1]).unwrap()).unwrap();
        payload.insert("sub".to_string(), json!("mallory@evil.com"));
        let forged = format!(
            "{}.{}.{}",
            parts[0],
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&payload).unwrap()),
            parts[2]
        );

        assert_eq!(
            manager.decode_token(&forged).unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[test]
    fn scopes_are_deduplicated() {
        let manager = manager("s3cr3t");
        let token = manager
            .create_access_token(&data("a@b.com"), None, Some(&["read", "read", "write"]))
            .unwrap();
        let claims = manager.decode_token(&token).unwrap();
        assert_eq!(
            claims.scopes.as_deref(),
            Some(&["read".to_string(), "write".to_string()][..])
        );
    }

    #[tokio::test]
    async fn authenticates_header_token_and_resolves_user() {
        let manager = manager("s3cr3t");
        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();

        let user = manager.authenticate(&bearer(&token), &[]).await.unwrap();
        assert_eq!(user, TestUser { name: "A" });
    }

    #[tokio::test]
    async fn missing_token_is_not_authenticated() {
        let manager = manager("s3cr3t");
        assert_eq!(
            manager.authenticate(&HeaderMap::new(), &[]).await.unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn missing_sub_claim_is_not_authenticated() {
        let manager = manager("s3cr3t");
        let token = manager.create_access_token(&Map::new(), None, None).unwrap();
        assert_eq!(
            manager.authenticate(&bearer(&token), &[]).await.unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn unresolvable_subject_is_not_authenticated() {
        let manager = manager("s3cr3t");
        let token = manager
            .create_access_token(&data("nobody@b.com"), None, None)
            .unwrap();
        assert_eq!(
            manager.authenticate(&bearer(&token), &[]).await.unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn missing_required_scope_is_a_distinct_failure() {
        let manager = manager("s3cr3t");
        let token = manager
            .create_access_token(&data("a@b.com"), None, Some(&["read"]))
            .unwrap();

        assert_eq!(
            manager
                .authenticate(&bearer(&token), &["write"])
                .await
                .unwrap_err(),
            AuthError::InsufficientScope
        );
        assert!(manager.authenticate(&bearer(&token), &["read"]).await.is_ok());
    }

    #[tokio::test]
    async fn cookie_is_checked_before_header_and_empty_cookie_falls_back() {
        let manager = LoginManager::<TestUser>::builder(Secret::symmetric("s3cr3t"), "/auth/token")
            .use_cookie(true)
            .build();
        register_test_loader(&manager);
        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();

        let mut headers = bearer(&token);
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("access-token="),
        );
        // Empty cookie value counts as no cookie; the header token wins.
        assert!(manager.authenticate(&headers, &[]).await.is_ok());

        let mut headers = bearer(&token);
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("access-token=not-a-jwt"),
        );
        // A present cookie shadows the valid header token.
        assert_eq!(
            manager.authenticate(&headers, &[]).await.unwrap_err(),
            AuthError::NotAuthenticated
        );
    }

    #[tokio::test]
    async fn optional_mode_absorbs_failures() {
        let manager = manager("s3cr3t");
        assert_eq!(manager.authenticate_optional(&HeaderMap::new(), &[]).await, None);

        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();
        assert_eq!(
            manager.authenticate_optional(&bearer(&token), &[]).await,
            Some(TestUser { name: "A" })
        );
    }

    #[test]
    fn has_scopes_is_advisory() {
        let manager = manager("s3cr3t");
        let token = manager
            .create_access_token(&data("a@b.com"), None, Some(&["read"]))
            .unwrap();

        assert!(manager.has_scopes(&token, &["read"]));
        assert!(!manager.has_scopes(&token, &["write"]));
        assert!(!manager.has_scopes("not-a-token", &[]));
    }

    #[tokio::test]
    async fn blocking_loader_resolves_users() {
        let manager = LoginManager::<TestUser>::new(Secret::symmetric("s3cr3t"), "/auth/token");
        manager.blocking_user_loader(|identifier: String| {
            (identifier == "a@b.com").then_some(TestUser { name: "A" })
        });
        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();
        assert!(manager.authenticate(&bearer(&token), &[]).await.is_ok());
    }

    #[tokio::test]
    #[should_panic(expected = "no user loader registered")]
    async fn authenticating_without_a_loader_panics() {
        let manager = LoginManager::<TestUser>::new(Secret::symmetric("s3cr3t"), "/auth/token");
        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();
        let _ = manager.authenticate(&bearer(&token), &[]).await;
    }

    #[test]
    #[should_panic(expected = "both disabled")]
    fn disabling_both_sources_panics_at_build() {
        let _ = LoginManager::<TestUser>::builder(Secret::symmetric("s3cr3t"), "/auth/token")
            .use_header(false)
            .build();
    }

    #[tokio::test]
    async fn registering_again_replaces_the_loader() {
        let manager = LoginManager::<TestUser>::new(Secret::symmetric("s3cr3t"), "/auth/token");
        register_test_loader(&manager);
        manager.user_loader_fn(|_identifier: String| async move {
            Some(TestUser { name: "replacement" })
        });

        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();
        let user = manager.authenticate(&bearer(&token), &[]).await.unwrap();
        assert_eq!(user, TestUser { name: "replacement" });
    }

    #[test]
    fn set_cookie_appends_the_expected_attributes() {
        let manager = manager("s3cr3t");
        let mut headers = HeaderMap::new();
        manager.set_cookie(&mut headers, "tok").unwrap();
        assert_eq!(
            headers.get(SET_COOKIE).unwrap(),
            "access-token=tok; Path=/; HttpOnly; SameSite=Lax"
        );
    }

    #[tokio::test]
    async fn rs256_round_trip() {
        let key = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 2048).unwrap();
        let pem = rsa::pkcs8::EncodePrivateKey::to_pkcs8_pem(&key, rsa::pkcs8::LineEnding::LF)
            .unwrap();

        let manager = LoginManager::<TestUser>::new(
            Secret::asymmetric(pem.as_bytes()).unwrap(),
            "/auth/token",
        );
        register_test_loader(&manager);

        let token = manager
            .create_access_token(&data("a@b.com"), None, None)
            .unwrap();
        let user = manager.authenticate(&bearer(&token), &[]).await.unwrap();
        assert_eq!(user, TestUser { name: "A" });
    }
}
