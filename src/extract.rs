//! Credential extraction: locate a bearer token in request headers.
//!
//! Lookup order is fixed: the cookie is checked first (when enabled), the
//! `Authorization` header only on cookie miss. An empty cookie value counts
//! as no cookie.

use axum::http::{
    HeaderMap,
    header::{AUTHORIZATION, COOKIE},
};

/// Locate a token according to the configured sources. `None` means no
/// credential was presented; the caller decides whether that is fatal.
pub(crate) fn extract_token(
    headers: &HeaderMap,
    use_cookie: bool,
    use_header: bool,
    cookie_name: &str,
) -> Option<String> {
    let mut token = None;
    if use_cookie {
        token = token_from_cookie(headers, cookie_name);
    }
    if token.is_none() && use_header {
        token = token_from_header(headers);
    }
    token
}

fn token_from_cookie(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    let value = headers.get(COOKIE)?.to_str().ok()?;
    for pair in value.split(';') {
        let mut parts = pair.trim().splitn(2, '=');
        let key = parts.next()?.trim();
        let Some(val) = parts.next() else {
            continue;
        };
        let val = val.trim();
        if key == cookie_name && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn token_from_header(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
