//! services/api/src/web/middleware.rs
//!
//! Authentication middleware for protecting routes.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Duration;
use std::sync::Arc;
use tracing::{error, warn};
use trustpaws_core::account;

use crate::web::state::AppState;

pub const SESSION_COOKIE: &str = "session";

/// The raw session token of an authenticated request.
#[derive(Clone, Debug)]
pub struct AccessToken(pub String);

/// Reads the session token from the `Cookie` header, if any.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|c| {
            let (name, value) = c.trim().split_once('=')?;
            (name == SESSION_COOKIE && !value.is_empty()).then(|| value.to_string())
        })
}

pub fn session_cookie(token: &str, ttl: Duration) -> String {
    format!(
        "{}={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        SESSION_COOKIE,
        token,
        ttl.num_seconds()
    )
}

pub fn cleared_session_cookie() -> String {
    format!(
        "{}=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0",
        SESSION_COOKIE
    )
}

/// Middleware that validates the session cookie against the identity provider.
///
/// If valid, makes sure the user has a profile row, then inserts the
/// `SessionUser` and its `AccessToken` into request extensions for handlers to
/// use. If invalid or missing, returns 401 Unauthorized.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = session_token(req.headers()).ok_or(StatusCode::UNAUTHORIZED)?;

    let user = state
        .identity
        .get_session(&token)
        .await
        .map_err(|e| {
            error!("Failed to validate session: {:?}", e);
            StatusCode::UNAUTHORIZED
        })?
        .ok_or(StatusCode::UNAUTHORIZED)?;

    if let Err(e) = account::ensure_profile(state.db.as_ref(), &user).await {
        warn!("Could not create profile for {}: {}", user.user_id, e);
    }

    req.extensions_mut().insert(user);
    req.extensions_mut().insert(AccessToken(token));

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_the_session_cookie_among_others() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; session=abc123; lang=pt"),
        );
        assert_eq!(session_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn missing_or_empty_cookie_is_none() {
        let mut headers = HeaderMap::new();
        assert_eq!(session_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("session="));
        assert_eq!(session_token(&headers), None);
        headers.insert(header::COOKIE, HeaderValue::from_static("mysession=x"));
        assert_eq!(session_token(&headers), None);
    }

    #[test]
    fn cookie_carries_the_ttl() {
        assert_eq!(
            session_cookie("abc", Duration::days(1)),
            "session=abc; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=86400"
        );
    }
}
