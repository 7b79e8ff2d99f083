//! services/api/src/web/auth.rs
//!
//! Authentication endpoints: password login, magic links, logout and password change.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use trustpaws_core::account::{self, PasswordChange};
use trustpaws_core::domain::{AuthSession, Route, SessionUser};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::error::{account_error, HandlerError};
use crate::web::middleware::{cleared_session_cookie, session_cookie, session_token};
use crate::web::state::AppState;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct MagicLinkRequest {
    pub email: String,
}

#[derive(Deserialize, IntoParams)]
pub struct CallbackParams {
    /// The one-time token from the emailed link.
    pub token: String,
}

#[derive(Deserialize, ToSchema)]
pub struct ChangePasswordRequest {
    /// When given, it is checked before the password is replaced.
    pub current_password: Option<String>,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub email: String,
    /// Where the browser should go next.
    pub redirect_to: String,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct RedirectResponse {
    pub redirect_to: String,
}

fn cookie_for(state: &AppState, session: &AuthSession) -> String {
    session_cookie(
        &session.access_token,
        Duration::days(state.config.session_ttl_days),
    )
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /auth/login - Sign in with email and password
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Missing or malformed email or password"),
        (status = 401, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let (session, next) = account::sign_in(state.identity.as_ref(), &req.email, &req.password)
        .await
        .map_err(|e| account_error("Failed to sign in", e))?;

    let cookie = cookie_for(&state, &session);
    let response = AuthResponse {
        user_id: session.user.user_id,
        email: session.user.email,
        redirect_to: next.path().to_string(),
    };

    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie)], Json(response)))
}

/// POST /auth/magic-link - Email a one-time sign-in link
#[utoipa::path(
    post,
    path = "/auth/magic-link",
    request_body = MagicLinkRequest,
    responses(
        (status = 202, description = "Link sent", body = MessageResponse),
        (status = 400, description = "Invalid email"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn magic_link_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<MagicLinkRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    account::request_magic_link(state.identity.as_ref(), &req.email, &state.config.site_url)
        .await
        .map_err(|e| account_error("Failed to send magic link", e))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(MessageResponse {
            message: "Check your email for the sign-in link".to_string(),
        }),
    ))
}

/// GET /auth/callback - Exchange a magic-link token for a session
#[utoipa::path(
    get,
    path = "/auth/callback",
    params(CallbackParams),
    responses(
        (status = 303, description = "Signed in; redirects to the dashboard gate"),
        (status = 401, description = "Unknown, used or expired link")
    )
)]
pub async fn callback_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Result<impl IntoResponse, HandlerError> {
    let (session, next) = account::consume_magic_link(state.identity.as_ref(), &params.token)
        .await
        .map_err(|e| account_error("Failed to sign in with link", e))?;

    let cookie = cookie_for(&state, &session);
    Ok((
        StatusCode::SEE_OTHER,
        [
            (header::SET_COOKIE, cookie),
            (header::LOCATION, next.path().to_string()),
        ],
    ))
}

/// POST /auth/logout - Sign out and invalidate the session
#[utoipa::path(
    post,
    path = "/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = RedirectResponse),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, HandlerError> {
    let token = session_token(&headers)
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    // Looked up first; the session is gone once signed out.
    let user = state.identity.get_session(&token).await.ok().flatten();

    state.identity.sign_out(&token).await.map_err(|e| {
        error!("Failed to sign out: {:?}", e);
        (StatusCode::INTERNAL_SERVER_ERROR, "Failed to logout".to_string())
    })?;
    if let Some(user) = user {
        state.wizards.clear(user.user_id).await;
    }

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cleared_session_cookie())],
        Json(RedirectResponse {
            redirect_to: Route::Home.path().to_string(),
        }),
    ))
}

/// PUT /auth/password - Change the signed-in user's password
#[utoipa::path(
    put,
    path = "/auth/password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Too short or confirmation does not match"),
        (status = 401, description = "Current password is incorrect")
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let change = PasswordChange {
        current_password: req.current_password,
        new_password: req.new_password,
        confirm_password: req.confirm_password,
    };
    account::change_password(state.identity.as_ref(), &user, &change)
        .await
        .map_err(|e| account_error("Failed to change password", e))?;

    Ok(Json(MessageResponse {
        message: "Password updated".to_string(),
    }))
}
