//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the session, role gate, profile and dashboard
//! endpoints, and the master definition for the OpenAPI document.

use crate::error::{port_error, HandlerError};
use crate::web::middleware::session_token;
use crate::web::state::AppState;
use crate::web::{auth, onboarding, pets};
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;
use trustpaws_core::account::{self, DashboardSummary};
use trustpaws_core::domain::{PetsProfile, ProfileDetails, Role, SessionUser};
use trustpaws_core::navigation::{nav_links, NavAction};
use trustpaws_core::pets::PetEditor;
use trustpaws_core::role_gate::{self, GateDecision};
use trustpaws_core::session::SessionSnapshot;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        auth::login_handler,
        auth::magic_link_handler,
        auth::callback_handler,
        auth::logout_handler,
        auth::change_password_handler,
        session_handler,
        nav_handler,
        gate_handler,
        choose_role_handler,
        dashboard_handler,
        tutor_dashboard_handler,
        sitter_dashboard_handler,
        get_settings_handler,
        update_settings_handler,
        pets::list_pets_handler,
        pets::create_pet_handler,
        pets::update_pet_handler,
        pets::delete_pet_handler,
        pets::upload_photo_handler,
        onboarding::get_wizard_handler,
        onboarding::next_handler,
        onboarding::skip_handler,
        onboarding::back_handler,
        onboarding::next_months_handler,
        onboarding::previous_months_handler,
        onboarding::finish_handler,
    ),
    components(
        schemas(
            auth::LoginRequest, auth::MagicLinkRequest, auth::ChangePasswordRequest,
            auth::AuthResponse, auth::MessageResponse, auth::RedirectResponse,
            SessionResponse, UserResponse, NavLinkResponse, GateResponse, ChooseRoleRequest,
            SummaryResponse, TutorDashboardResponse, SettingsResponse, SettingsRequest,
            pets::PetRequest, pets::PetResponse,
            onboarding::WizardView, onboarding::MonthPage, onboarding::FinishRequest,
            onboarding::FinishResponse,
        )
    ),
    tags(
        (name = "TrustPaws API", description = "Accounts, pets and tutor onboarding for the TrustPaws pet-sitting marketplace.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl From<SessionUser> for UserResponse {
    fn from(user: SessionUser) -> Self {
        Self {
            user_id: user.user_id,
            email: user.email,
            last_sign_in_at: user.last_sign_in_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: Option<UserResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct NavLinkResponse {
    pub label: String,
    pub href: String,
    /// `link` or `sign_out`.
    pub action: String,
}

#[derive(Serialize, ToSchema)]
pub struct GateResponse {
    /// `loading`, `choose_role` or `navigate`.
    pub decision: String,
    pub redirect_to: Option<String>,
}

impl From<GateDecision> for GateResponse {
    fn from(decision: GateDecision) -> Self {
        match decision {
            GateDecision::Loading => Self {
                decision: "loading".to_string(),
                redirect_to: None,
            },
            GateDecision::ChooseRole => Self {
                decision: "choose_role".to_string(),
                redirect_to: None,
            },
            GateDecision::Navigate(route) => Self {
                decision: "navigate".to_string(),
                redirect_to: Some(route.path().to_string()),
            },
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct ChooseRoleRequest {
    #[schema(value_type = String, example = "tutor")]
    pub role: Role,
}

#[derive(Serialize, ToSchema)]
pub struct SummaryResponse {
    /// First name when set, otherwise the email.
    pub display_name: String,
    pub email: String,
    pub user_id: Uuid,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

impl From<DashboardSummary> for SummaryResponse {
    fn from(summary: DashboardSummary) -> Self {
        Self {
            display_name: summary.display_name,
            email: summary.email,
            user_id: summary.user_id,
            last_sign_in_at: summary.last_sign_in_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TutorDashboardResponse {
    pub summary: SummaryResponse,
    pub pets: Vec<pets::PetResponse>,
    /// The most recent onboarding answers, if the wizard was ever finished.
    #[schema(value_type = Option<Object>)]
    pub pets_profile: Option<PetsProfile>,
}

#[derive(Serialize, ToSchema)]
pub struct SettingsResponse {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone_number: String,
}

impl SettingsResponse {
    fn new(email: &str, details: ProfileDetails) -> Self {
        Self {
            email: email.to_string(),
            first_name: details.first_name,
            last_name: details.last_name,
            username: details.username,
            phone_number: details.phone_number,
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct SettingsRequest {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub phone_number: String,
}

/// Resolves the request's cookie to a settled session. A missing cookie or a
/// failed lookup both read as signed out.
pub async fn current_session(state: &AppState, headers: &HeaderMap) -> SessionSnapshot {
    let Some(token) = session_token(headers) else {
        return SessionSnapshot::anonymous();
    };
    match state.identity.get_session(&token).await {
        Ok(user) => SessionSnapshot::resolved(user),
        Err(e) => {
            warn!("Session lookup failed, treating as signed out: {}", e);
            SessionSnapshot::anonymous()
        }
    }
}

//=========================================================================================
// Session and Navigation
//=========================================================================================

/// The signed-in user, or `null`.
#[utoipa::path(
    get,
    path = "/session",
    responses((status = 200, description = "Current session", body = SessionResponse))
)]
pub async fn session_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let snapshot = current_session(&state, &headers).await;
    Json(SessionResponse {
        user: snapshot.user.map(UserResponse::from),
    })
}

/// Links for the top navigation bar.
#[utoipa::path(
    get,
    path = "/nav",
    responses((status = 200, description = "Navigation links", body = [NavLinkResponse]))
)]
pub async fn nav_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let snapshot = current_session(&state, &headers).await;
    let links: Vec<NavLinkResponse> = nav_links(&snapshot)
        .into_iter()
        .map(|link| NavLinkResponse {
            label: link.label.to_string(),
            href: link.href.to_string(),
            action: match link.action {
                NavAction::Link => "link",
                NavAction::SignOut => "sign_out",
            }
            .to_string(),
        })
        .collect();
    Json(links)
}

//=========================================================================================
// Role Gate
//=========================================================================================

/// Decides where `/dashboard` sends the visitor.
///
/// Signed-in users get a profile row on their first visit. Anonymous visitors
/// are sent to the login page.
#[utoipa::path(
    get,
    path = "/gate",
    responses((status = 200, description = "Gate decision", body = GateResponse))
)]
pub async fn gate_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let snapshot = current_session(&state, &headers).await;
    if let Some(user) = &snapshot.user {
        if let Err(e) = account::ensure_profile(state.db.as_ref(), user).await {
            warn!("Failed to ensure profile for {}: {}", user.user_id, e);
        }
    }
    let decision = role_gate::resolve(state.db.as_ref(), &snapshot).await;
    Json(GateResponse::from(decision))
}

/// Stores the role picked on the chooser.
#[utoipa::path(
    post,
    path = "/profile/role",
    request_body = ChooseRoleRequest,
    responses(
        (status = 200, description = "Role saved", body = auth::RedirectResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn choose_role_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<ChooseRoleRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    account::ensure_profile(state.db.as_ref(), &user)
        .await
        .map_err(|e| port_error("Failed to load profile", e))?;
    let next = role_gate::choose_role(state.db.as_ref(), user.user_id, req.role)
        .await
        .map_err(|e| port_error("Failed to save role", e))?;

    Ok(Json(auth::RedirectResponse {
        redirect_to: next.path().to_string(),
    }))
}

//=========================================================================================
// Dashboards
//=========================================================================================

#[utoipa::path(
    get,
    path = "/dashboard",
    responses((status = 200, description = "Dashboard header", body = SummaryResponse))
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> impl IntoResponse {
    let summary = account::dashboard_summary(state.db.as_ref(), &user).await;
    Json(SummaryResponse::from(summary))
}

#[utoipa::path(
    get,
    path = "/dashboard/tutor",
    responses(
        (status = 200, description = "Tutor dashboard", body = TutorDashboardResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn tutor_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let db = state.db.as_ref();
    let summary = account::dashboard_summary(db, &user).await;
    let editor = PetEditor::load(db, user.user_id)
        .await
        .map_err(|e| port_error("Failed to load pets", e))?;
    let pets_profile = match db.latest_pets_profile(user.user_id).await {
        Ok(profile) => profile,
        Err(e) => {
            warn!("Failed to load onboarding answers for {}: {}", user.user_id, e);
            None
        }
    };

    Ok(Json(TutorDashboardResponse {
        summary: summary.into(),
        pets: editor
            .into_pets()
            .into_iter()
            .map(pets::PetResponse::from)
            .collect::<Vec<_>>(),
        pets_profile,
    }))
}

#[utoipa::path(
    get,
    path = "/dashboard/sitter",
    responses((status = 200, description = "Sitter dashboard", body = SummaryResponse))
)]
pub async fn sitter_dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> impl IntoResponse {
    let summary = account::dashboard_summary(state.db.as_ref(), &user).await;
    Json(SummaryResponse::from(summary))
}

//=========================================================================================
// Settings
//=========================================================================================

#[utoipa::path(
    get,
    path = "/settings",
    responses((status = 200, description = "Profile details", body = SettingsResponse))
)]
pub async fn get_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> impl IntoResponse {
    let details = account::load_settings(state.db.as_ref(), user.user_id).await;
    Json(SettingsResponse::new(&user.email, details))
}

#[utoipa::path(
    put,
    path = "/settings",
    request_body = SettingsRequest,
    responses(
        (status = 200, description = "Profile details saved", body = SettingsResponse),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn update_settings_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<SettingsRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let details = ProfileDetails {
        first_name: req.first_name,
        last_name: req.last_name,
        username: req.username,
        phone_number: req.phone_number,
    };
    let profile = account::save_settings(state.db.as_ref(), user.user_id, &details)
        .await
        .map_err(|e| port_error("Failed to save settings", e))?;

    Ok((
        StatusCode::OK,
        Json(SettingsResponse::new(&user.email, ProfileDetails::from(&profile))),
    ))
}
