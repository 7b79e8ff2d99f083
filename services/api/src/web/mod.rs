pub mod auth;
pub mod middleware;
pub mod onboarding;
pub mod pets;
pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use std::sync::Arc;

pub use middleware::require_auth;
pub use state::AppState;
pub use ws_handler::ws_handler;

/// Builds the API router: public routes, plus the routes behind `require_auth`.
pub fn router(app_state: Arc<AppState>) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/auth/login", post(auth::login_handler))
        .route("/auth/magic-link", post(auth::magic_link_handler))
        .route("/auth/callback", get(auth::callback_handler))
        .route("/auth/logout", post(auth::logout_handler))
        .route("/session", get(rest::session_handler))
        .route("/nav", get(rest::nav_handler))
        .route("/gate", get(rest::gate_handler));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/auth/password", put(auth::change_password_handler))
        .route("/session/ws", get(ws_handler))
        .route("/profile/role", post(rest::choose_role_handler))
        .route("/dashboard", get(rest::dashboard_handler))
        .route("/dashboard/tutor", get(rest::tutor_dashboard_handler))
        .route("/dashboard/sitter", get(rest::sitter_dashboard_handler))
        .route(
            "/settings",
            get(rest::get_settings_handler).put(rest::update_settings_handler),
        )
        .route(
            "/pets",
            get(pets::list_pets_handler).post(pets::create_pet_handler),
        )
        .route(
            "/pets/{id}",
            put(pets::update_pet_handler).delete(pets::delete_pet_handler),
        )
        .route("/pets/{id}/photo", post(pets::upload_photo_handler))
        .route("/onboarding", get(onboarding::get_wizard_handler))
        .route("/onboarding/next", post(onboarding::next_handler))
        .route("/onboarding/skip", post(onboarding::skip_handler))
        .route("/onboarding/back", post(onboarding::back_handler))
        .route("/onboarding/months/next", post(onboarding::next_months_handler))
        .route(
            "/onboarding/months/previous",
            post(onboarding::previous_months_handler),
        )
        .route("/onboarding/finish", post(onboarding::finish_handler))
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            require_auth,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(DefaultBodyLimit::max(10 * 1024 * 1024))
        .with_state(app_state)
}
