//! services/api/src/web/onboarding.rs
//!
//! Drives the tutor onboarding wizard. The wizard lives in memory per user
//! until it is finished; each endpoint returns the wizard's current view.

use axum::{
    extract::State,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use trustpaws_core::domain::{PetType, PetsProfile, SessionUser};
use trustpaws_core::onboarding;
use trustpaws_core::wizard::{
    PetNeed, StepAnswer, TripLength, Wizard, WizardAnswers, WizardStep,
};
use utoipa::ToSchema;

use crate::error::{onboarding_error, wizard_error, HandlerError};
use crate::web::state::AppState;

//=========================================================================================
// View Types
//=========================================================================================

#[derive(Serialize, ToSchema)]
pub struct MonthPage {
    /// Six labels such as `Mar 2025`, oldest first.
    pub labels: Vec<String>,
    pub can_go_back: bool,
}

#[derive(Serialize, ToSchema)]
pub struct OptionItem {
    pub value: String,
    pub label: String,
}

#[derive(Serialize, ToSchema)]
pub struct WizardView {
    #[schema(value_type = String, example = "pet_types")]
    pub step: WizardStep,
    /// One-based.
    pub step_number: usize,
    pub total_steps: usize,
    pub can_skip: bool,
    #[schema(value_type = Object)]
    pub answers: WizardAnswers,
    /// Starting values for the counters on the pet count step.
    #[schema(value_type = Option<Object>)]
    pub count_form: Option<BTreeMap<PetType, u32>>,
    /// Choices offered on the current step, when it has a fixed catalog.
    pub options: Vec<OptionItem>,
    /// The month grid on the select dates step.
    pub months: Option<MonthPage>,
}

impl WizardView {
    fn of(wizard: &Wizard) -> Self {
        let step = wizard.step();
        let (step_number, total_steps) = wizard.progress();
        let options = match step {
            WizardStep::PetTypes => PetType::ALL
                .iter()
                .map(|t| OptionItem {
                    value: t.as_str().to_string(),
                    label: t.as_str().to_string(),
                })
                .collect(),
            WizardStep::PetNeeds => PetNeed::ALL
                .iter()
                .map(|need| OptionItem {
                    value: enum_tag(need),
                    label: need.label().to_string(),
                })
                .collect(),
            WizardStep::TripLength => TripLength::ALL
                .iter()
                .map(|length| OptionItem {
                    value: enum_tag(length),
                    label: length.label().to_string(),
                })
                .collect(),
            _ => Vec::new(),
        };
        Self {
            step,
            step_number,
            total_steps,
            can_skip: step.can_skip(),
            answers: wizard.answers().clone(),
            count_form: (step == WizardStep::PetCount)
                .then(|| wizard.count_form().into_counts()),
            options,
            months: (step == WizardStep::SelectDates).then(|| MonthPage {
                labels: wizard.month_window().labels(),
                can_go_back: wizard.month_window().can_go_back(),
            }),
        }
    }
}

/// The serde tag of a unit enum variant.
fn enum_tag<T: Serialize>(value: &T) -> String {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(tag)) => tag,
        _ => String::new(),
    }
}

#[derive(Deserialize, ToSchema)]
pub struct FinishRequest {
    pub location: String,
}

#[derive(Serialize, ToSchema)]
pub struct FinishResponse {
    pub redirect_to: String,
    #[schema(value_type = Object)]
    pub pets_profile: PetsProfile,
}

//=========================================================================================
// Handlers
//=========================================================================================

async fn with_wizard<F>(state: &AppState, user: &SessionUser, apply: F) -> Result<WizardView, HandlerError>
where
    F: FnOnce(&mut Wizard) -> Result<(), HandlerError>,
{
    let today = Utc::now().date_naive();
    let wizard = state.wizards.get_or_start(user.user_id, today).await;
    let mut wizard = wizard.lock().await;
    wizard.set_today(today);
    apply(&mut wizard)?;
    Ok(WizardView::of(&wizard))
}

/// The wizard's current step and answers, starting a new wizard if needed.
#[utoipa::path(
    get,
    path = "/onboarding",
    responses((status = 200, description = "Current wizard state", body = WizardView))
)]
pub async fn get_wizard_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    Ok(Json(with_wizard(&state, &user, |_| Ok(())).await?))
}

/// "Continue": submits the current step's answer.
#[utoipa::path(
    post,
    path = "/onboarding/next",
    request_body(
        content_type = "application/json",
        description = "The step's answer, e.g. `{\"step\": \"pet_types\", \"value\": [\"dog\"]}`."
    ),
    responses(
        (status = 200, description = "Advanced one step", body = WizardView),
        (status = 400, description = "Invalid answer"),
        (status = 409, description = "Answer is for a different step")
    )
)]
pub async fn next_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(answer): Json<StepAnswer>,
) -> Result<impl IntoResponse, HandlerError> {
    let view = with_wizard(&state, &user, |wizard| {
        wizard.next(answer).map(|_| ()).map_err(wizard_error)
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/onboarding/skip",
    responses(
        (status = 200, description = "Skipped an optional step", body = WizardView),
        (status = 409, description = "Step cannot be skipped")
    )
)]
pub async fn skip_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let view = with_wizard(&state, &user, |wizard| {
        wizard.skip().map(|_| ()).map_err(wizard_error)
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/onboarding/back",
    responses((status = 200, description = "Went back one step", body = WizardView))
)]
pub async fn back_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let view = with_wizard(&state, &user, |wizard| {
        wizard.back();
        Ok(())
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/onboarding/months/next",
    responses((status = 200, description = "Next six months", body = WizardView))
)]
pub async fn next_months_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let view = with_wizard(&state, &user, |wizard| {
        wizard.month_window_mut().next_page();
        Ok(())
    })
    .await?;
    Ok(Json(view))
}

#[utoipa::path(
    post,
    path = "/onboarding/months/previous",
    responses((status = 200, description = "Previous six months", body = WizardView))
)]
pub async fn previous_months_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let view = with_wizard(&state, &user, |wizard| {
        wizard.month_window_mut().previous_page();
        Ok(())
    })
    .await?;
    Ok(Json(view))
}

/// "Finish" on the location step: saves the answers and ends the wizard.
#[utoipa::path(
    post,
    path = "/onboarding/finish",
    request_body = FinishRequest,
    responses(
        (status = 200, description = "Onboarding saved", body = FinishResponse),
        (status = 400, description = "Location is empty"),
        (status = 409, description = "Not on the location step"),
        (status = 500, description = "Saving failed; the wizard stays on the location step")
    )
)]
pub async fn finish_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<FinishRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let wizard = state
        .wizards
        .get_or_start(user.user_id, Utc::now().date_naive())
        .await;
    let done = {
        let mut wizard = wizard.lock().await;
        onboarding::complete(state.db.as_ref(), &user, &mut wizard, &req.location)
            .await
            .map_err(onboarding_error)?
    };
    state.wizards.clear(user.user_id).await;
    info!("Cleared onboarding wizard for {}", user.user_id);

    Ok(Json(FinishResponse {
        redirect_to: done.next.path().to_string(),
        pets_profile: done.pets_profile,
    }))
}
