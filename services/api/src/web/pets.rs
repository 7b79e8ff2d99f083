//! services/api/src/web/pets.rs
//!
//! The tutor's pet list: create, edit, delete and photo upload.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trustpaws_core::domain::{Birthday, Pet, PetDraft, PetGender, PetSize, SessionUser, Species};
use trustpaws_core::pets::{encode_photo, PetEditor};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::error::{pet_error, port_error, HandlerError};
use crate::web::state::AppState;

/// Largest accepted photo upload.
pub const MAX_PHOTO_BYTES: usize = 5 * 1024 * 1024;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, Serialize, ToSchema, Default, Clone, Copy)]
pub struct BirthdayBody {
    pub day: Option<u8>,
    pub month: Option<u8>,
    pub year: Option<i32>,
}

#[derive(Deserialize, ToSchema)]
pub struct PetRequest {
    #[schema(value_type = String, example = "dog")]
    pub species: Species,
    #[schema(value_type = Option<String>, example = "female")]
    pub gender: Option<PetGender>,
    pub castrated: Option<bool>,
    pub name: String,
    #[serde(default)]
    pub breed: String,
    #[schema(value_type = Option<String>, example = "medium")]
    pub size: Option<PetSize>,
    #[serde(default)]
    pub birthday: BirthdayBody,
    #[serde(default)]
    pub know_day_month: bool,
    #[serde(default)]
    pub vaccines: Vec<String>,
    /// A `data:` URL; usually set through the photo upload instead.
    pub photo: Option<String>,
}

impl From<PetRequest> for PetDraft {
    fn from(req: PetRequest) -> Self {
        PetDraft {
            species: req.species,
            gender: req.gender,
            castrated: req.castrated,
            name: req.name,
            breed: req.breed,
            size: req.size,
            birthday: Birthday {
                day: req.birthday.day,
                month: req.birthday.month,
                year: req.birthday.year,
            },
            know_day_month: req.know_day_month,
            vaccines: req.vaccines,
            photo: req.photo,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct PetResponse {
    pub id: i64,
    pub tutor_id: Uuid,
    #[schema(value_type = String)]
    pub species: Species,
    #[schema(value_type = Option<String>)]
    pub gender: Option<PetGender>,
    pub castrated: Option<bool>,
    pub name: String,
    pub breed: String,
    #[schema(value_type = Option<String>)]
    pub size: Option<PetSize>,
    pub birthday: BirthdayBody,
    pub know_day_month: bool,
    pub vaccines: Vec<String>,
    pub photo: Option<String>,
}

impl From<Pet> for PetResponse {
    fn from(pet: Pet) -> Self {
        let details = pet.details;
        Self {
            id: pet.id,
            tutor_id: pet.tutor_id,
            species: details.species,
            gender: details.gender,
            castrated: details.castrated,
            name: details.name,
            breed: details.breed,
            size: details.size,
            birthday: BirthdayBody {
                day: details.birthday.day,
                month: details.birthday.month,
                year: details.birthday.year,
            },
            know_day_month: details.know_day_month,
            vaccines: details.vaccines,
            photo: details.photo,
        }
    }
}

//=========================================================================================
// Handlers
//=========================================================================================

/// The tutor's pets, newest first.
#[utoipa::path(
    get,
    path = "/pets",
    responses(
        (status = 200, description = "Pets", body = [PetResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn list_pets_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
) -> Result<impl IntoResponse, HandlerError> {
    let editor = PetEditor::load(state.db.as_ref(), user.user_id)
        .await
        .map_err(|e| port_error("Failed to load pets", e))?;
    let pets: Vec<PetResponse> = editor.into_pets().into_iter().map(PetResponse::from).collect();
    Ok(Json(pets))
}

#[utoipa::path(
    post,
    path = "/pets",
    request_body = PetRequest,
    responses(
        (status = 201, description = "Pet added", body = PetResponse),
        (status = 400, description = "Invalid pet"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn create_pet_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Json(req): Json<PetRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let db = state.db.as_ref();
    let mut editor = PetEditor::load(db, user.user_id)
        .await
        .map_err(|e| port_error("Failed to load pets", e))?;
    editor.open_create();
    let pet = editor
        .submit(db, req.into())
        .await
        .map_err(|e| pet_error("Failed to save pet", e))?;

    Ok((StatusCode::CREATED, Json(PetResponse::from(pet))))
}

#[utoipa::path(
    put,
    path = "/pets/{id}",
    params(("id" = i64, Path, description = "Pet id")),
    request_body = PetRequest,
    responses(
        (status = 200, description = "Pet updated", body = PetResponse),
        (status = 400, description = "Invalid pet"),
        (status = 404, description = "Not one of the tutor's pets")
    )
)]
pub async fn update_pet_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(pet_id): Path<i64>,
    Json(req): Json<PetRequest>,
) -> Result<impl IntoResponse, HandlerError> {
    let db = state.db.as_ref();
    let mut editor = PetEditor::load(db, user.user_id)
        .await
        .map_err(|e| port_error("Failed to load pets", e))?;
    editor
        .open_edit(pet_id)
        .map_err(|e| pet_error("Failed to open pet", e))?;
    let pet = editor
        .submit(db, req.into())
        .await
        .map_err(|e| pet_error("Failed to save pet", e))?;

    Ok(Json(PetResponse::from(pet)))
}

/// Deletes a pet and returns the remaining list.
#[utoipa::path(
    delete,
    path = "/pets/{id}",
    params(("id" = i64, Path, description = "Pet id")),
    responses(
        (status = 200, description = "Remaining pets", body = [PetResponse]),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn delete_pet_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(pet_id): Path<i64>,
) -> Result<impl IntoResponse, HandlerError> {
    let db = state.db.as_ref();
    let mut editor = PetEditor::load(db, user.user_id)
        .await
        .map_err(|e| port_error("Failed to load pets", e))?;
    editor
        .delete(db, pet_id)
        .await
        .map_err(|e| port_error("Failed to delete pet", e))?;

    let pets: Vec<PetResponse> = editor.into_pets().into_iter().map(PetResponse::from).collect();
    Ok(Json(pets))
}

/// Stores an uploaded image on the pet as a `data:` URL.
///
/// Accepts a multipart/form-data request with a single image part.
#[utoipa::path(
    post,
    path = "/pets/{id}/photo",
    params(("id" = i64, Path, description = "Pet id")),
    request_body(content_type = "multipart/form-data", description = "The image to upload."),
    responses(
        (status = 200, description = "Photo saved", body = PetResponse),
        (status = 400, description = "Missing or non-image file"),
        (status = 404, description = "Not one of the tutor's pets")
    )
)]
pub async fn upload_photo_handler(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<SessionUser>,
    Path(pet_id): Path<i64>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, HandlerError> {
    let (content_type, data) = read_image(&mut multipart).await?;

    let db = state.db.as_ref();
    let mut editor = PetEditor::load(db, user.user_id)
        .await
        .map_err(|e| port_error("Failed to load pets", e))?;
    let pet = editor
        .set_photo(db, pet_id, encode_photo(&data, &content_type))
        .await
        .map_err(|e| pet_error("Failed to save photo", e))?
        .clone();

    Ok(Json(PetResponse::from(pet)))
}

async fn read_image(multipart: &mut Multipart) -> Result<(String, Bytes), HandlerError> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include an image".to_string(),
            )
        })?;

    let content_type = field
        .content_type()
        .filter(|ct| ct.starts_with("image/"))
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Uploaded file must be an image".to_string(),
            )
        })?
        .to_string();

    let data = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;
    if data.is_empty() || data.len() > MAX_PHOTO_BYTES {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Photo must be between 1 byte and {} bytes", MAX_PHOTO_BYTES),
        ));
    }
    Ok((content_type, data))
}
