//! crates/trustpaws_core/src/pets.rs
//!
//! The tutor's pet list and its add/edit panel.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{Pet, PetDraft};
use crate::ports::{DatabaseService, PortError, PortResult};

#[derive(Debug, thiserror::Error)]
pub enum PetError {
    #[error("{0}")]
    Validation(String),
    #[error("Pet {0} is not in the list")]
    UnknownPet(i64),
    #[error(transparent)]
    Port(#[from] PortError),
}

/// Whether the add/edit panel is open, and for which pet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorMode {
    Closed,
    Creating,
    Editing(i64),
}

/// A tutor's pets, newest first, plus the state of the add/edit panel.
#[derive(Debug, Clone)]
pub struct PetEditor {
    tutor_id: Uuid,
    pets: Vec<Pet>,
    mode: EditorMode,
}

impl PetEditor {
    pub async fn load(db: &dyn DatabaseService, tutor_id: Uuid) -> PortResult<Self> {
        let pets = db.list_pets(tutor_id).await?;
        Ok(Self {
            tutor_id,
            pets,
            mode: EditorMode::Closed,
        })
    }

    pub fn pets(&self) -> &[Pet] {
        &self.pets
    }

    pub fn into_pets(self) -> Vec<Pet> {
        self.pets
    }

    pub fn mode(&self) -> EditorMode {
        self.mode
    }

    pub fn open_create(&mut self) {
        self.mode = EditorMode::Creating;
    }

    /// Opens the panel on an existing pet, returning it to prefill the form.
    pub fn open_edit(&mut self, pet_id: i64) -> Result<&Pet, PetError> {
        let pet = self
            .pets
            .iter()
            .find(|p| p.id == pet_id)
            .ok_or(PetError::UnknownPet(pet_id))?;
        self.mode = EditorMode::Editing(pet_id);
        Ok(pet)
    }

    pub fn close(&mut self) {
        self.mode = EditorMode::Closed;
    }

    /// Saves the form: inserts when creating, updates when editing. The list is
    /// re-fetched before the panel closes.
    pub async fn submit(
        &mut self,
        db: &dyn DatabaseService,
        draft: PetDraft,
    ) -> Result<Pet, PetError> {
        let draft = validate(draft)?;
        let saved = match self.mode {
            EditorMode::Editing(pet_id) => db.update_pet(pet_id, self.tutor_id, &draft).await?,
            EditorMode::Creating | EditorMode::Closed => {
                db.insert_pet(self.tutor_id, &draft).await?
            }
        };

        match db.list_pets(self.tutor_id).await {
            Ok(pets) => self.pets = pets,
            Err(e) => {
                warn!("Failed to refresh pets for {}: {}", self.tutor_id, e);
                self.pets.retain(|p| p.id != saved.id);
                self.pets.push(saved.clone());
                self.pets.sort_by(|a, b| b.id.cmp(&a.id));
            }
        }
        self.mode = EditorMode::Closed;
        Ok(saved)
    }

    /// Deletes a pet. It leaves the list once the call returns, whatever the
    /// outcome; the store's result is passed back to the caller.
    pub async fn delete(&mut self, db: &dyn DatabaseService, pet_id: i64) -> PortResult<()> {
        let result = db.delete_pet(pet_id, self.tutor_id).await;
        if let Err(e) = &result {
            warn!("Delete of pet {} reported an error: {}", pet_id, e);
        }
        self.pets.retain(|p| p.id != pet_id);
        if self.mode == EditorMode::Editing(pet_id) {
            self.mode = EditorMode::Closed;
        }
        result
    }

    /// Stores an encoded photo on one of the listed pets.
    pub async fn set_photo(
        &mut self,
        db: &dyn DatabaseService,
        pet_id: i64,
        photo: String,
    ) -> Result<&Pet, PetError> {
        let index = self
            .pets
            .iter()
            .position(|p| p.id == pet_id)
            .ok_or(PetError::UnknownPet(pet_id))?;
        db.set_pet_photo(pet_id, self.tutor_id, &photo).await?;
        let pet = &mut self.pets[index];
        pet.details.photo = Some(photo);
        Ok(pet)
    }
}

/// Client-side checks run before any write.
pub fn validate(mut draft: PetDraft) -> Result<PetDraft, PetError> {
    draft.name = draft.name.trim().to_string();
    if draft.name.is_empty() {
        return Err(PetError::Validation("Pet name is required".to_string()));
    }
    if let Some(month) = draft.birthday.month {
        if !(1..=12).contains(&month) {
            return Err(PetError::Validation(format!("Invalid birth month {}", month)));
        }
    }
    if let Some(day) = draft.birthday.day {
        if !(1..=31).contains(&day) {
            return Err(PetError::Validation(format!("Invalid birth day {}", day)));
        }
    }
    if !draft.know_day_month {
        draft.birthday.day = None;
        draft.birthday.month = None;
    }
    let mut vaccines: Vec<String> = Vec::with_capacity(draft.vaccines.len());
    for vaccine in draft.vaccines.drain(..) {
        let vaccine = vaccine.trim().to_string();
        if !vaccine.is_empty() && !vaccines.contains(&vaccine) {
            vaccines.push(vaccine);
        }
    }
    draft.vaccines = vaccines;
    Ok(draft)
}

/// Encodes an uploaded image as a `data:` URL for inline storage.
pub fn encode_photo(bytes: &[u8], content_type: &str) -> String {
    format!("data:{};base64,{}", content_type, STANDARD.encode(bytes))
}
