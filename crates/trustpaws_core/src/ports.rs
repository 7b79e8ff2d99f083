//! crates/trustpaws_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of the identity provider and relational store behind them.

use async_trait::async_trait;
use futures::Stream;
use std::pin::Pin;
use uuid::Uuid;

use crate::domain::{
    AuthSession, AuthStateChange, NewPetsProfile, NewProfile, Pet, PetDraft, PetsProfile,
    Profile, ProfileDetails, Role, SessionUser, UnknownVariant,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Invalid login credentials")]
    InvalidCredentials,
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid stored value: {0}")]
    Invalid(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

impl From<UnknownVariant> for PortError {
    fn from(err: UnknownVariant) -> Self {
        PortError::Invalid(err.to_string())
    }
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

/// The auth-state stream handed out by an identity provider.
pub type AuthStateStream = Pin<Box<dyn Stream<Item = AuthStateChange> + Send>>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Signs in with email and password, returning a fresh session.
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession>;

    /// Emails a one-time sign-in link pointing at `redirect_to`.
    /// The identity is created if it does not exist yet.
    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> PortResult<()>;

    /// Exchanges a one-time link token for a session. Tokens are single use.
    async fn consume_magic_link(&self, token: &str) -> PortResult<AuthSession>;

    /// Resolves an access token to its user, or `None` if it is unknown or expired.
    async fn get_session(&self, access_token: &str) -> PortResult<Option<SessionUser>>;

    async fn sign_out(&self, access_token: &str) -> PortResult<()>;

    /// Checks a password without creating a session.
    async fn reauthenticate(&self, email: &str, password: &str) -> PortResult<()>;

    async fn update_password(&self, user_id: Uuid, new_password: &str) -> PortResult<()>;

    /// Subscribes to sign-in, sign-out, refresh and password events for all users.
    fn auth_state_changes(&self) -> AuthStateStream;
}

#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Profiles ---
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>>;

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile>;

    /// Inserts or updates the editable details, keyed on the profile id.
    async fn upsert_profile_details(
        &self,
        user_id: Uuid,
        details: &ProfileDetails,
    ) -> PortResult<Profile>;

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> PortResult<()>;

    // --- Pets ---
    /// Lists a tutor's pets, most recently created first.
    async fn list_pets(&self, tutor_id: Uuid) -> PortResult<Vec<Pet>>;

    async fn insert_pet(&self, tutor_id: Uuid, pet: &PetDraft) -> PortResult<Pet>;

    async fn update_pet(&self, pet_id: i64, tutor_id: Uuid, pet: &PetDraft) -> PortResult<Pet>;

    async fn set_pet_photo(&self, pet_id: i64, tutor_id: Uuid, photo: &str) -> PortResult<()>;

    async fn delete_pet(&self, pet_id: i64, tutor_id: Uuid) -> PortResult<()>;

    // --- Onboarding results ---
    async fn insert_pets_profile(&self, record: NewPetsProfile) -> PortResult<PetsProfile>;

    async fn latest_pets_profile(&self, user_id: Uuid) -> PortResult<Option<PetsProfile>>;
}
