//! crates/trustpaws_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or transport. Enumerated
//! columns are parsed into tagged types at the store boundary, so the rest of
//! the crate never handles raw role or species strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

//=========================================================================================
// Identity
//=========================================================================================

/// The identity of a signed-in user, as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionUser {
    pub user_id: Uuid,
    pub email: String,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

/// A browser login session handed out by the identity provider.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub access_token: String,
    pub user: SessionUser,
    pub expires_at: DateTime<Utc>,
}

/// The kind of change announced on the identity provider's auth-state stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthEvent {
    SignedIn,
    SignedOut,
    PasswordUpdated,
}

/// One event on the auth-state stream.
#[derive(Debug, Clone)]
pub struct AuthStateChange {
    pub event: AuthEvent,
    pub user_id: Uuid,
}

//=========================================================================================
// Error raised when a stored value does not match its tagged type
//=========================================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// Implements `as_str`, `Display` and `FromStr` for a fieldless enum using the
/// same snake_case tags serde uses.
macro_rules! string_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $tag:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $tag),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($tag => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        kind: $kind,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

//=========================================================================================
// Profiles
//=========================================================================================

/// Account mode gating which dashboard is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Tutor,
    Sitter,
}

string_enum!(Role, "role", { Tutor => "tutor", Sitter => "sitter" });

/// A user's profile row. `id` always equals the owning session's user id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub id: Uuid,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub phone_number: Option<String>,
    /// `None` means the user has not chosen a role yet.
    pub role: Option<Role>,
}

/// The fields needed to insert a profile that does not exist yet.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub id: Uuid,
    pub email: String,
    pub role: Option<Role>,
}

/// Editable personal details from the settings form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileDetails {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub phone_number: String,
}

impl From<&Profile> for ProfileDetails {
    fn from(profile: &Profile) -> Self {
        Self {
            first_name: profile.first_name.clone().unwrap_or_default(),
            last_name: profile.last_name.clone().unwrap_or_default(),
            username: profile.username.clone().unwrap_or_default(),
            phone_number: profile.phone_number.clone().unwrap_or_default(),
        }
    }
}

//=========================================================================================
// Pets
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Species {
    Dog,
    Cat,
}

string_enum!(Species, "species", { Dog => "dog", Cat => "cat" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetGender {
    Male,
    Female,
}

string_enum!(PetGender, "gender", { Male => "male", Female => "female" });

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetSize {
    Small,
    Medium,
    Large,
}

string_enum!(PetSize, "size", { Small => "small", Medium => "medium", Large => "large" });

/// A pet's birthday. Day and month are only meaningful when the tutor knows them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Birthday {
    pub day: Option<u8>,
    pub month: Option<u8>,
    pub year: Option<i32>,
}

/// A pet as entered in the pet editor, before the store assigns an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PetDraft {
    pub species: Species,
    pub gender: Option<PetGender>,
    /// Tri-state: `None` means the tutor did not answer.
    pub castrated: Option<bool>,
    pub name: String,
    pub breed: String,
    pub size: Option<PetSize>,
    #[serde(default)]
    pub birthday: Birthday,
    #[serde(default)]
    pub know_day_month: bool,
    #[serde(default)]
    pub vaccines: Vec<String>,
    pub photo: Option<String>,
}

/// A stored pet belonging to a tutor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pet {
    pub id: i64,
    pub tutor_id: Uuid,
    #[serde(flatten)]
    pub details: PetDraft,
}

//=========================================================================================
// Onboarding result
//=========================================================================================

/// The nine species tags offered in the first wizard step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PetType {
    Dog,
    Cat,
    Poultry,
    Horse,
    Fish,
    Bird,
    Reptile,
    Livestock,
    Small,
}

string_enum!(PetType, "pet type", {
    Dog => "dog",
    Cat => "cat",
    Poultry => "poultry",
    Horse => "horse",
    Fish => "fish",
    Bird => "bird",
    Reptile => "reptile",
    Livestock => "livestock",
    Small => "small",
});

/// The persisted summary of a completed onboarding wizard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PetsProfile {
    pub id: i64,
    pub user_id: Uuid,
    pub pet_types: Vec<PetType>,
    pub pet_count: BTreeMap<PetType, u32>,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

/// A PetsProfile waiting to be inserted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPetsProfile {
    pub user_id: Uuid,
    pub pet_types: Vec<PetType>,
    pub pet_count: BTreeMap<PetType, u32>,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl NewPetsProfile {
    /// The JSON array stored in the `pet_types` column.
    pub fn pet_types_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.pet_types)
    }

    /// The JSON object stored in the `pet_count` column.
    pub fn pet_count_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.pet_count)
    }
}

//=========================================================================================
// Navigation targets
//=========================================================================================

/// Client-side routes the application navigates between.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Home,
    Login,
    FirstLogin,
    ChooseRole,
    Dashboard,
    TutorDashboard,
    TutorOnboarding,
    SitterDashboard,
    Settings,
    Services,
}

impl Route {
    pub fn path(&self) -> &'static str {
        match self {
            Route::Home => "/",
            Route::Login => "/login",
            Route::FirstLogin => "/first-login",
            Route::ChooseRole => "/choose-role",
            Route::Dashboard => "/dashboard",
            Route::TutorDashboard => "/dashboard/tutor",
            Route::TutorOnboarding => "/dashboard/tutor/onboarding",
            Route::SitterDashboard => "/dashboard/sitter",
            Route::Settings => "/dashboard/settings",
            Route::Services => "/services",
        }
    }
}
