//! crates/trustpaws_core/src/onboarding.rs
//!
//! Persists a finished onboarding wizard.

use chrono::Utc;
use tracing::{error, info};

use crate::domain::{NewProfile, PetsProfile, Role, Route, SessionUser};
use crate::ports::{DatabaseService, PortError};
use crate::wizard::{Wizard, WizardError};

#[derive(Debug, thiserror::Error)]
pub enum OnboardingError {
    #[error(transparent)]
    Wizard(#[from] WizardError),
    #[error("Failed to create profile: {0}")]
    CreateProfile(#[source] PortError),
    #[error("Failed to save onboarding answers: {0}")]
    SavePetsProfile(#[source] PortError),
}

/// The outcome of a successful finish.
#[derive(Debug, Clone)]
pub struct Completed {
    pub pets_profile: PetsProfile,
    pub next: Route,
}

/// Finishes `wizard` with `location` and writes the result.
///
/// Makes sure the user has a profile (creating one with the tutor role when
/// missing), then inserts one PetsProfile row. The two writes are independent:
/// if the second fails the profile stays created. On any failure the wizard is
/// left on the location step so the user can retry.
pub async fn complete(
    db: &dyn DatabaseService,
    user: &SessionUser,
    wizard: &mut Wizard,
    location: &str,
) -> Result<Completed, OnboardingError> {
    let record = wizard.finish(location, user.user_id, Utc::now())?;

    // An unreadable profile is treated as missing; the insert then reports
    // the real problem if there is one.
    let existing = db.get_profile(user.user_id).await.ok().flatten();
    if existing.is_none() {
        db.insert_profile(NewProfile {
            id: user.user_id,
            email: user.email.clone(),
            role: Some(Role::Tutor),
        })
        .await
        .map_err(|e| {
            error!("Failed to create profile for {}: {}", user.user_id, e);
            OnboardingError::CreateProfile(e)
        })?;
    }

    let pets_profile = db.insert_pets_profile(record).await.map_err(|e| {
        error!("Failed to save onboarding for {}: {}", user.user_id, e);
        OnboardingError::SavePetsProfile(e)
    })?;

    info!("User {} finished onboarding", user.user_id);
    Ok(Completed {
        pets_profile,
        next: Route::TutorDashboard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PetType;
    use crate::testing::{blank_profile, MemoryStore};
    use crate::wizard::{StepAnswer, WizardStep};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn user() -> SessionUser {
        SessionUser {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            last_sign_in_at: None,
        }
    }

    fn wizard_on_location() -> Wizard {
        let mut wizard = Wizard::new(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap());
        wizard
            .next(StepAnswer::PetTypes(vec![PetType::Dog, PetType::Cat]))
            .unwrap();
        wizard
            .next(StepAnswer::PetCount(BTreeMap::from([
                (PetType::Dog, 2),
                (PetType::Cat, 1),
            ])))
            .unwrap();
        wizard.next(StepAnswer::PetNeeds(vec![])).unwrap();
        wizard.next(StepAnswer::Info).unwrap();
        wizard.skip().unwrap();
        wizard
            .next(StepAnswer::SelectDates(vec!["Mar 2025".to_string()]))
            .unwrap();
        wizard.skip().unwrap();
        assert_eq!(wizard.step(), WizardStep::Location);
        wizard
    }

    #[tokio::test]
    async fn creates_profile_then_pets_profile() {
        let db = MemoryStore::new();
        let user = user();
        let mut wizard = wizard_on_location();

        let done = complete(&db, &user, &mut wizard, "São Paulo").await.unwrap();

        assert_eq!(done.next, Route::TutorDashboard);
        assert_eq!(db.count("insert_profile"), 1);
        assert_eq!(db.count("insert_pets_profile"), 1);
        let calls = db.calls();
        let profile_at = calls.iter().position(|c| *c == "insert_profile").unwrap();
        let pets_at = calls.iter().position(|c| *c == "insert_pets_profile").unwrap();
        assert!(profile_at < pets_at);

        assert_eq!(db.profile(user.user_id).unwrap().role, Some(Role::Tutor));
        let rows = db.pets_profiles();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].pet_types, vec![PetType::Dog, PetType::Cat]);
        assert_eq!(
            rows[0].pet_count,
            BTreeMap::from([(PetType::Dog, 2), (PetType::Cat, 1)])
        );
        assert_eq!(rows[0].location, "São Paulo");
    }

    #[tokio::test]
    async fn existing_profile_is_not_recreated() {
        let db = MemoryStore::new();
        let user = user();
        db.seed_profile(blank_profile(user.user_id, &user.email, Some(Role::Tutor)));
        let mut wizard = wizard_on_location();

        complete(&db, &user, &mut wizard, "Recife").await.unwrap();
        assert_eq!(db.count("insert_profile"), 0);
        assert_eq!(db.count("insert_pets_profile"), 1);
    }

    #[tokio::test]
    async fn profile_failure_halts_before_pets_profile() {
        let db = MemoryStore::new();
        db.fail_on("insert_profile");
        let mut wizard = wizard_on_location();

        let err = complete(&db, &user(), &mut wizard, "Recife")
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::CreateProfile(_)));
        assert_eq!(db.count("insert_pets_profile"), 0);
        assert_eq!(wizard.step(), WizardStep::Location);
    }

    #[tokio::test]
    async fn pets_profile_failure_keeps_created_profile() {
        let db = MemoryStore::new();
        db.fail_on("insert_pets_profile");
        let user = user();
        let mut wizard = wizard_on_location();

        let err = complete(&db, &user, &mut wizard, "Recife")
            .await
            .unwrap_err();
        assert!(matches!(err, OnboardingError::SavePetsProfile(_)));
        assert!(db.profile(user.user_id).is_some());

        db.recover("insert_pets_profile");
        complete(&db, &user, &mut wizard, "Recife").await.unwrap();
        assert_eq!(db.count("insert_profile"), 1);
        assert_eq!(db.pets_profiles().len(), 1);
    }

    #[tokio::test]
    async fn empty_location_never_reaches_store() {
        let db = MemoryStore::new();
        let mut wizard = wizard_on_location();
        let err = complete(&db, &user(), &mut wizard, "").await.unwrap_err();
        assert!(matches!(
            err,
            OnboardingError::Wizard(WizardError::EmptyLocation)
        ));
        assert!(db.calls().is_empty());
    }
}
