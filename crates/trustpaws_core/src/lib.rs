pub mod account;
pub mod domain;
pub mod navigation;
pub mod onboarding;
pub mod pets;
pub mod ports;
pub mod role_gate;
pub mod session;
pub mod wizard;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use domain::{
    AuthEvent, AuthSession, AuthStateChange, Birthday, NewPetsProfile, NewProfile, Pet, PetDraft,
    PetGender, PetSize, PetType, PetsProfile, Profile, ProfileDetails, Role, Route, SessionUser,
    Species,
};
pub use ports::{AuthStateStream, DatabaseService, IdentityProvider, PortError, PortResult};
pub use session::{SessionContext, SessionSnapshot};
pub use wizard::{StepAnswer, Wizard, WizardError, WizardStep};
