//! services/api/src/error.rs
//!
//! Defines the primary error type for the API service, and the mapping from
//! core errors to the `(StatusCode, String)` pairs handlers return.

use axum::http::StatusCode;
use tracing::error;

use crate::config::ConfigError;
use trustpaws_core::account::AccountError;
use trustpaws_core::onboarding::OnboardingError;
use trustpaws_core::pets::PetError;
use trustpaws_core::ports::PortError;
use trustpaws_core::wizard::WizardError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure to apply database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

/// What a handler returns on failure.
pub type HandlerError = (StatusCode, String);

/// Maps a port failure, logging anything that is not the caller's fault.
pub fn port_error(context: &str, e: PortError) -> HandlerError {
    let status = match &e {
        PortError::NotFound(_) => StatusCode::NOT_FOUND,
        PortError::InvalidCredentials | PortError::Unauthorized => StatusCode::UNAUTHORIZED,
        PortError::Invalid(_) | PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("{}: {:?}", context, e);
        return (status, context.to_string());
    }
    (status, e.to_string())
}

pub fn account_error(context: &str, e: AccountError) -> HandlerError {
    match e {
        AccountError::Validation(v) => (StatusCode::BAD_REQUEST, v.to_string()),
        AccountError::InvalidCredentials | AccountError::IncorrectCurrentPassword => {
            (StatusCode::UNAUTHORIZED, e.to_string())
        }
        AccountError::Port(p) => port_error(context, p),
    }
}

pub fn wizard_error(e: WizardError) -> HandlerError {
    let status = match e {
        WizardError::WrongStep { .. }
        | WizardError::SkipNotAllowed(_)
        | WizardError::UseFinish
        | WizardError::NotOnLastStep => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, e.to_string())
}

pub fn onboarding_error(e: OnboardingError) -> HandlerError {
    match e {
        OnboardingError::Wizard(w) => wizard_error(w),
        other => {
            error!("Onboarding failed: {}", other);
            (StatusCode::INTERNAL_SERVER_ERROR, other.to_string())
        }
    }
}

pub fn pet_error(context: &str, e: PetError) -> HandlerError {
    match e {
        PetError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        PetError::UnknownPet(_) => (StatusCode::NOT_FOUND, e.to_string()),
        PetError::Port(p) => port_error(context, p),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trustpaws_core::account::ValidationError;
    use trustpaws_core::domain::PetType;

    #[test]
    fn internal_failures_hide_details() {
        let (status, body) = port_error(
            "Failed to load pets",
            PortError::Unexpected("connection reset".to_string()),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, "Failed to load pets");
    }

    #[test]
    fn caller_errors_keep_their_message() {
        let (status, body) = account_error(
            "Failed to sign in",
            AccountError::Validation(ValidationError::PasswordMismatch),
        );
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, "Passwords do not match");

        let (status, _) = account_error("x", AccountError::InvalidCredentials);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn wizard_misuse_is_a_conflict() {
        assert_eq!(wizard_error(WizardError::UseFinish).0, StatusCode::CONFLICT);
        assert_eq!(
            wizard_error(WizardError::MissingCount(PetType::Dog)).0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            wizard_error(WizardError::PastMonth("Jan 1990".to_string())).0,
            StatusCode::BAD_REQUEST
        );
    }
}
