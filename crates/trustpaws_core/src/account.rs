//! crates/trustpaws_core/src/account.rs
//!
//! Sign-in flows, account settings and the profile row that backs them.
//! Form checks here run before any call to the identity provider or store.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{AuthSession, NewProfile, Profile, ProfileDetails, Route, SessionUser};
use crate::ports::{DatabaseService, IdentityProvider, PortError, PortResult};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Required(&'static str),
    #[error("'{0}' is not a valid email address")]
    InvalidEmail(String),
    #[error("Password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,
    #[error("Passwords do not match")]
    PasswordMismatch,
}

#[derive(Debug, thiserror::Error)]
pub enum AccountError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Current password is incorrect")]
    IncorrectCurrentPassword,
    #[error(transparent)]
    Port(PortError),
}

impl From<PortError> for AccountError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::InvalidCredentials => AccountError::InvalidCredentials,
            other => AccountError::Port(other),
        }
    }
}

fn require_email(email: &str) -> Result<&str, ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError::Required("Email"));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(ValidationError::InvalidEmail(email.to_string())),
    }
}

//=========================================================================================
// Sign-in
//=========================================================================================

/// Password sign-in. On success the browser goes to the dashboard gate.
pub async fn sign_in(
    identity: &dyn IdentityProvider,
    email: &str,
    password: &str,
) -> Result<(AuthSession, Route), AccountError> {
    let email = require_email(email)?;
    if password.is_empty() {
        return Err(ValidationError::Required("Password").into());
    }
    let session = identity.sign_in_with_password(email, password).await?;
    info!("User {} signed in with password", session.user.user_id);
    Ok((session, Route::Dashboard))
}

/// Where magic links send the browser back to.
pub fn magic_link_redirect(site_url: &str) -> String {
    format!("{}/auth/callback", site_url.trim_end_matches('/'))
}

/// The "join" flow: emails a one-time sign-in link.
pub async fn request_magic_link(
    identity: &dyn IdentityProvider,
    email: &str,
    site_url: &str,
) -> Result<(), AccountError> {
    let email = require_email(email)?;
    identity
        .send_magic_link(email, &magic_link_redirect(site_url))
        .await?;
    Ok(())
}

/// Exchanges a clicked magic link for a session.
pub async fn consume_magic_link(
    identity: &dyn IdentityProvider,
    token: &str,
) -> Result<(AuthSession, Route), AccountError> {
    if token.is_empty() {
        return Err(ValidationError::Required("Token").into());
    }
    let session = identity.consume_magic_link(token).await?;
    info!("User {} signed in with magic link", session.user.user_id);
    Ok((session, Route::Dashboard))
}

//=========================================================================================
// Password change
//=========================================================================================

#[derive(Debug, Clone, Default)]
pub struct PasswordChange {
    /// When present, the user is re-authenticated with it first.
    pub current_password: Option<String>,
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChange {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort);
        }
        if self.new_password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        Ok(())
    }
}

pub async fn change_password(
    identity: &dyn IdentityProvider,
    user: &SessionUser,
    change: &PasswordChange,
) -> Result<(), AccountError> {
    change.validate()?;
    if let Some(current) = change.current_password.as_deref().filter(|p| !p.is_empty()) {
        identity
            .reauthenticate(&user.email, current)
            .await
            .map_err(|e| match e {
                PortError::InvalidCredentials => AccountError::IncorrectCurrentPassword,
                other => AccountError::Port(other),
            })?;
    }
    identity
        .update_password(user.user_id, &change.new_password)
        .await?;
    info!("User {} changed their password", user.user_id);
    Ok(())
}

//=========================================================================================
// Profile
//=========================================================================================

/// Returns the user's profile, inserting a bare one on their first visit.
pub async fn ensure_profile(db: &dyn DatabaseService, user: &SessionUser) -> PortResult<Profile> {
    if let Some(profile) = db.get_profile(user.user_id).await? {
        return Ok(profile);
    }
    info!("Creating profile for {}", user.user_id);
    db.insert_profile(NewProfile {
        id: user.user_id,
        email: user.email.clone(),
        role: None,
    })
    .await
}

/// Loads the settings form. A failed read leaves the form empty.
pub async fn load_settings(db: &dyn DatabaseService, user_id: Uuid) -> ProfileDetails {
    match db.get_profile(user_id).await {
        Ok(profile) => profile.as_ref().map(ProfileDetails::from).unwrap_or_default(),
        Err(e) => {
            warn!("Error loading profile {}: {}", user_id, e);
            ProfileDetails::default()
        }
    }
}

pub async fn save_settings(
    db: &dyn DatabaseService,
    user_id: Uuid,
    details: &ProfileDetails,
) -> PortResult<Profile> {
    let trimmed = ProfileDetails {
        first_name: details.first_name.trim().to_string(),
        last_name: details.last_name.trim().to_string(),
        username: details.username.trim().to_string(),
        phone_number: details.phone_number.trim().to_string(),
    };
    db.upsert_profile_details(user_id, &trimmed).await
}

/// The header block shown on every dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DashboardSummary {
    /// First name when set, otherwise the email.
    pub display_name: String,
    pub email: String,
    pub user_id: Uuid,
    pub last_sign_in_at: Option<DateTime<Utc>>,
}

pub async fn dashboard_summary(db: &dyn DatabaseService, user: &SessionUser) -> DashboardSummary {
    let first_name = match db.get_profile(user.user_id).await {
        Ok(profile) => profile.and_then(|p| p.first_name).filter(|n| !n.is_empty()),
        Err(e) => {
            warn!("Error loading profile {}: {}", user.user_id, e);
            None
        }
    };
    DashboardSummary {
        display_name: first_name.unwrap_or_else(|| user.email.clone()),
        email: user.email.clone(),
        user_id: user.user_id,
        last_sign_in_at: user.last_sign_in_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{blank_profile, MemoryIdentity, MemoryStore};

    fn session_user(user_id: Uuid) -> SessionUser {
        SessionUser {
            user_id,
            email: "ana@example.com".to_string(),
            last_sign_in_at: None,
        }
    }

    #[tokio::test]
    async fn password_sign_in_goes_to_dashboard() {
        let identity = MemoryIdentity::new();
        identity.register("ana@example.com", "secret123");
        let (session, route) = sign_in(&identity, " ana@example.com ", "secret123")
            .await
            .unwrap();
        assert_eq!(route, Route::Dashboard);
        assert_eq!(session.user.email, "ana@example.com");
    }

    #[tokio::test]
    async fn bad_credentials_are_reported_inline() {
        let identity = MemoryIdentity::new();
        identity.register("ana@example.com", "secret123");
        let err = sign_in(&identity, "ana@example.com", "wrong").await.unwrap_err();
        assert!(matches!(err, AccountError::InvalidCredentials));

        let err = sign_in(&identity, "not-an-email", "x").await.unwrap_err();
        assert!(matches!(
            err,
            AccountError::Validation(ValidationError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn magic_link_round_trip() {
        let identity = MemoryIdentity::new();
        request_magic_link(&identity, "new@example.com", "https://trustpaws.test/")
            .await
            .unwrap();
        let sent = identity.sent_links();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].redirect_to, "https://trustpaws.test/auth/callback");

        let (session, route) = consume_magic_link(&identity, &sent[0].token).await.unwrap();
        assert_eq!(session.user.email, "new@example.com");
        assert_eq!(route, Route::Dashboard);

        // Single use.
        assert!(consume_magic_link(&identity, &sent[0].token).await.is_err());
    }

    #[test]
    fn password_rules_are_checked_locally() {
        let mut change = PasswordChange {
            current_password: None,
            new_password: "abc".to_string(),
            confirm_password: "abc".to_string(),
        };
        assert_eq!(change.validate(), Err(ValidationError::PasswordTooShort));
        change.new_password = "abcdef".to_string();
        assert_eq!(change.validate(), Err(ValidationError::PasswordMismatch));
        change.confirm_password = "abcdef".to_string();
        assert_eq!(change.validate(), Ok(()));
    }

    #[tokio::test]
    async fn password_change_checks_current_password() {
        let identity = MemoryIdentity::new();
        let user_id = identity.register("ana@example.com", "secret123");
        let user = session_user(user_id);
        let mut change = PasswordChange {
            current_password: Some("wrong".to_string()),
            new_password: "newsecret".to_string(),
            confirm_password: "newsecret".to_string(),
        };
        let err = change_password(&identity, &user, &change).await.unwrap_err();
        assert!(matches!(err, AccountError::IncorrectCurrentPassword));

        change.current_password = Some("secret123".to_string());
        change_password(&identity, &user, &change).await.unwrap();
        assert!(identity
            .sign_in_with_password("ana@example.com", "newsecret")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn ensure_profile_creates_once() {
        let db = MemoryStore::new();
        let user = session_user(Uuid::new_v4());
        let first = ensure_profile(&db, &user).await.unwrap();
        let second = ensure_profile(&db, &user).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.role, None);
        assert_eq!(db.count("insert_profile"), 1);
    }

    #[tokio::test]
    async fn settings_round_trip_and_read_failures_are_empty() {
        let db = MemoryStore::new();
        let id = Uuid::new_v4();
        db.seed_profile(blank_profile(id, "ana@example.com", None));
        let details = ProfileDetails {
            first_name: " Ana ".to_string(),
            last_name: "Silva".to_string(),
            username: "ana".to_string(),
            phone_number: "+55 11 99999-0000".to_string(),
        };
        save_settings(&db, id, &details).await.unwrap();
        assert_eq!(load_settings(&db, id).await.first_name, "Ana");

        db.fail_on("get_profile");
        assert_eq!(load_settings(&db, id).await, ProfileDetails::default());
    }

    #[tokio::test]
    async fn dashboard_greets_by_first_name_or_email() {
        let db = MemoryStore::new();
        let user = session_user(Uuid::new_v4());
        assert_eq!(
            dashboard_summary(&db, &user).await.display_name,
            "ana@example.com"
        );
        let mut profile = blank_profile(user.user_id, &user.email, None);
        profile.first_name = Some("Ana".to_string());
        db.seed_profile(profile);
        assert_eq!(dashboard_summary(&db, &user).await.display_name, "Ana");
    }
}
