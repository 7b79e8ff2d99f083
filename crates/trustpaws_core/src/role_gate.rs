//! crates/trustpaws_core/src/role_gate.rs
//!
//! Decides which screen a visitor lands on, from their session and the role
//! stored on their profile.

use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{Role, Route};
use crate::ports::{DatabaseService, PortResult};
use crate::session::SessionSnapshot;

/// Progress of the one-off role lookup for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleLookup {
    Pending,
    /// `None` covers both "no profile row" and "role not chosen yet".
    Resolved(Option<Role>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Session or role still loading; show a spinner.
    Loading,
    /// Present the tutor / sitter chooser.
    ChooseRole,
    /// Leave the gate for another route.
    Navigate(Route),
}

/// The route each role lands on once chosen.
pub fn dashboard_for(role: Role) -> Route {
    match role {
        Role::Tutor => Route::TutorDashboard,
        Role::Sitter => Route::SitterDashboard,
    }
}

/// Pure gate decision.
pub fn decide(session: &SessionSnapshot, lookup: RoleLookup) -> GateDecision {
    if session.is_loading {
        return GateDecision::Loading;
    }
    if session.user.is_none() {
        return GateDecision::Navigate(Route::Login);
    }
    match lookup {
        RoleLookup::Pending => GateDecision::Loading,
        RoleLookup::Resolved(None) => GateDecision::ChooseRole,
        RoleLookup::Resolved(Some(role)) => GateDecision::Navigate(dashboard_for(role)),
    }
}

/// Reads the stored role for `user_id`, once.
///
/// A store failure is logged and reported as "no role", which sends the user to
/// the chooser exactly like a first visit does.
pub async fn lookup_role(db: &dyn DatabaseService, user_id: Uuid) -> RoleLookup {
    match db.get_profile(user_id).await {
        Ok(profile) => RoleLookup::Resolved(profile.and_then(|p| p.role)),
        Err(e) => {
            warn!("Failed to load role for user {}: {}", user_id, e);
            RoleLookup::Resolved(None)
        }
    }
}

/// Resolves the gate for a settled session, fetching the role if needed.
pub async fn resolve(db: &dyn DatabaseService, session: &SessionSnapshot) -> GateDecision {
    let lookup = match &session.user {
        Some(user) if !session.is_loading => lookup_role(db, user.user_id).await,
        _ => RoleLookup::Pending,
    };
    decide(session, lookup)
}

/// Stores the chosen role and returns where the user goes next: tutors start
/// the onboarding wizard, sitters go straight to their dashboard.
pub async fn choose_role(db: &dyn DatabaseService, user_id: Uuid, role: Role) -> PortResult<Route> {
    db.update_profile_role(user_id, role).await?;
    info!("User {} chose role {}", user_id, role);
    Ok(match role {
        Role::Tutor => Route::TutorOnboarding,
        Role::Sitter => Route::SitterDashboard,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionUser;
    use crate::testing::{blank_profile, MemoryStore};

    fn user(id: Uuid) -> SessionSnapshot {
        SessionSnapshot::signed_in(SessionUser {
            user_id: id,
            email: "ana@example.com".to_string(),
            last_sign_in_at: None,
        })
    }

    #[test]
    fn anonymous_visitors_go_to_login() {
        assert_eq!(
            decide(&SessionSnapshot::anonymous(), RoleLookup::Pending),
            GateDecision::Navigate(Route::Login)
        );
    }

    #[test]
    fn loading_session_shows_spinner() {
        assert_eq!(
            decide(&SessionSnapshot::loading(), RoleLookup::Pending),
            GateDecision::Loading
        );
        assert_eq!(
            decide(&user(Uuid::new_v4()), RoleLookup::Pending),
            GateDecision::Loading
        );
    }

    #[test]
    fn role_selects_dashboard() {
        let session = user(Uuid::new_v4());
        assert_eq!(
            decide(&session, RoleLookup::Resolved(Some(Role::Tutor))),
            GateDecision::Navigate(Route::TutorDashboard)
        );
        assert_eq!(
            decide(&session, RoleLookup::Resolved(Some(Role::Sitter))),
            GateDecision::Navigate(Route::SitterDashboard)
        );
        assert_eq!(
            decide(&session, RoleLookup::Resolved(None)),
            GateDecision::ChooseRole
        );
    }

    #[tokio::test]
    async fn missing_profile_shows_chooser() {
        let db = MemoryStore::new();
        let decision = resolve(&db, &user(Uuid::new_v4())).await;
        assert_eq!(decision, GateDecision::ChooseRole);
    }

    #[tokio::test]
    async fn stored_role_is_followed() {
        let db = MemoryStore::new();
        let id = Uuid::new_v4();
        db.seed_profile(blank_profile(id, "ana@example.com", Some(Role::Sitter)));
        assert_eq!(
            resolve(&db, &user(id)).await,
            GateDecision::Navigate(Route::SitterDashboard)
        );
    }

    #[tokio::test]
    async fn read_failure_falls_through_to_chooser() {
        let db = MemoryStore::new();
        let id = Uuid::new_v4();
        db.seed_profile(blank_profile(id, "ana@example.com", Some(Role::Tutor)));
        db.fail_on("get_profile");
        assert_eq!(resolve(&db, &user(id)).await, GateDecision::ChooseRole);
    }

    #[tokio::test]
    async fn anonymous_resolve_does_not_touch_store() {
        let db = MemoryStore::new();
        let decision = resolve(&db, &SessionSnapshot::anonymous()).await;
        assert_eq!(decision, GateDecision::Navigate(Route::Login));
        assert!(db.calls().is_empty());
    }

    #[tokio::test]
    async fn choosing_a_role_writes_it_and_routes() {
        let db = MemoryStore::new();
        let id = Uuid::new_v4();
        db.seed_profile(blank_profile(id, "ana@example.com", None));

        let route = choose_role(&db, id, Role::Tutor).await.unwrap();
        assert_eq!(route, Route::TutorOnboarding);
        assert_eq!(db.profile(id).unwrap().role, Some(Role::Tutor));

        let route = choose_role(&db, id, Role::Sitter).await.unwrap();
        assert_eq!(route, Route::SitterDashboard);
    }

    #[tokio::test]
    async fn failed_role_write_is_reported() {
        let db = MemoryStore::new();
        db.fail_on("update_profile_role");
        assert!(choose_role(&db, Uuid::new_v4(), Role::Sitter).await.is_err());
    }
}
