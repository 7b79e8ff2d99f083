//! crates/trustpaws_core/src/navigation.rs
//!
//! Links shown in the site's top navigation bar.

use serde::Serialize;

use crate::domain::Route;
use crate::session::SessionSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NavAction {
    /// A plain link to `href`.
    Link,
    /// Ends the session when clicked.
    SignOut,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavLink {
    pub label: &'static str,
    pub href: &'static str,
    pub action: NavAction,
}

impl NavLink {
    fn to(label: &'static str, route: Route) -> Self {
        Self {
            label,
            href: route.path(),
            action: NavAction::Link,
        }
    }
}

/// Home and the sitter search are always shown. Session links appear only once
/// the session has loaded.
pub fn nav_links(session: &SessionSnapshot) -> Vec<NavLink> {
    let mut links = vec![
        NavLink::to("Home", Route::Home),
        NavLink::to("Find a pet sitter", Route::Services),
    ];
    if session.is_loading {
        return links;
    }
    if session.user.is_some() {
        links.push(NavLink::to("Dashboard", Route::Dashboard));
        links.push(NavLink {
            label: "Sign Out",
            href: Route::Home.path(),
            action: NavAction::SignOut,
        });
    } else {
        links.push(NavLink::to("Login", Route::Login));
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionUser;
    use uuid::Uuid;

    fn labels(session: &SessionSnapshot) -> Vec<&'static str> {
        nav_links(session).iter().map(|l| l.label).collect()
    }

    #[test]
    fn links_follow_the_session() {
        assert_eq!(
            labels(&SessionSnapshot::loading()),
            vec!["Home", "Find a pet sitter"]
        );
        assert_eq!(
            labels(&SessionSnapshot::anonymous()),
            vec!["Home", "Find a pet sitter", "Login"]
        );
        let signed_in = SessionSnapshot::signed_in(SessionUser {
            user_id: Uuid::new_v4(),
            email: "ana@example.com".to_string(),
            last_sign_in_at: None,
        });
        assert_eq!(
            labels(&signed_in),
            vec!["Home", "Find a pet sitter", "Dashboard", "Sign Out"]
        );
        assert_eq!(nav_links(&signed_in)[3].action, NavAction::SignOut);
    }
}
