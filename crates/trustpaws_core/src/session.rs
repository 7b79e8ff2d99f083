//! crates/trustpaws_core/src/session.rs
//!
//! The session context: one holder per client of "who is signed in", kept current
//! by listening to the identity provider's auth-state stream.

use futures::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::domain::SessionUser;
use crate::ports::IdentityProvider;

/// What the rest of the application sees of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSnapshot {
    pub user: Option<SessionUser>,
    pub is_loading: bool,
}

impl SessionSnapshot {
    pub fn loading() -> Self {
        Self {
            user: None,
            is_loading: true,
        }
    }

    pub fn resolved(user: Option<SessionUser>) -> Self {
        Self {
            user,
            is_loading: false,
        }
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self::resolved(Some(user))
    }

    pub fn anonymous() -> Self {
        Self::resolved(None)
    }
}

/// Holds the session for one access token and refreshes it on every relevant
/// auth-state event. Dropping the context unsubscribes from the provider.
pub struct SessionContext {
    state: watch::Receiver<SessionSnapshot>,
    listener: JoinHandle<()>,
}

impl SessionContext {
    /// Subscribes to the provider and starts resolving `access_token`.
    ///
    /// The context starts out loading. Provider failures are not distinguished
    /// from "no session".
    pub fn attach(provider: Arc<dyn IdentityProvider>, access_token: String) -> Self {
        let (tx, rx) = watch::channel(SessionSnapshot::loading());
        // Subscribe before the first lookup so no event can slip between the two.
        let mut changes = provider.auth_state_changes();

        let listener = tokio::spawn(async move {
            let mut current = load(provider.as_ref(), &access_token).await;
            tx.send_replace(SessionSnapshot::resolved(current.clone()));

            while let Some(change) = changes.next().await {
                let Some(user) = &current else {
                    // An anonymous token never becomes signed in.
                    continue;
                };
                if change.user_id != user.user_id {
                    continue;
                }
                debug!(event = ?change.event, user_id = %change.user_id, "Refreshing session");
                current = load(provider.as_ref(), &access_token).await;
                tx.send_replace(SessionSnapshot::resolved(current.clone()));
            }
        });

        Self {
            state: rx,
            listener,
        }
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().clone()
    }

    /// A receiver that is notified whenever the snapshot is replaced.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.state.clone()
    }

    /// Waits for the initial lookup to finish and returns its result.
    pub async fn loaded(&self) -> SessionSnapshot {
        let mut rx = self.state.clone();
        let snapshot = match rx.wait_for(|snapshot| !snapshot.is_loading).await {
            Ok(snapshot) => snapshot.clone(),
            // The listener is gone; treat it as signed out.
            Err(_) => SessionSnapshot::anonymous(),
        };
        snapshot
    }
}

impl Drop for SessionContext {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

async fn load(provider: &dyn IdentityProvider, access_token: &str) -> Option<SessionUser> {
    match provider.get_session(access_token).await {
        Ok(user) => user,
        Err(e) => {
            warn!("Session lookup failed, treating as signed out: {}", e);
            None
        }
    }
}
