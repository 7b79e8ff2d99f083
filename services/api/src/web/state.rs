//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-user onboarding wizards.

use crate::config::Config;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use trustpaws_core::ports::{DatabaseService, IdentityProvider};
use trustpaws_core::wizard::Wizard;
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub identity: Arc<dyn IdentityProvider>,
    pub config: Arc<Config>,
    pub wizards: Arc<WizardRegistry>,
}

impl AppState {
    pub fn new(
        db: Arc<dyn DatabaseService>,
        identity: Arc<dyn IdentityProvider>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            db,
            identity,
            config,
            wizards: Arc::new(WizardRegistry::default()),
        }
    }
}

//=========================================================================================
// WizardRegistry (One In-Progress Wizard per User)
//=========================================================================================

/// Wizards untouched for this long are dropped on the next access.
pub const WIZARD_IDLE_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

struct Entry {
    wizard: Arc<Mutex<Wizard>>,
    touched: Instant,
}

/// In-progress onboarding wizards, keyed by user. Nothing here is persisted:
/// a server restart sends the user back to the first step.
#[derive(Default)]
pub struct WizardRegistry {
    wizards: Mutex<HashMap<Uuid, Entry>>,
}

impl WizardRegistry {
    /// The user's wizard, starting a fresh one on `today` if there is none.
    pub async fn get_or_start(&self, user_id: Uuid, today: NaiveDate) -> Arc<Mutex<Wizard>> {
        self.forget_idle(WIZARD_IDLE_TIMEOUT).await;
        let mut wizards = self.wizards.lock().await;
        let entry = wizards.entry(user_id).or_insert_with(|| Entry {
            wizard: Arc::new(Mutex::new(Wizard::new(today))),
            touched: Instant::now(),
        });
        entry.touched = Instant::now();
        entry.wizard.clone()
    }

    /// Drops the user's wizard, e.g. after it was saved or the user signed out.
    pub async fn clear(&self, user_id: Uuid) {
        self.wizards.lock().await.remove(&user_id);
    }

    /// Drops every wizard idle for at least `max_idle`, returning how many went.
    pub async fn forget_idle(&self, max_idle: Duration) -> usize {
        let mut wizards = self.wizards.lock().await;
        let before = wizards.len();
        wizards.retain(|_, entry| entry.touched.elapsed() < max_idle);
        before - wizards.len()
    }

    pub async fn len(&self) -> usize {
        self.wizards.lock().await.len()
    }
}
