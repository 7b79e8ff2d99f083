//! crates/trustpaws_core/src/testing.rs
//!
//! In-memory implementations of the ports, with call recording and failure
//! injection. Compiled for this crate's tests and behind the `testing` feature
//! for dependents.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::{
    AuthEvent, AuthSession, AuthStateChange, NewPetsProfile, NewProfile, Pet, PetDraft,
    PetsProfile, Profile, ProfileDetails, Role, SessionUser,
};
use crate::ports::{AuthStateStream, DatabaseService, IdentityProvider, PortError, PortResult};

//=========================================================================================
// Identity provider
//=========================================================================================

struct MemoryUser {
    user_id: Uuid,
    password: Option<String>,
    last_sign_in_at: Option<chrono::DateTime<Utc>>,
}

/// A magic link that was "emailed" by [`MemoryIdentity`].
#[derive(Debug, Clone)]
pub struct SentLink {
    pub email: String,
    pub redirect_to: String,
    pub token: String,
}

pub struct MemoryIdentity {
    users: Mutex<HashMap<String, MemoryUser>>,
    sessions: Mutex<HashMap<String, String>>,
    links: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<SentLink>>,
    events: broadcast::Sender<AuthStateChange>,
}

impl Default for MemoryIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            users: Mutex::new(HashMap::new()),
            sessions: Mutex::new(HashMap::new()),
            links: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            events,
        }
    }

    /// Creates a password identity and returns its user id.
    pub fn register(&self, email: &str, password: &str) -> Uuid {
        let user_id = Uuid::new_v4();
        self.users.lock().unwrap().insert(
            email.to_string(),
            MemoryUser {
                user_id,
                password: Some(password.to_string()),
                last_sign_in_at: None,
            },
        );
        user_id
    }

    /// Magic links sent so far, oldest first.
    pub fn sent_links(&self) -> Vec<SentLink> {
        self.sent.lock().unwrap().clone()
    }

    fn start_session(&self, email: &str) -> PortResult<AuthSession> {
        let user = {
            let mut users = self.users.lock().unwrap();
            let record = users
                .get_mut(email)
                .ok_or(PortError::InvalidCredentials)?;
            record.last_sign_in_at = Some(Utc::now());
            SessionUser {
                user_id: record.user_id,
                email: email.to_string(),
                last_sign_in_at: record.last_sign_in_at,
            }
        };
        let access_token = Uuid::new_v4().to_string();
        self.sessions
            .lock()
            .unwrap()
            .insert(access_token.clone(), email.to_string());
        self.emit(AuthEvent::SignedIn, user.user_id);
        Ok(AuthSession {
            access_token,
            user,
            expires_at: Utc::now() + Duration::days(30),
        })
    }

    fn emit(&self, event: AuthEvent, user_id: Uuid) {
        // No subscribers is fine.
        let _ = self.events.send(AuthStateChange { event, user_id });
    }

    fn check_password(&self, email: &str, password: &str) -> PortResult<()> {
        let users = self.users.lock().unwrap();
        match users.get(email) {
            Some(MemoryUser {
                password: Some(stored),
                ..
            }) if stored == password => Ok(()),
            _ => Err(PortError::InvalidCredentials),
        }
    }
}

#[async_trait]
impl IdentityProvider for MemoryIdentity {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        self.check_password(email, password)?;
        self.start_session(email)
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> PortResult<()> {
        self.users
            .lock()
            .unwrap()
            .entry(email.to_string())
            .or_insert_with(|| MemoryUser {
                user_id: Uuid::new_v4(),
                password: None,
                last_sign_in_at: None,
            });
        let token = Uuid::new_v4().simple().to_string();
        self.links
            .lock()
            .unwrap()
            .insert(token.clone(), email.to_string());
        self.sent.lock().unwrap().push(SentLink {
            email: email.to_string(),
            redirect_to: redirect_to.to_string(),
            token,
        });
        Ok(())
    }

    async fn consume_magic_link(&self, token: &str) -> PortResult<AuthSession> {
        let email = self
            .links
            .lock()
            .unwrap()
            .remove(token)
            .ok_or(PortError::InvalidCredentials)?;
        self.start_session(&email)
    }

    async fn get_session(&self, access_token: &str) -> PortResult<Option<SessionUser>> {
        let Some(email) = self.sessions.lock().unwrap().get(access_token).cloned() else {
            return Ok(None);
        };
        let users = self.users.lock().unwrap();
        Ok(users.get(&email).map(|record| SessionUser {
            user_id: record.user_id,
            email: email.clone(),
            last_sign_in_at: record.last_sign_in_at,
        }))
    }

    async fn sign_out(&self, access_token: &str) -> PortResult<()> {
        let Some(email) = self.sessions.lock().unwrap().remove(access_token) else {
            return Ok(());
        };
        let user_id = self.users.lock().unwrap().get(&email).map(|u| u.user_id);
        if let Some(user_id) = user_id {
            self.emit(AuthEvent::SignedOut, user_id);
        }
        Ok(())
    }

    async fn reauthenticate(&self, email: &str, password: &str) -> PortResult<()> {
        self.check_password(email, password)
    }

    async fn update_password(&self, user_id: Uuid, new_password: &str) -> PortResult<()> {
        {
            let mut users = self.users.lock().unwrap();
            let record = users
                .values_mut()
                .find(|u| u.user_id == user_id)
                .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;
            record.password = Some(new_password.to_string());
        }
        self.emit(AuthEvent::PasswordUpdated, user_id);
        Ok(())
    }

    fn auth_state_changes(&self) -> AuthStateStream {
        let rx = self.events.subscribe();
        Box::pin(futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(change) => return Some((change, rx)),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        }))
    }
}

//=========================================================================================
// Relational store
//=========================================================================================

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    pets: Vec<Pet>,
    pets_profiles: Vec<PetsProfile>,
    next_id: i64,
}

/// An in-memory `DatabaseService`. Every call is recorded by method name, and
/// any method can be made to fail with [`MemoryStore::fail_on`].
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    calls: Mutex<Vec<&'static str>>,
    failing: Mutex<HashSet<&'static str>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later call to `operation` fail with `PortError::Unexpected`.
    pub fn fail_on(&self, operation: &'static str) {
        self.failing.lock().unwrap().insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.failing.lock().unwrap().remove(operation);
    }

    /// Method names called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, operation: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| **c == operation)
            .count()
    }

    pub fn profile(&self, user_id: Uuid) -> Option<Profile> {
        self.tables.lock().unwrap().profiles.get(&user_id).cloned()
    }

    pub fn pets_profiles(&self) -> Vec<PetsProfile> {
        self.tables.lock().unwrap().pets_profiles.clone()
    }

    /// Seeds a profile without recording a call.
    pub fn seed_profile(&self, profile: Profile) {
        self.tables
            .lock()
            .unwrap()
            .profiles
            .insert(profile.id, profile);
    }

    fn enter(&self, operation: &'static str) -> PortResult<()> {
        self.calls.lock().unwrap().push(operation);
        if self.failing.lock().unwrap().contains(operation) {
            return Err(PortError::Unexpected(format!("{} failed", operation)));
        }
        Ok(())
    }
}

/// A profile with only an id and email set.
pub fn blank_profile(id: Uuid, email: &str, role: Option<Role>) -> Profile {
    Profile {
        id,
        email: Some(email.to_string()),
        first_name: None,
        last_name: None,
        username: None,
        phone_number: None,
        role,
    }
}

#[async_trait]
impl DatabaseService for MemoryStore {
    async fn get_profile(&self, user_id: Uuid) -> PortResult<Option<Profile>> {
        self.enter("get_profile")?;
        Ok(self.profile(user_id))
    }

    async fn insert_profile(&self, profile: NewProfile) -> PortResult<Profile> {
        self.enter("insert_profile")?;
        let mut tables = self.tables.lock().unwrap();
        if tables.profiles.contains_key(&profile.id) {
            return Err(PortError::Unexpected(format!(
                "duplicate key: profile {}",
                profile.id
            )));
        }
        let row = blank_profile(profile.id, &profile.email, profile.role);
        tables.profiles.insert(row.id, row.clone());
        Ok(row)
    }

    async fn upsert_profile_details(
        &self,
        user_id: Uuid,
        details: &ProfileDetails,
    ) -> PortResult<Profile> {
        self.enter("upsert_profile_details")?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables.profiles.entry(user_id).or_insert_with(|| Profile {
            id: user_id,
            email: None,
            first_name: None,
            last_name: None,
            username: None,
            phone_number: None,
            role: None,
        });
        row.first_name = Some(details.first_name.clone());
        row.last_name = Some(details.last_name.clone());
        row.username = Some(details.username.clone());
        row.phone_number = Some(details.phone_number.clone());
        Ok(row.clone())
    }

    async fn update_profile_role(&self, user_id: Uuid, role: Role) -> PortResult<()> {
        self.enter("update_profile_role")?;
        // Like an UPDATE ... WHERE id = $1, a missing row is not an error.
        if let Some(row) = self.tables.lock().unwrap().profiles.get_mut(&user_id) {
            row.role = Some(role);
        }
        Ok(())
    }

    async fn list_pets(&self, tutor_id: Uuid) -> PortResult<Vec<Pet>> {
        self.enter("list_pets")?;
        let tables = self.tables.lock().unwrap();
        let mut pets: Vec<Pet> = tables
            .pets
            .iter()
            .filter(|p| p.tutor_id == tutor_id)
            .cloned()
            .collect();
        pets.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(pets)
    }

    async fn insert_pet(&self, tutor_id: Uuid, pet: &PetDraft) -> PortResult<Pet> {
        self.enter("insert_pet")?;
        let mut tables = self.tables.lock().unwrap();
        // pets.tutor_id references profiles(id).
        if !tables.profiles.contains_key(&tutor_id) {
            return Err(PortError::Unexpected(format!(
                "foreign key violation: no profile {}",
                tutor_id
            )));
        }
        tables.next_id += 1;
        let row = Pet {
            id: tables.next_id,
            tutor_id,
            details: pet.clone(),
        };
        tables.pets.push(row.clone());
        Ok(row)
    }

    async fn update_pet(&self, pet_id: i64, tutor_id: Uuid, pet: &PetDraft) -> PortResult<Pet> {
        self.enter("update_pet")?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .pets
            .iter_mut()
            .find(|p| p.id == pet_id && p.tutor_id == tutor_id)
            .ok_or_else(|| PortError::NotFound(format!("Pet {} not found", pet_id)))?;
        let photo = pet.photo.clone().or_else(|| row.details.photo.take());
        row.details = pet.clone();
        row.details.photo = photo;
        Ok(row.clone())
    }

    async fn set_pet_photo(&self, pet_id: i64, tutor_id: Uuid, photo: &str) -> PortResult<()> {
        self.enter("set_pet_photo")?;
        let mut tables = self.tables.lock().unwrap();
        let row = tables
            .pets
            .iter_mut()
            .find(|p| p.id == pet_id && p.tutor_id == tutor_id)
            .ok_or_else(|| PortError::NotFound(format!("Pet {} not found", pet_id)))?;
        row.details.photo = Some(photo.to_string());
        Ok(())
    }

    async fn delete_pet(&self, pet_id: i64, tutor_id: Uuid) -> PortResult<()> {
        self.enter("delete_pet")?;
        self.tables
            .lock()
            .unwrap()
            .pets
            .retain(|p| !(p.id == pet_id && p.tutor_id == tutor_id));
        Ok(())
    }

    async fn insert_pets_profile(&self, record: NewPetsProfile) -> PortResult<PetsProfile> {
        self.enter("insert_pets_profile")?;
        let mut tables = self.tables.lock().unwrap();
        tables.next_id += 1;
        let row = PetsProfile {
            id: tables.next_id,
            user_id: record.user_id,
            pet_types: record.pet_types,
            pet_count: record.pet_count,
            location: record.location,
            created_at: record.created_at,
        };
        tables.pets_profiles.push(row.clone());
        Ok(row)
    }

    async fn latest_pets_profile(&self, user_id: Uuid) -> PortResult<Option<PetsProfile>> {
        self.enter("latest_pets_profile")?;
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .pets_profiles
            .iter()
            .filter(|p| p.user_id == user_id)
            .max_by_key(|p| p.id)
            .cloned())
    }
}
