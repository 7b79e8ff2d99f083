//! services/api/src/adapters/identity.rs
//!
//! The Postgres-backed implementation of the `IdentityProvider` port: password
//! and magic-link sign-in, opaque session tokens in `auth_sessions`, and an
//! in-process broadcast of auth-state changes.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::{FromRow, PgPool};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};
use trustpaws_core::domain::{AuthEvent, AuthSession, AuthStateChange, SessionUser};
use trustpaws_core::ports::{AuthStateStream, IdentityProvider, PortError, PortResult};
use uuid::Uuid;

use crate::adapters::mailer::Mailer;

const EVENT_BUFFER: usize = 256;

pub struct PgIdentityAdapter {
    pool: PgPool,
    mailer: Arc<dyn Mailer>,
    events: broadcast::Sender<AuthStateChange>,
    session_ttl: Duration,
    magic_link_ttl: Duration,
}

impl PgIdentityAdapter {
    pub fn new(
        pool: PgPool,
        mailer: Arc<dyn Mailer>,
        session_ttl: Duration,
        magic_link_ttl: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        Self {
            pool,
            mailer,
            events,
            session_ttl,
            magic_link_ttl,
        }
    }

    fn emit(&self, event: AuthEvent, user_id: Uuid) {
        // Err only means nobody is listening.
        let _ = self.events.send(AuthStateChange { event, user_id });
    }

    /// Stamps the sign-in time and issues a new session token.
    async fn start_session(&self, user_id: Uuid) -> PortResult<AuthSession> {
        let user = sqlx::query_as::<_, UserRecord>(
            "UPDATE users SET last_sign_in_at = NOW() WHERE id = $1 \
             RETURNING id, email, last_sign_in_at",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or_else(|| PortError::NotFound(format!("User {} not found", user_id)))?;

        let access_token = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.session_ttl;
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&access_token)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        self.emit(AuthEvent::SignedIn, user_id);
        Ok(AuthSession {
            access_token,
            user: user.to_domain(),
            expires_at,
        })
    }

    /// Looks up a password identity and checks the password against it.
    async fn verify_credentials(&self, email: &str, password: &str) -> PortResult<Uuid> {
        let record = sqlx::query_as::<_, CredentialsRecord>(
            "SELECT id, password_hash FROM users WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?
        .ok_or(PortError::InvalidCredentials)?;

        let hash = record.password_hash.ok_or(PortError::InvalidCredentials)?;
        if !verify_password(&hash, password)? {
            return Err(PortError::InvalidCredentials);
        }
        Ok(record.id)
    }
}

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

pub fn hash_password(password: &str) -> PortResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            PortError::Unexpected("Failed to hash password".to_string())
        })
}

pub fn verify_password(stored_hash: &str, password: &str) -> PortResult<bool> {
    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        PortError::Unexpected("Authentication error".to_string())
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}

//=========================================================================================
// Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    id: Uuid,
    email: String,
    last_sign_in_at: Option<DateTime<Utc>>,
}
impl UserRecord {
    fn to_domain(self) -> SessionUser {
        SessionUser {
            user_id: self.id,
            email: self.email,
            last_sign_in_at: self.last_sign_in_at,
        }
    }
}

#[derive(FromRow)]
struct CredentialsRecord {
    id: Uuid,
    password_hash: Option<String>,
}

//=========================================================================================
// `IdentityProvider` Trait Implementation
//=========================================================================================

#[async_trait]
impl IdentityProvider for PgIdentityAdapter {
    async fn sign_in_with_password(&self, email: &str, password: &str) -> PortResult<AuthSession> {
        let user_id = self.verify_credentials(email, password).await?;
        self.start_session(user_id).await
    }

    async fn send_magic_link(&self, email: &str, redirect_to: &str) -> PortResult<()> {
        let user_id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (id, email) VALUES ($1, $2) \
             ON CONFLICT (email) DO UPDATE SET email = EXCLUDED.email \
             RETURNING id",
        )
        .bind(Uuid::new_v4())
        .bind(email.to_lowercase())
        .fetch_one(&self.pool)
        .await
        .map_err(unexpected)?;

        let token = Uuid::new_v4().simple().to_string();
        sqlx::query("INSERT INTO magic_links (token, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(user_id)
            .bind(Utc::now() + self.magic_link_ttl)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        let link = format!("{}?token={}", redirect_to, token);
        self.mailer.send_magic_link(email, &link).await?;
        info!("Magic link issued for user {}", user_id);
        Ok(())
    }

    async fn consume_magic_link(&self, token: &str) -> PortResult<AuthSession> {
        let user_id: Option<Uuid> = sqlx::query_scalar(
            "UPDATE magic_links SET consumed_at = NOW() \
             WHERE token = $1 AND consumed_at IS NULL AND expires_at > NOW() \
             RETURNING user_id",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        match user_id {
            Some(user_id) => self.start_session(user_id).await,
            None => {
                warn!("Rejected an unknown, used or expired magic link");
                Err(PortError::Unauthorized)
            }
        }
    }

    async fn get_session(&self, access_token: &str) -> PortResult<Option<SessionUser>> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT u.id, u.email, u.last_sign_in_at \
             FROM auth_sessions s JOIN users u ON u.id = s.user_id \
             WHERE s.id = $1 AND s.expires_at > NOW()",
        )
        .bind(access_token)
        .fetch_optional(&self.pool)
        .await
        .map_err(unexpected)?;

        Ok(record.map(UserRecord::to_domain))
    }

    async fn sign_out(&self, access_token: &str) -> PortResult<()> {
        let user_id: Option<Uuid> =
            sqlx::query_scalar("DELETE FROM auth_sessions WHERE id = $1 RETURNING user_id")
                .bind(access_token)
                .fetch_optional(&self.pool)
                .await
                .map_err(unexpected)?;

        if let Some(user_id) = user_id {
            self.emit(AuthEvent::SignedOut, user_id);
        }
        Ok(())
    }

    async fn reauthenticate(&self, email: &str, password: &str) -> PortResult<()> {
        self.verify_credentials(email, password).await.map(|_| ())
    }

    async fn update_password(&self, user_id: Uuid, new_password: &str) -> PortResult<()> {
        let hash = hash_password(new_password)?;
        let result = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
            .bind(user_id)
            .bind(hash)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;

        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("User {} not found", user_id)));
        }
        self.emit(AuthEvent::PasswordUpdated, user_id);
        Ok(())
    }

    fn auth_state_changes(&self) -> AuthStateStream {
        let mut rx = self.events.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(change) => yield change,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Auth-state subscriber lagged, skipped {} events", skipped);
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}
