//! services/api/src/adapters/mailer.rs
//!
//! Outbound mail for magic links. SMTP goes through `lettre`; without SMTP
//! settings the link is written to the log so local sign-in still works.

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;
use trustpaws_core::ports::{PortError, PortResult};

use crate::config::SmtpConfig;

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_magic_link(&self, to: &str, link: &str) -> PortResult<()>;
}

pub fn magic_link_body(link: &str) -> String {
    format!(
        "Hi!\n\nClick the link below to sign in to TrustPaws:\n\n{}\n\n\
         If you did not ask for this email you can ignore it.\n",
        link
    )
}

//=========================================================================================
// SMTP
//=========================================================================================

pub struct SmtpMailer {
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }
}

fn send_blocking(config: &SmtpConfig, to: &str, subject: &str, body: String) -> PortResult<()> {
    let creds = Credentials::new(config.username.clone(), config.password.clone());

    let transport = SmtpTransport::relay(&config.host)
        .map_err(|e| PortError::Unexpected(format!("SMTP relay error: {}", e)))?
        .port(config.port)
        .credentials(creds)
        .build();

    let email = Message::builder()
        .from(
            config
                .from_address
                .parse()
                .map_err(|e| PortError::Unexpected(format!("Invalid from address: {}", e)))?,
        )
        .to(to
            .parse()
            .map_err(|e| PortError::Unexpected(format!("Invalid to address: {}", e)))?)
        .subject(subject)
        .body(body)
        .map_err(|e| PortError::Unexpected(format!("Failed to build email: {}", e)))?;

    transport
        .send(&email)
        .map_err(|e| PortError::Unexpected(format!("SMTP send failed: {}", e)))?;
    Ok(())
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_magic_link(&self, to: &str, link: &str) -> PortResult<()> {
        let config = self.config.clone();
        let to_owned = to.to_string();
        let body = magic_link_body(link);
        tokio::task::spawn_blocking(move || {
            send_blocking(&config, &to_owned, "Your TrustPaws sign-in link", body)
        })
        .await
        .map_err(|e| PortError::Unexpected(format!("Mail task failed: {}", e)))??;

        info!("Magic link emailed to {}", to);
        Ok(())
    }
}

//=========================================================================================
// Log only
//=========================================================================================

/// Used when no SMTP server is configured.
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_magic_link(&self, to: &str, link: &str) -> PortResult<()> {
        info!(to = %to, link = %link, "SMTP not configured; magic link not emailed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_contains_the_link() {
        let body = magic_link_body("https://trustpaws.test/auth/callback?token=abc");
        assert!(body.contains("https://trustpaws.test/auth/callback?token=abc"));
    }

    #[tokio::test]
    async fn log_mailer_always_succeeds() {
        LogMailer
            .send_magic_link("ana@example.com", "https://trustpaws.test/auth/callback?token=abc")
            .await
            .expect("expected logging the link to succeed");
    }
}
