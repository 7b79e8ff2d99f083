//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::net::SocketAddr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// SMTP settings for delivering magic links.
#[derive(Clone, Debug)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from_address: String,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    /// Public origin of the web app; used for CORS and magic-link redirects.
    pub site_url: String,
    pub session_ttl_days: i64,
    pub magic_link_ttl_minutes: i64,
    /// When absent, magic links are written to the log instead of emailed.
    pub smtp: Option<SmtpConfig>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // --- Server and Database Settings ---
        let bind_address_str = lookup("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:3000".to_string());
        let bind_address = bind_address_str.parse::<SocketAddr>().map_err(|e| {
            ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string())
        })?;

        let database_url =
            lookup("DATABASE_URL").ok_or_else(|| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let site_url = lookup("SITE_URL")
            .unwrap_or_else(|| "http://localhost:3000".to_string())
            .trim_end_matches('/')
            .to_string();

        // --- Auth Settings ---
        let session_ttl_days = parse_positive(&lookup, "SESSION_TTL_DAYS", 30)?;
        let magic_link_ttl_minutes = parse_positive(&lookup, "MAGIC_LINK_TTL_MINUTES", 60)?;

        // --- Mail Settings (optional as a group) ---
        let smtp = match lookup("SMTP_HOST") {
            None => None,
            Some(host) => {
                let port_str = lookup("SMTP_PORT").unwrap_or_else(|| "587".to_string());
                let port = port_str.parse::<u16>().map_err(|e| {
                    ConfigError::InvalidValue("SMTP_PORT".to_string(), e.to_string())
                })?;
                let require = |key: &str| {
                    lookup(key).ok_or_else(|| ConfigError::MissingVar(key.to_string()))
                };
                Some(SmtpConfig {
                    host,
                    port,
                    username: require("SMTP_USERNAME")?,
                    password: require("SMTP_PASSWORD")?,
                    from_address: require("MAIL_FROM")?,
                })
            }
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            site_url,
            session_ttl_days,
            magic_link_ttl_minutes,
            smtp,
        })
    }
}

fn parse_positive<F>(lookup: &F, key: &str, default: i64) -> Result<i64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<i64>() {
            Ok(value) if value > 0 => Ok(value),
            _ => Err(ConfigError::InvalidValue(
                key.to_string(),
                format!("'{}' is not a positive integer", raw),
            )),
        },
    }
}
