//! Server configuration from environment variables
//!
//! - `FLEETWATCH_HOST`: Bind address (default: 0.0.0.0)
//! - `FLEETWATCH_PORT`: Port number (default: 8080)
//! - `FLEETWATCH_DISPATCH_WORKERS`: Concurrent email senders (default: 4)
//! - `FLEETWATCH_DISPATCH_QUEUE`: Pending email slots (default: 256)
//! - `SMTP_HOST`, `SMTP_PORT`, `SMTP_USER`, `SMTP_PASS`: Mail submission;
//!   email alerts are disabled unless all four are set
//! - `SMTP_FROM`: Sender address (default: `SMTP_USER`)
//! - `SMTP_TIMEOUT_SECS`: SMTP connection timeout (default: 10)

use std::time::Duration;

/// Mail submission settings
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: Option<String>,
    pub timeout: Duration,
}

impl SmtpConfig {
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `Ok(None)` when any of host, port, user or password is missing
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let (Some(host), Some(port), Some(username), Some(password)) = (
            get("SMTP_HOST"),
            get("SMTP_PORT"),
            get("SMTP_USER"),
            get("SMTP_PASS"),
        ) else {
            return Ok(None);
        };

        let port = port
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid("SMTP_PORT", port.clone()))?;

        let timeout = match get("SMTP_TIMEOUT_SECS") {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::Invalid("SMTP_TIMEOUT_SECS", raw.clone()))?,
            None => Duration::from_secs(10),
        };

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            from: get("SMTP_FROM"),
            timeout,
        }))
    }
}

/// Notification dispatch pool sizing
#[derive(Debug, Clone, Copy)]
pub struct DispatchConfig {
    pub workers: usize,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 256,
        }
    }
}

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub dispatch: DispatchConfig,
    pub smtp: Option<SmtpConfig>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            dispatch: DispatchConfig::default(),
            smtp: None,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            host: lookup("FLEETWATCH_HOST").unwrap_or(defaults.host),
            port: parse_or("FLEETWATCH_PORT", &lookup, defaults.port)?,
            dispatch: DispatchConfig {
                workers: parse_or(
                    "FLEETWATCH_DISPATCH_WORKERS",
                    &lookup,
                    defaults.dispatch.workers,
                )?,
                queue_capacity: parse_or(
                    "FLEETWATCH_DISPATCH_QUEUE",
                    &lookup,
                    defaults.dispatch.queue_capacity,
                )?,
            },
            smtp: SmtpConfig::from_lookup(&lookup)?,
        })
    }
}

fn parse_or<T, F>(key: &'static str, lookup: &F, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid(key, raw.clone())),
        None => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1:?}")]
    Invalid(&'static str, String),
}
