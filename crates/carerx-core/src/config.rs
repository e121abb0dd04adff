//! Runtime settings.
//!
//! Defaults suit a single clinic deployment. Hosts override them through
//! `CARERX_*` environment variables (a `.env` file is honoured) or by
//! building a [`LedgerConfig`] directly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const ENV_INVITE_TTL_DAYS: &str = "CARERX_INVITE_TTL_DAYS";
pub const ENV_MIN_PASSWORD_LENGTH: &str = "CARERX_MIN_PASSWORD_LENGTH";
pub const ENV_BUSY_TIMEOUT_MS: &str = "CARERX_BUSY_TIMEOUT_MS";
pub const ENV_STRICT_INTEGRITY: &str = "CARERX_STRICT_INTEGRITY";

/// Configuration errors.
#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for {name}: '{value}'")]
    InvalidValue { name: &'static str, value: String },
}

/// Settings for the ledger and invite services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Lifetime of a freshly issued invite.
    pub invite_ttl_days: u32,
    /// Minimum password length for accounts created on invite accept.
    pub min_password_length: usize,
    /// How long a writer waits on a locked database before giving up.
    pub busy_timeout_ms: u64,
    /// Fail dispense requests when the ledger already holds more than
    /// was prescribed for some item.
    pub strict_integrity: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            invite_ttl_days: 7,
            min_password_length: 8,
            busy_timeout_ms: 5_000,
            strict_integrity: true,
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Missing .env is fine
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each variable.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_INVITE_TTL_DAYS) {
            config.invite_ttl_days = parse_positive(ENV_INVITE_TTL_DAYS, &value)?;
        }
        if let Some(value) = lookup(ENV_MIN_PASSWORD_LENGTH) {
            config.min_password_length = parse_positive(ENV_MIN_PASSWORD_LENGTH, &value)?;
        }
        if let Some(value) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = parse_value(ENV_BUSY_TIMEOUT_MS, &value)?;
        }
        if let Some(value) = lookup(ENV_STRICT_INTEGRITY) {
            config.strict_integrity = parse_bool(ENV_STRICT_INTEGRITY, &value)?;
        }

        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        name,
        value: value.to_string(),
    })
}

fn parse_positive<T>(name: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialEq + Default,
{
    let parsed: T = parse_value(name, value)?;
    if parsed == T::default() {
        return Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        });
    }
    Ok(parsed)
}

fn parse_bool(name: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            name,
            value: value.to_string(),
        }),
    }
}
