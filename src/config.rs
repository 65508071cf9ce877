//! Environment-driven configuration.
//!
//! All settings come from environment variables and are validated at startup
//! so the process fails fast on a bad deployment.

use std::env;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};

/// Configuration errors raised during startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}")]
    Missing { var: String },

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

/// Runtime configuration for the relay service.
#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres connection string.
    pub database_url: String,
    /// 32-byte key for AES-256-GCM encryption of subscription secrets.
    pub encryption_key: Vec<u8>,
    /// Address the HTTP API binds to.
    pub listen_addr: String,
    /// Dispatcher tick interval in seconds.
    pub dispatch_interval_secs: u64,
    /// Maximum deliveries claimed per tick.
    pub dispatch_batch_size: i32,
    /// Maximum concurrent outbound sends per tick.
    pub dispatch_concurrency: usize,
    /// Outbound HTTP timeout in seconds.
    pub http_timeout_secs: u64,
    /// Maximum delivery attempts before a delivery is terminally failed.
    pub max_delivery_attempts: i32,
    /// Age in seconds after which an in-flight claim is considered stale.
    pub stale_claim_secs: i64,
    /// Interval in seconds between fan-out repair passes.
    pub fanout_repair_interval_secs: u64,
    /// Allow plain-HTTP subscription URLs (development only).
    pub allow_http_urls: bool,
}

impl Config {
    /// Load configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = require("DATABASE_URL")?;

        let key_b64 = require("WEBHOOK_ENCRYPTION_KEY")?;
        let encryption_key = BASE64.decode(&key_b64).map_err(|e| ConfigError::Invalid {
            var: "WEBHOOK_ENCRYPTION_KEY".to_string(),
            reason: format!("not valid base64: {e}"),
        })?;
        if encryption_key.len() != 32 {
            return Err(ConfigError::Invalid {
                var: "WEBHOOK_ENCRYPTION_KEY".to_string(),
                reason: format!("expected 32 bytes after decode, got {}", encryption_key.len()),
            });
        }

        Ok(Self {
            database_url,
            encryption_key,
            listen_addr: optional("LISTEN_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            dispatch_interval_secs: parse_or("DISPATCH_INTERVAL_SECS", 60)?,
            dispatch_batch_size: parse_or("DISPATCH_BATCH_SIZE", 50)?,
            dispatch_concurrency: parse_or("DISPATCH_CONCURRENCY", 8)?,
            http_timeout_secs: parse_or("HTTP_TIMEOUT_SECS", 10)?,
            max_delivery_attempts: parse_or("MAX_DELIVERY_ATTEMPTS", 6)?,
            stale_claim_secs: parse_or("STALE_CLAIM_SECS", 300)?,
            fanout_repair_interval_secs: parse_or("FANOUT_REPAIR_INTERVAL_SECS", 300)?,
            allow_http_urls: parse_or("ALLOW_HTTP_URLS", false)?,
        })
    }
}

fn require(var: &str) -> Result<String, ConfigError> {
    env::var(var).map_err(|_| ConfigError::Missing {
        var: var.to_string(),
    })
}

fn optional(var: &str) -> Option<String> {
    env::var(var).ok().filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(var: &str, default: T) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match optional(var) {
        Some(raw) => raw.parse().map_err(|e| ConfigError::Invalid {
            var: var.to_string(),
            reason: format!("{e}"),
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_or_uses_default_when_unset() {
        // Variable name chosen to not collide with real configuration.
        let value: u64 = parse_or("WEBHOOK_RELAY_TEST_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn test_parse_or_rejects_garbage() {
        env::set_var("WEBHOOK_RELAY_TEST_BAD_VAR", "not-a-number");
        let result: Result<u64, _> = parse_or("WEBHOOK_RELAY_TEST_BAD_VAR", 1);
        assert!(result.is_err());
        env::remove_var("WEBHOOK_RELAY_TEST_BAD_VAR");
    }

    #[test]
    fn test_parse_or_reads_bool() {
        env::set_var("WEBHOOK_RELAY_TEST_BOOL_VAR", "true");
        let value: bool = parse_or("WEBHOOK_RELAY_TEST_BOOL_VAR", false).unwrap();
        assert!(value);
        env::remove_var("WEBHOOK_RELAY_TEST_BOOL_VAR");
    }
}
