//! Line Relay configuration.
//!
//! Configuration is loaded from environment variables with sensible
//! defaults. Every value can be overridden per deployment; malformed
//! numeric values fall back to the default.

use std::collections::HashMap;
use std::env;
use thiserror::Error;

/// Default TCP bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:30001";

/// Default capacity of each session's outbound frame queue.
pub const DEFAULT_OUTBOUND_QUEUE_CAPACITY: usize = 1024;

/// Default per-session drain timeout during registry teardown, in seconds.
pub const DEFAULT_DRAIN_TIMEOUT_SECONDS: u64 = 5;

/// Default relay instance ID prefix.
pub const DEFAULT_RELAY_ID_PREFIX: &str = "relay";

/// Line Relay configuration.
///
/// Loaded from environment variables with sensible defaults.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP listener bind address (default: "0.0.0.0:30001").
    pub bind_address: String,

    /// Capacity of each session's outbound frame queue (default: 1024).
    pub outbound_queue_capacity: usize,

    /// Per-session drain timeout during `close_all`, in seconds (default: 5).
    pub drain_timeout_seconds: u64,

    /// Unique identifier for this relay instance.
    pub relay_id: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let bind_address = vars
            .get("RELAY_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let outbound_queue_capacity = vars
            .get("RELAY_OUTBOUND_QUEUE_CAPACITY")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_OUTBOUND_QUEUE_CAPACITY);

        if outbound_queue_capacity == 0 {
            return Err(ConfigError::InvalidValue(
                "RELAY_OUTBOUND_QUEUE_CAPACITY must be at least 1".to_string(),
            ));
        }

        let drain_timeout_seconds = vars
            .get("RELAY_DRAIN_TIMEOUT_SECONDS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_DRAIN_TIMEOUT_SECONDS);

        // Generate relay instance ID
        let relay_id = vars.get("RELAY_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RELAY_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            bind_address,
            outbound_queue_capacity,
            drain_timeout_seconds,
            relay_id,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_from_vars_success_with_defaults() {
        let vars = HashMap::new();

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, DEFAULT_BIND_ADDRESS);
        assert_eq!(
            config.outbound_queue_capacity,
            DEFAULT_OUTBOUND_QUEUE_CAPACITY
        );
        assert_eq!(config.drain_timeout_seconds, DEFAULT_DRAIN_TIMEOUT_SECONDS);
        // Relay ID should be auto-generated
        assert!(config.relay_id.starts_with("relay-"));
    }

    #[test]
    fn test_from_vars_success_with_custom_values() {
        let vars = HashMap::from([
            (
                "RELAY_BIND_ADDRESS".to_string(),
                "127.0.0.1:30002".to_string(),
            ),
            ("RELAY_OUTBOUND_QUEUE_CAPACITY".to_string(), "64".to_string()),
            ("RELAY_DRAIN_TIMEOUT_SECONDS".to_string(), "2".to_string()),
        ]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");

        assert_eq!(config.bind_address, "127.0.0.1:30002");
        assert_eq!(config.outbound_queue_capacity, 64);
        assert_eq!(config.drain_timeout_seconds, 2);
    }

    #[test]
    fn test_relay_id_custom_value() {
        let vars = HashMap::from([("RELAY_ID".to_string(), "relay-custom-001".to_string())]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(config.relay_id, "relay-custom-001");
    }

    #[test]
    fn test_malformed_numeric_falls_back_to_default() {
        let vars = HashMap::from([(
            "RELAY_OUTBOUND_QUEUE_CAPACITY".to_string(),
            "not-a-number".to_string(),
        )]);

        let config = Config::from_vars(&vars).expect("Config should load successfully");
        assert_eq!(
            config.outbound_queue_capacity,
            DEFAULT_OUTBOUND_QUEUE_CAPACITY
        );
    }

    #[test]
    fn test_zero_queue_capacity_rejected() {
        let vars = HashMap::from([(
            "RELAY_OUTBOUND_QUEUE_CAPACITY".to_string(),
            "0".to_string(),
        )]);

        let result = Config::from_vars(&vars);
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }
}
