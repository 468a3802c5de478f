//! # Service Configuration
//!
//! Configuration for a ledger node: where the database and the oracle live,
//! how often to reconcile, and how long anything may take.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     ACCRUAL_SYSTEM_ADDRESS=http://accrual:8081                         │
//! │     DATABASE_URI=sqlite:///var/lib/loyalty/loyalty.db                  │
//! │     LOYALTY_POLL_INTERVAL_SECS=5                                       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/loyalty-ledger/config.toml (Linux)                       │
//! │     ~/Library/Application Support/com.loyalty.ledger/config.toml       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! accrual_address = "http://localhost:8081"
//! database_url = "sqlite://loyalty.db"
//! poll_interval_secs = 10
//! operation_timeout_ms = 1000
//! transaction_timeout_ms = 2000
//! max_connections = 5
//! failure_policy = "abort_tick"   # abort_tick | skip_order
//! log_level = "info"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::base_url;
use crate::error::{ConfigError, ConfigResult};
use loyalty_db::DbConfig;

// =============================================================================
// Failure Policy
// =============================================================================

/// What a reconciler tick does when one order fails.
///
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  orders: [A] [B] [C] [D]        B fails                                │
/// │                                                                         │
/// │  ABORT_TICK (default)           A ✓  B ✗  stop. C, D wait for the      │
/// │                                 next tick.                              │
/// │                                                                         │
/// │  SKIP_ORDER                     A ✓  B ✗  C ✓  D ✓                      │
/// │                                                                         │
/// │  A rate limit from the oracle stops the tick under both policies.      │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop processing the rest of the batch.
    #[default]
    AbortTick,

    /// Log the failure and move on to the next order.
    SkipOrder,
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailurePolicy::AbortTick => write!(f, "abort_tick"),
            FailurePolicy::SkipOrder => write!(f, "skip_order"),
        }
    }
}

impl std::str::FromStr for FailurePolicy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "abort_tick" | "abort" => Ok(FailurePolicy::AbortTick),
            "skip_order" | "skip" => Ok(FailurePolicy::SkipOrder),
            other => Err(ConfigError::Invalid(format!(
                "Unknown failure policy: '{}'. Valid options: abort_tick, skip_order",
                other
            ))),
        }
    }
}

// =============================================================================
// Service Configuration
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Base address of the accrual oracle. The scheme may be omitted.
    #[serde(default = "default_accrual_address")]
    pub accrual_address: String,

    /// `sqlite://path` URL or bare path of the ledger database.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Seconds between reconciler ticks.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Deadline for single reads and oracle calls (milliseconds).
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// Deadline for a whole transaction (milliseconds).
    #[serde(default = "default_transaction_timeout")]
    pub transaction_timeout_ms: u64,

    /// Connection pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Reconciler behavior on a per-order failure.
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Default tracing filter. `RUST_LOG` wins when set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_accrual_address() -> String {
    "http://localhost:8081".to_string()
}
fn default_database_url() -> String {
    "sqlite://loyalty.db".to_string()
}
fn default_poll_interval() -> u64 {
    10
}
fn default_operation_timeout() -> u64 {
    1000
}
fn default_transaction_timeout() -> u64 {
    2000
}
fn default_max_connections() -> u32 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        ServiceConfig {
            accrual_address: default_accrual_address(),
            database_url: default_database_url(),
            poll_interval_secs: default_poll_interval(),
            operation_timeout_ms: default_operation_timeout(),
            transaction_timeout_ms: default_transaction_timeout(),
            max_connections: default_max_connections(),
            failure_policy: FailurePolicy::default(),
            log_level: default_log_level(),
        }
    }
}

impl ServiceConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                config = Self::from_file(&path)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML file without applying overrides.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> ConfigResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or(ConfigError::NoPath)?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        base_url(&self.accrual_address).map_err(|e| {
            ConfigError::Invalid(format!(
                "accrual_address '{}' is not a valid URL: {}",
                self.accrual_address, e
            ))
        })?;

        if self.database_url.trim().is_empty() {
            return Err(ConfigError::Invalid("database_url must not be empty".into()));
        }

        for (name, value) in [
            ("poll_interval_secs", self.poll_interval_secs),
            ("operation_timeout_ms", self.operation_timeout_ms),
            ("transaction_timeout_ms", self.transaction_timeout_ms),
            ("max_connections", u64::from(self.max_connections)),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than 0")));
            }
        }

        if self.transaction_timeout_ms < self.operation_timeout_ms {
            return Err(ConfigError::Invalid(format!(
                "transaction_timeout_ms ({}) must not be shorter than operation_timeout_ms ({})",
                self.transaction_timeout_ms, self.operation_timeout_ms
            )));
        }

        Ok(())
    }

    /// Applies overrides from a variable lookup, normally the environment.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("ACCRUAL_SYSTEM_ADDRESS") {
            debug!(address = %address, "Overriding accrual address from environment");
            self.accrual_address = address;
        }

        if let Some(url) = lookup("DATABASE_URI") {
            debug!("Overriding database URL from environment");
            self.database_url = url;
        }

        override_parsed(&lookup, "LOYALTY_POLL_INTERVAL_SECS", &mut self.poll_interval_secs);
        override_parsed(&lookup, "LOYALTY_OPERATION_TIMEOUT_MS", &mut self.operation_timeout_ms);
        override_parsed(&lookup, "LOYALTY_TRANSACTION_TIMEOUT_MS", &mut self.transaction_timeout_ms);
        override_parsed(&lookup, "LOYALTY_MAX_CONNECTIONS", &mut self.max_connections);

        if let Some(policy) = lookup("LOYALTY_FAILURE_POLICY") {
            match policy.parse() {
                Ok(parsed) => self.failure_policy = parsed,
                Err(e) => warn!(policy = %policy, error = %e, "Ignoring failure policy from environment"),
            }
        }

        if let Some(level) = lookup("LOYALTY_LOG_LEVEL") {
            self.log_level = level;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "loyalty", "ledger")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn transaction_timeout(&self) -> Duration {
        Duration::from_millis(self.transaction_timeout_ms)
    }

    /// Database settings derived from this config.
    pub fn db_config(&self) -> DbConfig {
        DbConfig::new(self.database_url.clone())
            .max_connections(self.max_connections)
            .query_timeout(self.operation_timeout())
            .transaction_timeout(self.transaction_timeout())
    }
}

fn override_parsed<F, T>(lookup: &F, key: &str, target: &mut T)
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => {
                debug!(key, value = %raw, "Overriding from environment");
                *target = value;
            }
            Err(_) => warn!(key, value = %raw, "Ignoring unparseable environment value"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = ServiceConfig::default();
        assert_eq!(config.accrual_address, "http://localhost:8081");
        assert_eq!(config.poll_interval(), Duration::from_secs(10));
        assert_eq!(config.operation_timeout(), Duration::from_secs(1));
        assert_eq!(config.transaction_timeout(), Duration::from_secs(2));
        assert_eq!(config.failure_policy, FailurePolicy::AbortTick);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: ServiceConfig = toml::from_str(
            r#"
            accrual_address = "accrual.internal:9000"
            failure_policy = "skip_order"
            "#,
        )
        .unwrap();

        assert_eq!(config.accrual_address, "accrual.internal:9000");
        assert_eq!(config.failure_policy, FailurePolicy::SkipOrder);
        assert_eq!(config.poll_interval_secs, 10);
        assert_eq!(config.database_url, "sqlite://loyalty.db");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        config.apply_overrides(env(&[
            ("ACCRUAL_SYSTEM_ADDRESS", "http://accrual:8081"),
            ("DATABASE_URI", "sqlite:///tmp/ledger.db"),
            ("LOYALTY_POLL_INTERVAL_SECS", "3"),
            ("LOYALTY_FAILURE_POLICY", "skip"),
            ("LOYALTY_MAX_CONNECTIONS", "not-a-number"),
        ]));

        assert_eq!(config.accrual_address, "http://accrual:8081");
        assert_eq!(config.database_url, "sqlite:///tmp/ledger.db");
        assert_eq!(config.poll_interval_secs, 3);
        assert_eq!(config.failure_policy, FailurePolicy::SkipOrder);
        // Garbage is ignored, the previous value stays
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ServiceConfig::default();

        config.poll_interval_secs = 0;
        assert!(config.validate().is_err());
        config.poll_interval_secs = 10;

        config.transaction_timeout_ms = 500;
        assert!(config.validate().is_err());
        config.transaction_timeout_ms = 2000;

        config.accrual_address = "http://[::1".to_string();
        assert!(config.validate().is_err());

        config.accrual_address = "localhost:8081".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("abort_tick".parse::<FailurePolicy>().unwrap(), FailurePolicy::AbortTick);
        assert_eq!("SKIP-ORDER".parse::<FailurePolicy>().unwrap(), FailurePolicy::SkipOrder);
        assert!("retry".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_save_and_reload() {
        let path = std::env::temp_dir()
            .join(format!("loyalty-config-{}", std::process::id()))
            .join("config.toml");

        let mut config = ServiceConfig::default();
        config.poll_interval_secs = 42;
        config.failure_policy = FailurePolicy::SkipOrder;
        config.save(Some(path.clone())).unwrap();

        let loaded = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);

        let _ = std::fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_db_config_carries_timeouts() {
        let mut config = ServiceConfig::default();
        config.operation_timeout_ms = 250;
        config.max_connections = 8;

        let db = config.db_config();
        assert_eq!(db.query_timeout, Duration::from_millis(250));
        assert_eq!(db.transaction_timeout, Duration::from_secs(2));
        assert_eq!(db.max_connections, 8);
        assert!(db.run_migrations);
    }
}
