//! # Accrual Error Types
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Accrual Error Categories                           │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │   Transport     │  │     Oracle      │  │       Ledger            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Request        │  │  NotRegistered  │  │  Ledger(LedgerError)    │ │
//! │  │  Timeout        │  │  RateLimited    │  │                         │ │
//! │  │                 │  │  UnexpectedStat │  │                         │ │
//! │  │                 │  │  InvalidResponse│  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ConfigError is separate: it only happens at startup.                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;
use thiserror::Error;

use loyalty_db::LedgerError;

/// Result type alias for accrual operations.
pub type AccrualResult<T> = Result<T, AccrualError>;

/// Failures while asking the oracle or applying its verdict.
#[derive(Debug, Error)]
pub enum AccrualError {
    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The request could not be sent or the body could not be read.
    #[error("Oracle request failed: {0}")]
    Request(String),

    /// No response within the HTTP timeout.
    #[error("Oracle request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),

    // =========================================================================
    // Oracle Errors
    // =========================================================================
    /// The oracle does not know this order yet (HTTP 204).
    #[error("Order {0} is not registered with the oracle")]
    NotRegistered(String),

    /// The oracle asked us to back off (HTTP 429).
    #[error("Oracle rate limit hit{}", retry_hint(.retry_after))]
    RateLimited { retry_after: Option<Duration> },

    /// Any status the protocol does not define.
    #[error("Oracle answered with unexpected status {0}")]
    UnexpectedStatus(u16),

    /// The body did not decode, or described a different order.
    #[error("Invalid oracle response: {0}")]
    InvalidResponse(String),

    // =========================================================================
    // Ledger Errors
    // =========================================================================
    /// Applying the verdict failed.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn retry_hint(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(d) => format!(", retry after {}s", d.as_secs()),
        None => String::new(),
    }
}

impl From<reqwest::Error> for AccrualError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AccrualError::InvalidResponse(err.to_string())
        } else {
            AccrualError::Request(err.to_string())
        }
    }
}

impl AccrualError {
    /// Returns true if asking again later might succeed.
    ///
    /// ## Retryable Errors
    /// - Transport failures and timeouts
    /// - Not registered yet, rate limited
    /// - Transient ledger failures (busy, pool exhausted)
    pub fn is_retryable(&self) -> bool {
        match self {
            AccrualError::Request(_)
            | AccrualError::Timeout(_)
            | AccrualError::NotRegistered(_)
            | AccrualError::RateLimited { .. } => true,
            AccrualError::UnexpectedStatus(status) => *status >= 500,
            AccrualError::InvalidResponse(_) => false,
            AccrualError::Ledger(e) => e.is_retryable(),
        }
    }

    /// Returns true if the whole tick must stop, whatever the failure policy.
    pub fn halts_tick(&self) -> bool {
        matches!(self, AccrualError::RateLimited { .. })
    }
}

// =============================================================================
// Configuration Errors
// =============================================================================

/// Failures loading, validating or saving [`crate::config::ServiceConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Reading or writing the file failed.
    #[error("Config file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid TOML for this config.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be rendered as TOML.
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value is out of range or malformed.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// No path was given and no default location exists on this platform.
    #[error("No config path available")]
    NoPath,
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
