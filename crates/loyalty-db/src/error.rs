//! # Database Error Types
//!
//! Two layers of errors leave this crate:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error ──► DbError ──┐                                           │
//! │                            ├──► LedgerError ──► ErrorKind ──► status   │
//! │  CoreError ────────────────┘     (what callers     (what the HTTP       │
//! │                                   match on)         layer maps)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! - [`DbError`]: storage went wrong (constraint, timeout, pool, panic)
//! - [`LedgerError`]: either a business rejection or a storage failure
//! - [`ErrorKind`]: flat classification for transport mapping

use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

use loyalty_core::CoreError;

// =============================================================================
// Database Error
// =============================================================================

/// Database operation errors.
///
/// These errors wrap sqlx errors and provide additional context
/// for debugging and for deciding whether a retry makes sense.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    ///
    /// ## When This Occurs
    /// - Login lookup for an unknown user
    /// - Balance read for a user who never had an order or withdrawal
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    ///
    /// ## When This Occurs
    /// - Order or balance written for a user id that was never registered
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Commit or rollback failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Another writer holds the database lock.
    ///
    /// ## When This Occurs
    /// - Two transactions read the same balance, then both try to write;
    ///   SQLite lets one through and rejects the other
    #[error("Database is busy: {0}")]
    Busy(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A query or transaction exceeded its deadline and was abandoned.
    #[error("{operation} timed out after {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The transaction body panicked. The transaction was rolled back.
    #[error("Transaction panicked: {0}")]
    TransactionPanicked(String),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Creates a Timeout error.
    pub fn timeout(operation: &'static str, after: Duration) -> Self {
        DbError::Timeout { operation, after }
    }

    /// Whether the same operation may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::Busy(_)
                | DbError::PoolExhausted
                | DbError::Timeout { .. }
                | DbError::ConnectionFailed(_)
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type / lock
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// sqlx::Error::PoolClosed     → DbError::ConnectionFailed
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Record", "unknown"),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // SQLite messages:
                //   "UNIQUE constraint failed: <table>.<column>"
                //   "FOREIGN KEY constraint failed"
                //   "database is locked" (SQLITE_BUSY)
                if let Some(field) = msg.strip_prefix("UNIQUE constraint failed: ") {
                    DbError::UniqueViolation {
                        field: field.to_string(),
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation {
                        message: msg.to_string(),
                    }
                } else if msg.contains("database is locked") || msg.contains("database is busy") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::Io(e) => DbError::ConnectionFailed(e.to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Ledger Error
// =============================================================================

/// Everything a ledger operation can fail with.
///
/// `Rejected` is the ledger saying no (bad order number, not enough points);
/// `Storage` is the ledger being unable to answer.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Rejected(#[from] CoreError),

    #[error(transparent)]
    Storage(#[from] DbError),
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(err.into())
    }
}

impl From<loyalty_core::ValidationError> for LedgerError {
    fn from(err: loyalty_core::ValidationError) -> Self {
        LedgerError::Rejected(err.into())
    }
}

impl LedgerError {
    /// Classifies the error for callers that map it to a transport response.
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Rejected(core) => match core {
                CoreError::InvalidOrderNumber(_) => ErrorKind::InvalidOrderNumber,
                CoreError::OrderAlreadyUploaded(_) => ErrorKind::DuplicateOwn,
                CoreError::OrderOwnedByOther(_) => ErrorKind::OwnedByOther,
                CoreError::UserAlreadyExists(_) => ErrorKind::AlreadyExists,
                CoreError::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
                CoreError::NoOrders | CoreError::NoWithdrawals => ErrorKind::Empty,
                CoreError::InvalidCredentials => ErrorKind::Unauthorized,
                CoreError::Validation(_) => ErrorKind::InvalidInput,
                CoreError::Credentials(_) => ErrorKind::Storage,
            },
            LedgerError::Storage(db) => match db {
                DbError::NotFound { .. } => ErrorKind::NotFound,
                e if e.is_retryable() => ErrorKind::Transient,
                DbError::TransactionPanicked(_) => ErrorKind::Transient,
                _ => ErrorKind::Storage,
            },
        }
    }

    /// Whether the same operation may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Storage(db) if db.is_retryable())
    }
}

/// Convenience type alias for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;

// =============================================================================
// Error Kind
// =============================================================================

/// Flat classification of ledger failures.
///
/// ## HTTP Mapping
/// ```text
/// InvalidOrderNumber  → 422      DuplicateOwn  → 200 (already accepted)
/// OwnedByOther        → 409      AlreadyExists → 409
/// InsufficientFunds   → 402      Empty         → 204
/// NotFound            → 404      InvalidInput  → 400
/// Unauthorized        → 401      Transient     → 503
/// Storage             → 500
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidOrderNumber,
    DuplicateOwn,
    OwnedByOther,
    AlreadyExists,
    InsufficientFunds,
    Empty,
    NotFound,
    InvalidInput,
    Unauthorized,
    Transient,
    Storage,
}

impl ErrorKind {
    /// Status code the HTTP layer answers with.
    pub const fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InvalidOrderNumber => 422,
            ErrorKind::DuplicateOwn => 200,
            ErrorKind::OwnedByOther | ErrorKind::AlreadyExists => 409,
            ErrorKind::InsufficientFunds => 402,
            ErrorKind::Empty => 204,
            ErrorKind::NotFound => 404,
            ErrorKind::InvalidInput => 400,
            ErrorKind::Unauthorized => 401,
            ErrorKind::Transient => 503,
            ErrorKind::Storage => 500,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
