//! # Error Types
//!
//! Domain-specific error types for loyalty-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  loyalty-core errors (this file)                                       │
//! │  ├── CoreError        - Business rule rejections                       │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  loyalty-db errors (separate crate)                                    │
//! │  ├── DbError          - Storage failures                               │
//! │  └── LedgerError      - CoreError | DbError, what callers see          │
//! │                                                                         │
//! │  loyalty-accrual errors (separate crate)                               │
//! │  └── AccrualError     - Oracle transport + LedgerError                 │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → LedgerError → AccrualError        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::points::Points;

// =============================================================================
// Core Error
// =============================================================================

/// Business rule rejections.
///
/// Every variant is a deliberate "no" from the ledger, as opposed to a
/// storage or network failure. Callers surface these to the end user.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoreError {
    /// The order number fails the Luhn checksum or is not all digits.
    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),

    /// The same user already uploaded this order.
    ///
    /// ## When This Occurs
    /// - User retries a submission after a timeout
    /// - User double-clicks submit
    ///
    /// The submission workflow turns this into a success, so end users
    /// never see it as an error.
    #[error("Order {0} was already uploaded by this user")]
    OrderAlreadyUploaded(String),

    /// Another user owns this order number.
    #[error("Order {0} was uploaded by another user")]
    OrderOwnedByOther(String),

    /// The login is taken.
    #[error("User '{0}' already exists")]
    UserAlreadyExists(String),

    /// Withdrawal exceeds the spendable balance.
    ///
    /// ## User Workflow
    /// ```text
    /// withdraw(order, 400)
    ///      │
    ///      ▼
    /// current balance: 300
    ///      │
    ///      ▼
    /// InsufficientFunds { requested: 400.00, available: 300.00 }
    ///      │
    ///      ▼
    /// Transaction rolls back, nothing written
    /// ```
    #[error("Insufficient funds: requested {requested}, available {available}")]
    InsufficientFunds {
        requested: Points,
        available: Points,
    },

    /// The user has not uploaded any orders.
    #[error("No orders uploaded")]
    NoOrders,

    /// The user has not made any withdrawals.
    #[error("No withdrawals made")]
    NoWithdrawals,

    /// Login and password do not match a registered user.
    #[error("Invalid login or password")]
    InvalidCredentials,

    /// Password hashing failed.
    #[error("Credential processing failed: {0}")]
    Credentials(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any storage work starts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format.
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::InsufficientFunds {
            requested: Points::from_whole(400),
            available: Points::from_whole(300),
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: requested 400.00, available 300.00"
        );

        let err = CoreError::OrderOwnedByOther("79927398713".to_string());
        assert_eq!(err.to_string(), "Order 79927398713 was uploaded by another user");
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "login".to_string(),
        };
        assert_eq!(err.to_string(), "login is required");

        let err = ValidationError::MustBePositive {
            field: "sum".to_string(),
        };
        assert_eq!(err.to_string(), "sum must be positive");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "password".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
