//! # Domain Types
//!
//! The four entities the ledger stores, plus the order status machine.
//!
//! ## Order Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Order Status Machine                             │
//! │                                                                         │
//! │   submit_order()                                                       │
//! │        │                                                                │
//! │        ▼                                                                │
//! │   ┌─────────┐  oracle   ┌────────────┐  oracle   ┌───────────┐         │
//! │   │   NEW   │─────────►│ PROCESSING │─────────►│ PROCESSED │ terminal │
//! │   └────┬────┘           └─────┬──────┘           └───────────┘         │
//! │        │                      │                  ┌───────────┐         │
//! │        └──────────────────────┴────────────────►│  INVALID  │ terminal │
//! │                                                  └───────────┘         │
//! │                                                                         │
//! │   Only the reconciler moves an order past NEW.                         │
//! │   Accrual stays None until the oracle decides.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::points::Points;

// =============================================================================
// User
// =============================================================================

/// A registered user.
///
/// Created once at registration and never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct User {
    /// UUID v4 string
    pub id: String,

    /// Unique login
    pub login: String,

    /// Argon2 PHC string
    #[serde(skip_serializing)]
    pub password_hash: String,

    pub created_at: DateTime<Utc>,
}

impl User {
    /// Creates a new user with a generated id.
    ///
    /// ## Arguments
    /// * `login` - Already validated login
    /// * `password_hash` - Output of [`crate::credentials::hash_password`]
    pub fn new(login: impl Into<String>, password_hash: impl Into<String>) -> Self {
        User {
            id: uuid::Uuid::new_v4().to_string(),
            login: login.into(),
            password_hash: password_hash.into(),
            created_at: Utc::now(),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Where an order is in its accrual lifecycle.
///
/// ## Wire/DB Format
/// Uppercase strings: `NEW`, `PROCESSING`, `PROCESSED`, `INVALID`.
/// The oracle's `REGISTERED` status is accepted as an alias of `NEW`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "UPPERCASE"))]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
    /// Uploaded, not yet picked up by the oracle
    #[serde(alias = "REGISTERED")]
    New,
    /// Oracle is computing the accrual
    Processing,
    /// Accrual decided (terminal)
    Processed,
    /// Oracle refused the order (terminal)
    Invalid,
}

impl OrderStatus {
    /// Statuses the reconciler still has to poll for.
    pub const UNFINISHED: [OrderStatus; 2] = [OrderStatus::New, OrderStatus::Processing];

    /// Returns true once no further transitions can happen.
    #[inline]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Processed | OrderStatus::Invalid)
    }

    /// Returns the canonical uppercase name.
    pub const fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::New => "NEW",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Processed => "PROCESSED",
            OrderStatus::Invalid => "INVALID",
        }
    }

    /// Checks whether moving from `self` to `next` is a forward step.
    ///
    /// ## Rules
    /// - Nothing leaves a terminal status
    /// - Nothing goes back to NEW once it left NEW
    /// - Staying in the same non-terminal status is allowed
    ///
    /// ## Example
    /// ```rust
    /// use loyalty_core::OrderStatus;
    ///
    /// assert!(OrderStatus::New.can_transition_to(OrderStatus::Processed));
    /// assert!(!OrderStatus::Processing.can_transition_to(OrderStatus::New));
    /// assert!(!OrderStatus::Invalid.can_transition_to(OrderStatus::Processed));
    /// ```
    pub const fn can_transition_to(&self, next: OrderStatus) -> bool {
        match self {
            OrderStatus::New => true,
            OrderStatus::Processing => !matches!(next, OrderStatus::New),
            OrderStatus::Processed | OrderStatus::Invalid => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Order
// =============================================================================

/// A purchase order uploaded by a user.
///
/// ## Accrual
/// `None` means the oracle has not decided yet. `Some(Points::ZERO)` is a
/// decided order that earned nothing. The two are never conflated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    /// Luhn-valid digit string, unique across all users
    pub number: String,

    /// Owner. Not part of the public representation.
    #[serde(skip)]
    pub user_id: String,

    pub status: OrderStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accrual: Option<Points>,

    pub uploaded_at: DateTime<Utc>,
}

impl Order {
    /// Creates a freshly uploaded order: status NEW, no accrual.
    pub fn new(number: impl Into<String>, user_id: impl Into<String>) -> Self {
        Order {
            number: number.into(),
            user_id: user_id.into(),
            status: OrderStatus::New,
            accrual: None,
            uploaded_at: Utc::now(),
        }
    }
}

// =============================================================================
// Balance
// =============================================================================

/// A user's running point counters.
///
/// `current` is what can still be spent, `withdrawn` is the lifetime total
/// already spent. A withdrawal moves the same amount from one to the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Balance {
    pub current: Points,
    pub withdrawn: Points,
}

// =============================================================================
// Withdrawal
// =============================================================================

/// One spend of points against an order. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Withdrawal {
    #[serde(skip)]
    pub user_id: String,

    /// Order number the withdrawal is attached to
    #[cfg_attr(feature = "sqlx", sqlx(rename = "order_number"))]
    pub order: String,

    /// Amount withdrawn
    #[cfg_attr(feature = "sqlx", sqlx(rename = "amount"))]
    pub sum: Points,

    pub processed_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(user_id: impl Into<String>, order: impl Into<String>, sum: Points) -> Self {
        Withdrawal {
            user_id: user_id.into(),
            order: order.into(),
            sum,
            processed_at: Utc::now(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!OrderStatus::New.is_terminal());
        assert!(!OrderStatus::Processing.is_terminal());
        assert!(OrderStatus::Processed.is_terminal());
        assert!(OrderStatus::Invalid.is_terminal());

        assert!(OrderStatus::UNFINISHED.iter().all(|s| !s.is_terminal()));
    }

    #[test]
    fn test_status_wire_names() {
        let json = serde_json::to_string(&OrderStatus::Processing).unwrap();
        assert_eq!(json, "\"PROCESSING\"");

        let status: OrderStatus = serde_json::from_str("\"REGISTERED\"").unwrap();
        assert_eq!(status, OrderStatus::New);

        let status: OrderStatus = serde_json::from_str("\"INVALID\"").unwrap();
        assert_eq!(status, OrderStatus::Invalid);

        assert!(serde_json::from_str::<OrderStatus>("\"processed\"").is_err());
    }

    #[test]
    fn test_new_order_has_no_accrual() {
        let order = Order::new("79927398713", "user-1");
        assert_eq!(order.status, OrderStatus::New);
        assert_eq!(order.accrual, None);
    }

    #[test]
    fn test_order_json_omits_owner_and_missing_accrual() {
        let order = Order::new("79927398713", "user-1");
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["number"], "79927398713");
        assert_eq!(json["status"], "NEW");
        assert!(json.get("user_id").is_none());
        assert!(json.get("accrual").is_none());
        assert!(json.get("uploaded_at").is_some());
    }

    #[test]
    fn test_withdrawal_json_shape() {
        let w = Withdrawal::new("user-1", "2377225624", Points::from_whole(500));
        let json = serde_json::to_value(&w).unwrap();

        assert_eq!(json["order"], "2377225624");
        assert_eq!(json["sum"], 500);
        assert!(json.get("user_id").is_none());
    }

    #[test]
    fn test_user_hash_not_serialized() {
        let user = User::new("alice", "$argon2id$v=19$...");
        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["login"], "alice");
    }
}
