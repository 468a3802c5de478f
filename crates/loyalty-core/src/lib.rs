//! # loyalty-core: Pure Domain Logic for the Loyalty Ledger
//!
//! This crate holds the types and rules every other crate agrees on, as pure
//! functions with zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Loyalty Ledger Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────┐        ┌──────────────────────────────┐  │
//! │  │  Request handlers        │        │  loyalty-accrual             │  │
//! │  │  (outside this repo)     │        │  Reconciler ◄──► Oracle      │  │
//! │  └────────────┬─────────────┘        └──────────────┬───────────────┘  │
//! │               │                                     │                   │
//! │  ┌────────────▼─────────────────────────────────────▼───────────────┐  │
//! │  │                 loyalty-db (Ledger, repositories)                │  │
//! │  └────────────────────────────────┬─────────────────────────────────┘  │
//! │                                   │                                     │
//! │  ┌────────────────────────────────▼─────────────────────────────────┐  │
//! │  │              ★ loyalty-core (THIS CRATE) ★                       │  │
//! │  │                                                                  │  │
//! │  │   ┌──────────┐  ┌──────────┐  ┌────────────┐  ┌─────────────┐   │  │
//! │  │   │  types   │  │  points  │  │ validation │  │ credentials │   │  │
//! │  │   │  Order   │  │  Points  │  │ Luhn check │  │   argon2    │   │  │
//! │  │   │  Balance │  │          │  │ login, sum │  │             │   │  │
//! │  │   └──────────┘  └──────────┘  └────────────┘  └─────────────┘   │  │
//! │  │                                                                  │  │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS            │  │
//! │  └──────────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - User, Order, OrderStatus, Balance, Withdrawal
//! - [`points`] - Integer point amounts (hundredths)
//! - [`error`] - Domain error types
//! - [`validation`] - Order number checksum and input rules
//! - [`credentials`] - Password hashing
//!
//! ## Example Usage
//!
//! ```rust
//! use loyalty_core::{validate_order_number, Order, OrderStatus};
//!
//! let number = validate_order_number("79927398713").unwrap();
//! let order = Order::new(number, "user-1");
//!
//! assert_eq!(order.status, OrderStatus::New);
//! assert!(order.accrual.is_none());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod credentials;
pub mod error;
pub mod points;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use points::Points;
pub use types::*;
pub use validation::{is_valid_order_number, validate_order_number};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum login length in characters.
pub const MAX_LOGIN_LENGTH: usize = 64;
