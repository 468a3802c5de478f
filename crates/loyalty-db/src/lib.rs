//! # loyalty-db: Ledger Store for the Loyalty Ledger
//!
//! This crate owns every read and write of users, orders, balances and
//! withdrawals. It uses SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Loyalty Ledger Data Flow                           │
//! │                                                                         │
//! │  Request handler (submit_order)      Reconciler tick (apply_verdict)   │
//! │       │                                     │                           │
//! │       ▼                                     ▼                           │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   loyalty-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │    Ledger     │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │  (ledger.rs)  │───►│  UserRepo     │    │  (embedded)  │  │   │
//! │  │   │               │    │  OrderRepo    │    │              │  │   │
//! │  │   │  one workflow │    │  BalanceRepo  │    │ 001_init.sql │  │   │
//! │  │   │  = one tx     │    │  WithdrawRepo │    │              │  │   │
//! │  │   └───────┬───────┘    └───────────────┘    └──────────────┘  │   │
//! │  │           ▼                                                     │   │
//! │  │   ┌───────────────┐                                             │   │
//! │  │   │   Database    │  SqlitePool, run_in_transaction, timeouts   │   │
//! │  │   │   (pool.rs)   │                                             │   │
//! │  │   └───────────────┘                                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database (WAL)                       │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool, transaction runner, timeouts
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Storage errors, ledger errors, error kinds
//! - [`repository`] - One repository per table
//! - [`ledger`] - Submission, verdict and withdrawal workflows
//!
//! ## Usage
//!
//! ```rust,ignore
//! use loyalty_db::{Database, DbConfig, Ledger, SubmitOutcome};
//!
//! let db = Database::new(DbConfig::new("loyalty.db")).await?;
//! let ledger = Ledger::new(db);
//!
//! let user = ledger.register_user("alice", "s3cret").await?;
//! let outcome = ledger.submit_order(&user.id, "79927398713").await?;
//! assert_eq!(outcome, SubmitOutcome::Accepted);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod ledger;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult, ErrorKind, LedgerError, LedgerResult};
pub use ledger::{Ledger, SubmitOutcome};
pub use pool::{Database, DbConfig};

// Repository re-exports for convenience
pub use repository::balance::BalanceRepository;
pub use repository::order::OrderRepository;
pub use repository::user::UserRepository;
pub use repository::withdrawal::WithdrawalRepository;
