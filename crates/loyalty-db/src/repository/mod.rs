//! # Repository Module
//!
//! SQL for the four ledger tables, one repository per table.
//!
//! ## Two Kinds Of Methods
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Reads (methods on &self)                                              │
//! │  ├── run on the pool                                                   │
//! │  └── bounded by the query timeout                                      │
//! │                                                                         │
//! │      db.orders().list_for_user(uid)                                    │
//! │      db.balances().get(uid)                                            │
//! │                                                                         │
//! │  Transactional steps (associated fns taking a connection)              │
//! │  ├── run on the connection handed out by run_in_transaction            │
//! │  └── bounded by the transaction timeout as a whole                     │
//! │                                                                         │
//! │      OrderRepository::create(conn, &order)                             │
//! │      BalanceRepository::debit_withdrawn(conn, uid, amount)            │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`UserRepository`] - Registration and login lookup
//! - [`OrderRepository`] - Order upload, status updates, work queue
//! - [`BalanceRepository`] - Running current/withdrawn counters
//! - [`WithdrawalRepository`] - Append-only withdrawal history

pub mod balance;
pub mod order;
pub mod user;
pub mod withdrawal;

pub use balance::BalanceRepository;
pub use order::OrderRepository;
pub use user::UserRepository;
pub use withdrawal::WithdrawalRepository;
