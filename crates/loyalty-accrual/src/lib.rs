//! # loyalty-accrual: Accrual Reconciliation for the Loyalty Ledger
//!
//! Orders are uploaded as NEW and stay unfinished until the external
//! accrual oracle decides them. This crate polls the oracle for every
//! unfinished order and applies its verdicts to the ledger.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           loyalty-node                                  │
//! │                                                                         │
//! │   ServiceConfig ──► Database ──► Ledger                                │
//! │        │                           │                                    │
//! │        ▼                           ▼                                    │
//! │   AccrualClient ───────────► Reconciler ◄──── BackgroundTasks          │
//! │   (AccrualOracle)            tick() every         periodic task,       │
//! │        │                     poll interval        cancellation token    │
//! │        ▼                                                                │
//! │   GET {accrual}/api/orders/{number}                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`client`] - Oracle trait and its HTTP implementation
//! - [`reconciler`] - One tick over the unfinished orders
//! - [`scheduler`] - Periodic task with graceful shutdown
//! - [`config`] - Node configuration (TOML + environment)
//! - [`error`] - Accrual and configuration errors

// =============================================================================
// Module Declarations
// =============================================================================

pub mod client;
pub mod config;
pub mod error;
pub mod reconciler;
pub mod scheduler;

// =============================================================================
// Re-exports
// =============================================================================

pub use client::{AccrualClient, AccrualOracle};
pub use config::{FailurePolicy, ServiceConfig};
pub use error::{AccrualError, AccrualResult, ConfigError, ConfigResult};
pub use reconciler::{Reconciler, TickReport};
pub use scheduler::BackgroundTasks;
