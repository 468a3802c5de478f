//! # Accrual Reconciler
//!
//! Drives unfinished orders toward a terminal status, one tick at a time.
//!
//! ## One Tick
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ledger.unfinished_orders()          failed → log, skip tick           │
//! │       │                              empty  → nothing to do            │
//! │       ▼                                                                 │
//! │  for each order, oldest first:                                         │
//! │       │                                                                 │
//! │       ├─ oracle.resolve(order)                                         │
//! │       │     NotRegistered ───────────► pending, next order             │
//! │       │     RateLimited ─────────────► stop the tick                   │
//! │       │     other failure ───────────► FailurePolicy decides           │
//! │       │                                                                 │
//! │       ├─ verdict unchanged ──────────► pending, next order             │
//! │       │                                                                 │
//! │       └─ ledger.apply_verdict(verdict)                                 │
//! │             one transaction: update row, credit accrual                │
//! │             failure ─────────────────► FailurePolicy decides           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Orders are handled sequentially. A tick never retries an order; the next
//! tick sees it again if it is still unfinished.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::AccrualOracle;
use crate::config::FailurePolicy;
use crate::error::{AccrualError, AccrualResult};
use crate::scheduler::BackgroundTasks;
use loyalty_core::{Order, Points};
use loyalty_db::Ledger;

/// What one tick did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Orders the tick looked at.
    pub examined: usize,
    /// Orders whose status or accrual changed.
    pub resolved: usize,
    /// Orders whose accrual was credited to a balance.
    pub credited: usize,
    /// Orders the oracle has nothing new about yet.
    pub pending: usize,
    /// Orders that failed at the oracle or in the ledger.
    pub failed: usize,
    /// True if the tick stopped before the end of the batch.
    pub aborted: bool,
}

/// How a single order came out of a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pending,
    Resolved { credited: bool },
}

/// Applies oracle verdicts to the ledger.
#[derive(Clone)]
pub struct Reconciler {
    ledger: Ledger,
    oracle: Arc<dyn AccrualOracle>,
    policy: FailurePolicy,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(ledger: Ledger, oracle: Arc<dyn AccrualOracle>, policy: FailurePolicy) -> Self {
        Reconciler {
            ledger,
            oracle,
            policy,
        }
    }

    /// Registers this reconciler as a periodic task ticking every `period`.
    pub fn run_every(self, tasks: &mut BackgroundTasks, period: Duration) {
        info!(period_secs = period.as_secs_f64(), policy = %self.policy, "Starting accrual reconciler");
        tasks.spawn_periodic("accrual_reconciler", period, move || {
            let reconciler = self.clone();
            async move {
                reconciler.tick().await;
            }
        });
    }

    /// Runs one pass over every unfinished order.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let orders = match self.ledger.unfinished_orders().await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Skipping tick: could not list unfinished orders");
                report.aborted = true;
                return report;
            }
        };

        if orders.is_empty() {
            debug!("No unfinished orders");
            return report;
        }

        for order in &orders {
            report.examined += 1;

            match self.reconcile(order).await {
                Ok(Outcome::Pending) => report.pending += 1,
                Ok(Outcome::Resolved { credited }) => {
                    report.resolved += 1;
                    if credited {
                        report.credited += 1;
                    }
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(order = %order.number, error = %e, "Reconciling order failed");

                    if e.halts_tick() || self.policy == FailurePolicy::AbortTick {
                        report.aborted = true;
                        break;
                    }
                }
            }
        }

        if report.resolved > 0 || report.failed > 0 {
            info!(
                examined = report.examined,
                resolved = report.resolved,
                credited = report.credited,
                failed = report.failed,
                aborted = report.aborted,
                "Reconciler tick finished"
            );
        } else {
            debug!(examined = report.examined, pending = report.pending, "Reconciler tick finished");
        }

        report
    }

    async fn reconcile(&self, order: &Order) -> AccrualResult<Outcome> {
        let verdict = match self.oracle.resolve(order).await {
            Ok(verdict) => verdict,
            Err(AccrualError::NotRegistered(_)) => {
                debug!(order = %order.number, "Oracle has not registered the order yet");
                return Ok(Outcome::Pending);
            }
            Err(e) => return Err(e),
        };

        if verdict.status == order.status && verdict.accrual == order.accrual {
            return Ok(Outcome::Pending);
        }

        if !order.status.can_transition_to(verdict.status) {
            debug!(
                order = %order.number,
                from = %order.status,
                to = %verdict.status,
                "Ignoring backward verdict"
            );
            return Ok(Outcome::Pending);
        }

        let credited =
            verdict.accrual.unwrap_or(Points::ZERO) > order.accrual.unwrap_or(Points::ZERO);
        if self.ledger.apply_verdict(verdict).await? {
            Ok(Outcome::Resolved { credited })
        } else {
            // Went terminal since listing, or the verdict lowered the accrual
            Ok(Outcome::Pending)
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
