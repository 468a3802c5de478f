//! # Ledger Workflows
//!
//! The operations callers (request handlers, the reconciler) invoke. Each
//! mutating workflow is exactly one transaction.
//!
//! ## Workflows
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  submit_order(uid, raw)                                                │
//! │    Luhn check ──✗──► InvalidOrderNumber                                │
//! │       │                                                                 │
//! │    ┌──▼─────────────── transaction ──────────────────────┐             │
//! │    │ OrderRepository::create      (NEW, no accrual)      │             │
//! │    │ BalanceRepository::credit    (None: row only)       │             │
//! │    └─────────────────────────────────────────────────────┘             │
//! │       │                                                                 │
//! │       ├── ok                     → Accepted                            │
//! │       └── OrderAlreadyUploaded   → AlreadyUploaded (not an error)      │
//! │                                                                         │
//! │  withdraw(uid, order, sum)                                             │
//! │    Luhn check, sum > 0                                                 │
//! │    ┌──▼─────────────── transaction ──────────────────────┐             │
//! │    │ BalanceRepository::current   sum > current → reject │             │
//! │    │ WithdrawalRepository::record                        │             │
//! │    │ BalanceRepository::debit_withdrawn                  │             │
//! │    └─────────────────────────────────────────────────────┘             │
//! │                                                                         │
//! │  apply_verdict(order)            (reconciler only)                     │
//! │    ┌──▼─────────────── transaction ──────────────────────┐             │
//! │    │ OrderRepository::stored_accrual   accrual so far    │             │
//! │    │ OrderRepository::update      unfinished rows only   │             │
//! │    │ BalanceRepository::credit    growth over stored     │             │
//! │    └─────────────────────────────────────────────────────┘             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use tracing::{debug, info, warn};

use crate::error::{DbError, LedgerError, LedgerResult};
use crate::pool::Database;
use crate::repository::{BalanceRepository, OrderRepository, WithdrawalRepository};
use loyalty_core::credentials::{hash_password, verify_password};
use loyalty_core::validation::{validate_login, validate_password, validate_withdrawal_amount};
use loyalty_core::{
    validate_order_number, Balance, CoreError, Order, Points, User, ValidationError, Withdrawal,
};

/// Result of an order submission. Both variants are successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The order is new and queued for accrual.
    Accepted,
    /// This user had already uploaded the order; nothing changed.
    AlreadyUploaded,
}

/// Entry point for every ledger operation.
#[derive(Debug, Clone)]
pub struct Ledger {
    db: Database,
}

impl Ledger {
    pub fn new(db: Database) -> Self {
        Ledger { db }
    }

    /// The underlying database handle.
    pub fn database(&self) -> &Database {
        &self.db
    }

    // =========================================================================
    // Users
    // =========================================================================

    /// Registers a new user.
    ///
    /// ## Errors
    /// - `Validation` for an empty/oversized login or empty password
    /// - `UserAlreadyExists` if the login is taken
    pub async fn register_user(&self, login: &str, password: &str) -> LedgerResult<User> {
        let login = validate_login(login)?.to_string();
        validate_password(password)?;

        let password = password.to_string();
        let hash = tokio::task::spawn_blocking(move || hash_password(&password))
            .await
            .map_err(|e| CoreError::Credentials(e.to_string()))??;

        let user = User::new(login, hash);
        self.db.users().create(&user).await?;

        info!(user_id = %user.id, login = %user.login, "User registered");
        Ok(user)
    }

    /// Looks up a user by login.
    pub async fn find_user(&self, login: &str) -> LedgerResult<User> {
        Ok(self.db.users().find_by_login(login).await?)
    }

    /// Checks a login/password pair.
    ///
    /// ## Errors
    /// `InvalidCredentials` for an unknown login or a wrong password alike.
    pub async fn authenticate(&self, login: &str, password: &str) -> LedgerResult<User> {
        let user = match self.db.users().find_by_login(login.trim()).await {
            Ok(user) => user,
            Err(DbError::NotFound { .. }) => return Err(CoreError::InvalidCredentials.into()),
            Err(e) => return Err(e.into()),
        };

        let password = password.to_string();
        let hash = user.password_hash.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| CoreError::Credentials(e.to_string()))?;

        if !matches {
            debug!(login = %user.login, "Password mismatch");
            return Err(CoreError::InvalidCredentials.into());
        }

        Ok(user)
    }

    // =========================================================================
    // Orders
    // =========================================================================

    /// Uploads an order for accrual.
    ///
    /// ## Errors
    /// - `InvalidOrderNumber` if the checksum fails
    /// - `OrderOwnedByOther` if another user uploaded it first
    pub async fn submit_order(&self, user_id: &str, raw: &str) -> LedgerResult<SubmitOutcome> {
        let number = validate_order_number(raw)?;
        let order = Order::new(number, user_id);

        let result = self
            .db
            .run_in_transaction(move |conn| {
                Box::pin(async move {
                    OrderRepository::create(conn, &order).await?;
                    BalanceRepository::credit(conn, &order.user_id, None).await?;
                    Ok::<_, LedgerError>(())
                })
            })
            .await;

        match result {
            Ok(()) => {
                info!(order = %number, user_id = %user_id, "Order accepted");
                Ok(SubmitOutcome::Accepted)
            }
            Err(LedgerError::Rejected(CoreError::OrderAlreadyUploaded(_))) => {
                debug!(order = %number, user_id = %user_id, "Order already uploaded");
                Ok(SubmitOutcome::AlreadyUploaded)
            }
            // Lost an insert race on the primary key; decide by who won
            Err(LedgerError::Storage(DbError::UniqueViolation { .. })) => {
                match self.db.orders().get(number).await? {
                    Some(existing) if existing.user_id == user_id => {
                        Ok(SubmitOutcome::AlreadyUploaded)
                    }
                    _ => Err(CoreError::OrderOwnedByOther(number.to_string()).into()),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Lists a user's orders, oldest first.
    ///
    /// ## Errors
    /// `NoOrders` if there are none.
    pub async fn orders(&self, user_id: &str) -> LedgerResult<Vec<Order>> {
        self.db.orders().list_for_user(user_id).await
    }

    /// Every order still waiting on the oracle.
    pub async fn unfinished_orders(&self) -> LedgerResult<Vec<Order>> {
        Ok(self.db.orders().list_unfinished().await?)
    }

    /// Applies an oracle verdict to an unfinished order.
    ///
    /// The status/accrual update and the balance credit commit together.
    /// Only the growth over the accrual already stored is credited, so an
    /// accrual reported first with PROCESSING and again with PROCESSED
    /// lands once. A verdict for an order that is already terminal changes
    /// nothing, and neither does one that would lower the stored accrual.
    ///
    /// ## Returns
    /// `true` if the order row changed.
    pub async fn apply_verdict(&self, order: Order) -> LedgerResult<bool> {
        if order.accrual.is_some_and(|a| a.is_negative()) {
            return Err(ValidationError::InvalidFormat {
                field: "accrual".to_string(),
                reason: "must not be negative".to_string(),
            }
            .into());
        }

        self.db
            .run_in_transaction(move |conn| {
                Box::pin(async move {
                    let stored = OrderRepository::stored_accrual(conn, &order.number)
                        .await?
                        .unwrap_or(Points::ZERO);
                    let reported = order.accrual.unwrap_or(Points::ZERO);

                    let growth = match reported.checked_sub(stored) {
                        Some(growth) if !growth.is_negative() => growth,
                        _ => {
                            warn!(
                                order = %order.number,
                                stored = %stored,
                                reported = %reported,
                                "Ignoring verdict that lowers the accrual"
                            );
                            return Ok(false);
                        }
                    };

                    let changed = OrderRepository::update(conn, &order).await?;
                    if changed && !growth.is_zero() {
                        BalanceRepository::credit(conn, &order.user_id, Some(growth)).await?;
                    }
                    Ok::<_, LedgerError>(changed)
                })
            })
            .await
    }

    // =========================================================================
    // Balance & Withdrawals
    // =========================================================================

    /// A user's current and withdrawn totals.
    ///
    /// ## Errors
    /// `NotFound` if the user never uploaded an order.
    pub async fn balance(&self, user_id: &str) -> LedgerResult<Balance> {
        Ok(self.db.balances().get(user_id).await?)
    }

    /// Spends points against an order number.
    ///
    /// ## Errors
    /// - `InvalidOrderNumber` if the checksum fails
    /// - `Validation` if `sum` is not positive
    /// - `InsufficientFunds` if `sum` exceeds the current balance; nothing
    ///   is written in that case
    pub async fn withdraw(&self, user_id: &str, order: &str, sum: Points) -> LedgerResult<Withdrawal> {
        let number = validate_order_number(order)?;
        validate_withdrawal_amount(sum)?;

        let withdrawal = Withdrawal::new(user_id, number, sum);
        let record = withdrawal.clone();

        self.db
            .run_in_transaction(move |conn| {
                Box::pin(async move {
                    let available = BalanceRepository::current(conn, &record.user_id).await?;
                    if record.sum > available {
                        return Err(LedgerError::from(CoreError::InsufficientFunds {
                            requested: record.sum,
                            available,
                        }));
                    }

                    WithdrawalRepository::record(conn, &record).await?;
                    BalanceRepository::debit_withdrawn(conn, &record.user_id, record.sum).await?;
                    Ok::<_, LedgerError>(())
                })
            })
            .await?;

        info!(user_id = %user_id, order = %number, sum = %sum, "Withdrawal recorded");
        Ok(withdrawal)
    }

    /// Lists a user's withdrawals, oldest first.
    ///
    /// ## Errors
    /// `NoWithdrawals` if there are none.
    pub async fn withdrawals(&self, user_id: &str) -> LedgerResult<Vec<Withdrawal>> {
        self.db.withdrawals().list_for_user(user_id).await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
