//! # Balance Repository
//!
//! One row per user holding two running counters.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  credit(uid, 500)          current += 500                         │
//! │  debit_withdrawn(uid, 200) current -= 200, withdrawn += 200       │
//! │                            (one statement, guarded by funds)      │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The counters are never recomputed from history; each transaction moves
//! them by exactly the amount it records.

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::pool::bounded;
use loyalty_core::{Balance, CoreError, Points};

/// Repository for balance database operations.
#[derive(Debug, Clone)]
pub struct BalanceRepository {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl BalanceRepository {
    /// Creates a new BalanceRepository.
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        BalanceRepository {
            pool,
            query_timeout,
        }
    }

    /// Gets a user's balance.
    ///
    /// ## Errors
    /// `DbError::NotFound` if the row was never materialized. The first
    /// order upload creates it.
    pub async fn get(&self, user_id: &str) -> DbResult<Balance> {
        let balance: Option<Balance> = bounded(self.query_timeout, "get balance", async {
            sqlx::query_as::<_, Balance>(
                "SELECT current, withdrawn FROM balances WHERE user_id = ?1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await?;

        balance.ok_or_else(|| DbError::not_found("Balance", user_id))
    }

    /// Reads the spendable amount inside the caller's transaction.
    ///
    /// Zero when the row does not exist yet.
    pub async fn current(conn: &mut SqliteConnection, user_id: &str) -> DbResult<Points> {
        let current: Option<Points> =
            sqlx::query_scalar("SELECT current FROM balances WHERE user_id = ?1")
                .bind(user_id)
                .fetch_optional(&mut *conn)
                .await?;

        Ok(current.unwrap_or(Points::ZERO))
    }

    /// Adds `amount` to `current`, creating the row if needed.
    ///
    /// `None` adds nothing and only materializes the row.
    pub async fn credit(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: Option<Points>,
    ) -> DbResult<()> {
        let amount = amount.unwrap_or(Points::ZERO);
        debug!(user_id = %user_id, amount = %amount, "Crediting balance");

        sqlx::query(
            r#"
            INSERT INTO balances (user_id, current, withdrawn)
            VALUES (?1, ?2, 0)
            ON CONFLICT(user_id) DO UPDATE SET current = current + excluded.current
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Moves `amount` from `current` to `withdrawn`.
    ///
    /// Both counters change in one statement, and only if `current` covers
    /// the amount. Callers check funds first; the guard here means a
    /// balance can never go below zero even if that check was skipped.
    ///
    /// ## Errors
    /// `CoreError::InsufficientFunds` if the guard rejects the debit.
    pub async fn debit_withdrawn(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: Points,
    ) -> LedgerResult<()> {
        debug!(user_id = %user_id, amount = %amount, "Debiting balance");

        let result = sqlx::query(
            r#"
            UPDATE balances SET
                current = current - ?2,
                withdrawn = withdrawn + ?2
            WHERE user_id = ?1 AND current >= ?2
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            let available = Self::current(conn, user_id).await?;
            return Err(CoreError::InsufficientFunds {
                requested: amount,
                available,
            }
            .into());
        }

        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::repository::test_support::{seed_user, test_db};
    use crate::Database;

    async fn credit(db: &Database, uid: &str, amount: Option<Points>) {
        let uid = uid.to_string();
        db.run_in_transaction(move |conn| {
            Box::pin(async move { BalanceRepository::credit(conn, &uid, amount).await })
        })
        .await
        .unwrap();
    }

    async fn debit(db: &Database, uid: &str, amount: Points) -> LedgerResult<()> {
        let uid = uid.to_string();
        db.run_in_transaction(move |conn| {
            Box::pin(async move { BalanceRepository::debit_withdrawn(conn, &uid, amount).await })
        })
        .await
    }

    #[tokio::test]
    async fn test_missing_balance_not_found() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        let err = db.balances().get(&uid).await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_credit_none_materializes_zero_row() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        credit(&db, &uid, None).await;
        credit(&db, &uid, None).await;

        let balance = db.balances().get(&uid).await.unwrap();
        assert_eq!(balance, Balance::default());
    }

    #[tokio::test]
    async fn test_credits_accumulate() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        credit(&db, &uid, Some(Points::from_whole(100))).await;
        credit(&db, &uid, Some(Points::from_whole(50))).await;

        let balance = db.balances().get(&uid).await.unwrap();
        assert_eq!(balance.current, Points::from_whole(150));
        assert_eq!(balance.withdrawn, Points::ZERO);
    }

    #[tokio::test]
    async fn test_debit_moves_both_counters() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;
        credit(&db, &uid, Some(Points::from_whole(150))).await;

        debit(&db, &uid, Points::from_whole(40)).await.unwrap();

        let balance = db.balances().get(&uid).await.unwrap();
        assert_eq!(balance.current, Points::from_whole(110));
        assert_eq!(balance.withdrawn, Points::from_whole(40));
    }

    #[tokio::test]
    async fn test_debit_guard_rejects_overdraft() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;
        credit(&db, &uid, Some(Points::from_whole(30))).await;

        let err = debit(&db, &uid, Points::from_whole(31)).await.unwrap_err();
        match err {
            LedgerError::Rejected(CoreError::InsufficientFunds {
                requested,
                available,
            }) => {
                assert_eq!(requested, Points::from_whole(31));
                assert_eq!(available, Points::from_whole(30));
            }
            other => panic!("expected InsufficientFunds, got {other:?}"),
        }

        let balance = db.balances().get(&uid).await.unwrap();
        assert_eq!(balance.current, Points::from_whole(30));
        assert_eq!(balance.withdrawn, Points::ZERO);
    }

    #[tokio::test]
    async fn test_current_defaults_to_zero() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        let current = db
            .run_in_transaction(move |conn| {
                Box::pin(async move { BalanceRepository::current(conn, &uid).await })
            })
            .await
            .unwrap();
        assert_eq!(current, Points::ZERO);
    }
}
