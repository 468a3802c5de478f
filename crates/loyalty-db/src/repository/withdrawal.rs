//! # Withdrawal Repository
//!
//! Append-only withdrawal history. Rows are never updated or deleted.

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::pool::bounded;
use loyalty_core::{CoreError, Withdrawal};

/// Repository for withdrawal database operations.
#[derive(Debug, Clone)]
pub struct WithdrawalRepository {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl WithdrawalRepository {
    /// Creates a new WithdrawalRepository.
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        WithdrawalRepository {
            pool,
            query_timeout,
        }
    }

    /// Appends a withdrawal inside the caller's transaction.
    pub async fn record(conn: &mut SqliteConnection, withdrawal: &Withdrawal) -> DbResult<()> {
        debug!(
            user_id = %withdrawal.user_id,
            order = %withdrawal.order,
            sum = %withdrawal.sum,
            "Recording withdrawal"
        );

        sqlx::query(
            r#"
            INSERT INTO withdrawals (user_id, order_number, amount, processed_at)
            VALUES (?1, ?2, ?3, ?4)
            "#,
        )
        .bind(&withdrawal.user_id)
        .bind(&withdrawal.order)
        .bind(withdrawal.sum)
        .bind(withdrawal.processed_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Lists a user's withdrawals, oldest first.
    ///
    /// ## Errors
    /// `CoreError::NoWithdrawals` if the user has none.
    pub async fn list_for_user(&self, user_id: &str) -> LedgerResult<Vec<Withdrawal>> {
        let withdrawals = bounded(self.query_timeout, "list withdrawals", async {
            sqlx::query_as::<_, Withdrawal>(
                r#"
                SELECT user_id, order_number, amount, processed_at
                FROM withdrawals
                WHERE user_id = ?1
                ORDER BY processed_at, id
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await?;

        if withdrawals.is_empty() {
            return Err(CoreError::NoWithdrawals.into());
        }

        Ok(withdrawals)
    }
}
