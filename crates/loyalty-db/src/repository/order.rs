//! # Order Repository
//!
//! Order upload, status updates, and the reconciler's work queue.
//!
//! ## Upload Outcomes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  create(conn, order)                                                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SELECT user_id FROM orders WHERE number = ?                           │
//! │       │                                                                 │
//! │       ├── no row            → INSERT (status NEW)        → Ok          │
//! │       ├── same user_id      → OrderAlreadyUploaded       (no write)    │
//! │       └── other user_id     → OrderOwnedByOther          (no write)    │
//! │                                                                         │
//! │  The lookup and the insert share the caller's transaction, and the     │
//! │  primary key on `number` rejects whatever slips between them.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::sqlite::SqliteConnection;
use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::pool::bounded;
use loyalty_core::{CoreError, Order, OrderStatus, Points};

/// Repository for order database operations.
#[derive(Debug, Clone)]
pub struct OrderRepository {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl OrderRepository {
    /// Creates a new OrderRepository.
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        OrderRepository {
            pool,
            query_timeout,
        }
    }

    // =========================================================================
    // Transactional steps
    // =========================================================================

    /// Inserts a freshly uploaded order with status NEW.
    ///
    /// ## Errors
    /// - `CoreError::OrderAlreadyUploaded` if this user already owns it
    /// - `CoreError::OrderOwnedByOther` if another user owns it
    pub async fn create(conn: &mut SqliteConnection, order: &Order) -> LedgerResult<()> {
        let owner: Option<String> =
            sqlx::query_scalar("SELECT user_id FROM orders WHERE number = ?1")
                .bind(&order.number)
                .fetch_optional(&mut *conn)
                .await?;

        match owner {
            Some(owner) if owner == order.user_id => {
                return Err(CoreError::OrderAlreadyUploaded(order.number.clone()).into());
            }
            Some(_) => {
                return Err(CoreError::OrderOwnedByOther(order.number.clone()).into());
            }
            None => {}
        }

        debug!(order = %order.number, user_id = %order.user_id, "Inserting order");

        sqlx::query(
            r#"
            INSERT INTO orders (number, user_id, status, accrual, uploaded_at)
            VALUES (?1, ?2, ?3, NULL, ?4)
            "#,
        )
        .bind(&order.number)
        .bind(&order.user_id)
        .bind(OrderStatus::New)
        .bind(order.uploaded_at)
        .execute(&mut *conn)
        .await?;

        Ok(())
    }

    /// Reads the accrual already stored for an unfinished order.
    ///
    /// `None` if the order is unknown, terminal, or has no accrual yet.
    pub async fn stored_accrual(
        conn: &mut SqliteConnection,
        number: &str,
    ) -> DbResult<Option<Points>> {
        let accrual: Option<Option<Points>> = sqlx::query_scalar(
            r#"
            SELECT accrual FROM orders
            WHERE number = ?1 AND status IN (?2, ?3)
            "#,
        )
        .bind(number)
        .bind(OrderStatus::UNFINISHED[0])
        .bind(OrderStatus::UNFINISHED[1])
        .fetch_optional(&mut *conn)
        .await?;

        Ok(accrual.flatten())
    }

    /// Overwrites status and accrual for an order that is still unfinished.
    ///
    /// ## Returns
    /// `true` if a row changed. `false` if the number is unknown or the
    /// order already reached a terminal status, in which case nothing is
    /// written and the caller must not credit anything.
    pub async fn update(conn: &mut SqliteConnection, order: &Order) -> DbResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders SET
                status = ?2,
                accrual = ?3
            WHERE number = ?1 AND status IN (?4, ?5)
            "#,
        )
        .bind(&order.number)
        .bind(order.status)
        .bind(order.accrual)
        .bind(OrderStatus::UNFINISHED[0])
        .bind(OrderStatus::UNFINISHED[1])
        .execute(&mut *conn)
        .await?;

        let changed = result.rows_affected() > 0;
        debug!(
            order = %order.number,
            status = %order.status,
            accrual = ?order.accrual,
            changed,
            "Updated order"
        );

        Ok(changed)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Gets an order by number.
    pub async fn get(&self, number: &str) -> DbResult<Option<Order>> {
        bounded(self.query_timeout, "get order", async {
            sqlx::query_as::<_, Order>(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE number = ?1
                "#,
            )
            .bind(number)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await
    }

    /// Lists a user's orders, oldest upload first.
    ///
    /// ## Errors
    /// `CoreError::NoOrders` if the user has none.
    pub async fn list_for_user(&self, user_id: &str) -> LedgerResult<Vec<Order>> {
        let orders = bounded(self.query_timeout, "list orders", async {
            sqlx::query_as::<_, Order>(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE user_id = ?1
                ORDER BY uploaded_at, rowid
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await?;

        if orders.is_empty() {
            return Err(CoreError::NoOrders.into());
        }

        Ok(orders)
    }

    /// Lists every order in NEW or PROCESSING across all users.
    ///
    /// This is the reconciler's work queue. Terminal orders never appear.
    pub async fn list_unfinished(&self) -> DbResult<Vec<Order>> {
        bounded(self.query_timeout, "list unfinished orders", async {
            sqlx::query_as::<_, Order>(
                r#"
                SELECT number, user_id, status, accrual, uploaded_at
                FROM orders
                WHERE status IN (?1, ?2)
                ORDER BY uploaded_at, rowid
                "#,
            )
            .bind(OrderStatus::UNFINISHED[0])
            .bind(OrderStatus::UNFINISHED[1])
            .fetch_all(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await
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

    async fn create(db: &Database, order: Order) -> LedgerResult<()> {
        db.run_in_transaction(move |conn| {
            Box::pin(async move { OrderRepository::create(conn, &order).await })
        })
        .await
    }

    async fn update(db: &Database, order: Order) -> DbResult<bool> {
        db.run_in_transaction(move |conn| {
            Box::pin(async move { OrderRepository::update(conn, &order).await })
        })
        .await
    }

    #[tokio::test]
    async fn test_create_and_list() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        create(&db, Order::new("79927398713", &uid)).await.unwrap();
        create(&db, Order::new("18", &uid)).await.unwrap();

        let orders = db.orders().list_for_user(&uid).await.unwrap();
        let numbers: Vec<_> = orders.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, ["79927398713", "18"]);
        assert!(orders.iter().all(|o| o.status == OrderStatus::New && o.accrual.is_none()));
    }

    #[tokio::test]
    async fn test_same_user_duplicate() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        create(&db, Order::new("79927398713", &uid)).await.unwrap();
        let err = create(&db, Order::new("79927398713", &uid)).await.unwrap_err();

        assert!(matches!(
            err,
            LedgerError::Rejected(CoreError::OrderAlreadyUploaded(_))
        ));
        assert_eq!(db.orders().list_for_user(&uid).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_other_user_rejected() {
        let db = test_db().await;
        let alice = seed_user(&db, "alice").await;
        let bob = seed_user(&db, "bob").await;

        create(&db, Order::new("79927398713", &alice)).await.unwrap();
        let err = create(&db, Order::new("79927398713", &bob)).await.unwrap_err();

        assert!(matches!(err, LedgerError::Rejected(CoreError::OrderOwnedByOther(_))));

        let stored = db.orders().get("79927398713").await.unwrap().unwrap();
        assert_eq!(stored.user_id, alice);
        assert!(matches!(
            db.orders().list_for_user(&bob).await,
            Err(LedgerError::Rejected(CoreError::NoOrders))
        ));
    }

    #[tokio::test]
    async fn test_update_only_unfinished() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;
        create(&db, Order::new("79927398713", &uid)).await.unwrap();

        let mut order = db.orders().get("79927398713").await.unwrap().unwrap();
        order.status = OrderStatus::Processed;
        order.accrual = Some(Points::from_whole(500));
        assert!(update(&db, order.clone()).await.unwrap());

        // A replayed verdict finds the order terminal and changes nothing
        order.accrual = Some(Points::from_whole(900));
        assert!(!update(&db, order).await.unwrap());

        let stored = db.orders().get("79927398713").await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Processed);
        assert_eq!(stored.accrual, Some(Points::from_whole(500)));
    }

    #[tokio::test]
    async fn test_update_unknown_is_noop() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        let mut ghost = Order::new("18", &uid);
        ghost.status = OrderStatus::Processing;
        assert!(!update(&db, ghost).await.unwrap());
        assert!(db.orders().get("18").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unfinished_excludes_terminal() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;

        for number in ["79927398713", "18", "0", "26"] {
            create(&db, Order::new(number, &uid)).await.unwrap();
        }

        let verdicts = [
            ("18", OrderStatus::Processing, None),
            ("0", OrderStatus::Processed, Some(Points::from_whole(10))),
            ("26", OrderStatus::Invalid, None),
        ];
        for (number, status, accrual) in verdicts {
            let mut order = db.orders().get(number).await.unwrap().unwrap();
            order.status = status;
            order.accrual = accrual;
            update(&db, order).await.unwrap();
        }

        let unfinished = db.orders().list_unfinished().await.unwrap();
        let numbers: Vec<_> = unfinished.iter().map(|o| o.number.as_str()).collect();
        assert_eq!(numbers, ["79927398713", "18"]);
        assert!(unfinished.iter().all(|o| !o.status.is_terminal()));
    }

    #[tokio::test]
    async fn test_zero_accrual_distinct_from_absent() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;
        create(&db, Order::new("0", &uid)).await.unwrap();

        let mut order = db.orders().get("0").await.unwrap().unwrap();
        order.status = OrderStatus::Processed;
        order.accrual = Some(Points::ZERO);
        update(&db, order).await.unwrap();

        let stored = db.orders().get("0").await.unwrap().unwrap();
        assert_eq!(stored.accrual, Some(Points::ZERO));
    }

    #[tokio::test]
    async fn test_stored_accrual_tracks_unfinished_rows() {
        let db = test_db().await;
        let uid = seed_user(&db, "alice").await;
        create(&db, Order::new("18", &uid)).await.unwrap();

        let read = |db: Database| async move {
            db.run_in_transaction(|conn| {
                Box::pin(async move { OrderRepository::stored_accrual(conn, "18").await })
            })
            .await
            .unwrap()
        };
        assert_eq!(read(db.clone()).await, None);

        let mut order = db.orders().get("18").await.unwrap().unwrap();
        order.status = OrderStatus::Processing;
        order.accrual = Some(Points::from_whole(10));
        update(&db, order.clone()).await.unwrap();
        assert_eq!(read(db.clone()).await, Some(Points::from_whole(10)));

        // Terminal orders are out of reach
        order.status = OrderStatus::Processed;
        update(&db, order).await.unwrap();
        assert_eq!(read(db.clone()).await, None);
    }
}
