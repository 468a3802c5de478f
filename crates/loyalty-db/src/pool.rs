//! # Database Pool Management
//!
//! Connection pool creation, deadlines, and the transaction runner.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Database Connection Pool                           │
//! │                                                                         │
//! │  Node startup                                                          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  DbConfig::new(url) ← pool size, query + transaction deadlines         │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  │  ┌─────┐ ┌─────┐ ┌─────┐ ┌─────┐       │                           │
//! │  │  │Conn1│ │Conn2│ │Conn3│ │Conn4│ ...   │  (max_connections)        │
//! │  │  └─────┘ └─────┘ └─────┘ └─────┘       │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├──► reads: repositories, each bounded by query_timeout          │
//! │       │                                                                 │
//! │       └──► writes: run_in_transaction, bounded by transaction_timeout  │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Transactions Are The Only Lock
//! No mutex guards a balance. Every multi-step mutation (order + balance,
//! withdrawal + balance) runs inside exactly one [`Database::run_in_transaction`]
//! call, so either every statement commits or none does.

use futures::future::BoxFuture;
use futures::FutureExt;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteConnection, SqliteJournalMode, SqlitePoolOptions,
    SqliteSynchronous,
};
use sqlx::SqlitePool;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{BalanceRepository, OrderRepository, UserRepository, WithdrawalRepository};

// =============================================================================
// Configuration
// =============================================================================

/// Database configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = DbConfig::new("sqlite://loyalty.db")
///     .max_connections(5)
///     .query_timeout(Duration::from_secs(1))
///     .transaction_timeout(Duration::from_secs(2));
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// `sqlite://path`, `sqlite::memory:`, or a bare file path.
    pub url: String,

    /// Maximum number of connections in the pool.
    /// Default: 5
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    /// Default: 1
    pub min_connections: u32,

    /// How long to wait for a free connection.
    /// Default: 30 seconds
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections.
    /// Default: 10 minutes
    pub idle_timeout: Option<Duration>,

    /// Maximum age of a pooled connection. `None` keeps connections.
    /// Default: 30 minutes
    pub max_lifetime: Option<Duration>,

    /// Deadline for a single read outside a transaction.
    /// Default: 1 second
    pub query_timeout: Duration,

    /// Deadline for a whole transaction, begin through commit.
    /// Default: 2 seconds
    pub transaction_timeout: Duration,

    /// How long SQLite itself waits on a locked database before giving up.
    /// Default: 1 second
    pub busy_timeout: Duration,

    /// Whether to run migrations on connect.
    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// Creates a new database configuration for the given URL or path.
    ///
    /// ## Arguments
    /// * `url` - `sqlite://...` URL or a file path. The file is created if
    ///   it doesn't exist.
    pub fn new(url: impl Into<String>) -> Self {
        DbConfig {
            url: url.into(),
            max_connections: 5,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            query_timeout: Duration::from_secs(1),
            transaction_timeout: Duration::from_secs(2),
            busy_timeout: Duration::from_secs(1),
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the minimum number of connections.
    pub fn min_connections(mut self, min: u32) -> Self {
        self.min_connections = min;
        self
    }

    /// Sets the connection acquire timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets the per-query deadline.
    pub fn query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Sets the whole-transaction deadline.
    pub fn transaction_timeout(mut self, timeout: Duration) -> Self {
        self.transaction_timeout = timeout;
        self
    }

    /// Sets SQLite's busy handler timeout.
    pub fn busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on connect.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Creates an in-memory database configuration (for testing).
    ///
    /// A single connection that is never recycled, since every new
    /// in-memory connection would see an empty database.
    pub fn in_memory() -> Self {
        DbConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            max_lifetime: None,
            ..DbConfig::new("sqlite::memory:")
        }
    }

    fn connect_url(&self) -> String {
        if self.url.starts_with("sqlite:") {
            self.url.clone()
        } else {
            format!("sqlite://{}", self.url)
        }
    }
}

// =============================================================================
// Database
// =============================================================================

/// Main database handle providing repository access and transactions.
///
/// Cheap to clone: clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    query_timeout: Duration,
    transaction_timeout: Duration,
}

impl Database {
    /// Creates a new database connection pool.
    ///
    /// ## What This Does
    /// 1. Creates the database file if it doesn't exist
    /// 2. Configures SQLite:
    ///    - WAL mode for concurrent reads
    ///    - NORMAL synchronous (balance of safety/speed)
    ///    - Foreign keys enabled
    ///    - busy timeout so short lock waits don't fail outright
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        let url = config.connect_url();
        info!(url = %url, "Initializing database connection");

        let connect_options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            // SQLite has them disabled by default for backwards compatibility
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout)
            .create_if_missing(true);

        debug!("Connection options configured");

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect_with(connect_options)
            .await
            .map_err(|e| DbError::ConnectionFailed(e.to_string()))?;

        info!(
            max_connections = config.max_connections,
            query_timeout_ms = config.query_timeout.as_millis() as u64,
            transaction_timeout_ms = config.transaction_timeout.as_millis() as u64,
            "Database pool created"
        );

        let db = Database {
            pool,
            query_timeout: config.query_timeout,
            transaction_timeout: config.transaction_timeout,
        };

        if config.run_migrations {
            db.run_migrations().await?;
        }

        Ok(db)
    }

    /// Runs database migrations. Idempotent.
    pub async fn run_migrations(&self) -> DbResult<()> {
        migrations::run_migrations(&self.pool).await
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Per-query deadline applied by the repositories.
    pub fn query_timeout(&self) -> Duration {
        self.query_timeout
    }

    /// Returns the user repository.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone(), self.query_timeout)
    }

    /// Returns the order repository.
    pub fn orders(&self) -> OrderRepository {
        OrderRepository::new(self.pool.clone(), self.query_timeout)
    }

    /// Returns the balance repository.
    pub fn balances(&self) -> BalanceRepository {
        BalanceRepository::new(self.pool.clone(), self.query_timeout)
    }

    /// Returns the withdrawal repository.
    pub fn withdrawals(&self) -> WithdrawalRepository {
        WithdrawalRepository::new(self.pool.clone(), self.query_timeout)
    }

    /// Runs `f` inside one database transaction.
    ///
    /// ## Outcome
    /// ```text
    /// ┌────────────────────────┬──────────────────────────────────────────┐
    /// │ f returns Ok(v)        │ COMMIT, return Ok(v)                     │
    /// │ f returns Err(e)       │ ROLLBACK, return Err(e) unchanged        │
    /// │ f panics               │ ROLLBACK, log at error level,            │
    /// │                        │ return DbError::TransactionPanicked      │
    /// │ transaction_timeout    │ ROLLBACK (transaction dropped),          │
    /// │ expires                │ return DbError::Timeout                  │
    /// └────────────────────────┴──────────────────────────────────────────┘
    /// ```
    ///
    /// The transaction starts with `BEGIN IMMEDIATE`, so concurrent units
    /// of work are serialized by SQLite and wait up to `busy_timeout` for
    /// each other.
    ///
    /// `f` receives the transaction's connection. Every statement of the
    /// unit of work must go through that connection, never through the pool.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let credited = db
    ///     .run_in_transaction(move |conn| {
    ///         Box::pin(async move {
    ///             let changed = OrderRepository::update(conn, &order).await?;
    ///             if changed {
    ///                 BalanceRepository::credit(conn, &order.user_id, order.accrual).await?;
    ///             }
    ///             Ok::<_, LedgerError>(changed)
    ///         })
    ///     })
    ///     .await?;
    /// ```
    pub async fn run_in_transaction<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DbError> + fmt::Display + Send,
    {
        let limit = self.transaction_timeout;

        match tokio::time::timeout(limit, self.transact(f)).await {
            Ok(result) => result,
            Err(_) => {
                // Dropping the in-flight sqlx Transaction queues its rollback
                warn!(timeout_ms = limit.as_millis() as u64, "Transaction timed out, rolled back");
                Err(DbError::timeout("transaction", limit).into())
            }
        }
    }

    async fn transact<F, T, E>(&self, f: F) -> Result<T, E>
    where
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, E>> + Send,
        T: Send,
        E: From<DbError> + fmt::Display + Send,
    {
        // Take the write lock up front so writers queue on busy_timeout
        // instead of failing when a read upgrades to a write
        let mut tx = self
            .pool
            .begin_with("BEGIN IMMEDIATE")
            .await
            .map_err(DbError::from)?;

        let outcome = AssertUnwindSafe(f(&mut *tx)).catch_unwind().await;

        match outcome {
            Ok(Ok(value)) => {
                tx.commit().await.map_err(|e| match DbError::from(e) {
                    busy @ DbError::Busy(_) => busy,
                    other => DbError::TransactionFailed(other.to_string()),
                })?;
                Ok(value)
            }
            Ok(Err(err)) => {
                debug!(error = %err, "Transaction rolled back");
                if let Err(e) = tx.rollback().await {
                    warn!(error = %e, "Rollback failed");
                }
                Err(err)
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!(panic = %message, "Transaction panicked, rolling back");
                if let Err(e) = tx.rollback().await {
                    error!(error = %e, "Rollback after panic failed");
                }
                Err(DbError::TransactionPanicked(message).into())
            }
        }
    }

    /// Closes the database connection pool.
    ///
    /// After calling close, all repository operations will fail.
    pub async fn close(&self) {
        info!("Closing database connection pool");
        self.pool.close().await;
    }

    /// Checks if the database is healthy (can execute queries).
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Deadlines
// =============================================================================

/// Runs a storage future under a deadline.
pub(crate) async fn bounded<T, F>(limit: Duration, operation: &'static str, fut: F) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => {
            warn!(operation, timeout_ms = limit.as_millis() as u64, "Query timed out");
            Err(DbError::timeout(operation, limit))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
