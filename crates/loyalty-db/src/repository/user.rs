//! # User Repository
//!
//! Registration and login lookup.

use sqlx::SqlitePool;
use std::time::Duration;
use tracing::debug;

use crate::error::{DbError, DbResult, LedgerResult};
use crate::pool::bounded;
use loyalty_core::{CoreError, User};

/// Repository for user database operations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl UserRepository {
    /// Creates a new UserRepository.
    pub fn new(pool: SqlitePool, query_timeout: Duration) -> Self {
        UserRepository {
            pool,
            query_timeout,
        }
    }

    /// Inserts a new user.
    ///
    /// ## Errors
    /// `CoreError::UserAlreadyExists` when the login is taken. Detected from
    /// the affected-row count of a conflict-ignoring insert, so two racing
    /// registrations cannot both succeed.
    pub async fn create(&self, user: &User) -> LedgerResult<()> {
        debug!(user_id = %user.id, login = %user.login, "Creating user");

        let result = bounded(self.query_timeout, "create user", async {
            sqlx::query(
                r#"
                INSERT INTO users (id, login, password_hash, created_at)
                VALUES (?1, ?2, ?3, ?4)
                ON CONFLICT(login) DO NOTHING
                "#,
            )
            .bind(&user.id)
            .bind(&user.login)
            .bind(&user.password_hash)
            .bind(user.created_at)
            .execute(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::UserAlreadyExists(user.login.clone()).into());
        }

        Ok(())
    }

    /// Looks up a user by login.
    ///
    /// ## Errors
    /// `DbError::NotFound` if no user has this login.
    pub async fn find_by_login(&self, login: &str) -> DbResult<User> {
        let user: Option<User> = bounded(self.query_timeout, "find user", async {
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, login, password_hash, created_at
                FROM users
                WHERE login = ?1
                "#,
            )
            .bind(login)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::from)
        })
        .await?;

        user.ok_or_else(|| DbError::not_found("User", login))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LedgerError;
    use crate::repository::test_support::test_db;

    #[tokio::test]
    async fn test_create_and_find() {
        let db = test_db().await;
        let user = User::new("alice", "$argon2id$hash");

        db.users().create(&user).await.unwrap();

        let found = db.users().find_by_login("alice").await.unwrap();
        assert_eq!(found.id, user.id);
        assert_eq!(found.password_hash, "$argon2id$hash");
    }

    #[tokio::test]
    async fn test_duplicate_login_rejected() {
        let db = test_db().await;
        db.users().create(&User::new("alice", "h1")).await.unwrap();

        let err = db.users().create(&User::new("alice", "h2")).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::Rejected(CoreError::UserAlreadyExists(ref login)) if login == "alice"
        ));

        // First registration is untouched
        let found = db.users().find_by_login("alice").await.unwrap();
        assert_eq!(found.password_hash, "h1");
    }

    #[tokio::test]
    async fn test_unknown_login_not_found() {
        let db = test_db().await;
        let err = db.users().find_by_login("nobody").await.unwrap_err();
        assert!(matches!(err, DbError::NotFound { .. }));
    }
}
