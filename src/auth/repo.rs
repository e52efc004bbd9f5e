use std::{future::Future, time::Duration};

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;
use tracing::{debug, error, warn};

use crate::auth::{
    password::{HashError, PasswordHasher},
    repo_types::{canonical_email, NewUser, User},
};

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("user not found")]
    NotFound,
    #[error("{0}")]
    Storage(String),
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),
    #[error(transparent)]
    Hash(#[from] HashError),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            other => StoreError::Storage(other.to_string()),
        }
    }
}

/// Persistence for user identity records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// All users ordered by `(last_name, id)`.
    async fn get_all(&self) -> Result<Vec<User>, StoreError>;
    async fn get_by_email(&self, email: &str) -> Result<User, StoreError>;
    async fn get_by_id(&self, id: i64) -> Result<User, StoreError>;
    /// Hashes `new_user.password` and returns the assigned id.
    async fn insert(&self, new_user: NewUser) -> Result<i64, StoreError>;
    /// Persists profile fields and refreshes `updated_at`.
    async fn update(&self, user: &User) -> Result<(), StoreError>;
    /// Deleting an unknown id succeeds.
    async fn delete(&self, id: i64) -> Result<(), StoreError>;
    /// Overwrites the password hash only.
    async fn reset_password(&self, id: i64, new_password: &str) -> Result<(), StoreError>;
}

/// Argon2 is CPU-bound; keep it off the async workers.
pub(crate) async fn hash_blocking(
    hasher: &PasswordHasher,
    plain: &str,
) -> Result<String, StoreError> {
    let hasher = hasher.clone();
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || hasher.hash(&plain))
        .await
        .map_err(|e| StoreError::Hash(HashError::Hashing(e.to_string())))?
        .map_err(StoreError::from)
}

/// Blocking-pool counterpart of [`PasswordHasher::verify`].
pub(crate) async fn verify_blocking(
    hasher: &PasswordHasher,
    hash: &str,
    plain: &str,
) -> Result<bool, HashError> {
    let hasher = hasher.clone();
    let hash = hash.to_owned();
    let plain = plain.to_owned();
    tokio::task::spawn_blocking(move || hasher.verify(&hash, &plain))
        .await
        .map_err(|e| HashError::Hashing(e.to_string()))?
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
    hasher: PasswordHasher,
    query_timeout: Duration,
}

impl PgUserStore {
    pub fn new(db: PgPool, hasher: PasswordHasher, query_timeout: Duration) -> Self {
        Self {
            db,
            hasher,
            query_timeout,
        }
    }

    /// Runs one query under the store's timeout. Dropping the future on expiry
    /// cancels the query and returns its connection to the pool.
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match tokio::time::timeout(self.query_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(sqlx::Error::RowNotFound)) => Err(StoreError::NotFound),
            Ok(Err(e)) => {
                error!(error = %e, op, "user store query failed");
                Err(e.into())
            }
            Err(_) => {
                warn!(op, timeout_ms = self.query_timeout.as_millis() as u64, "user store query timed out");
                Err(StoreError::Timeout(self.query_timeout))
            }
        }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_all(&self) -> Result<Vec<User>, StoreError> {
        self.bounded(
            "get_all",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, first_name, last_name, password, created_at, updated_at
                FROM users
                ORDER BY last_name, id
                "#,
            )
            .fetch_all(&self.db),
        )
        .await
    }

    async fn get_by_email(&self, email: &str) -> Result<User, StoreError> {
        let email = canonical_email(email);
        self.bounded(
            "get_by_email",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, first_name, last_name, password, created_at, updated_at
                FROM users
                WHERE email = $1
                "#,
            )
            .bind(&email)
            .fetch_optional(&self.db),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn get_by_id(&self, id: i64) -> Result<User, StoreError> {
        self.bounded(
            "get_by_id",
            sqlx::query_as::<_, User>(
                r#"
                SELECT id, email, first_name, last_name, password, created_at, updated_at
                FROM users
                WHERE id = $1
                "#,
            )
            .bind(id)
            .fetch_optional(&self.db),
        )
        .await?
        .ok_or(StoreError::NotFound)
    }

    async fn insert(&self, new_user: NewUser) -> Result<i64, StoreError> {
        let hash = hash_blocking(&self.hasher, &new_user.password).await?;
        let now = OffsetDateTime::now_utc();
        let id = self
            .bounded(
                "insert",
                sqlx::query_scalar::<_, i64>(
                    r#"
                    INSERT INTO users (email, first_name, last_name, password, created_at, updated_at)
                    VALUES ($1, $2, $3, $4, $5, $5)
                    RETURNING id
                    "#,
                )
                .bind(canonical_email(&new_user.email))
                .bind(&new_user.first_name)
                .bind(&new_user.last_name)
                .bind(&hash)
                .bind(now)
                .fetch_one(&self.db),
            )
            .await?;
        debug!(user_id = id, "user inserted");
        Ok(id)
    }

    async fn update(&self, user: &User) -> Result<(), StoreError> {
        let result = self
            .bounded(
                "update",
                sqlx::query(
                    r#"
                    UPDATE users
                    SET email = $1, first_name = $2, last_name = $3,
                        updated_at = GREATEST($4, updated_at)
                    WHERE id = $5
                    "#,
                )
                .bind(canonical_email(&user.email))
                .bind(&user.first_name)
                .bind(&user.last_name)
                .bind(OffsetDateTime::now_utc())
                .bind(user.id)
                .execute(&self.db),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), StoreError> {
        let result = self
            .bounded(
                "delete",
                sqlx::query("DELETE FROM users WHERE id = $1")
                    .bind(id)
                    .execute(&self.db),
            )
            .await?;
        debug!(user_id = id, rows = result.rows_affected(), "user delete");
        Ok(())
    }

    async fn reset_password(&self, id: i64, new_password: &str) -> Result<(), StoreError> {
        let hash = hash_blocking(&self.hasher, new_password).await?;
        let result = self
            .bounded(
                "reset_password",
                sqlx::query("UPDATE users SET password = $1 WHERE id = $2")
                    .bind(&hash)
                    .bind(id)
                    .execute(&self.db),
            )
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }
}
