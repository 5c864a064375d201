//! PostgreSQL implementation of TokenStore
//!
//! Production persistence using PostgreSQL with:
//! - Create-once inserts via `ON CONFLICT`
//! - Consume-once via a single conditional `UPDATE .. RETURNING`

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error, instrument, warn};

use super::store::*;

/// PostgreSQL implementation of TokenStore
///
/// Uses a connection pool for efficient database access. The schema lives in
/// `crates/durable/migrations` and can be applied with [`Self::migrate`].
///
/// # Example
///
/// ```ignore
/// use taskbridge_durable::PostgresTokenStore;
/// use sqlx::PgPool;
///
/// let pool = PgPool::connect("postgres://localhost/mydb").await?;
/// let store = PostgresTokenStore::new(pool);
/// store.migrate().await?;
/// ```
#[derive(Clone)]
pub struct PostgresTokenStore {
    pool: PgPool,
    strictness: PutStrictness,
}

impl PostgresTokenStore {
    /// Create a new PostgreSQL store with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            strictness: PutStrictness::Reject,
        }
    }

    /// Set the duplicate-put behavior
    pub fn with_strictness(mut self, strictness: PutStrictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Apply the bundled schema migrations
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl TokenStore for PostgresTokenStore {
    #[instrument(skip(self, token))]
    async fn put(&self, execution_id: &str, token: ResumeToken) -> Result<(), PersistFailure> {
        match self.strictness {
            PutStrictness::Reject => {
                let result = sqlx::query(
                    r#"
                    INSERT INTO callback_tokens (execution_id, token)
                    VALUES ($1, $2)
                    ON CONFLICT (execution_id) DO NOTHING
                    "#,
                )
                .bind(execution_id)
                .bind(token.expose())
                .execute(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to store token record: {}", e);
                    PersistFailure::Database(e.to_string())
                })?;

                if result.rows_affected() == 0 {
                    return Err(PersistFailure::AlreadyExists(execution_id.to_string()));
                }
            }
            PutStrictness::Overwrite => {
                let row = sqlx::query(
                    r#"
                    INSERT INTO callback_tokens (execution_id, token)
                    VALUES ($1, $2)
                    ON CONFLICT (execution_id) DO UPDATE
                    SET token = EXCLUDED.token,
                        created_at = NOW(),
                        consumed = FALSE,
                        consumed_at = NULL
                    RETURNING (xmax = 0) AS inserted
                    "#,
                )
                .bind(execution_id)
                .bind(token.expose())
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    error!("Failed to store token record: {}", e);
                    PersistFailure::Database(e.to_string())
                })?;

                let inserted: bool = row.get("inserted");
                if !inserted {
                    warn!(%execution_id, "overwrote existing token record");
                }
            }
        }

        debug!(%execution_id, "stored token record");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, execution_id: &str) -> Result<TokenRecord, LookupFailure> {
        let row = sqlx::query(
            r#"
            SELECT execution_id, token, created_at, consumed
            FROM callback_tokens
            WHERE execution_id = $1
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to load token record: {}", e);
            LookupFailure::Database(e.to_string())
        })?
        .ok_or_else(|| LookupFailure::NotFound(execution_id.to_string()))?;

        let token: String = row.get("token");
        Ok(TokenRecord {
            execution_id: row.get("execution_id"),
            token: ResumeToken::new(token),
            created_at: row.get("created_at"),
            consumed: row.get("consumed"),
        })
    }

    #[instrument(skip(self))]
    async fn mark_consumed(&self, execution_id: &str) -> Result<(), ConsumeError> {
        let updated = sqlx::query(
            r#"
            UPDATE callback_tokens
            SET consumed = TRUE, consumed_at = NOW()
            WHERE execution_id = $1 AND consumed = FALSE
            RETURNING execution_id
            "#,
        )
        .bind(execution_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            error!("Failed to mark token consumed: {}", e);
            ConsumeError::Database(e.to_string())
        })?;

        if updated.is_some() {
            debug!(%execution_id, "marked token consumed");
            return Ok(());
        }

        // Lost the compare-and-set: either already consumed or never written
        let exists = sqlx::query("SELECT 1 FROM callback_tokens WHERE execution_id = $1")
            .bind(execution_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to check token record: {}", e);
                ConsumeError::Database(e.to_string())
            })?;

        match exists {
            Some(_) => Err(DuplicateResume {
                execution_id: execution_id.to_string(),
            }
            .into()),
            None => Err(ConsumeError::NotFound(execution_id.to_string())),
        }
    }
}

