//! PostgreSQL store implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{info, instrument};

use crate::domain::{
    AppError, DatabaseClient, DatabaseError, FilteredTransaction, MintTask, MintTaskStatus,
};

/// PostgreSQL connection pool configuration.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Duration,
    pub max_lifetime: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 2,
            acquire_timeout: Duration::from_secs(3),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: Duration::from_secs(1800),
        }
    }
}

/// PostgreSQL store with connection pooling.
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect with custom pool configuration.
    pub async fn new(database_url: &str, config: PostgresConfig) -> Result<Self, AppError> {
        info!("Connecting to PostgreSQL...");
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime)
            .connect(database_url)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Connect with default pool configuration.
    pub async fn with_defaults(database_url: &str) -> Result<Self, AppError> {
        Self::new(database_url, PostgresConfig::default()).await
    }

    /// Run database migrations.
    pub async fn run_migrations(&self) -> Result<(), AppError> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Migration(e.to_string())))?;
        info!("Database migrations completed");
        Ok(())
    }

    /// The underlying pool, leased to handlers for transactional writes.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_mint_task(row: &sqlx::postgres::PgRow) -> MintTask {
        let status: String = row.get("status");
        MintTask {
            id: row.get("id"),
            user_address: row.get("user_address"),
            amount: row.get("amount"),
            status: status.parse().unwrap_or(MintTaskStatus::Pending),
            retry_count: row.get("retry_count"),
            next_retry_time: row.get("next_retry_time"),
            tx_hash: row.get("tx_hash"),
            remark: row.get("remark"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
        }
    }
}

#[async_trait]
impl DatabaseClient for PgStore {
    #[instrument(skip(self))]
    async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn max_filtered_block_number(&self) -> Result<Option<i64>, AppError> {
        let row = sqlx::query("SELECT MAX(block_number) AS max_block FROM filter_transaction")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;
        Ok(row.get("max_block"))
    }

    #[instrument(skip(self))]
    async fn eligible_mint_tasks(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<MintTask>, AppError> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_address, amount, status, retry_count, next_retry_time,
                   tx_hash, remark, created_at, updated_at
            FROM mint_token_task
            WHERE next_retry_time <= NOW()
              AND retry_count < $1
              AND status IN ('pending', 'failed')
            ORDER BY id
            LIMIT $2
            "#,
        )
        .bind(max_retries)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(rows.iter().map(Self::row_to_mint_task).collect())
    }

    #[instrument(skip(self))]
    async fn claim_mint_task(&self, task_id: i64) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE mint_token_task
            SET status = 'processing', updated_at = NOW()
            WHERE id = $1 AND status IN ('pending', 'failed')
            "#,
        )
        .bind(task_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, remark))]
    async fn mark_mint_task_failed(
        &self,
        task_id: i64,
        next_retry_time: DateTime<Utc>,
        remark: &str,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE mint_token_task
            SET status = 'failed',
                retry_count = retry_count + 1,
                next_retry_time = $2,
                remark = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(task_id)
        .bind(next_retry_time)
        .bind(remark)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn mark_mint_task_sent(&self, task_id: i64, tx_hash: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE mint_token_task
            SET status = 'sent',
                retry_count = retry_count + 1,
                tx_hash = $2,
                updated_at = NOW()
            WHERE id = $1 AND status = 'processing'
            "#,
        )
        .bind(task_id)
        .bind(tx_hash)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

        Ok(())
    }
}

/// Check whether a transaction has already been processed. Runs on the
/// caller's executor so it can join the handler's database transaction.
pub async fn filter_row_exists<'e, E>(
    executor: E,
    block_number: i64,
    tx_hash: &str,
) -> Result<bool, AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query(
        "SELECT id FROM filter_transaction WHERE block_number = $1 AND tx_hash = $2",
    )
    .bind(block_number)
    .bind(tx_hash)
    .fetch_optional(executor)
    .await
    .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

    Ok(row.is_some())
}

/// Insert a filtered-transaction log row on the caller's executor.
pub async fn insert_filter_row<'e, E>(
    executor: E,
    row: &FilteredTransaction,
) -> Result<(), AppError>
where
    E: sqlx::PgExecutor<'e>,
{
    sqlx::query(
        r#"
        INSERT INTO filter_transaction (block_number, tx_hash, tx_index, tx_value, tx_status)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(row.block_number)
    .bind(&row.tx_hash)
    .bind(row.tx_index)
    .bind(&row.tx_value)
    .bind(row.tx_status)
    .execute(executor)
    .await
    .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

    Ok(())
}
