//! Business handlers for watched addresses.
//!
//! Both handlers follow the same contract: fetch the receipt themselves
//! (bounded retry, loud failure), short-circuit on the
//! `(block_number, tx_hash)` idempotency check, then run the filter-log
//! insert and their business writes inside one database transaction.

use alloy::primitives::Address;
use async_trait::async_trait;
use sqlx::PgPool;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::config::RetryPolicy;
use crate::domain::{
    AppError, DatabaseError, DispatchError, FilteredTransaction, HandlerContext, RpcReceipt,
    RpcTransaction, TransactionHandler,
};
use crate::infra::database::{filter_row_exists, insert_filter_row};
use crate::infra::rpc::retry::receipt_with_retry;
use crate::infra::rpc::units::{hex_to_ether, hex_to_number, wei_to_ether};
use crate::infra::rpc::FunctionRegistry;

/// Receipt successful status word.
const RECEIPT_SUCCESS: i64 = 1;

/// Build the filter-log row for a transaction and its receipt status.
fn filtered_row(tx: &RpcTransaction, status: i64) -> Result<FilteredTransaction, AppError> {
    Ok(FilteredTransaction {
        block_number: hex_to_number(&tx.block_number)? as i64,
        tx_hash: tx.hash.clone(),
        tx_index: hex_to_number(&tx.transaction_index)? as i32,
        tx_value: hex_to_ether(&tx.value)?,
        tx_status: status as i32,
    })
}

async fn fetch_receipt(ctx: &HandlerContext, policy: &RetryPolicy) -> Result<RpcReceipt, AppError> {
    receipt_with_retry(&ctx.chain, &ctx.tx.hash, policy).await
}

fn checksummed(address: &str) -> Result<String, AppError> {
    Address::from_str(address)
        .map(|a| a.to_checksum(None))
        .map_err(|e| DispatchError::new(address, format!("invalid address: {}", e)).into())
}

/// Watches the token contract's `mint` calls.
///
/// On a successful receipt it decodes the mint event from the last receipt
/// log, records it in `mint_token_log` and resolves the matching `sent` mint
/// task to `success`.
pub struct MintWatchHandler {
    registry: Arc<FunctionRegistry>,
    receipt_retry: RetryPolicy,
}

impl MintWatchHandler {
    #[must_use]
    pub fn new(registry: Arc<FunctionRegistry>, receipt_retry: RetryPolicy) -> Self {
        Self {
            registry,
            receipt_retry,
        }
    }
}

#[async_trait]
impl TransactionHandler for MintWatchHandler {
    #[instrument(skip(self, ctx), fields(tx_hash = %ctx.tx.hash))]
    async fn process(&self, ctx: HandlerContext) -> Result<(), AppError> {
        let receipt = fetch_receipt(&ctx, &self.receipt_retry).await?;
        let status = hex_to_number(&receipt.status)? as i64;
        let row = filtered_row(&ctx.tx, status)?;

        if filter_row_exists(&ctx.pool, row.block_number, &row.tx_hash).await? {
            info!(tx_hash = %ctx.tx.hash, "already processed, skipping");
            return Ok(());
        }

        let mut db_tx = begin(&ctx.pool).await?;
        insert_filter_row(&mut *db_tx, &row).await?;

        if status == RECEIPT_SUCCESS {
            let log = receipt.logs.last().ok_or_else(|| {
                DispatchError::new(ctx.tx.hash.clone(), "mint receipt carries no logs")
            })?;
            let event = self.registry.decode_output("mint", &log.data)?;

            let recipient = event
                .get(1)
                .and_then(|v| v.as_address())
                .ok_or_else(|| {
                    DispatchError::new(ctx.tx.hash.clone(), "mint event missing recipient")
                })?
                .to_checksum(None);
            let amount = event
                .get(2)
                .and_then(|v| v.as_uint())
                .map(|(wei, _)| wei_to_ether(wei))
                .ok_or_else(|| {
                    DispatchError::new(ctx.tx.hash.clone(), "mint event missing amount")
                })?;

            sqlx::query(
                "INSERT INTO mint_token_log (tx_hash, user_address, amount) VALUES ($1, $2, $3)",
            )
            .bind(&ctx.tx.hash)
            .bind(&recipient)
            .bind(&amount)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

            let resolved = sqlx::query(
                r#"
                UPDATE mint_token_task
                SET status = 'success', updated_at = NOW()
                WHERE tx_hash = $1 AND status = 'sent'
                "#,
            )
            .bind(&ctx.tx.hash)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

            if resolved.rows_affected() == 0 {
                // Dropping the transaction rolls everything back.
                return Err(DispatchError::new(
                    ctx.tx.hash.clone(),
                    "no sent mint task matches this hash",
                )
                .into());
            }

            info!(tx_hash = %ctx.tx.hash, recipient = %recipient, amount = %amount, "mint observed");
        }

        commit(db_tx).await
    }
}

/// Watches inbound transfers into a collection wallet and records them in
/// the `transfer` table.
pub struct DepositWatchHandler {
    receipt_retry: RetryPolicy,
}

impl DepositWatchHandler {
    #[must_use]
    pub fn new(receipt_retry: RetryPolicy) -> Self {
        Self { receipt_retry }
    }
}

#[async_trait]
impl TransactionHandler for DepositWatchHandler {
    #[instrument(skip(self, ctx), fields(tx_hash = %ctx.tx.hash))]
    async fn process(&self, ctx: HandlerContext) -> Result<(), AppError> {
        let receipt = fetch_receipt(&ctx, &self.receipt_retry).await?;
        let status = hex_to_number(&receipt.status)? as i64;
        let row = filtered_row(&ctx.tx, status)?;

        if filter_row_exists(&ctx.pool, row.block_number, &row.tx_hash).await? {
            info!(tx_hash = %ctx.tx.hash, "already processed, skipping");
            return Ok(());
        }

        let mut db_tx = begin(&ctx.pool).await?;
        insert_filter_row(&mut *db_tx, &row).await?;

        if status == RECEIPT_SUCCESS {
            let sender = checksummed(&ctx.tx.from)?;
            let amount = hex_to_ether(&ctx.tx.value)?;

            sqlx::query(
                "INSERT INTO transfer (tx_hash, user_address, amount) VALUES ($1, $2, $3)",
            )
            .bind(&ctx.tx.hash)
            .bind(&sender)
            .bind(&amount)
            .execute(&mut *db_tx)
            .await
            .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))?;

            info!(tx_hash = %ctx.tx.hash, sender = %sender, amount = %amount, "deposit observed");
        }

        commit(db_tx).await
    }
}

async fn begin(pool: &PgPool) -> Result<sqlx::Transaction<'static, sqlx::Postgres>, AppError> {
    pool.begin()
        .await
        .map_err(|e| AppError::Database(DatabaseError::Connection(e.to_string())))
}

async fn commit(db_tx: sqlx::Transaction<'static, sqlx::Postgres>) -> Result<(), AppError> {
    db_tx
        .commit()
        .await
        .map_err(|e| AppError::Database(DatabaseError::Query(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filtered_row_conversion() {
        let tx = RpcTransaction {
            hash: "0xabc".to_string(),
            block_number: "0x3e8".to_string(),
            transaction_index: "0x2".to_string(),
            value: "0x16345785d8a0000".to_string(),
            ..Default::default()
        };

        let row = filtered_row(&tx, 1).unwrap();
        assert_eq!(row.block_number, 1000);
        assert_eq!(row.tx_index, 2);
        assert_eq!(row.tx_value, "0.1");
        assert_eq!(row.tx_status, 1);
    }

    #[test]
    fn test_checksummed_address() {
        let checksummed = checksummed("0xac05d75850dfed2d94a940fcb60b038818ad9a7e").unwrap();
        assert_eq!(
            checksummed.to_lowercase(),
            "0xac05d75850dfed2d94a940fcb60b038818ad9a7e"
        );
        assert!(checksummed.starts_with("0x"));

        assert!(super::checksummed("not-an-address").is_err());
    }
}
