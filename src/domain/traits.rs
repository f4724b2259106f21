//! Domain traits defining contracts for external systems.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;

use super::error::AppError;
use super::types::{
    BlockSelector, CallRequest, DecodedCall, MintTask, RpcBlock, RpcLog, RpcReceipt,
    RpcTransaction,
};

/// Chain RPC contract. One method per JSON-RPC call; retry policy is layered
/// on top by the callers that need it.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Current chain height.
    async fn block_number(&self) -> Result<u64, AppError>;

    /// Fetch a block; `full` includes complete transaction objects.
    /// `Ok(None)` means the endpoint answered with a null block (not yet
    /// available), which fetch-class callers treat as retryable.
    async fn block(&self, selector: BlockSelector, full: bool)
    -> Result<Option<RpcBlock>, AppError>;

    /// Receipt for a mined transaction, absent while unmined.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>, AppError>;

    /// Transaction lookup by hash.
    async fn transaction_by_hash(&self, tx_hash: &str)
    -> Result<Option<RpcTransaction>, AppError>;

    /// Current gas price in wei.
    async fn gas_price(&self) -> Result<alloy::primitives::U256, AppError>;

    /// Confirmed transaction count for an address: the next usable nonce.
    async fn transaction_count(&self, address: &str) -> Result<u64, AppError>;

    /// Gas estimate for a call object, in gas units.
    async fn estimate_gas(&self, call: &CallRequest) -> Result<u64, AppError>;

    /// Broadcast a locally signed raw transaction, returning its hash.
    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, AppError>;

    /// Read-only contract call, returning the raw hex output.
    async fn call(&self, call: &CallRequest) -> Result<String, AppError>;

    /// Historical event logs over a block range.
    async fn logs(
        &self,
        from_block: u64,
        to_block: u64,
        topics: Vec<String>,
        addresses: Vec<String>,
    ) -> Result<Vec<RpcLog>, AppError>;
}

/// Cache store contract: cursor, process locks and the wallet round-robin
/// index.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;

    /// Set-if-absent; `true` when the key was written by this call.
    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, AppError>;

    /// Delete only when the stored value equals `value`; `true` when a key
    /// was deleted. Guards lock release against removing a later holder's
    /// lock.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError>;
}

/// Relational store contract used by the engines. Handlers work with the
/// connection pool directly because their writes must share one database
/// transaction.
#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Check database connectivity.
    async fn health_check(&self) -> Result<(), AppError>;

    /// Highest block number present in the filtered-transaction log; the
    /// durable fallback for the sync cursor.
    async fn max_filtered_block_number(&self) -> Result<Option<i64>, AppError>;

    /// Mint tasks eligible for processing: `pending` or `failed`, retry
    /// budget left, retry window elapsed.
    async fn eligible_mint_tasks(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<MintTask>, AppError>;

    /// Optimistic claim: `pending`/`failed` → `processing`. `false` means
    /// another runner already took the task.
    async fn claim_mint_task(&self, task_id: i64) -> Result<bool, AppError>;

    /// `processing` → `failed`, recording the retry schedule and the error
    /// message, incrementing the attempt counter.
    async fn mark_mint_task_failed(
        &self,
        task_id: i64,
        next_retry_time: DateTime<Utc>,
        remark: &str,
    ) -> Result<(), AppError>;

    /// `processing` → `sent`, recording the broadcast hash, incrementing the
    /// attempt counter.
    async fn mark_mint_task_sent(&self, task_id: i64, tx_hash: &str) -> Result<(), AppError>;
}

/// Per-block dispatch contract the sync engine drives. Returns the number of
/// transactions that matched a handler.
#[async_trait]
pub trait BlockProcessor: Send + Sync {
    async fn process_block(&self, block: &RpcBlock) -> Result<u64, AppError>;
}

/// Everything a handler invocation needs: the decoded call (for contract
/// routes), the raw transaction, chain access for its own receipt fetch, and
/// a pool lease for its transactional writes.
#[derive(Clone)]
pub struct HandlerContext {
    pub call: Option<DecodedCall>,
    pub tx: RpcTransaction,
    pub chain: Arc<dyn ChainClient>,
    pub pool: PgPool,
}

/// A business handler bound to a watched address. Implementations must be
/// idempotent over `(block_number, tx_hash)` and keep the filter-log insert
/// and their own writes in one database transaction.
#[async_trait]
pub trait TransactionHandler: Send + Sync {
    async fn process(&self, ctx: HandlerContext) -> Result<(), AppError>;
}
