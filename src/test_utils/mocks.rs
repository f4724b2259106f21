//! Mock implementations for testing.

use async_trait::async_trait;
use alloy::primitives::{keccak256, U256};
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::domain::{
    AppError, BlockProcessor, BlockSelector, CacheStore, CallRequest, ChainClient, DatabaseClient,
    DispatchError, MintTask, MintTaskStatus, RpcBlock, RpcError, RpcLog, RpcReceipt,
    RpcTransaction,
};
use crate::infra::rpc::units::{hex_to_number, number_to_hex};

/// Mock chain client with programmable failures and timing.
#[derive(Default)]
pub struct MockChainClient {
    height: u64,
    /// Pre-seeded blocks; any other number in range is synthesized empty.
    blocks: Mutex<HashMap<u64, RpcBlock>>,
    /// Block numbers whose fetch always fails.
    fail_blocks: HashSet<u64>,
    /// Artificial per-block fetch latency, to scramble completion order.
    fetch_delays: HashMap<u64, Duration>,
    receipts: Mutex<HashMap<String, RpcReceipt>>,
    nonces: HashMap<String, u64>,
    /// Addresses whose nonce fetch fails.
    fail_nonces: HashSet<String>,
    gas_price: U256,
    gas_estimate: u64,
    /// When set, every broadcast is rejected with this endpoint error.
    send_error: Option<String>,
    sent: Mutex<Vec<Vec<u8>>>,
    calls: AtomicU64,
}

impl MockChainClient {
    #[must_use]
    pub fn new(height: u64) -> Self {
        Self {
            height,
            gas_price: U256::from(1_000_000_000_u64),
            gas_estimate: 60_000,
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_block(self, block: RpcBlock) -> Self {
        let number = hex_to_number(&block.number).expect("block number");
        self.blocks.lock().unwrap().insert(number, block);
        self
    }

    #[must_use]
    pub fn with_failing_block(mut self, number: u64) -> Self {
        self.fail_blocks.insert(number);
        self
    }

    #[must_use]
    pub fn with_fetch_delay(mut self, number: u64, delay: Duration) -> Self {
        self.fetch_delays.insert(number, delay);
        self
    }

    #[must_use]
    pub fn with_receipt(self, receipt: RpcReceipt) -> Self {
        self.receipts
            .lock()
            .unwrap()
            .insert(receipt.transaction_hash.clone(), receipt);
        self
    }

    #[must_use]
    pub fn with_nonce(mut self, address: &str, nonce: u64) -> Self {
        self.nonces.insert(address.to_lowercase(), nonce);
        self
    }

    #[must_use]
    pub fn with_failing_nonce(mut self, address: &str) -> Self {
        self.fail_nonces.insert(address.to_lowercase());
        self
    }

    #[must_use]
    pub fn with_send_error(mut self, message: &str) -> Self {
        self.send_error = Some(message.to_string());
        self
    }

    /// Raw payloads accepted by `send_raw_transaction`, in broadcast order.
    pub fn sent_transactions(&self) -> Vec<Vec<u8>> {
        self.sent.lock().unwrap().clone()
    }

    /// Total RPC calls served.
    pub fn rpc_calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn block_number(&self) -> Result<u64, AppError> {
        self.record_call();
        Ok(self.height)
    }

    async fn block(
        &self,
        selector: BlockSelector,
        _full: bool,
    ) -> Result<Option<RpcBlock>, AppError> {
        self.record_call();
        let number = match selector {
            BlockSelector::Number(n) => n,
            BlockSelector::Latest => self.height,
            _ => return Ok(None),
        };

        if let Some(delay) = self.fetch_delays.get(&number) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail_blocks.contains(&number) {
            return Err(RpcError::Transport("connection reset".to_string()).into());
        }
        if number > self.height {
            return Ok(None);
        }

        if let Some(block) = self.blocks.lock().unwrap().get(&number) {
            return Ok(Some(block.clone()));
        }
        Ok(Some(RpcBlock {
            number: number_to_hex(number),
            hash: format!("0xblock{:x}", number),
            ..Default::default()
        }))
    }

    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<RpcReceipt>, AppError> {
        self.record_call();
        Ok(self.receipts.lock().unwrap().get(tx_hash).cloned())
    }

    async fn transaction_by_hash(
        &self,
        _tx_hash: &str,
    ) -> Result<Option<RpcTransaction>, AppError> {
        self.record_call();
        Ok(None)
    }

    async fn gas_price(&self) -> Result<U256, AppError> {
        self.record_call();
        Ok(self.gas_price)
    }

    async fn transaction_count(&self, address: &str) -> Result<u64, AppError> {
        self.record_call();
        let key = address.to_lowercase();
        if self.fail_nonces.contains(&key) {
            return Err(RpcError::Transport("nonce fetch failed".to_string()).into());
        }
        Ok(self.nonces.get(&key).copied().unwrap_or(0))
    }

    async fn estimate_gas(&self, _call: &CallRequest) -> Result<u64, AppError> {
        self.record_call();
        Ok(self.gas_estimate)
    }

    async fn send_raw_transaction(&self, raw: &[u8]) -> Result<String, AppError> {
        self.record_call();
        if let Some(message) = &self.send_error {
            return Err(RpcError::Endpoint(message.clone()).into());
        }
        self.sent.lock().unwrap().push(raw.to_vec());
        Ok(format!("0x{}", alloy::hex::encode(keccak256(raw))))
    }

    async fn call(&self, _call: &CallRequest) -> Result<String, AppError> {
        self.record_call();
        Ok("0x".to_string())
    }

    async fn logs(
        &self,
        _from_block: u64,
        _to_block: u64,
        _topics: Vec<String>,
        _addresses: Vec<String>,
    ) -> Result<Vec<RpcLog>, AppError> {
        self.record_call();
        Ok(vec![])
    }
}

/// In-memory cache store with the same set-if-absent / guarded-delete
/// semantics as the Redis implementation.
#[derive(Default)]
pub struct MockCacheStore {
    map: Mutex<HashMap<String, String>>,
}

impl MockCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: &str) {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
    }

    pub fn value_of(&self, key: &str) -> Option<String> {
        self.map.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl CacheStore for MockCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.insert(key, value);
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut map = self.map.lock().unwrap();
        if map.contains_key(key) {
            return Ok(false);
        }
        map.insert(key.to_string(), value.to_string());
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, AppError> {
        let mut map = self.map.lock().unwrap();
        if map.get(key).map(String::as_str) == Some(value) {
            map.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}

/// In-memory database client covering the engine-facing operations.
#[derive(Default)]
pub struct MockDatabaseClient {
    tasks: Mutex<Vec<MintTask>>,
    max_filtered_block: Mutex<Option<i64>>,
    /// Task ids whose claim is refused, simulating a concurrent runner
    /// winning the race between load and claim.
    denied_claims: Mutex<HashSet<i64>>,
}

impl MockDatabaseClient {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_task(&self, task: MintTask) {
        self.tasks.lock().unwrap().push(task);
    }

    pub fn deny_claim(&self, task_id: i64) {
        self.denied_claims.lock().unwrap().insert(task_id);
    }

    pub fn set_max_filtered_block(&self, block: Option<i64>) {
        *self.max_filtered_block.lock().unwrap() = block;
    }

    pub fn task(&self, task_id: i64) -> Option<MintTask> {
        self.tasks
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    async fn health_check(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn max_filtered_block_number(&self) -> Result<Option<i64>, AppError> {
        Ok(*self.max_filtered_block.lock().unwrap())
    }

    async fn eligible_mint_tasks(
        &self,
        limit: i64,
        max_retries: i32,
    ) -> Result<Vec<MintTask>, AppError> {
        let now = Utc::now();
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .iter()
            .filter(|t| {
                matches!(t.status, MintTaskStatus::Pending | MintTaskStatus::Failed)
                    && t.retry_count < max_retries
                    && t.next_retry_time <= now
            })
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn claim_mint_task(&self, task_id: i64) -> Result<bool, AppError> {
        if self.denied_claims.lock().unwrap().contains(&task_id) {
            return Ok(false);
        }
        let mut tasks = self.tasks.lock().unwrap();
        match tasks.iter_mut().find(|t| {
            t.id == task_id
                && matches!(t.status, MintTaskStatus::Pending | MintTaskStatus::Failed)
        }) {
            Some(task) => {
                task.status = MintTaskStatus::Processing;
                task.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_mint_task_failed(
        &self,
        task_id: i64,
        next_retry_time: DateTime<Utc>,
        remark: &str,
    ) -> Result<(), AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.status == MintTaskStatus::Processing)
        {
            task.status = MintTaskStatus::Failed;
            task.retry_count += 1;
            task.next_retry_time = next_retry_time;
            task.remark = Some(remark.to_string());
            task.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn mark_mint_task_sent(&self, task_id: i64, tx_hash: &str) -> Result<(), AppError> {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(task) = tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.status == MintTaskStatus::Processing)
        {
            task.status = MintTaskStatus::Sent;
            task.retry_count += 1;
            task.tx_hash = Some(tx_hash.to_string());
            task.updated_at = Utc::now();
        }
        Ok(())
    }
}

/// Recording block processor.
#[derive(Default)]
pub struct MockBlockProcessor {
    processed: Mutex<Vec<u64>>,
    fail_on: Option<u64>,
}

impl MockBlockProcessor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing_on(block: u64) -> Self {
        Self {
            processed: Mutex::new(Vec::new()),
            fail_on: Some(block),
        }
    }

    /// Block numbers in the order they were dispatched.
    pub fn processed_blocks(&self) -> Vec<u64> {
        self.processed.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockProcessor for MockBlockProcessor {
    async fn process_block(&self, block: &RpcBlock) -> Result<u64, AppError> {
        let number = hex_to_number(&block.number)?;
        if self.fail_on == Some(number) {
            return Err(DispatchError::new(
                format!("0xtx-in-{:x}", number),
                "handler rejected",
            )
            .into());
        }
        self.processed.lock().unwrap().push(number);
        Ok(block.transactions.len() as u64)
    }
}
