//! Block synchronization engine.
//!
//! Each run: acquire the process lock, read the cursor and the chain height
//! concurrently, compute a bounded window, fetch it chunk by chunk with
//! per-block retry, dispatch blocks strictly in ascending order and advance
//! the cursor one block at a time. A block that cannot be fetched or
//! dispatched aborts the run with the cursor parked just before it, so the
//! next run resumes exactly there.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::SyncSettings;
use crate::domain::{
    AppError, BlockProcessor, CacheStore, ChainClient, DatabaseClient, RpcBlock, RpcError,
    SyncOutcome, SyncReport,
};
use crate::infra::rpc::retry::block_with_retry;

use super::lock::ProcessLock;

/// Cache key holding the last fully processed block number.
pub const CURSOR_KEY: &str = "last_block_number";

/// Drives one bounded catch-up pass over the chain.
pub struct BlockSyncEngine {
    chain: Arc<dyn ChainClient>,
    cache: Arc<dyn CacheStore>,
    db: Arc<dyn DatabaseClient>,
    processor: Arc<dyn BlockProcessor>,
    lock: ProcessLock,
    settings: SyncSettings,
}

impl BlockSyncEngine {
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        cache: Arc<dyn CacheStore>,
        db: Arc<dyn DatabaseClient>,
        processor: Arc<dyn BlockProcessor>,
        chain_id: u64,
        settings: SyncSettings,
    ) -> Self {
        let lock = ProcessLock::new(Arc::clone(&cache), ProcessLock::block_sync_key(chain_id));
        Self {
            chain,
            cache,
            db,
            processor,
            lock,
            settings,
        }
    }

    /// Run one synchronization pass. The lock is released on every exit
    /// path; `AlreadyRunning` and `NoNewBlocks` are quiet outcomes.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<SyncOutcome, AppError> {
        if !self.lock.acquire().await? {
            info!("block sync already running, exiting");
            return Ok(SyncOutcome::AlreadyRunning);
        }

        let result = self.run_locked().await;
        self.lock.release().await;
        result
    }

    async fn run_locked(&self) -> Result<SyncOutcome, AppError> {
        let started = Instant::now();

        // Both fixed points are required to define the window; the first
        // failure wins.
        let (cursor, height) = {
            let (cursor_res, height_res) =
                tokio::join!(self.last_processed_block(), self.chain.block_number());
            (cursor_res?, height_res?)
        };

        // Bootstrap with no prior cursor starts at the tip: exactly one
        // block, no historical backfill.
        let start = match cursor {
            Some(last) => last + 1,
            None => height,
        };
        if start > height {
            info!("no new blocks");
            return Ok(SyncOutcome::NoNewBlocks);
        }

        let span = height - start + 1;
        let end = if span > self.settings.max_blocks_per_run {
            // Excess is deferred to the next run.
            start + self.settings.max_blocks_per_run - 1
        } else {
            height
        };

        info!(start, end, "syncing window");

        let numbers: Vec<u64> = (start..=end).collect();
        let mut blocks_processed = 0_u64;
        let mut transactions_dispatched = 0_u64;

        for chunk in numbers.chunks(self.settings.chunk_size.max(1)) {
            let chunk_started = Instant::now();
            let fetched = self.fetch_chunk(chunk).await?;

            // The whole chunk must have fetched before anything dispatches;
            // a hole would otherwise let earlier blocks advance the cursor
            // past state the next run still needs to revisit.
            if let Some((&missing, _)) = fetched.iter().find(|(_, block)| block.is_none()) {
                warn!(block = missing, "block retrieval failed, aborting run");
                return Err(RpcError::RetrievalExhausted(missing).into());
            }

            for (number, block) in fetched {
                let Some(block) = block else {
                    return Err(RpcError::RetrievalExhausted(number).into());
                };
                transactions_dispatched += self.processor.process_block(&block).await?;
                self.cache.set(CURSOR_KEY, &number.to_string()).await?;
                blocks_processed += 1;
            }

            info!(
                from = chunk.first().copied().unwrap_or_default(),
                to = chunk.last().copied().unwrap_or_default(),
                blocks = chunk.len(),
                elapsed_ms = chunk_started.elapsed().as_millis() as u64,
                "chunk processed"
            );

            if !self.settings.inter_chunk_sleep.is_zero() {
                tokio::time::sleep(self.settings.inter_chunk_sleep).await;
            }
        }

        Ok(SyncOutcome::Completed(SyncReport {
            blocks_processed,
            transactions_dispatched,
            elapsed: started.elapsed(),
        }))
    }

    /// Fetch a chunk concurrently, one retried task per block, merged into
    /// ascending order. A block that exhausted its retries stays `None`.
    async fn fetch_chunk(&self, numbers: &[u64]) -> Result<BTreeMap<u64, Option<RpcBlock>>, AppError> {
        let mut join_set: JoinSet<(u64, Option<RpcBlock>)> = JoinSet::new();
        for &number in numbers {
            let chain = Arc::clone(&self.chain);
            let policy = self.settings.fetch_retry.clone();
            join_set.spawn(async move { (number, block_with_retry(&chain, number, &policy).await) });
        }

        let mut fetched = BTreeMap::new();
        while let Some(joined) = join_set.join_next().await {
            let (number, block) =
                joined.map_err(|e| AppError::Internal(format!("fetch task failed: {}", e)))?;
            fetched.insert(number, block);
        }
        Ok(fetched)
    }

    /// The resume point: cache cursor first, then the highest block in the
    /// durable transaction log, `None` when both are empty.
    async fn last_processed_block(&self) -> Result<Option<u64>, AppError> {
        if let Some(raw) = self.cache.get(CURSOR_KEY).await? {
            if let Ok(number) = raw.parse::<u64>() {
                return Ok(Some(number));
            }
            warn!(value = %raw, "ignoring unparsable cursor value");
        }

        Ok(self
            .db
            .max_filtered_block_number()
            .await?
            .and_then(|n| u64::try_from(n).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::config::RetryPolicy;
    use crate::test_utils::mocks::{MockBlockProcessor, MockCacheStore, MockChainClient, MockDatabaseClient};

    struct Harness {
        chain: Arc<MockChainClient>,
        cache: Arc<MockCacheStore>,
        db: Arc<MockDatabaseClient>,
        processor: Arc<MockBlockProcessor>,
        engine: BlockSyncEngine,
    }

    fn harness_with(chain: MockChainClient, processor: MockBlockProcessor, settings: SyncSettings) -> Harness {
        let chain = Arc::new(chain);
        let cache = Arc::new(MockCacheStore::new());
        let db = Arc::new(MockDatabaseClient::new());
        let processor = Arc::new(processor);
        let engine = BlockSyncEngine::new(
            Arc::clone(&chain) as Arc<dyn ChainClient>,
            Arc::clone(&cache) as Arc<dyn CacheStore>,
            Arc::clone(&db) as Arc<dyn DatabaseClient>,
            Arc::clone(&processor) as Arc<dyn BlockProcessor>,
            97,
            settings,
        );
        Harness {
            chain,
            cache,
            db,
            processor,
            engine,
        }
    }

    fn fast_settings() -> SyncSettings {
        SyncSettings {
            fetch_retry: RetryPolicy {
                tries: 1,
                delays: vec![Duration::from_millis(1)],
                default_delay: Duration::from_millis(1),
            },
            max_blocks_per_run: 1000,
            chunk_size: 100,
            inter_chunk_sleep: Duration::ZERO,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_processes_only_the_tip() {
        let h = harness_with(MockChainClient::new(1000), MockBlockProcessor::new(), fast_settings());

        let outcome = h.engine.run().await.unwrap();

        match outcome {
            SyncOutcome::Completed(report) => assert_eq!(report.blocks_processed, 1),
            other => panic!("expected completion, got {:?}", other),
        }
        assert_eq!(h.processor.processed_blocks(), vec![1000]);
        assert_eq!(h.cache.value_of(CURSOR_KEY), Some("1000".to_string()));
    }

    #[tokio::test]
    async fn test_failed_block_aborts_before_any_dispatch() {
        let h = harness_with(
            MockChainClient::new(503).with_failing_block(502),
            MockBlockProcessor::new(),
            fast_settings(),
        );
        h.cache.insert(CURSOR_KEY, "500");

        let err = h.engine.run().await.unwrap_err();

        assert!(err.to_string().contains("502"));
        // The chunk is validated whole: 501 is not dispatched and the
        // cursor stays at 500 for the next run to resume from.
        assert!(h.processor.processed_blocks().is_empty());
        assert_eq!(h.cache.value_of(CURSOR_KEY), Some("500".to_string()));
        // Lock must be free again after the failed run.
        assert!(h.cache.value_of("97_block_sync").is_none());
    }

    #[tokio::test]
    async fn test_blocks_dispatch_in_ascending_order_despite_completion_order() {
        // Earlier blocks answer slower, so completion order is reversed.
        let mut chain = MockChainClient::new(110);
        for (i, number) in (101..=110).enumerate() {
            chain = chain.with_fetch_delay(number, Duration::from_millis((10 - i as u64) * 5));
        }
        let h = harness_with(chain, MockBlockProcessor::new(), fast_settings());
        h.cache.insert(CURSOR_KEY, "100");

        h.engine.run().await.unwrap();

        let expected: Vec<u64> = (101..=110).collect();
        assert_eq!(h.processor.processed_blocks(), expected);
        assert_eq!(h.cache.value_of(CURSOR_KEY), Some("110".to_string()));
    }

    #[tokio::test]
    async fn test_window_is_clamped_to_max_blocks_per_run() {
        let mut settings = fast_settings();
        settings.max_blocks_per_run = 5;
        let h = harness_with(MockChainClient::new(10_000), MockBlockProcessor::new(), settings);
        h.cache.insert(CURSOR_KEY, "10");

        h.engine.run().await.unwrap();

        assert_eq!(h.processor.processed_blocks(), vec![11, 12, 13, 14, 15]);
        assert_eq!(h.cache.value_of(CURSOR_KEY), Some("15".to_string()));
    }

    #[tokio::test]
    async fn test_lock_held_is_a_quiet_exit() {
        let h = harness_with(MockChainClient::new(1000), MockBlockProcessor::new(), fast_settings());
        h.cache.insert("97_block_sync", "other instance");

        let outcome = h.engine.run().await.unwrap();

        assert_eq!(outcome, SyncOutcome::AlreadyRunning);
        assert_eq!(h.chain.rpc_calls(), 0);
        // The foreign lock is left untouched.
        assert_eq!(h.cache.value_of("97_block_sync"), Some("other instance".to_string()));
    }

    #[tokio::test]
    async fn test_caught_up_cursor_yields_no_new_blocks() {
        let h = harness_with(MockChainClient::new(500), MockBlockProcessor::new(), fast_settings());
        h.cache.insert(CURSOR_KEY, "500");

        let outcome = h.engine.run().await.unwrap();

        assert_eq!(outcome, SyncOutcome::NoNewBlocks);
        assert!(h.processor.processed_blocks().is_empty());
        assert!(h.cache.value_of("97_block_sync").is_none());
    }

    #[tokio::test]
    async fn test_cursor_falls_back_to_transaction_log() {
        let h = harness_with(MockChainClient::new(505), MockBlockProcessor::new(), fast_settings());
        h.db.set_max_filtered_block(Some(503));

        h.engine.run().await.unwrap();

        assert_eq!(h.processor.processed_blocks(), vec![504, 505]);
    }

    #[tokio::test]
    async fn test_dispatch_failure_keeps_cursor_before_failed_block() {
        let h = harness_with(
            MockChainClient::new(503),
            MockBlockProcessor::failing_on(502),
            fast_settings(),
        );
        h.cache.insert(CURSOR_KEY, "500");

        let err = h.engine.run().await.unwrap_err();

        assert!(err.to_string().contains("handler rejected"));
        // 501 dispatched and committed; 502 failed; 503 never reached.
        assert_eq!(h.processor.processed_blocks(), vec![501]);
        assert_eq!(h.cache.value_of(CURSOR_KEY), Some("501".to_string()));
        assert!(h.cache.value_of("97_block_sync").is_none());
    }
}
