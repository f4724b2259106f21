//! End-to-end engine scenarios over the mock infrastructure.

use std::sync::Arc;
use std::time::Duration;

use evm_block_relayer::app::{BlockSyncEngine, CURSOR_KEY};
use evm_block_relayer::config::{RetryPolicy, SyncSettings};
use evm_block_relayer::domain::{
    BlockProcessor, CacheStore, ChainClient, DatabaseClient, SyncOutcome,
};
use evm_block_relayer::test_utils::mocks::{
    MockBlockProcessor, MockCacheStore, MockChainClient, MockDatabaseClient,
};

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

fn engine_over(
    chain: Arc<MockChainClient>,
    cache: Arc<MockCacheStore>,
    processor: Arc<MockBlockProcessor>,
) -> BlockSyncEngine {
    BlockSyncEngine::new(
        chain as Arc<dyn ChainClient>,
        cache as Arc<dyn CacheStore>,
        Arc::new(MockDatabaseClient::new()) as Arc<dyn DatabaseClient>,
        processor as Arc<dyn BlockProcessor>,
        97,
        fast_settings(),
    )
}

#[tokio::test]
async fn test_first_ever_run_fetches_exactly_the_tip() {
    // Cursor absent, chain height 1000, max window 1000: exactly block 1000,
    // no historical backfill.
    let chain = Arc::new(MockChainClient::new(1000));
    let cache = Arc::new(MockCacheStore::new());
    let processor = Arc::new(MockBlockProcessor::new());

    let engine = engine_over(Arc::clone(&chain), Arc::clone(&cache), Arc::clone(&processor));
    let outcome = engine.run().await.unwrap();

    match outcome {
        SyncOutcome::Completed(report) => {
            assert_eq!(report.blocks_processed, 1);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_eq!(processor.processed_blocks(), vec![1000]);
    assert_eq!(cache.value_of(CURSOR_KEY), Some("1000".to_string()));
}

#[tokio::test]
async fn test_permanently_failing_block_parks_the_cursor() {
    // Cursor 500, height 503, block 502 never retrievable: the run aborts
    // and the cursor stays at 500, not 501.
    let chain = Arc::new(MockChainClient::new(503).with_failing_block(502));
    let cache = Arc::new(MockCacheStore::new());
    cache.insert(CURSOR_KEY, "500");
    let processor = Arc::new(MockBlockProcessor::new());

    let engine = engine_over(Arc::clone(&chain), Arc::clone(&cache), Arc::clone(&processor));
    let err = engine.run().await.unwrap_err();

    assert!(err.to_string().contains("block 502 retrieval failed"));
    assert_eq!(cache.value_of(CURSOR_KEY), Some("500".to_string()));
    assert!(processor.processed_blocks().is_empty());
}

#[tokio::test]
async fn test_consecutive_runs_resume_and_then_idle() {
    let chain = Arc::new(MockChainClient::new(505));
    let cache = Arc::new(MockCacheStore::new());
    cache.insert(CURSOR_KEY, "500");
    let processor = Arc::new(MockBlockProcessor::new());

    let engine = engine_over(Arc::clone(&chain), Arc::clone(&cache), Arc::clone(&processor));

    engine.run().await.unwrap();
    assert_eq!(processor.processed_blocks(), vec![501, 502, 503, 504, 505]);

    // Caught up: the next run is a clean no-op.
    let outcome = engine.run().await.unwrap();
    assert_eq!(outcome, SyncOutcome::NoNewBlocks);
    assert_eq!(processor.processed_blocks().len(), 5);
}

#[tokio::test]
async fn test_deferred_catch_up_across_runs() {
    // A backlog larger than the per-run cap drains monotonically over
    // consecutive runs.
    let chain = Arc::new(MockChainClient::new(1020));
    let cache = Arc::new(MockCacheStore::new());
    cache.insert(CURSOR_KEY, "1000");
    let processor = Arc::new(MockBlockProcessor::new());

    let mut settings = fast_settings();
    settings.max_blocks_per_run = 10;
    let engine = BlockSyncEngine::new(
        Arc::clone(&chain) as Arc<dyn ChainClient>,
        Arc::clone(&cache) as Arc<dyn CacheStore>,
        Arc::new(MockDatabaseClient::new()) as Arc<dyn DatabaseClient>,
        Arc::clone(&processor) as Arc<dyn BlockProcessor>,
        97,
        settings,
    );

    engine.run().await.unwrap();
    assert_eq!(cache.value_of(CURSOR_KEY), Some("1010".to_string()));

    engine.run().await.unwrap();
    assert_eq!(cache.value_of(CURSOR_KEY), Some("1020".to_string()));

    let expected: Vec<u64> = (1001..=1020).collect();
    assert_eq!(processor.processed_blocks(), expected);
}
