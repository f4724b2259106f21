//! Bounded retry for fetch-class RPC calls.
//!
//! An explicit attempt loop over a backoff table: attempt `n` sleeps
//! `delays[n]` before the next try, falling back to the table's default past
//! the end. A call that still fails keeps its failure; it is never converted
//! into an empty success.

use std::sync::Arc;
use tracing::warn;

use crate::config::RetryPolicy;
use crate::domain::{AppError, BlockSelector, ChainClient, RpcBlock, RpcError, RpcReceipt};

/// Fetch a block with bounded retry. `None` means the block stayed
/// unavailable after every attempt; callers decide how fatal that is.
pub async fn block_with_retry(
    chain: &Arc<dyn ChainClient>,
    number: u64,
    policy: &RetryPolicy,
) -> Option<RpcBlock> {
    for attempt in 0..=policy.tries {
        match chain.block(BlockSelector::Number(number), true).await {
            Ok(Some(block)) => return Some(block),
            Ok(None) => {
                warn!(block = number, attempt, "block not yet available");
            }
            Err(err) => {
                warn!(block = number, attempt, error = %err, "block fetch failed");
            }
        }

        if attempt < policy.tries {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }
    None
}

/// Fetch a receipt with bounded retry, failing loudly when it never shows
/// up: a dispatched transaction without a receipt is a handler error.
pub async fn receipt_with_retry(
    chain: &Arc<dyn ChainClient>,
    tx_hash: &str,
    policy: &RetryPolicy,
) -> Result<RpcReceipt, AppError> {
    for attempt in 0..=policy.tries {
        match chain.transaction_receipt(tx_hash).await {
            Ok(Some(receipt)) => return Ok(receipt),
            Ok(None) => {
                warn!(tx_hash, attempt, "receipt not yet available");
            }
            Err(err) => {
                warn!(tx_hash, attempt, error = %err, "receipt fetch failed");
            }
        }

        if attempt < policy.tries {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }
    }
    Err(RpcError::ReceiptUnavailable(tx_hash.to_string()).into())
}
