//! Cache-backed single-flight process lock.
//!
//! One lock key per job and chain. Acquisition is a set-if-absent of a
//! per-acquisition token; release deletes only when the stored token still
//! matches, so a later instance's lock can never be removed by a stale
//! holder. The lock has no TTL: a crashed holder requires manual unlock.

use chrono::Utc;
use std::sync::Arc;
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::domain::{AppError, CacheStore};

/// Single-flight guard for a periodic job.
pub struct ProcessLock {
    cache: Arc<dyn CacheStore>,
    key: String,
    token: Mutex<Option<String>>,
}

impl ProcessLock {
    #[must_use]
    pub fn new(cache: Arc<dyn CacheStore>, key: impl Into<String>) -> Self {
        Self {
            cache,
            key: key.into(),
            token: Mutex::new(None),
        }
    }

    /// Lock key for the block synchronization job of a chain.
    #[must_use]
    pub fn block_sync_key(chain_id: u64) -> String {
        format!("{}_block_sync", chain_id)
    }

    /// Lock key for the token mint job of a chain.
    #[must_use]
    pub fn token_mint_key(chain_id: u64) -> String {
        format!("{}_token_mint", chain_id)
    }

    /// Try to acquire the lock. `false` means another instance is running,
    /// which callers treat as a quiet exit, not an error.
    pub async fn acquire(&self) -> Result<bool, AppError> {
        let token = Utc::now().format("%Y-%m-%d %H:%M:%S%.9f").to_string();
        let acquired = self.cache.set_if_absent(&self.key, &token).await?;
        if acquired {
            debug!(key = %self.key, "lock acquired");
            *self.token.lock().unwrap() = Some(token);
        }
        Ok(acquired)
    }

    /// Release the lock if this instance holds it. Failure to release is
    /// logged, never propagated: release also runs on error paths, and the
    /// run's own failure is the one worth surfacing.
    pub async fn release(&self) {
        let token = self.token.lock().unwrap().take();
        let Some(token) = token else {
            return;
        };

        match self.cache.delete_if_equals(&self.key, &token).await {
            Ok(true) => debug!(key = %self.key, "lock released"),
            Ok(false) => warn!(key = %self.key, "lock already taken over, not released"),
            Err(err) => warn!(key = %self.key, error = %err, "lock release failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mocks::MockCacheStore;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let cache = Arc::new(MockCacheStore::new());
        let lock = ProcessLock::new(cache.clone(), "97_block_sync");

        assert!(lock.acquire().await.unwrap());
        assert!(cache.value_of("97_block_sync").is_some());

        lock.release().await;
        assert!(cache.value_of("97_block_sync").is_none());
    }

    #[tokio::test]
    async fn test_second_acquire_is_refused() {
        let cache = Arc::new(MockCacheStore::new());
        let first = ProcessLock::new(cache.clone(), "97_token_mint");
        let second = ProcessLock::new(cache.clone(), "97_token_mint");

        assert!(first.acquire().await.unwrap());
        assert!(!second.acquire().await.unwrap());
    }

    #[tokio::test]
    async fn test_release_spares_a_later_holder() {
        let cache = Arc::new(MockCacheStore::new());
        let stale = ProcessLock::new(cache.clone(), "97_block_sync");
        assert!(stale.acquire().await.unwrap());

        // Operator unlocks manually, a fresh instance takes the lock.
        cache.delete_if_equals("97_block_sync", &cache.value_of("97_block_sync").unwrap()).await.unwrap();
        let fresh = ProcessLock::new(cache.clone(), "97_block_sync");
        assert!(fresh.acquire().await.unwrap());
        let fresh_token = cache.value_of("97_block_sync").unwrap();

        // The stale holder's release must not remove the fresh lock.
        stale.release().await;
        assert_eq!(cache.value_of("97_block_sync"), Some(fresh_token));
    }

    #[tokio::test]
    async fn test_release_without_acquire_is_a_noop() {
        let cache = Arc::new(MockCacheStore::new());
        cache.insert("97_block_sync", "someone-else");

        let lock = ProcessLock::new(cache.clone(), "97_block_sync");
        lock.release().await;
        assert_eq!(
            cache.value_of("97_block_sync"),
            Some("someone-else".to_string())
        );
    }
}
