//! Signer wallet rotation and per-run nonce bookkeeping.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::config::SignerWallet;
use crate::domain::{AppError, CacheStore};

/// Round-robin rotation over the configured signer wallets.
///
/// The cursor (`<job_type>_wallet_index`, the index of the wallet used last)
/// is persisted in the cache so distribution stays even across runs. Wallets
/// in the per-run failed set are skipped.
pub struct WalletRotation {
    wallets: Vec<SignerWallet>,
    index_key: String,
}

impl WalletRotation {
    #[must_use]
    pub fn new(job_type: &str, wallets: Vec<SignerWallet>) -> Self {
        Self {
            wallets,
            index_key: format!("{}_wallet_index", job_type),
        }
    }

    #[must_use]
    pub fn wallets(&self) -> &[SignerWallet] {
        &self.wallets
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.wallets.is_empty()
    }

    /// Select the next usable wallet, advancing and persisting the cursor.
    /// Candidates in `failed_addresses` (lower-cased) are skipped; their
    /// cursor advance still counts, matching a rotation that simply moves
    /// past dead wallets.
    pub async fn next_wallet(
        &self,
        cache: &Arc<dyn CacheStore>,
        failed_addresses: &HashSet<String>,
    ) -> Result<&SignerWallet, AppError> {
        if self.wallets.is_empty() {
            return Err(AppError::Internal("no signer wallets configured".to_string()));
        }

        // Bounded walk: one full cycle is enough to visit every wallet once.
        for _ in 0..self.wallets.len() {
            let index = self.advance_index(cache).await?;
            let wallet = &self.wallets[index];
            if !failed_addresses.contains(&wallet.address.to_lowercase()) {
                return Ok(wallet);
            }
        }

        Err(AppError::Internal("every signer wallet is unusable".to_string()))
    }

    /// Advance the persisted cursor by one position, wrapping at the end of
    /// the list, and return the selected index.
    async fn advance_index(&self, cache: &Arc<dyn CacheStore>) -> Result<usize, AppError> {
        let stored = cache
            .get(&self.index_key)
            .await?
            .and_then(|raw| raw.parse::<usize>().ok());

        let next = match stored {
            Some(last_used) if last_used + 1 < self.wallets.len() => last_used + 1,
            _ => 0,
        };

        cache.set(&self.index_key, &next.to_string()).await?;
        Ok(next)
    }
}

/// Run-scoped nonce ledger, keyed by `(chain_id, address)`.
///
/// Seeded once per run from the chain's transaction count, then incremented
/// locally per assignment; the chain is never re-queried mid-run. This
/// assumes no external sender shares the wallets during the run.
#[derive(Debug, Default)]
pub struct NonceTable {
    next: HashMap<String, u64>,
}

impl NonceTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    pub fn seed(&mut self, chain_id: u64, address: &str, nonce: u64) {
        self.next.insert(Self::key(chain_id, address), nonce);
    }

    /// Take the next nonce for a signer, incrementing the local counter.
    /// `None` for signers that were never seeded.
    pub fn allocate(&mut self, chain_id: u64, address: &str) -> Option<u64> {
        let entry = self.next.get_mut(&Self::key(chain_id, address))?;
        let nonce = *entry;
        *entry += 1;
        Some(nonce)
    }

    fn key(chain_id: u64, address: &str) -> String {
        format!("{}_{}", chain_id, address.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::mocks::MockCacheStore;
    use secrecy::SecretString;

    fn wallet(address: &str) -> SignerWallet {
        SignerWallet {
            address: address.to_string(),
            private_key: SecretString::from("00".repeat(32)),
        }
    }

    fn rotation(addresses: &[&str]) -> WalletRotation {
        WalletRotation::new(
            "auto_token_mint",
            addresses.iter().map(|a| wallet(a)).collect(),
        )
    }

    fn cache() -> Arc<dyn CacheStore> {
        Arc::new(MockCacheStore::new())
    }

    #[tokio::test]
    async fn test_rotation_cycles_and_wraps() {
        let rotation = rotation(&["0xa", "0xb", "0xc"]);
        let cache = cache();
        let none = HashSet::new();

        let mut picks = Vec::new();
        for _ in 0..5 {
            picks.push(rotation.next_wallet(&cache, &none).await.unwrap().address.clone());
        }
        assert_eq!(picks, vec!["0xa", "0xb", "0xc", "0xa", "0xb"]);
    }

    #[tokio::test]
    async fn test_rotation_skips_failed_addresses() {
        let rotation = rotation(&["0xa", "0xb", "0xc"]);
        let cache = cache();
        let failed: HashSet<String> = ["0xb".to_string()].into();

        let mut picks = Vec::new();
        for _ in 0..4 {
            picks.push(rotation.next_wallet(&cache, &failed).await.unwrap().address.clone());
        }
        assert_eq!(picks, vec!["0xa", "0xc", "0xa", "0xc"]);
    }

    #[tokio::test]
    async fn test_rotation_index_persists_across_instances() {
        let cache = cache();
        let none = HashSet::new();

        let first = rotation(&["0xa", "0xb", "0xc"]);
        assert_eq!(first.next_wallet(&cache, &none).await.unwrap().address, "0xa");

        // A new run resumes from the persisted cursor.
        let second = rotation(&["0xa", "0xb", "0xc"]);
        assert_eq!(second.next_wallet(&cache, &none).await.unwrap().address, "0xb");
    }

    #[tokio::test]
    async fn test_rotation_fails_when_all_wallets_are_failed() {
        let rotation = rotation(&["0xa", "0xb"]);
        let cache = cache();
        let failed: HashSet<String> = ["0xa".to_string(), "0xb".to_string()].into();

        assert!(rotation.next_wallet(&cache, &failed).await.is_err());
    }

    #[tokio::test]
    async fn test_single_usable_wallet_takes_everything() {
        let rotation = rotation(&["0xa", "0xb", "0xc"]);
        let cache = cache();
        let failed: HashSet<String> = ["0xa".to_string(), "0xc".to_string()].into();

        for _ in 0..3 {
            assert_eq!(rotation.next_wallet(&cache, &failed).await.unwrap().address, "0xb");
        }
    }

    #[test]
    fn test_nonce_allocation_is_gapless() {
        let mut table = NonceTable::new();
        table.seed(97, "0xAbC", 5);

        assert_eq!(table.allocate(97, "0xabc"), Some(5));
        assert_eq!(table.allocate(97, "0xABC"), Some(6));
        assert_eq!(table.allocate(97, "0xabc"), Some(7));
    }

    #[test]
    fn test_nonce_table_is_chain_scoped() {
        let mut table = NonceTable::new();
        table.seed(97, "0xabc", 5);
        table.seed(56, "0xabc", 9);

        assert_eq!(table.allocate(97, "0xabc"), Some(5));
        assert_eq!(table.allocate(56, "0xabc"), Some(9));
        assert_eq!(table.allocate(1, "0xabc"), None);
    }
}
