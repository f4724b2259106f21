//! Mint dispatch engine.
//!
//! Each run: acquire the process lock, load a bounded page of eligible
//! tasks, seed the nonce table from the chain for every signer, then walk
//! the tasks in order: claim, pick a signer round-robin, allocate its next
//! nonce and broadcast the signed mint concurrently. Broadcast outcomes move
//! the task to `sent` or schedule a retry; the lock is released whatever
//! happens.

use alloy::dyn_abi::DynSolValue;
use alloy::primitives::{Address, U256};
use chrono::{Duration as ChronoDuration, Utc};
use std::collections::HashSet;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};

use crate::config::{MintSettings, SignerWallet};
use crate::domain::{
    AppError, CacheStore, CallRequest, ChainClient, DatabaseClient, DispatchError, MintOutcome,
    MintReport, MintTask,
};
use crate::infra::rpc::units::{ether_to_wei, u256_to_hex};
use crate::infra::rpc::{sign_legacy_transaction, FunctionRegistry, LegacyTxParams};

use super::lock::ProcessLock;
use super::wallets::{NonceTable, WalletRotation};

/// Round-robin cursor namespace for this job.
const JOB_TYPE: &str = "auto_token_mint";

enum BroadcastOutcome {
    Sent,
    Failed,
}

/// Drives one pass over the pending mint tasks.
pub struct MintDispatchEngine {
    chain: Arc<dyn ChainClient>,
    cache: Arc<dyn CacheStore>,
    db: Arc<dyn DatabaseClient>,
    registry: Arc<FunctionRegistry>,
    rotation: WalletRotation,
    lock: ProcessLock,
    settings: MintSettings,
    chain_id: u64,
    gas_ratio: f64,
    /// The token contract receiving the mint calls.
    token_contract: String,
}

impl MintDispatchEngine {
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        chain: Arc<dyn ChainClient>,
        cache: Arc<dyn CacheStore>,
        db: Arc<dyn DatabaseClient>,
        registry: Arc<FunctionRegistry>,
        wallets: Vec<SignerWallet>,
        chain_id: u64,
        gas_ratio: f64,
        token_contract: String,
        settings: MintSettings,
    ) -> Self {
        let lock = ProcessLock::new(Arc::clone(&cache), ProcessLock::token_mint_key(chain_id));
        Self {
            chain,
            cache,
            db,
            registry,
            rotation: WalletRotation::new(JOB_TYPE, wallets),
            lock,
            settings,
            chain_id,
            gas_ratio,
            token_contract,
        }
    }

    /// Run one mint pass. The lock is released on every exit path.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<MintOutcome, AppError> {
        if !self.lock.acquire().await? {
            info!("token mint already running, exiting");
            return Ok(MintOutcome::AlreadyRunning);
        }

        let result = self.run_locked().await;
        self.lock.release().await;
        result
    }

    async fn run_locked(&self) -> Result<MintOutcome, AppError> {
        let started = Instant::now();

        let tasks = self
            .db
            .eligible_mint_tasks(self.settings.batch_size, self.settings.max_retries)
            .await?;
        if tasks.is_empty() {
            info!("no pending mint tasks");
            return Ok(MintOutcome::NoPendingTasks);
        }

        let (mut nonces, failed_addresses) = self.seed_nonces().await?;
        if nonces.is_empty() {
            warn!("every signer wallet failed its nonce fetch");
            return Ok(MintOutcome::NoUsableSigners);
        }

        let mut join_set: JoinSet<BroadcastOutcome> = JoinSet::new();
        let mut tasks_skipped = 0_u64;

        for task in tasks {
            // Optimistic claim: zero rows means a concurrent runner owns it.
            if !self.db.claim_mint_task(task.id).await? {
                tasks_skipped += 1;
                continue;
            }

            let wallet = self
                .rotation
                .next_wallet(&self.cache, &failed_addresses)
                .await?
                .clone();
            let Some(nonce) = nonces.allocate(self.chain_id, &wallet.address) else {
                // A usable wallet is always seeded; a miss is a logic error.
                return Err(AppError::Internal(format!(
                    "no nonce seeded for signer {}",
                    wallet.address
                )));
            };

            let chain = Arc::clone(&self.chain);
            let db = Arc::clone(&self.db);
            let registry = Arc::clone(&self.registry);
            let settings = self.settings.clone();
            let token_contract = self.token_contract.clone();
            let chain_id = self.chain_id;
            let gas_ratio = self.gas_ratio;

            join_set.spawn(async move {
                let sent = broadcast_mint(
                    &chain,
                    &registry,
                    chain_id,
                    gas_ratio,
                    &token_contract,
                    &wallet,
                    nonce,
                    &task,
                )
                .await;

                match sent {
                    Ok(tx_hash) => {
                        info!(task_id = task.id, tx_hash = %tx_hash, "mint broadcast");
                        if let Err(err) = db.mark_mint_task_sent(task.id, &tx_hash).await {
                            warn!(task_id = task.id, error = %err, "failed to record sent task");
                        }
                        BroadcastOutcome::Sent
                    }
                    Err(err) => {
                        let delay = settings.retry_delay_secs(task.retry_count);
                        let next_retry = Utc::now() + ChronoDuration::seconds(delay);
                        warn!(task_id = task.id, error = %err, retry_in_secs = delay, "mint broadcast failed");
                        if let Err(err) = record_failure(&db, task.id, next_retry, &err).await {
                            warn!(task_id = task.id, error = %err, "failed to record failed task");
                        }
                        BroadcastOutcome::Failed
                    }
                }
            });
        }

        // Wait for every in-flight broadcast before releasing the lock.
        let mut tasks_sent = 0_u64;
        let mut tasks_failed = 0_u64;
        while let Some(joined) = join_set.join_next().await {
            match joined.map_err(|e| AppError::Internal(format!("broadcast task failed: {}", e)))? {
                BroadcastOutcome::Sent => tasks_sent += 1,
                BroadcastOutcome::Failed => tasks_failed += 1,
            }
        }

        Ok(MintOutcome::Completed(MintReport {
            tasks_sent,
            tasks_failed,
            tasks_skipped,
            elapsed: started.elapsed(),
        }))
    }

    /// Fetch the on-chain nonce of every signer concurrently. Failures land
    /// in the failed-address set instead of aborting; only a fully failed
    /// wallet set ends the run.
    async fn seed_nonces(&self) -> Result<(NonceTable, HashSet<String>), AppError> {
        let mut join_set: JoinSet<(String, Result<u64, AppError>)> = JoinSet::new();
        for wallet in self.rotation.wallets() {
            let chain = Arc::clone(&self.chain);
            let address = wallet.address.clone();
            join_set.spawn(async move {
                let nonce = chain.transaction_count(&address).await;
                (address, nonce)
            });
        }

        let mut nonces = NonceTable::new();
        let mut failed_addresses = HashSet::new();
        while let Some(joined) = join_set.join_next().await {
            let (address, nonce) =
                joined.map_err(|e| AppError::Internal(format!("nonce task failed: {}", e)))?;
            match nonce {
                Ok(nonce) => nonces.seed(self.chain_id, &address, nonce),
                Err(err) => {
                    warn!(address = %address, error = %err, "nonce fetch failed, excluding wallet");
                    failed_addresses.insert(address.to_lowercase());
                }
            }
        }
        Ok((nonces, failed_addresses))
    }
}

async fn record_failure(
    db: &Arc<dyn DatabaseClient>,
    task_id: i64,
    next_retry: chrono::DateTime<Utc>,
    err: &AppError,
) -> Result<(), AppError> {
    db.mark_mint_task_failed(task_id, next_retry, &err.to_string())
        .await
}

/// Compose, sign and broadcast one mint call with a pre-allocated nonce.
#[allow(clippy::too_many_arguments)]
async fn broadcast_mint(
    chain: &Arc<dyn ChainClient>,
    registry: &Arc<FunctionRegistry>,
    chain_id: u64,
    gas_ratio: f64,
    token_contract: &str,
    wallet: &SignerWallet,
    nonce: u64,
    task: &MintTask,
) -> Result<String, AppError> {
    let recipient = Address::from_str(&task.user_address).map_err(|e| {
        DispatchError::new(
            format!("task {}", task.id),
            format!("invalid recipient {}: {}", task.user_address, e),
        )
    })?;
    let contract = Address::from_str(token_contract).map_err(|e| {
        DispatchError::new(
            format!("task {}", task.id),
            format!("invalid token contract {}: {}", token_contract, e),
        )
    })?;
    let amount_wei = ether_to_wei(&task.amount)?;

    let input = registry.encode_call(
        "mint",
        &[
            DynSolValue::Address(recipient),
            DynSolValue::Uint(amount_wei, 256),
        ],
    )?;

    let call = CallRequest {
        from: Some(wallet.address.clone()),
        to: token_contract.to_string(),
        value: Some("0x0".to_string()),
        data: Some(format!("0x{}", alloy::hex::encode(&input))),
        ..Default::default()
    };

    let gas_price = chain.gas_price().await?;
    let estimate = chain.estimate_gas(&call).await?;
    let gas_limit = apply_gas_ratio(estimate, gas_ratio);

    let raw = sign_legacy_transaction(
        LegacyTxParams {
            chain_id,
            nonce,
            to: contract,
            value: U256::ZERO,
            gas_price: u128::try_from(gas_price).map_err(|_| {
                AppError::Internal(format!("gas price {} exceeds u128", u256_to_hex(gas_price)))
            })?,
            gas_limit,
            input: input.into(),
        },
        &wallet.private_key,
    )?;

    chain.send_raw_transaction(&raw).await
}

/// Estimates come in low often enough to strand transactions; pad by the
/// configured ratio.
fn apply_gas_ratio(estimate: u64, ratio: f64) -> u64 {
    if ratio <= 0.0 {
        estimate
    } else {
        (estimate as f64 * ratio).round() as u64
    }
}
