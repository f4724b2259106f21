//! Application configuration.
//!
//! Everything is read once at startup into [`AppConfig`] and passed by
//! reference to component constructors; no component reads the environment
//! after construction.

use secrecy::SecretString;
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use crate::domain::{AppError, ConfigError};

/// A known chain endpoint.
#[derive(Debug, Clone)]
pub struct ChainInfo {
    pub chain_id: u64,
    pub name: &'static str,
    pub base_coin: &'static str,
    pub rpc_url: &'static str,
    pub scan_url: &'static str,
    pub official: bool,
}

/// Built-in chain registry. `CHAIN_RPC_URL` overrides the endpoint of the
/// selected chain.
pub fn chain_registry() -> HashMap<u64, ChainInfo> {
    let chains = [
        ChainInfo {
            chain_id: 128,
            name: "HECO",
            base_coin: "HT",
            rpc_url: "https://http-mainnet.hecochain.com",
            scan_url: "https://hecoinfo.com",
            official: true,
        },
        ChainInfo {
            chain_id: 256,
            name: "HECO",
            base_coin: "HT",
            rpc_url: "https://http-testnet.hecochain.com",
            scan_url: "https://testnet.hecoinfo.com",
            official: false,
        },
        ChainInfo {
            chain_id: 56,
            name: "BSC",
            base_coin: "BNB",
            rpc_url: "https://bsc-dataseed1.binance.org",
            scan_url: "https://bscscan.com",
            official: true,
        },
        ChainInfo {
            chain_id: 97,
            name: "BSC",
            base_coin: "BNB",
            rpc_url: "https://data-seed-prebsc-1-s1.binance.org:8545",
            scan_url: "https://testnet.bscscan.com",
            official: false,
        },
    ];
    chains.into_iter().map(|c| (c.chain_id, c)).collect()
}

/// Bounded retry with a per-attempt backoff table. Attempts beyond the table
/// fall back to the default delay.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub tries: u32,
    pub delays: Vec<Duration>,
    pub default_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            tries: 3,
            delays: vec![
                Duration::from_millis(100),
                Duration::from_millis(300),
                Duration::from_millis(500),
            ],
            default_delay: Duration::from_millis(100),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after attempt number `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.delays
            .get(attempt as usize)
            .copied()
            .unwrap_or(self.default_delay)
    }
}

/// A signing wallet: address plus the private key used for local signing.
#[derive(Clone)]
pub struct SignerWallet {
    pub address: String,
    pub private_key: SecretString,
}

impl std::fmt::Debug for SignerWallet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerWallet")
            .field("address", &self.address)
            .field("private_key", &"<redacted>")
            .finish()
    }
}

/// Block synchronization settings.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Per-block fetch retry.
    pub fetch_retry: RetryPolicy,
    /// Hard cap on blocks processed in one run; the rest waits for the next
    /// run.
    pub max_blocks_per_run: u64,
    /// Blocks fetched concurrently per chunk.
    pub chunk_size: usize,
    /// Pause between chunks, rate limiting against the endpoint.
    pub inter_chunk_sleep: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            fetch_retry: RetryPolicy::default(),
            max_blocks_per_run: 1000,
            chunk_size: 100,
            inter_chunk_sleep: Duration::from_millis(500),
        }
    }
}

/// Mint dispatch settings.
#[derive(Debug, Clone)]
pub struct MintSettings {
    /// Tasks loaded per run.
    pub batch_size: i64,
    /// A task is abandoned once `retry_count` reaches this.
    pub max_retries: i32,
    /// Seconds until the next attempt, indexed by `retry_count`. Must have
    /// one entry per allowed retry.
    pub retry_delays_secs: Vec<i64>,
}

impl Default for MintSettings {
    fn default() -> Self {
        Self {
            batch_size: 100,
            max_retries: 3,
            retry_delays_secs: vec![10, 20, 30],
        }
    }
}

impl MintSettings {
    /// Delay before the retry following attempt `retry_count`.
    #[must_use]
    pub fn retry_delay_secs(&self, retry_count: i32) -> i64 {
        let idx = retry_count.max(0) as usize;
        self.retry_delays_secs
            .get(idx)
            .copied()
            .or_else(|| self.retry_delays_secs.last().copied())
            .unwrap_or(10)
    }
}

/// Application configuration, constructed once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain_id: u64,
    pub rpc_url: String,
    pub database_url: String,
    pub redis_url: String,
    /// Extra gas headroom ratio, e.g. `1.1` pays 10% above the estimate.
    /// `0` disables the adjustment.
    pub gas_ratio: f64,
    /// JSON-RPC connect/read timeout.
    pub rpc_timeout: Duration,
    /// Skip TLS certificate verification against the endpoint.
    pub accept_invalid_certs: bool,
    pub sync: SyncSettings,
    pub mint: MintSettings,
    /// Receipt fetch retry used by handlers.
    pub receipt_retry: RetryPolicy,
    /// Contract addresses watched by the dispatcher.
    pub watched_contracts: Vec<String>,
    /// Wallet addresses watched for inbound transfers.
    pub watched_wallets: Vec<String>,
    /// Signing wallets for outbound mints, in round-robin order.
    pub signer_wallets: Vec<SignerWallet>,
}

impl AppConfig {
    /// Build the configuration from the environment.
    pub fn from_env() -> Result<Self, AppError> {
        let chain_id = require_var("CHAIN_ID")?
            .parse::<u64>()
            .map_err(|e| ConfigError::invalid("CHAIN_ID", e.to_string()))?;

        let registry = chain_registry();
        let rpc_url = match env::var("CHAIN_RPC_URL").ok().filter(|v| !v.is_empty()) {
            Some(url) => url,
            None => registry
                .get(&chain_id)
                .map(|c| c.rpc_url.to_string())
                .ok_or_else(|| {
                    ConfigError::invalid("CHAIN_ID", format!("unknown chain {}", chain_id))
                })?,
        };

        let database_url = require_var("DATABASE_URL")?;
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let gas_ratio = parse_var("GAS_RATIO", 0.0_f64)?;
        let rpc_timeout = Duration::from_millis(parse_var("RPC_TIMEOUT_MS", 1000_u64)?);
        let accept_invalid_certs = env::var("RPC_VERIFY_TLS")
            .map(|v| !(v == "true" || v == "1"))
            .unwrap_or(true);

        let sync = SyncSettings {
            fetch_retry: RetryPolicy {
                tries: parse_var("BLOCK_FETCH_TRY_TIMES", 3_u32)?,
                delays: parse_delay_list("BLOCK_FETCH_RETRY_SLEEP", "0.1,0.3,0.5")?,
                default_delay: Duration::from_millis(100),
            },
            max_blocks_per_run: parse_var("MAX_BLOCKS_PER_RUN", 1000_u64)?,
            chunk_size: parse_var("BLOCKS_PER_CHUNK", 100_usize)?,
            inter_chunk_sleep: Duration::from_micros(parse_var("CHUNK_SLEEP_MICROS", 500_000_u64)?),
        };

        let mint = MintSettings {
            batch_size: parse_var("MINT_BATCH_SIZE", 100_i64)?,
            max_retries: parse_var("MINT_RETRY_COUNT", 3_i32)?,
            retry_delays_secs: parse_int_list("MINT_RETRY_DELAYS", "10,20,30")?,
        };

        let receipt_retry = RetryPolicy {
            tries: parse_var("RECEIPT_TRY_TIMES", 3_u32)?,
            delays: parse_delay_list("RECEIPT_RETRY_SLEEP", "0.1,0.3,0.5")?,
            default_delay: Duration::from_millis(100),
        };

        let watched_contracts = parse_address_list("WATCHED_CONTRACTS");
        let watched_wallets = parse_address_list("WATCHED_WALLETS");
        let signer_wallets = parse_signer_wallets(&env::var("MINTER_WALLETS").unwrap_or_default())?;

        Ok(Self {
            chain_id,
            rpc_url,
            database_url,
            redis_url,
            gas_ratio,
            rpc_timeout,
            accept_invalid_certs,
            sync,
            mint,
            receipt_retry,
            watched_contracts,
            watched_wallets,
            signer_wallets,
        })
    }
}

fn require_var(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::Missing(name.to_string()).into())
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.is_empty() => raw
            .parse::<T>()
            .map_err(|e| ConfigError::invalid(name, e.to_string()).into()),
        _ => Ok(default),
    }
}

/// Comma-separated seconds (fractions allowed) into durations, e.g.
/// `"0.1,0.3,0.5"`.
fn parse_delay_list(name: &str, default: &str) -> Result<Vec<Duration>, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(|part| {
            let secs = part
                .trim()
                .parse::<f64>()
                .map_err(|e| ConfigError::invalid(name, e.to_string()))?;
            if !secs.is_finite() || secs < 0.0 {
                return Err(ConfigError::invalid(name, format!("negative delay {}", part)).into());
            }
            Ok(Duration::from_secs_f64(secs))
        })
        .collect()
}

fn parse_int_list(name: &str, default: &str) -> Result<Vec<i64>, AppError> {
    let raw = env::var(name).unwrap_or_else(|_| default.to_string());
    raw.split(',')
        .map(|part| {
            part.trim()
                .parse::<i64>()
                .map_err(|e| ConfigError::invalid(name, e.to_string()).into())
        })
        .collect()
}

/// Comma-separated addresses, lower-cased for routing-table keys.
fn parse_address_list(name: &str) -> Vec<String> {
    env::var(name)
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// `address:private_key` pairs, comma-separated. Order defines the
/// round-robin sequence.
fn parse_signer_wallets(raw: &str) -> Result<Vec<SignerWallet>, AppError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (address, key) = pair.split_once(':').ok_or_else(|| {
                AppError::from(ConfigError::invalid(
                    "MINTER_WALLETS",
                    format!("expected address:key, got {:?}", pair),
                ))
            })?;
            Ok(SignerWallet {
                address: address.trim().to_string(),
                private_key: SecretString::from(key.trim().to_string()),
            })
        })
        .collect()
}
