//! Command-line entry point.

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use evm_block_relayer::app::{
    BlockSyncEngine, DepositWatchHandler, MintDispatchEngine, MintWatchHandler,
    TransactionDispatcher,
};
use evm_block_relayer::config::AppConfig;
use evm_block_relayer::domain::{
    BlockProcessor, CacheStore, ChainClient, DatabaseClient, MintOutcome, SyncOutcome,
};
use evm_block_relayer::infra::rpc::FunctionRegistry;
use evm_block_relayer::infra::{HttpChainClient, HttpClientConfig, PgStore, RedisStore};

#[derive(Parser)]
#[command(name = "evm-block-relayer", version, about = "Block sync and automated token minting")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Synchronize new blocks and dispatch watched transactions.
    SyncBlocks,
    /// Broadcast pending token mint tasks.
    AutoMint,
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,reqwest=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Everything both jobs share.
struct Services {
    config: AppConfig,
    chain: Arc<dyn ChainClient>,
    cache: Arc<dyn CacheStore>,
    store: Arc<PgStore>,
    registry: Arc<FunctionRegistry>,
}

async fn build_services() -> Result<Services> {
    let config = AppConfig::from_env()?;

    let store = Arc::new(PgStore::with_defaults(&config.database_url).await?);
    store.run_migrations().await?;

    let cache: Arc<dyn CacheStore> = Arc::new(RedisStore::connect(&config.redis_url).await?);

    let chain: Arc<dyn ChainClient> = Arc::new(HttpChainClient::new(
        &config.rpc_url,
        HttpClientConfig {
            timeout: config.rpc_timeout,
            accept_invalid_certs: config.accept_invalid_certs,
        },
    )?);

    info!(chain_id = config.chain_id, rpc = %config.rpc_url, "services initialized");

    Ok(Services {
        config,
        chain,
        cache,
        store,
        registry: Arc::new(FunctionRegistry::standard()),
    })
}

/// Wire the dispatcher: every watched contract gets the mint watcher, every
/// watched wallet the deposit watcher.
fn build_dispatcher(services: &Services) -> TransactionDispatcher {
    let mut dispatcher = TransactionDispatcher::new(
        Arc::clone(&services.chain),
        services.store.pool().clone(),
        Arc::clone(&services.registry),
    );

    for address in &services.config.watched_contracts {
        dispatcher.register_contract_handler(
            address,
            "mint",
            Arc::new(MintWatchHandler::new(
                Arc::clone(&services.registry),
                services.config.receipt_retry.clone(),
            )),
        );
    }
    for address in &services.config.watched_wallets {
        dispatcher.register_wallet_handler(
            address,
            Arc::new(DepositWatchHandler::new(services.config.receipt_retry.clone())),
        );
    }

    dispatcher
}

async fn run_sync_blocks() -> Result<()> {
    let services = build_services().await?;
    let dispatcher: Arc<dyn BlockProcessor> = Arc::new(build_dispatcher(&services));

    let engine = BlockSyncEngine::new(
        Arc::clone(&services.chain),
        Arc::clone(&services.cache),
        Arc::clone(&services.store) as Arc<dyn DatabaseClient>,
        dispatcher,
        services.config.chain_id,
        services.config.sync.clone(),
    );

    match engine.run().await {
        Ok(SyncOutcome::AlreadyRunning) => println!("block sync already in progress"),
        Ok(SyncOutcome::NoNewBlocks) => println!("no new blocks"),
        Ok(SyncOutcome::Completed(report)) => println!(
            "block sync complete: {} blocks, {} dispatched transactions in {:.3}s",
            report.blocks_processed,
            report.transactions_dispatched,
            report.elapsed.as_secs_f64()
        ),
        Err(err) => println!("block sync failed: {}", err),
    }
    Ok(())
}

async fn run_auto_mint() -> Result<()> {
    let services = build_services().await?;

    let token_contract = services
        .config
        .watched_contracts
        .first()
        .cloned()
        .ok_or_else(|| anyhow::anyhow!("WATCHED_CONTRACTS must name the token contract"))?;

    let engine = MintDispatchEngine::new(
        Arc::clone(&services.chain),
        Arc::clone(&services.cache),
        Arc::clone(&services.store) as Arc<dyn DatabaseClient>,
        Arc::clone(&services.registry),
        services.config.signer_wallets.clone(),
        services.config.chain_id,
        services.config.gas_ratio,
        token_contract,
        services.config.mint.clone(),
    );

    match engine.run().await {
        Ok(MintOutcome::AlreadyRunning) => println!("token mint already in progress"),
        Ok(MintOutcome::NoPendingTasks) => println!("no pending mint tasks"),
        Ok(MintOutcome::NoUsableSigners) => println!("no usable signer wallets"),
        Ok(MintOutcome::Completed(report)) => println!(
            "token mint complete: {} sent, {} failed, {} skipped in {:.3}s",
            report.tasks_sent,
            report.tasks_failed,
            report.tasks_skipped,
            report.elapsed.as_secs_f64()
        ),
        Err(err) => println!("token mint failed: {}", err),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::SyncBlocks => run_sync_blocks().await,
        Command::AutoMint => run_auto_mint().await,
    }
}
