//! Transaction dispatcher: routes a block's transactions to registered
//! handlers and enforces the all-or-nothing block contract.

use async_trait::async_trait;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

use crate::domain::{
    AppError, BlockProcessor, ChainClient, DecodedCall, DispatchError, HandlerContext, RpcBlock,
    RpcTransaction, TransactionHandler,
};
use crate::infra::rpc::FunctionRegistry;

/// A resolved dispatch for one transaction: the handler plus the decoded
/// call, when the route came from the contract table.
struct PlannedDispatch {
    handler: Arc<dyn TransactionHandler>,
    call: Option<DecodedCall>,
}

/// Routes transactions by lower-cased recipient address.
///
/// Contract routes additionally require the decoded input to name a function
/// registered for that address; wallet routes fire on the address alone.
/// The two tables are independent and at most one handler from each fires
/// per transaction.
pub struct TransactionDispatcher {
    contract_routes: HashMap<String, HashMap<String, Arc<dyn TransactionHandler>>>,
    wallet_routes: HashMap<String, Arc<dyn TransactionHandler>>,
    registry: Arc<FunctionRegistry>,
    chain: Arc<dyn ChainClient>,
    pool: PgPool,
}

impl TransactionDispatcher {
    #[must_use]
    pub fn new(chain: Arc<dyn ChainClient>, pool: PgPool, registry: Arc<FunctionRegistry>) -> Self {
        Self {
            contract_routes: HashMap::new(),
            wallet_routes: HashMap::new(),
            registry,
            chain,
            pool,
        }
    }

    /// Register a handler for `function` calls on a watched contract.
    pub fn register_contract_handler(
        &mut self,
        address: &str,
        function: &str,
        handler: Arc<dyn TransactionHandler>,
    ) {
        self.contract_routes
            .entry(address.to_lowercase())
            .or_default()
            .insert(function.to_string(), handler);
    }

    /// Register a handler for transfers into a watched wallet.
    pub fn register_wallet_handler(&mut self, address: &str, handler: Arc<dyn TransactionHandler>) {
        self.wallet_routes
            .insert(address.to_lowercase(), handler);
    }

    /// Resolve the handlers a transaction should reach. Unknown selectors
    /// and unregistered functions are a silent skip.
    fn route(&self, tx: &RpcTransaction) -> Result<Vec<PlannedDispatch>, AppError> {
        let Some(to) = tx.to.as_deref() else {
            return Ok(Vec::new());
        };
        let to = to.to_lowercase();
        let mut plans = Vec::new();

        if let Some(functions) = self.contract_routes.get(&to) {
            let decoded = self.registry.decode_input(&tx.input)?;
            if let Some(name) = decoded.function_name() {
                if let Some(handler) = functions.get(name) {
                    plans.push(PlannedDispatch {
                        handler: Arc::clone(handler),
                        call: Some(decoded),
                    });
                } else {
                    debug!(tx_hash = %tx.hash, function = name, "no handler for decoded function");
                }
            }
        }

        if let Some(handler) = self.wallet_routes.get(&to) {
            plans.push(PlannedDispatch {
                handler: Arc::clone(handler),
                call: None,
            });
        }

        Ok(plans)
    }
}

#[async_trait]
impl BlockProcessor for TransactionDispatcher {
    /// Evaluate every transaction of the block concurrently, join all
    /// results, and fail the whole block on the first handler error. The
    /// caller only advances the cursor when this returns `Ok`.
    async fn process_block(&self, block: &RpcBlock) -> Result<u64, AppError> {
        let mut join_set: JoinSet<(String, Result<(), AppError>)> = JoinSet::new();
        let mut dispatched = 0_u64;

        for tx in &block.transactions {
            let plans = self
                .route(tx)
                .map_err(|e| DispatchError::new(tx.hash.clone(), e.to_string()))?;
            if plans.is_empty() {
                continue;
            }
            dispatched += plans.len() as u64;

            let tx = tx.clone();
            let chain = Arc::clone(&self.chain);
            let pool = self.pool.clone();
            join_set.spawn(async move {
                let hash = tx.hash.clone();
                for plan in plans {
                    let ctx = HandlerContext {
                        call: plan.call,
                        tx: tx.clone(),
                        chain: Arc::clone(&chain),
                        pool: pool.clone(),
                    };
                    if let Err(err) = plan.handler.process(ctx).await {
                        return (hash, Err(err));
                    }
                }
                (hash, Ok(()))
            });
        }

        // Rendezvous: siblings run to completion, the first failure found
        // wins. Order of completion is irrelevant inside a block.
        let mut failure: Option<DispatchError> = None;
        while let Some(joined) = join_set.join_next().await {
            let (tx_hash, result) =
                joined.map_err(|e| AppError::Internal(format!("dispatch task failed: {}", e)))?;
            if let Err(err) = result {
                failure.get_or_insert(DispatchError::new(tx_hash, err.to_string()));
            }
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(dispatched),
        }
    }
}
