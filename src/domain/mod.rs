//! Domain layer containing core business types, traits, and error definitions.

pub mod error;
pub mod traits;
pub mod types;

pub use error::{
    AbiError, AppError, CacheError, ConfigError, DatabaseError, DispatchError, RpcError,
    SignerError,
};
pub use traits::{
    BlockProcessor, CacheStore, ChainClient, DatabaseClient, HandlerContext, TransactionHandler,
};
pub use types::{
    BlockSelector, CallRequest, DecodedCall, FilteredTransaction, MintOutcome, MintReport,
    MintTask, MintTaskStatus, RpcBlock, RpcLog, RpcReceipt, RpcTransaction, SyncOutcome,
    SyncReport,
};
