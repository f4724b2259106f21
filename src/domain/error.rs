//! Error taxonomy for the relayer.
//!
//! Errors are grouped by the subsystem that produced them and wrapped into
//! [`AppError`] at the boundaries. Lock contention and lost claim races are
//! deliberately *not* errors; they surface as quiet outcomes on the engine
//! result types instead.

use thiserror::Error;

/// Chain RPC failures.
#[derive(Debug, Error)]
pub enum RpcError {
    /// The HTTP transport failed (connect, timeout, body read).
    #[error("rpc transport error: {0}")]
    Transport(String),

    /// The endpoint answered with a JSON-RPC `error` member. The payload is
    /// carried verbatim.
    #[error("rpc endpoint error: {0}")]
    Endpoint(String),

    /// The endpoint returned an empty or unparsable body.
    #[error("empty rpc response")]
    EmptyResponse,

    /// The `result` member did not match the expected shape.
    #[error("unexpected rpc result: {0}")]
    UnexpectedResult(String),

    /// A block could not be retrieved after all configured attempts.
    #[error("block {0} retrieval failed")]
    RetrievalExhausted(u64),

    /// A transaction receipt stayed unavailable after all configured attempts.
    #[error("receipt for transaction {0} unavailable")]
    ReceiptUnavailable(String),
}

/// Relational store failures.
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("migration error: {0}")]
    Migration(String),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => Self::Connection(err.to_string()),
            other => Self::Query(other.to_string()),
        }
    }
}

/// Cache store failures.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("command error: {0}")]
    Command(String),
}

/// ABI registry and codec failures.
#[derive(Debug, Error)]
pub enum AbiError {
    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("invalid type in registry: {0}")]
    InvalidType(String),

    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),
}

/// Handler-level dispatch failures. Aborts the block being processed.
#[derive(Debug, Error)]
#[error("transaction {tx_hash}: {message}")]
pub struct DispatchError {
    pub tx_hash: String,
    pub message: String,
}

impl DispatchError {
    pub fn new(tx_hash: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tx_hash: tx_hash.into(),
            message: message.into(),
        }
    }
}

/// Startup configuration failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration: {0}")]
    Missing(String),

    #[error("invalid configuration {name}: {message}")]
    Invalid { name: String, message: String },
}

impl ConfigError {
    pub fn invalid(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Local transaction signing failures.
#[derive(Debug, Error)]
pub enum SignerError {
    #[error("invalid private key: {0}")]
    InvalidKey(String),

    #[error("signing failed: {0}")]
    Signing(String),
}

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Rpc error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Abi error: {0}")]
    Abi(#[from] AbiError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Signer error: {0}")]
    Signer(#[from] SignerError),

    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rpc_error_display() {
        let err = AppError::Rpc(RpcError::RetrievalExhausted(502));
        assert_eq!(err.to_string(), "Rpc error: block 502 retrieval failed");
    }

    #[test]
    fn test_dispatch_error_carries_hash() {
        let err = DispatchError::new("0xabc", "handler rejected");
        assert!(err.to_string().contains("0xabc"));
        assert!(err.to_string().contains("handler rejected"));
    }

    #[test]
    fn test_endpoint_error_payload_is_verbatim() {
        let payload = r#"{"code":-32000,"message":"nonce too low"}"#;
        let err = RpcError::Endpoint(payload.to_string());
        assert!(err.to_string().ends_with(payload));
    }
}
