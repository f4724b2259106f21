//! Domain types: chain wire objects, the filtered-transaction log row and the
//! mint task state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Block identifier accepted by `eth_getBlockByNumber` / `eth_getBlockByHash`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockSelector {
    Number(u64),
    Hash(String),
    Latest,
    Earliest,
    Pending,
}

/// A block as returned by the chain endpoint. Quantities stay in their hex
/// wire form; conversion happens at the point of use.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcBlock {
    pub number: String,
    pub hash: String,
    pub parent_hash: String,
    pub timestamp: String,
    pub transactions: Vec<RpcTransaction>,
}

/// A transaction embedded in a full block or returned by
/// `eth_getTransactionByHash`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcTransaction {
    pub hash: String,
    pub block_number: String,
    pub transaction_index: String,
    pub from: String,
    /// Absent for contract-creation transactions.
    pub to: Option<String>,
    pub value: String,
    pub input: String,
    pub nonce: String,
    pub gas: String,
    pub gas_price: String,
}

/// Mined-transaction outcome returned by `eth_getTransactionReceipt`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcReceipt {
    pub transaction_hash: String,
    pub block_number: String,
    /// `"0x1"` for success, `"0x0"` for failure.
    pub status: String,
    pub gas_used: String,
    pub logs: Vec<RpcLog>,
}

/// An event log entry inside a receipt or an `eth_getLogs` response.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RpcLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: String,
}

/// Call object for `eth_call` / `eth_estimateGas`. Absent members are
/// omitted from the wire payload.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
}

/// Outcome of decoding a contract call input against the function registry.
///
/// Unknown selectors are a normal routing miss, not an error: the dispatcher
/// skips them without touching the handler.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedCall {
    Function {
        name: String,
        params: Vec<alloy::dyn_abi::DynSolValue>,
    },
    Unknown {
        selector: String,
    },
}

impl DecodedCall {
    /// Function name when the selector resolved, `None` otherwise.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Self::Function { name, .. } => Some(name),
            Self::Unknown { .. } => None,
        }
    }
}

/// One row of the filtered-transaction log. The `(block_number, tx_hash)`
/// pair is the idempotency key for handler side effects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FilteredTransaction {
    pub block_number: i64,
    pub tx_hash: String,
    pub tx_index: i32,
    /// Transaction value in ether, decimal string.
    pub tx_value: String,
    /// Receipt status: 1 success, 0 failure.
    pub tx_status: i32,
}

/// Status of a mint task.
///
/// `pending → processing → {sent | failed}`; a `failed` task becomes eligible
/// again once its retry window elapses, a `sent` task is resolved to
/// `success` by the mint watch handler when the broadcast hash is observed
/// on-chain.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum MintTaskStatus {
    #[default]
    Pending,
    Processing,
    Sent,
    Failed,
    Success,
}

impl MintTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Success => "success",
        }
    }
}

impl std::str::FromStr for MintTaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            "success" => Ok(Self::Success),
            _ => Err(format!("Invalid mint task status: {}", s)),
        }
    }
}

impl std::fmt::Display for MintTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A queued outbound token mint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MintTask {
    pub id: i64,
    /// Recipient of the minted tokens.
    pub user_address: String,
    /// Amount in ether units, decimal string.
    pub amount: String,
    pub status: MintTaskStatus,
    /// Attempt counter: incremented on every broadcast outcome, success or
    /// failure.
    pub retry_count: i32,
    pub next_retry_time: DateTime<Utc>,
    /// Broadcast transaction hash once the task reaches `sent`.
    pub tx_hash: Option<String>,
    /// Last broadcast error message.
    pub remark: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MintTask {
    #[must_use]
    pub fn new(id: i64, user_address: String, amount: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_address,
            amount,
            status: MintTaskStatus::Pending,
            retry_count: 0,
            next_retry_time: now,
            tx_hash: None,
            remark: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Result of a block synchronization run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another instance holds the lock. Not an error.
    AlreadyRunning,
    /// The window was empty.
    NoNewBlocks,
    Completed(SyncReport),
}

/// Success summary for a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub blocks_processed: u64,
    pub transactions_dispatched: u64,
    pub elapsed: Duration,
}

/// Result of a mint dispatch run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MintOutcome {
    /// Another instance holds the lock. Not an error.
    AlreadyRunning,
    /// No task was eligible.
    NoPendingTasks,
    /// Every configured signer failed its nonce fetch.
    NoUsableSigners,
    Completed(MintReport),
}

/// Success summary for a mint run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintReport {
    pub tasks_sent: u64,
    pub tasks_failed: u64,
    pub tasks_skipped: u64,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_mint_task_status_display_and_parsing() {
        let statuses = vec![
            (MintTaskStatus::Pending, "pending"),
            (MintTaskStatus::Processing, "processing"),
            (MintTaskStatus::Sent, "sent"),
            (MintTaskStatus::Failed, "failed"),
            (MintTaskStatus::Success, "success"),
        ];

        for (status, string) in statuses {
            assert_eq!(status.as_str(), string);
            assert_eq!(status.to_string(), string);
            assert_eq!(MintTaskStatus::from_str(string).unwrap(), status);
        }

        assert!(MintTaskStatus::from_str("invalid").is_err());
    }

    #[test]
    fn test_mint_task_initialization_defaults() {
        let task = MintTask::new(7, "0xabc".to_string(), "1.5".to_string());
        assert_eq!(task.status, MintTaskStatus::Pending);
        assert_eq!(task.retry_count, 0);
        assert!(task.tx_hash.is_none());
        assert!(task.remark.is_none());
    }

    #[test]
    fn test_block_deserializes_from_rpc_shape() {
        let json = r#"{
            "number": "0x3e8",
            "hash": "0xblock",
            "parentHash": "0xparent",
            "timestamp": "0x60d0",
            "transactions": [{
                "hash": "0xtx",
                "blockNumber": "0x3e8",
                "transactionIndex": "0x0",
                "from": "0xfrom",
                "to": "0xto",
                "value": "0x0",
                "input": "0x",
                "nonce": "0x1",
                "gas": "0x5208",
                "gasPrice": "0x3b9aca00"
            }]
        }"#;

        let block: RpcBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.number, "0x3e8");
        assert_eq!(block.transactions.len(), 1);
        assert_eq!(block.transactions[0].to.as_deref(), Some("0xto"));
    }

    #[test]
    fn test_contract_creation_has_no_recipient() {
        let json = r#"{"hash": "0xtx", "to": null}"#;
        let tx: RpcTransaction = serde_json::from_str(json).unwrap();
        assert!(tx.to.is_none());
    }

    #[test]
    fn test_call_request_omits_absent_members() {
        let call = CallRequest {
            to: "0xto".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&call).unwrap();
        assert_eq!(json, r#"{"to":"0xto"}"#);
    }
}
