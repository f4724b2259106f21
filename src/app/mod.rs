//! Application layer: the coordination engines and their collaborators.

pub mod dispatch;
pub mod handlers;
pub mod lock;
pub mod mint;
pub mod sync;
pub mod wallets;

pub use dispatch::TransactionDispatcher;
pub use handlers::{DepositWatchHandler, MintWatchHandler};
pub use lock::ProcessLock;
pub use mint::MintDispatchEngine;
pub use sync::{BlockSyncEngine, CURSOR_KEY};
pub use wallets::{NonceTable, WalletRotation};
