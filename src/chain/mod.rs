//! Chain access layer
//!
//! JSON-RPC transport, receipt/log types, and confirmation polling.

pub mod network;
pub mod reader;
pub mod receipt;

pub use network::{JsonRpcClient, NetworkError};
pub use reader::{
    await_confirmation, await_confirmation_with_progress, ChainReader, ConfirmationError,
    ConfirmationPolicy,
};
pub use receipt::{Log, LogFilter, RpcTransaction, TransactionReceipt};
