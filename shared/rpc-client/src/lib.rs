//! JSON-RPC 2.0 client for blockchain nodes
//!
//! One `RpcClient` serves one chain. It holds an ordered list of
//! candidate endpoints and provides:
//! - Sticky endpoint rotation: calls start from the last endpoint that
//!   succeeded, so dead nodes stop seeing request amplification
//! - Per-endpoint retry with exponential backoff before failing over
//! - Batch calls with responses matched by request id
//! - Typed helpers for the EVM and Starknet RPC dialects

mod client;
mod error;
mod transport;
mod typed;
mod types;

pub use client::{RpcClient, RpcClientConfig};
pub use error::RpcClientError;
pub use transport::{HttpTransport, RpcTransport};
pub use typed::LogFilter;
pub use types::{RpcErrorObject, RpcRequest, RpcResponse};
