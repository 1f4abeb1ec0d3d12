//! Node service remote access: JSON-RPC types, client and the
//! consumer-side connection manager.

mod client;
mod manager;
pub mod protocol;

pub use client::{parse_endpoint, NodeClient};
pub use manager::{RemoteConnectionManager, RemoteSettings, RemoteState};
pub use protocol::{methods, RpcError, RpcRequest, RpcResponse};
