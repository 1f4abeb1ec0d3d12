//! Index engine integration.
//!
//! - `supervisor`: engine process lifecycle and readiness
//! - `protocol`: channel wire protocol
//! - `state`: per-channel lifecycle state machine
//! - `channel` / `client`: resilient ingest and search channels

mod channel;
mod client;
pub mod protocol;
mod state;
mod supervisor;

pub use channel::{ChannelSettings, IndexChannel};
pub use client::{ConnectReport, IndexChannelClient, SearchIndex};
pub use protocol::{ChannelMode, EngineConnection, IndexReply, IndexRequest};
pub use state::{ChannelEvent, ChannelState, ChannelStates, ConnectionTracker, NodeConnectionState};
pub use supervisor::{EngineLaunchConfig, EngineStatus, EngineSupervisor};
