//! Channel lifecycle state machine.
//!
//! Each channel moves between these states:
//! - DISCONNECTED: no connection, nothing in progress
//! - CONNECTING: connect + handshake in progress
//! - CONNECTED: requests may be issued
//! - RETRYING: waiting before the next connect attempt
//! - FAILED: the initial connect gave up (startup failure)
//!
//! Transitions are driven only by `ChannelEvent`s handed to
//! `ConnectionTracker::handle`, which also publishes the derived
//! `NodeConnectionState` to subscribers.

use super::protocol::ChannelMode;
use crate::error_log::RecentErrorLog;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Lifecycle state of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Retrying,
    Failed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChannelState::Disconnected => write!(f, "DISCONNECTED"),
            ChannelState::Connecting => write!(f, "CONNECTING"),
            ChannelState::Connected => write!(f, "CONNECTED"),
            ChannelState::Retrying => write!(f, "RETRYING"),
            ChannelState::Failed => write!(f, "FAILED"),
        }
    }
}

/// Lifecycle callbacks emitted by a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Connecting,
    Connected,
    Error(String),
    Disconnected,
    Timeout,
    Retrying { attempt: u32, delay: Duration },
}

impl ChannelState {
    /// Apply an event and return the next state.
    pub fn on_event(self, event: &ChannelEvent) -> ChannelState {
        match (self, event) {
            (_, ChannelEvent::Connecting) => ChannelState::Connecting,
            (_, ChannelEvent::Connected) => ChannelState::Connected,
            (_, ChannelEvent::Disconnected) => ChannelState::Disconnected,
            // Once connected, a timeout only fails the call that hit it.
            (ChannelState::Connected, ChannelEvent::Timeout) => ChannelState::Connected,
            (_, ChannelEvent::Timeout) => ChannelState::Failed,
            (ChannelState::Connected, ChannelEvent::Retrying { .. }) => ChannelState::Connected,
            (_, ChannelEvent::Retrying { .. }) => ChannelState::Retrying,
            (state, ChannelEvent::Error(_)) => state,
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ChannelState::Connected)
    }
}

/// States of both channels at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStates {
    pub ingest: ChannelState,
    pub search: ChannelState,
}

impl ChannelStates {
    pub fn get(&self, mode: ChannelMode) -> ChannelState {
        match mode {
            ChannelMode::Ingest => self.ingest,
            ChannelMode::Search => self.search,
        }
    }

    fn slot(&mut self, mode: ChannelMode) -> &mut ChannelState {
        match mode {
            ChannelMode::Ingest => &mut self.ingest,
            ChannelMode::Search => &mut self.search,
        }
    }

    /// Connection flags reported by status queries.
    pub fn connection_state(&self) -> NodeConnectionState {
        NodeConnectionState {
            ingest_connected: self.ingest.is_connected(),
            search_connected: self.search.is_connected(),
        }
    }
}

/// Whether each index channel is currently usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NodeConnectionState {
    pub ingest_connected: bool,
    pub search_connected: bool,
}

impl NodeConnectionState {
    pub fn fully_connected(&self) -> bool {
        self.ingest_connected && self.search_connected
    }
}

/// Owner of the channel states.
///
/// Channels report lifecycle events here; nothing else mutates the states.
#[derive(Debug)]
pub struct ConnectionTracker {
    node_id: String,
    states: watch::Sender<ChannelStates>,
    errors: Arc<RecentErrorLog>,
}

impl ConnectionTracker {
    pub fn new(node_id: impl Into<String>, errors: Arc<RecentErrorLog>) -> Self {
        let (states, _) = watch::channel(ChannelStates::default());
        Self {
            node_id: node_id.into(),
            states,
            errors,
        }
    }

    /// Handle a lifecycle event from the `mode` channel.
    pub fn handle(&self, mode: ChannelMode, event: ChannelEvent) {
        let node_id = &self.node_id;
        match &event {
            ChannelEvent::Connecting => {
                info!(node_id = %node_id, "{} channel connecting", mode);
            }
            ChannelEvent::Connected => {
                info!(node_id = %node_id, "{} channel connected", mode);
            }
            ChannelEvent::Error(message) => {
                error!(node_id = %node_id, "{} channel error: {}", mode, message);
                self.errors
                    .record(format!("{} channel error ({}): {}", mode, node_id, message));
            }
            ChannelEvent::Disconnected => {
                error!(node_id = %node_id, "{} channel disconnected", mode);
            }
            ChannelEvent::Timeout => {
                error!(node_id = %node_id, "{} channel timeout", mode);
                self.errors
                    .record(format!("{} channel timeout ({})", mode, node_id));
            }
            ChannelEvent::Retrying { attempt, delay } => {
                warn!(
                    node_id = %node_id,
                    "{} channel retrying (attempt {}) in {:?}", mode, attempt, delay
                );
            }
        }

        self.states.send_if_modified(|states| {
            let slot = states.slot(mode);
            let next = slot.on_event(&event);
            if next == *slot {
                return false;
            }
            *slot = next;
            true
        });
    }

    /// Current states of both channels.
    pub fn states(&self) -> ChannelStates {
        *self.states.borrow()
    }

    /// Current connection flags.
    pub fn connection_state(&self) -> NodeConnectionState {
        self.states.borrow().connection_state()
    }

    /// Subscribe to state changes.
    pub fn subscribe(&self) -> watch::Receiver<ChannelStates> {
        self.states.subscribe()
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn errors(&self) -> &Arc<RecentErrorLog> {
        &self.errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> ConnectionTracker {
        ConnectionTracker::new("node-test", Arc::new(RecentErrorLog::new(10)))
    }

    #[test]
    fn test_timeout_before_connect_fails_channel() {
        let state = ChannelState::Connecting.on_event(&ChannelEvent::Timeout);
        assert_eq!(state, ChannelState::Failed);
    }

    #[test]
    fn test_timeout_after_connect_is_per_call() {
        let state = ChannelState::Connected.on_event(&ChannelEvent::Timeout);
        assert_eq!(state, ChannelState::Connected);
    }

    #[test]
    fn test_error_never_changes_state() {
        for state in [
            ChannelState::Disconnected,
            ChannelState::Connecting,
            ChannelState::Connected,
            ChannelState::Retrying,
            ChannelState::Failed,
        ] {
            assert_eq!(state.on_event(&ChannelEvent::Error("x".into())), state);
        }
    }

    #[test]
    fn test_tracker_flags_follow_events() {
        let tracker = tracker();
        tracker.handle(ChannelMode::Ingest, ChannelEvent::Connected);
        assert_eq!(
            tracker.connection_state(),
            NodeConnectionState {
                ingest_connected: true,
                search_connected: false
            }
        );

        tracker.handle(ChannelMode::Search, ChannelEvent::Connected);
        assert!(tracker.connection_state().fully_connected());

        tracker.handle(ChannelMode::Search, ChannelEvent::Disconnected);
        assert!(!tracker.connection_state().search_connected);
        assert!(tracker.connection_state().ingest_connected);
    }

    #[test]
    fn test_retrying_does_not_change_connection_flags() {
        let tracker = tracker();
        tracker.handle(ChannelMode::Ingest, ChannelEvent::Connected);
        tracker.handle(
            ChannelMode::Ingest,
            ChannelEvent::Retrying {
                attempt: 1,
                delay: Duration::from_millis(10),
            },
        );
        assert!(tracker.connection_state().ingest_connected);
    }

    #[test]
    fn test_errors_and_timeouts_are_recorded() {
        let tracker = tracker();
        tracker.handle(ChannelMode::Ingest, ChannelEvent::Error("refused".into()));
        tracker.handle(ChannelMode::Search, ChannelEvent::Timeout);

        let messages = tracker.errors().recent_messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].contains("ingest channel error (node-test): refused"));
        assert!(messages[1].contains("search channel timeout"));
    }
}
