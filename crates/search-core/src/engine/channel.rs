//! One resilient channel to the index engine.
//!
//! A channel owns at most one `EngineConnection` and reports every
//! lifecycle change to the shared `ConnectionTracker`. Initial
//! establishment retries with backoff and fails for good once attempts are
//! exhausted, unless the channel was already handed to the background; a
//! connection lost later is re-established in the background without
//! giving up.

use super::protocol::{ChannelMode, EngineConnection, IndexReply, IndexRequest};
use super::state::{ChannelEvent, ChannelState, ConnectionTracker};
use crate::config::IndexConfig;
use crate::network::{BackoffState, RetryConfig};
use crate::{Result, SearchError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Connection settings shared by both channels.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// `host:port` of the engine's channel listener.
    pub address: String,
    pub password: String,
    /// Timeout of one connect + handshake attempt.
    pub connect_timeout: Duration,
    /// Timeout of one request on an established channel.
    pub operation_timeout: Duration,
    /// Backoff between connect attempts.
    pub reconnect: RetryConfig,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            address: format!("{}:{}", IndexConfig::DEFAULT_HOST, IndexConfig::DEFAULT_PORT),
            password: IndexConfig::DEFAULT_PASSWORD.to_string(),
            connect_timeout: IndexConfig::CONNECT_ATTEMPT_TIMEOUT,
            operation_timeout: IndexConfig::OPERATION_TIMEOUT,
            reconnect: RetryConfig::new()
                .with_base_delay(Duration::from_millis(500))
                .with_multiplier(2.0)
                .with_max_delay(Duration::from_secs(5))
                .with_max_attempts(IndexConfig::CONNECT_ATTEMPTS),
        }
    }
}

impl ChannelSettings {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            address: format!("{}:{}", host, port),
            ..Self::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = password.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, reconnect: RetryConfig) -> Self {
        self.reconnect = reconnect;
        self
    }
}

/// A single ingest or search channel.
#[derive(Debug)]
pub struct IndexChannel {
    mode: ChannelMode,
    settings: ChannelSettings,
    conn: Mutex<Option<EngineConnection>>,
    tracker: Arc<ConnectionTracker>,
    reconnecting: AtomicBool,
    closed: AtomicBool,
    background: AtomicBool,
}

impl IndexChannel {
    pub fn new(mode: ChannelMode, settings: ChannelSettings, tracker: Arc<ConnectionTracker>) -> Self {
        Self {
            mode,
            settings,
            conn: Mutex::new(None),
            tracker,
            reconnecting: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            background: AtomicBool::new(false),
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Initial establishment.
    ///
    /// Emits `Timeout` and fails with a startup error once the reconnect
    /// policy is exhausted. A channel already handed to the background
    /// switches to the endless reconnect loop instead.
    pub async fn establish(self: &Arc<Self>) -> Result<()> {
        self.tracker.handle(self.mode, ChannelEvent::Connecting);
        let policy = &self.settings.reconnect;
        let mut backoff = BackoffState::new(policy);

        loop {
            let err = match self.open().await {
                Ok(conn) => {
                    *self.conn.lock().await = Some(conn);
                    self.tracker.handle(self.mode, ChannelEvent::Connected);
                    return Ok(());
                }
                Err(e) => e,
            };

            self.tracker
                .handle(self.mode, ChannelEvent::Error(err.to_string()));
            match backoff.on_failure(policy) {
                Some(delay) => {
                    self.tracker.handle(
                        self.mode,
                        ChannelEvent::Retrying {
                            attempt: backoff.attempt,
                            delay,
                        },
                    );
                    tokio::time::sleep(delay).await;
                }
                None => {
                    self.tracker.handle(self.mode, ChannelEvent::Timeout);
                    if self.background.load(Ordering::SeqCst) {
                        warn!(
                            "{} channel gave up its initial connect; reconnecting in the background",
                            self.mode
                        );
                        self.spawn_reconnect();
                    }
                    return Err(SearchError::startup(format!(
                        "{} channel could not connect to {} after {} attempts: {}",
                        self.mode, self.settings.address, backoff.attempt, err
                    )));
                }
            }
        }
    }

    /// Execute one request on this channel.
    ///
    /// Reopens the connection lazily if a previous call dropped it. A
    /// transport failure marks the channel disconnected and starts a
    /// background reconnect; a timeout fails this call only.
    pub async fn run(self: &Arc<Self>, request: &IndexRequest) -> Result<IndexReply> {
        let mut guard = self.conn.lock().await;
        let mut conn = match guard.take() {
            Some(conn) => conn,
            None => match self.open().await {
                Ok(conn) => conn,
                Err(e) => {
                    drop(guard);
                    self.on_transport_failure(&e);
                    return Err(e);
                }
            },
        };

        let timeout = self.settings.operation_timeout;
        match tokio::time::timeout(timeout, conn.execute(request)).await {
            Ok(Ok(reply)) => {
                *guard = Some(conn);
                Ok(reply)
            }
            Ok(Err(e @ SearchError::Protocol { .. })) => {
                *guard = Some(conn);
                Err(e)
            }
            Ok(Err(e)) => {
                drop(guard);
                self.on_transport_failure(&e);
                Err(e)
            }
            Err(_) => {
                // The stream may still carry the late reply; drop it.
                drop(guard);
                debug!("{} {} timed out after {:?}", self.mode, request.keyword(), timeout);
                self.tracker.handle(self.mode, ChannelEvent::Timeout);
                Err(SearchError::Timeout(timeout))
            }
        }
    }

    /// Stop treating an unfinished initial establishment as a startup
    /// failure; if it already gave up, start reconnecting now.
    pub fn continue_in_background(self: &Arc<Self>) {
        self.background.store(true, Ordering::SeqCst);
        if self.tracker.states().get(self.mode) == ChannelState::Failed {
            self.spawn_reconnect();
        }
    }

    /// Close the connection and stop any background reconnect.
    pub async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let conn = self.conn.lock().await.take();
        if let Some(conn) = conn {
            let _ = conn.quit().await;
        }
        self.tracker.handle(self.mode, ChannelEvent::Disconnected);
    }

    async fn open(&self) -> Result<EngineConnection> {
        EngineConnection::open(
            &self.settings.address,
            self.mode,
            &self.settings.password,
            self.settings.connect_timeout,
        )
        .await
    }

    fn on_transport_failure(self: &Arc<Self>, err: &SearchError) {
        self.tracker
            .handle(self.mode, ChannelEvent::Error(err.to_string()));
        self.tracker.handle(self.mode, ChannelEvent::Disconnected);
        self.spawn_reconnect();
    }

    fn spawn_reconnect(self: &Arc<Self>) {
        if self.closed.load(Ordering::SeqCst) || self.reconnecting.swap(true, Ordering::SeqCst) {
            return;
        }
        let channel = Arc::clone(self);
        tokio::spawn(async move {
            channel.reconnect().await;
            channel.reconnecting.store(false, Ordering::SeqCst);
        });
    }

    /// Background reconnect; keeps trying at the capped delay once the
    /// policy's attempts are used up.
    async fn reconnect(&self) {
        let policy = &self.settings.reconnect;
        let mut backoff = BackoffState::new(policy);

        while !self.closed.load(Ordering::SeqCst) {
            let delay = backoff.on_failure(policy).unwrap_or(policy.max_delay);
            self.tracker.handle(
                self.mode,
                ChannelEvent::Retrying {
                    attempt: backoff.attempt,
                    delay,
                },
            );
            tokio::time::sleep(delay).await;
            if self.closed.load(Ordering::SeqCst) {
                break;
            }

            self.tracker.handle(self.mode, ChannelEvent::Connecting);
            match self.open().await {
                Ok(conn) => {
                    *self.conn.lock().await = Some(conn);
                    self.tracker.handle(self.mode, ChannelEvent::Connected);
                    info!("{} channel reconnected", self.mode);
                    return;
                }
                Err(e) => {
                    self.tracker
                        .handle(self.mode, ChannelEvent::Error(e.to_string()));
                }
            }
        }
    }
}
