//! Consumer-side connection manager for a node service.
//!
//! Keeps one `NodeClient` usable: a background loop probes the endpoint with
//! exponential backoff until it answers or the attempts run out. Calls wait
//! briefly for readiness and fail fast once the manager has given up, until
//! `reconnect` starts a fresh attempt sequence.

use super::client::NodeClient;
use super::protocol::methods;
use crate::config::RemoteConfig;
use crate::models::{IngestRequest, IngestResponse, SearchRequest, SearchResponse, StatusResponse};
use crate::network::{BackoffState, RetryConfig};
use crate::{Result, SearchError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Settings of a `RemoteConnectionManager`.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    /// Node endpoint, `host:port` or a full URL.
    pub endpoint: String,
    /// Backoff between connection attempts.
    pub retry: RetryConfig,
    /// Deadline of one connection attempt.
    pub connection_timeout: Duration,
    /// How long a call waits for the connection to become ready.
    pub ready_wait: Duration,
    /// Deadline of one remote call.
    pub request_timeout: Duration,
    /// Health poll interval within one connection attempt.
    pub poll_interval: Duration,
}

impl RemoteSettings {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            retry: RetryConfig::default(),
            connection_timeout: RemoteConfig::CONNECTION_TIMEOUT,
            ready_wait: RemoteConfig::READY_WAIT,
            request_timeout: RemoteConfig::REQUEST_TIMEOUT,
            poll_interval: RemoteConfig::HEALTH_POLL_INTERVAL,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    pub fn with_ready_wait(mut self, wait: Duration) -> Self {
        self.ready_wait = wait;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

/// Connection state of the manager.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RemoteState {
    /// No attempt sequence running.
    Idle,
    Connecting { attempt: u32 },
    Backoff { attempt: u32, delay: Duration },
    Ready,
    /// Attempts exhausted; calls fail until `reconnect`.
    Failed { attempts: u32 },
}

impl std::fmt::Display for RemoteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RemoteState::Idle => write!(f, "idle"),
            RemoteState::Connecting { attempt } => write!(f, "connecting (attempt {})", attempt),
            RemoteState::Backoff { attempt, delay } => {
                write!(f, "retrying after attempt {} in {:?}", attempt, delay)
            }
            RemoteState::Ready => write!(f, "ready"),
            RemoteState::Failed { attempts } => write!(f, "failed after {} attempts", attempts),
        }
    }
}

/// Supervised handle to one node service.
#[derive(Debug)]
pub struct RemoteConnectionManager {
    client: NodeClient,
    settings: RemoteSettings,
    state: watch::Sender<RemoteState>,
    running: AtomicBool,
}

impl RemoteConnectionManager {
    pub fn new(settings: RemoteSettings) -> Result<Arc<Self>> {
        let client = NodeClient::new(
            &settings.endpoint,
            settings.connection_timeout,
            settings.request_timeout,
        )?;
        let (state, _) = watch::channel(RemoteState::Idle);
        Ok(Arc::new(Self {
            client,
            settings,
            state,
            running: AtomicBool::new(false),
        }))
    }

    /// Start the connection loop unless one is already running.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.send_replace(RemoteState::Connecting { attempt: 1 });
        let manager = Arc::clone(self);
        tokio::spawn(async move { manager.connect_loop().await });
    }

    /// Start a fresh attempt sequence, e.g. after the manager gave up.
    pub fn reconnect(self: &Arc<Self>) {
        info!("Reconnect requested for {}", self.settings.endpoint);
        self.start();
    }

    pub fn state(&self) -> RemoteState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<RemoteState> {
        self.state.subscribe()
    }

    pub fn endpoint(&self) -> &str {
        &self.settings.endpoint
    }

    /// Ends in `Ready` or `Failed`; the loop is marked stopped before the
    /// final state is published.
    async fn connect_loop(&self) {
        let retry = &self.settings.retry;
        let mut backoff = BackoffState::new(retry);

        loop {
            let attempt = backoff.attempt + 1;
            self.state.send_replace(RemoteState::Connecting { attempt });
            info!(
                "Connecting to node service at {} (attempt {}/{})",
                self.settings.endpoint, attempt, retry.max_attempts
            );

            let err = match self
                .client
                .wait_for_ready(self.settings.connection_timeout, self.settings.poll_interval)
                .await
            {
                Ok(()) => {
                    info!("Connected to node service at {}", self.settings.endpoint);
                    self.running.store(false, Ordering::SeqCst);
                    self.state.send_replace(RemoteState::Ready);
                    return;
                }
                Err(e) => e,
            };

            match backoff.on_failure(retry) {
                Some(delay) => {
                    warn!(
                        "Node service at {} not reachable ({}); retrying in {:?}",
                        self.settings.endpoint, err, delay
                    );
                    self.state.send_replace(RemoteState::Backoff {
                        attempt: backoff.attempt,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
                None => {
                    error!(
                        "Giving up on node service at {} after {} attempts: {}",
                        self.settings.endpoint, backoff.attempt, err
                    );
                    self.running.store(false, Ordering::SeqCst);
                    self.state.send_replace(RemoteState::Failed {
                        attempts: backoff.attempt,
                    });
                    return;
                }
            }
        }
    }

    /// Wait up to `ready_wait` for the connection to be ready.
    pub async fn wait_ready(self: &Arc<Self>) -> Result<()> {
        if self.state() == RemoteState::Idle {
            self.start();
        }

        let wait = self.settings.ready_wait;
        let mut state = self.state.subscribe();
        let ready = async {
            loop {
                match *state.borrow_and_update() {
                    RemoteState::Ready => return Ok(()),
                    RemoteState::Failed { .. } => return Err(self.unavailable()),
                    _ => {}
                }
                if state.changed().await.is_err() {
                    return Err(self.unavailable());
                }
            }
        };
        tokio::time::timeout(wait, ready)
            .await
            .map_err(|_| SearchError::NotReady(wait))?
    }

    fn unavailable(&self) -> SearchError {
        SearchError::ServiceUnavailable {
            endpoint: self.settings.endpoint.clone(),
        }
    }

    /// Call a method once the connection is ready.
    ///
    /// A transport failure drops readiness and restarts the connection loop.
    pub async fn call(self: &Arc<Self>, method: &str, params: Value) -> Result<Value> {
        self.wait_ready().await?;

        match self.client.call(method, params).await {
            Err(e @ (SearchError::Http { .. } | SearchError::Transport { .. })) => {
                warn!(
                    "Call {} to {} failed: {}; reconnecting",
                    method, self.settings.endpoint, e
                );
                self.state.send_replace(RemoteState::Idle);
                self.start();
                Err(e)
            }
            other => other,
        }
    }

    async fn call_typed<T: DeserializeOwned>(
        self: &Arc<Self>,
        method: &str,
        params: Value,
    ) -> Result<T> {
        let value = self.call(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    pub async fn get_status(self: &Arc<Self>) -> Result<StatusResponse> {
        self.call_typed(methods::GET_STATUS, serde_json::json!({}))
            .await
    }

    pub async fn ingest_data(self: &Arc<Self>, request: &IngestRequest) -> Result<IngestResponse> {
        self.call_typed(methods::INGEST_DATA, serde_json::to_value(request)?)
            .await
    }

    pub async fn search_and_fetch_items(
        self: &Arc<Self>,
        request: &SearchRequest,
    ) -> Result<SearchResponse> {
        self.call_typed(methods::SEARCH_AND_FETCH_ITEMS, serde_json::to_value(request)?)
            .await
    }
}
