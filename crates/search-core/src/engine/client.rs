//! Index channel client: the ingest and search channels as one handle.

use super::channel::{ChannelSettings, IndexChannel};
use super::protocol::{ChannelMode, IndexReply, IndexRequest};
use super::state::{ChannelStates, ConnectionTracker, NodeConnectionState};
use super::supervisor::EngineStatus;
use crate::config::IndexConfig;
use crate::error_log::RecentErrorLog;
use crate::{Result, SearchError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Index operations used by ingestion and querying.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Current connection flags of both channels.
    fn connection_state(&self) -> NodeConnectionState;

    /// Index `text` under `(collection, bucket, object)`, replacing any
    /// text previously pushed for the same key.
    async fn push(&self, collection: &str, bucket: &str, object: &str, text: &str) -> Result<()>;

    /// Object ids matching `terms`, in engine order.
    async fn query(
        &self,
        collection: &str,
        bucket: &str,
        terms: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<String>>;

    /// Remove every entry of `collection`. Returns the number flushed.
    async fn flush(&self, collection: &str) -> Result<u64>;
}

/// Outcome of `IndexChannelClient::connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectReport {
    pub ingest_connected: bool,
    pub search_connected: bool,
    /// The connect ceiling passed before both channels connected.
    pub degraded: bool,
}

type PushKey = (String, String, String);

/// Owner of the ingest (write) and search (read) channels.
#[derive(Debug)]
pub struct IndexChannelClient {
    ingest: Arc<IndexChannel>,
    search: Arc<IndexChannel>,
    tracker: Arc<ConnectionTracker>,
    pushed: Mutex<HashSet<PushKey>>,
    connect_ceiling: Duration,
}

impl IndexChannelClient {
    pub fn new(
        node_id: impl Into<String>,
        settings: ChannelSettings,
        errors: Arc<RecentErrorLog>,
    ) -> Self {
        let tracker = Arc::new(ConnectionTracker::new(node_id, errors));
        Self {
            ingest: Arc::new(IndexChannel::new(
                ChannelMode::Ingest,
                settings.clone(),
                Arc::clone(&tracker),
            )),
            search: Arc::new(IndexChannel::new(
                ChannelMode::Search,
                settings,
                Arc::clone(&tracker),
            )),
            tracker,
            pushed: Mutex::new(HashSet::new()),
            connect_ceiling: IndexConfig::CONNECT_CEILING,
        }
    }

    /// Set the wall-clock ceiling for `connect`.
    pub fn with_connect_ceiling(mut self, ceiling: Duration) -> Self {
        self.connect_ceiling = ceiling;
        self
    }

    /// Connect both channels.
    ///
    /// Resolves once both are connected. Fails if either channel gives up
    /// or the supervised engine exits first. If the ceiling passes, returns
    /// a degraded report; unconnected channels keep trying and fall back to
    /// the background reconnect loop instead of giving up.
    pub async fn connect(
        &self,
        engine: Option<watch::Receiver<EngineStatus>>,
    ) -> Result<ConnectReport> {
        let ingest = spawn_establish(&self.ingest);
        let search = spawn_establish(&self.search);
        let aborts = [ingest.abort_handle(), search.abort_handle()];

        let both = async {
            tokio::try_join!(join_channel(ingest), join_channel(search))?;
            Ok::<(), SearchError>(())
        };
        let outcome = tokio::time::timeout(self.connect_ceiling, async {
            tokio::select! {
                result = both => result,
                code = engine_exit(engine) => Err(SearchError::startup(format!(
                    "index engine exited with code {:?} before both channels connected",
                    code
                ))),
            }
        })
        .await;

        let state = self.connection_state();
        let report = ConnectReport {
            ingest_connected: state.ingest_connected,
            search_connected: state.search_connected,
            degraded: !state.fully_connected(),
        };
        match outcome {
            Ok(Ok(())) => {
                info!(node_id = %self.tracker.node_id(), "Both index channels connected");
                Ok(report)
            }
            Ok(Err(e)) => {
                for abort in aborts {
                    abort.abort();
                }
                Err(e)
            }
            Err(_) => {
                for channel in [&self.ingest, &self.search] {
                    channel.continue_in_background();
                }
                warn!(
                    node_id = %self.tracker.node_id(),
                    "Index channels not connected within {:?}; continuing degraded (ingest: {}, search: {})",
                    self.connect_ceiling,
                    report.ingest_connected,
                    report.search_connected
                );
                Ok(report)
            }
        }
    }

    /// Close both channels.
    pub async fn close(&self) {
        self.ingest.close().await;
        self.search.close().await;
    }

    pub fn channel_states(&self) -> ChannelStates {
        self.tracker.states()
    }

    pub fn subscribe(&self) -> watch::Receiver<ChannelStates> {
        self.tracker.subscribe()
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    fn pushed_keys(&self) -> std::sync::MutexGuard<'_, HashSet<PushKey>> {
        match self.pushed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl SearchIndex for IndexChannelClient {
    fn connection_state(&self) -> NodeConnectionState {
        self.tracker.connection_state()
    }

    async fn push(&self, collection: &str, bucket: &str, object: &str, text: &str) -> Result<()> {
        if !self.connection_state().ingest_connected {
            return Err(SearchError::IngestUnavailable);
        }

        let key = (collection.to_string(), bucket.to_string(), object.to_string());
        let seen = self.pushed_keys().contains(&key);
        if seen {
            self.ingest
                .run(&IndexRequest::FlushObject {
                    collection: key.0.clone(),
                    bucket: key.1.clone(),
                    object: key.2.clone(),
                })
                .await?;
        }

        self.ingest
            .run(&IndexRequest::Push {
                collection: key.0.clone(),
                bucket: key.1.clone(),
                object: key.2.clone(),
                text: text.to_string(),
            })
            .await?;
        self.pushed_keys().insert(key);
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        bucket: &str,
        terms: &str,
        limit: u32,
        offset: u32,
    ) -> Result<Vec<String>> {
        if !self.connection_state().search_connected {
            return Err(SearchError::SearchUnavailable);
        }

        let reply = self
            .search
            .run(&IndexRequest::Query {
                collection: collection.to_string(),
                bucket: bucket.to_string(),
                terms: terms.to_string(),
                limit,
                offset,
            })
            .await?;
        match reply {
            IndexReply::Ids(ids) => Ok(ids),
            other => Err(SearchError::Protocol {
                command: "QUERY".to_string(),
                reason: format!("unexpected reply {:?}", other),
            }),
        }
    }

    async fn flush(&self, collection: &str) -> Result<u64> {
        if !self.connection_state().ingest_connected {
            return Err(SearchError::IngestUnavailable);
        }

        let reply = self
            .ingest
            .run(&IndexRequest::FlushCollection {
                collection: collection.to_string(),
            })
            .await?;
        self.pushed_keys().retain(|(c, _, _)| c != collection);
        match reply {
            IndexReply::Count(count) => Ok(count),
            _ => Ok(0),
        }
    }
}

fn spawn_establish(channel: &Arc<IndexChannel>) -> JoinHandle<Result<()>> {
    let channel = Arc::clone(channel);
    tokio::spawn(async move { channel.establish().await })
}

async fn join_channel(handle: JoinHandle<Result<()>>) -> Result<()> {
    handle
        .await
        .map_err(|e| SearchError::Other(format!("channel task failed: {}", e)))?
}

/// Resolves with the exit code once the engine has exited; never resolves
/// without an engine.
async fn engine_exit(engine: Option<watch::Receiver<EngineStatus>>) -> Option<i32> {
    let Some(mut engine) = engine else {
        return std::future::pending().await;
    };
    loop {
        if let EngineStatus::Exited { code, .. } = *engine.borrow_and_update() {
            return code;
        }
        if engine.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
