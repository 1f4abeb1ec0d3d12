//! Node bootstrap: store, index engine, channels, façade server.

use crate::server;
use anyhow::{Context, Result};
use catalog_search::{
    ChannelSettings, EngineLaunchConfig, EngineSupervisor, IndexChannelClient, NodeService,
    QueryMode, RecentErrorLog, SearchIndex, SqliteStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Everything needed to run one node.
#[derive(Debug, Clone)]
pub struct NodeOptions {
    pub node_id: String,
    pub db_path: PathBuf,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub channels: ChannelSettings,
    /// `None` when the engine is managed outside this process.
    pub engine: Option<EngineLaunchConfig>,
    pub query_mode: QueryMode,
    pub ingest_concurrency: usize,
}

/// Run a node until Ctrl-C.
pub async fn run_node(options: NodeOptions) -> Result<()> {
    let node_id = options.node_id.clone();
    info!(node_id = %node_id, "Starting search node");

    let store = SqliteStore::open(&options.db_path)
        .with_context(|| format!("opening document store {}", options.db_path.display()))?;
    let errors = Arc::new(RecentErrorLog::default());

    let supervisor = match options.engine {
        Some(launch) => {
            let ready_timeout = launch.ready_timeout;
            let supervisor = EngineSupervisor::spawn(launch, Arc::clone(&errors))?;
            if let Err(e) = supervisor.wait_ready(ready_timeout).await {
                supervisor.shutdown().await;
                return Err(e).context("index engine did not start");
            }
            Some(supervisor)
        }
        None => {
            info!(node_id = %node_id, "Using external index engine at {}", options.channels.address);
            None
        }
    };

    let client = Arc::new(IndexChannelClient::new(
        node_id.clone(),
        options.channels,
        Arc::clone(&errors),
    ));
    let report = match client
        .connect(supervisor.as_ref().map(EngineSupervisor::subscribe))
        .await
    {
        Ok(report) => report,
        Err(e) => {
            client.close().await;
            if let Some(supervisor) = &supervisor {
                supervisor.shutdown().await;
            }
            return Err(e).context("index channels did not connect");
        }
    };

    let node = Arc::new(
        NodeService::new(
            node_id.clone(),
            Arc::clone(&client) as Arc<dyn SearchIndex>,
            Arc::new(store),
            errors,
        )
        .with_query_mode(options.query_mode)
        .with_ingest_concurrency(options.ingest_concurrency),
    );

    let addr = server::start_server(Arc::clone(&node), &options.rpc_host, options.rpc_port).await?;
    info!(node_id = %node_id, "Node service running on {}", addr);

    if report.ingest_connected && report.search_connected {
        let node = Arc::clone(&node);
        tokio::spawn(async move {
            match node.reload_index().await {
                Ok(report) => info!(
                    node_id = %node.node_id(),
                    "Bulk reload finished: {} pushed, {} failed, {} skipped",
                    report.succeeded,
                    report.failed,
                    report.skipped
                ),
                Err(e) => error!(node_id = %node.node_id(), "Bulk reload failed: {}", e),
            }
        });
    } else {
        warn!(
            node_id = %node_id,
            "Skipping bulk reload; channels not fully connected (ingest: {}, search: {})",
            report.ingest_connected,
            report.search_connected
        );
    }

    tokio::signal::ctrl_c().await?;
    info!(node_id = %node_id, "Shutdown signal received");

    client.close().await;
    if let Some(supervisor) = supervisor {
        supervisor.shutdown().await;
    }
    info!(node_id = %node_id, "Search node stopped");
    Ok(())
}
