//! Search Node - search-index node for the product catalog.
//!
//! `serve` runs a node: it supervises the index engine, keeps the ingest and
//! search channels open, reloads the catalog into the index and serves the
//! node operations as JSON-RPC over HTTP. The remaining subcommands are
//! consumer-side tools that talk to a running node.

mod bench;
mod consumer;
mod handler;
mod seed;
mod server;
mod startup;

use anyhow::Result;
use catalog_search::config::{EngineConfig, IndexConfig, IngestConfig, ServerConfig};
use catalog_search::models::IngestRequest;
use catalog_search::{ChannelSettings, EngineLaunchConfig, QueryMode};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "search-node")]
#[command(about = "Search-index node for the product catalog")]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a search node
    Serve(ServeArgs),
    /// Fill the document store with random catalog items
    Seed {
        #[arg(long, env = "DB_PATH", default_value = "catalog.db")]
        db_path: PathBuf,
        #[arg(long, default_value = "10000")]
        count: usize,
        #[arg(long, default_value = "1000")]
        batch_size: usize,
    },
    /// Print a node's status
    Status(RemoteArgs),
    /// Search through a node
    Search {
        #[command(flatten)]
        remote: RemoteArgs,
        query: String,
        #[arg(long, default_value = "10")]
        limit: u32,
    },
    /// Ask a node to ingest a range of the catalog
    Ingest {
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long, default_value = "0")]
        start_index: u64,
        /// Number of documents; 0 = no limit
        #[arg(long, default_value = "1000000")]
        limit: u64,
        #[arg(long, default_value = "")]
        category: String,
    },
    /// Send many searches to a node and count failures
    Bench {
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long, default_value = "10000")]
        requests: usize,
        #[arg(long, default_value = "100")]
        concurrency: usize,
        /// Search terms to pick from
        #[arg(long, value_delimiter = ',')]
        terms: Vec<String>,
        #[arg(long, default_value = "10")]
        limit: u32,
    },
}

#[derive(Args, Debug)]
struct RemoteArgs {
    /// Node endpoint (host:port or URL)
    #[arg(long, env = "SEARCH_NODE_ENDPOINT", default_value = "127.0.0.1:50051")]
    endpoint: String,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Identifier attached to every log line of this node
    #[arg(long, env = "NODE_ID", default_value = "search-node-1")]
    node_id: String,

    /// SQLite document store
    #[arg(long, env = "DB_PATH", default_value = "catalog.db")]
    db_path: PathBuf,

    /// Host to bind the RPC server to
    #[arg(long, env = "RPC_HOST", default_value = ServerConfig::DEFAULT_HOST)]
    host: String,

    /// Port to listen on (0 = auto-assign)
    #[arg(short, long, env = "RPC_PORT", default_value_t = ServerConfig::DEFAULT_PORT)]
    port: u16,

    #[arg(long, env = "SONIC_HOST", default_value = IndexConfig::DEFAULT_HOST)]
    sonic_host: String,

    #[arg(long, env = "SONIC_PORT", default_value_t = IndexConfig::DEFAULT_PORT)]
    sonic_port: u16,

    #[arg(long, env = "SONIC_AUTH", default_value = IndexConfig::DEFAULT_PASSWORD, hide_env_values = true)]
    sonic_auth: String,

    /// Index engine binary
    #[arg(long, env = "SONIC_BINARY", default_value = EngineConfig::BINARY_PATH)]
    engine_binary: PathBuf,

    /// Index engine configuration file
    #[arg(long, env = "SONIC_CONFIG", default_value = EngineConfig::CONFIG_PATH)]
    engine_config: String,

    /// Seconds to wait for the engine's readiness line
    #[arg(long, default_value_t = EngineConfig::READY_TIMEOUT.as_secs())]
    engine_ready_timeout: u64,

    /// Connect to an already running engine instead of spawning one
    #[arg(long, env = "EXTERNAL_ENGINE")]
    external_engine: bool,

    /// per-term or phrase
    #[arg(long, env = "QUERY_MODE", default_value = "per-term")]
    query_mode: QueryMode,

    /// Documents pushed concurrently during ingestion
    #[arg(long, env = "INGEST_CONCURRENCY", default_value_t = IngestConfig::DEFAULT_CONCURRENCY)]
    ingest_concurrency: usize,
}

impl ServeArgs {
    fn into_options(self) -> startup::NodeOptions {
        let engine = (!self.external_engine).then(|| {
            EngineLaunchConfig::new(self.node_id.clone())
                .with_binary(self.engine_binary)
                .with_config_path(self.engine_config)
                .with_ready_timeout(Duration::from_secs(self.engine_ready_timeout))
        });
        startup::NodeOptions {
            node_id: self.node_id,
            db_path: self.db_path,
            rpc_host: self.host,
            rpc_port: self.port,
            channels: ChannelSettings::new(&self.sonic_host, self.sonic_port)
                .with_password(self.sonic_auth),
            engine,
            query_mode: self.query_mode,
            ingest_concurrency: self.ingest_concurrency,
        }
    }
}

fn init_logging(debug: bool, json: bool) {
    let log_level = if debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false);
    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.debug, cli.log_json);

    match cli.command {
        Command::Serve(args) => startup::run_node(args.into_options()).await,
        Command::Seed {
            db_path,
            count,
            batch_size,
        } => {
            let written = seed::seed_store(&db_path, count, batch_size).await?;
            info!("Wrote {} items to {}", written, db_path.display());
            Ok(())
        }
        Command::Status(remote) => {
            let manager = consumer::connect(&remote.endpoint)?;
            consumer::status(&manager).await
        }
        Command::Search {
            remote,
            query,
            limit,
        } => {
            let manager = consumer::connect(&remote.endpoint)?;
            consumer::search(&manager, &query, limit).await
        }
        Command::Ingest {
            remote,
            start_index,
            limit,
            category,
        } => {
            let manager = consumer::connect(&remote.endpoint)?;
            let request = IngestRequest {
                start_index,
                limit,
                category_filter: category,
            };
            consumer::ingest(&manager, request).await
        }
        Command::Bench {
            remote,
            requests,
            concurrency,
            terms,
            limit,
        } => {
            let terms = if terms.is_empty() {
                bench::DEFAULT_TERMS.iter().map(|t| t.to_string()).collect()
            } else {
                terms
            };
            let manager = consumer::connect(&remote.endpoint)?;
            info!(
                "Starting load test: {} requests to {} (concurrency {})",
                requests,
                manager.endpoint(),
                concurrency
            );
            let report = bench::run_bench(&manager, &terms, requests, concurrency, limit).await;
            println!("Total Requests: {}", report.total);
            println!("Successful Requests: {}", report.succeeded);
            println!("Failed Requests: {}", report.failed);
            println!("Elapsed: {:.2?}", report.elapsed);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_serve_defaults() {
        let cli = Cli::try_parse_from(["search-node", "serve", "--external-engine"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let options = args.into_options();
        assert!(options.engine.is_none());
        assert_eq!(options.query_mode, QueryMode::PerTerm);
        assert_eq!(options.ingest_concurrency, 1);
    }

    #[test]
    fn test_cli_rejects_unknown_query_mode() {
        let result = Cli::try_parse_from(["search-node", "serve", "--query-mode", "fuzzy"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_parses_bench_terms() {
        let cli = Cli::try_parse_from([
            "search-node",
            "bench",
            "--terms",
            "lamp,sofa",
            "--requests",
            "5",
        ])
        .unwrap();
        let Command::Bench {
            terms, requests, ..
        } = cli.command
        else {
            panic!("expected bench");
        };
        assert_eq!(terms, vec!["lamp", "sofa"]);
        assert_eq!(requests, 5);
    }
}
