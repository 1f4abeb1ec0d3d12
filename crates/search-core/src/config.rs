//! Centralized configuration for the catalog search node.
//!
//! Constants here are the defaults used when no runtime override is given.
//! Runtime overrides are carried by the builder-style settings structs of
//! each module (`EngineLaunchConfig`, `ChannelSettings`, `RemoteSettings`).

use std::time::Duration;

/// Index engine process configuration.
pub struct EngineConfig;

impl EngineConfig {
    pub const BINARY_PATH: &'static str = "/app/sonic/sonic";
    pub const CONFIG_PATH: &'static str = "/etc/sonic.cfg";
    /// Line the engine prints on stdout once it accepts channel connections.
    pub const READY_MARKER: &'static str = "(INFO) - listening on tcp://0.0.0.0:1491";
    pub const READY_TIMEOUT: Duration = Duration::from_secs(30);
    pub const STOP_TIMEOUT: Duration = Duration::from_secs(2);
    /// Maximum characters of a stderr chunk kept in the error log.
    pub const STDERR_PREFIX_CHARS: usize = 200;
}

/// Index channel configuration.
pub struct IndexConfig;

impl IndexConfig {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 1491;
    pub const DEFAULT_PASSWORD: &'static str = "SecretPassword";
    pub const COLLECTION: &'static str = "items";
    pub const SEARCH_BUCKET: &'static str = "search";
    /// Wall-clock ceiling for both channels to report connected.
    pub const CONNECT_CEILING: Duration = Duration::from_secs(10);
    pub const CONNECT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(2);
    pub const CONNECT_ATTEMPTS: u32 = 5;
    pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);
    /// Buffer size assumed until the engine announces its own.
    pub const DEFAULT_BUFFER_BYTES: usize = 20_000;
}

/// Ingestion and query configuration.
pub struct IngestConfig;

impl IngestConfig {
    pub const DEFAULT_CONCURRENCY: usize = 1;
    pub const MAX_CONCURRENCY: usize = 16;
    pub const PER_TERM_LIMIT: u32 = 10;
    pub const DEFAULT_RESULT_LIMIT: usize = 10;
}

/// Status reporting configuration.
pub struct StatusConfig;

impl StatusConfig {
    pub const RECENT_ERRORS: usize = 5;
    pub const ERROR_LOG_CAPACITY: usize = 100;
}

/// Consumer-side connection configuration.
pub struct RemoteConfig;

impl RemoteConfig {
    pub const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(5_000);
    pub const MAX_RETRY_DELAY: Duration = Duration::from_millis(60_000);
    pub const BACKOFF_MULTIPLIER: f64 = 1.5;
    pub const MAX_RETRIES: u32 = 20;
    pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);
    pub const READY_WAIT: Duration = Duration::from_secs(3);
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
    pub const HEALTH_POLL_INTERVAL: Duration = Duration::from_millis(200);
}

/// Node service (façade) server configuration.
pub struct ServerConfig;

impl ServerConfig {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";
    pub const DEFAULT_PORT: u16 = 50051;
    pub const MAX_CONCURRENT_REQUESTS: usize = 1024;
}
