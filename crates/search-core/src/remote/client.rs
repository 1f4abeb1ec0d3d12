//! HTTP client for one node service endpoint.

use super::protocol::{RpcRequest, RpcResponse};
use crate::config::RemoteConfig;
use crate::{Result, SearchError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// JSON-RPC client bound to one node endpoint.
#[derive(Debug)]
pub struct NodeClient {
    http: reqwest::Client,
    rpc_url: Url,
    health_url: Url,
    request_timeout: Duration,
    next_id: AtomicU64,
}

/// Parse an endpoint; `host:port` without a scheme is taken as plain HTTP.
pub fn parse_endpoint(endpoint: &str) -> Result<Url> {
    let endpoint = endpoint.trim();
    let with_scheme = if endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{}", endpoint)
    };
    Url::parse(&with_scheme).map_err(|e| SearchError::Config {
        message: format!("invalid node endpoint '{}': {}", endpoint, e),
    })
}

impl NodeClient {
    pub fn new(endpoint: &str, connect_timeout: Duration, request_timeout: Duration) -> Result<Self> {
        let base = parse_endpoint(endpoint)?;
        let join = |path: &str| {
            base.join(path).map_err(|e| SearchError::Config {
                message: format!("invalid node endpoint '{}': {}", endpoint, e),
            })
        };

        let http = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            http,
            rpc_url: join("/rpc")?,
            health_url: join("/health")?,
            request_timeout,
            next_id: AtomicU64::new(1),
        })
    }

    /// Client with the default timeouts.
    pub fn with_defaults(endpoint: &str) -> Result<Self> {
        Self::new(
            endpoint,
            RemoteConfig::CONNECTION_TIMEOUT,
            RemoteConfig::REQUEST_TIMEOUT,
        )
    }

    pub fn endpoint(&self) -> &str {
        self.rpc_url.as_str()
    }

    /// Call a JSON-RPC method and return its result value.
    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = RpcRequest::new(method, params, id);
        debug!("RPC {} -> {}", method, self.rpc_url);

        let response = self
            .http
            .post(self.rpc_url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body: RpcResponse = response.json().await.map_err(|e| {
            if e.is_timeout() {
                return self.transport_error(e);
            }
            SearchError::Http {
                message: format!("invalid response from {} (HTTP {}): {}", self.rpc_url, status, e),
            }
        })?;

        if let Some(err) = body.error {
            return Err(SearchError::Remote {
                code: err.code,
                message: err.message,
            });
        }
        body.result
            .ok_or_else(|| SearchError::Other("RPC response missing result".to_string()))
    }

    /// Check `GET /health` once.
    pub async fn health(&self) -> Result<()> {
        let response = self
            .http
            .get(self.health_url.clone())
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(SearchError::Http {
                message: format!("health check returned HTTP {}", response.status()),
            })
        }
    }

    /// A timed-out request reports the configured request timeout.
    fn transport_error(&self, err: reqwest::Error) -> SearchError {
        if err.is_timeout() {
            SearchError::Timeout(self.request_timeout)
        } else {
            err.into()
        }
    }

    /// Poll the health endpoint until it answers or `timeout` elapses.
    pub async fn wait_for_ready(&self, timeout: Duration, poll_interval: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let last = match tokio::time::timeout_at(deadline, self.health()).await {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) => e,
                Err(_) => return Err(SearchError::Timeout(timeout)),
            };
            if tokio::time::Instant::now() + poll_interval >= deadline {
                return Err(last);
            }
            tokio::time::sleep(poll_interval).await;
        }
    }
}
