//! Index engine process supervision.
//!
//! Spawns the engine binary, watches its stdout for the readiness line and
//! reports exits. Readiness is signaled once; an exit before readiness is a
//! startup failure, an exit afterwards is logged and recorded only. The
//! engine is never restarted automatically.

use crate::config::EngineConfig;
use crate::error_log::{truncate_chars, RecentErrorLog};
use crate::{Result, SearchError};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Configuration for launching the index engine.
#[derive(Debug, Clone)]
pub struct EngineLaunchConfig {
    /// Path to the engine binary.
    pub binary_path: PathBuf,
    /// Arguments passed to the binary.
    pub args: Vec<String>,
    /// Stdout text announcing readiness.
    pub ready_marker: String,
    /// Node id attached to every log line.
    pub node_id: String,
    /// How long to wait for the readiness line.
    pub ready_timeout: Duration,
    /// How long to wait after SIGTERM before killing.
    pub stop_timeout: Duration,
}

impl Default for EngineLaunchConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from(EngineConfig::BINARY_PATH),
            args: vec!["-c".to_string(), EngineConfig::CONFIG_PATH.to_string()],
            ready_marker: EngineConfig::READY_MARKER.to_string(),
            node_id: String::new(),
            ready_timeout: EngineConfig::READY_TIMEOUT,
            stop_timeout: EngineConfig::STOP_TIMEOUT,
        }
    }
}

impl EngineLaunchConfig {
    pub fn new(node_id: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            ..Self::default()
        }
    }

    /// Set the binary path.
    pub fn with_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.binary_path = path.into();
        self
    }

    /// Use `-c <path>` as the engine configuration.
    pub fn with_config_path(mut self, path: impl Into<String>) -> Self {
        self.args = vec!["-c".to_string(), path.into()];
        self
    }

    /// Replace the argument list.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Set the readiness line.
    pub fn with_ready_marker(mut self, marker: impl Into<String>) -> Self {
        self.ready_marker = marker.into();
        self
    }

    /// Set the ready timeout.
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Set the stop timeout.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }
}

/// Observed engine process status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Starting,
    Ready,
    Exited {
        code: Option<i32>,
        before_ready: bool,
    },
}

impl EngineStatus {
    pub fn is_exited(&self) -> bool {
        matches!(self, EngineStatus::Exited { .. })
    }
}

/// Handle to a running engine process.
pub struct EngineSupervisor {
    config: EngineLaunchConfig,
    pid: Option<u32>,
    status: watch::Receiver<EngineStatus>,
    stop: Mutex<Option<oneshot::Sender<()>>>,
    waiter: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for EngineSupervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineSupervisor")
            .field("binary", &self.config.binary_path)
            .field("pid", &self.pid)
            .field("status", &*self.status.borrow())
            .finish()
    }
}

impl EngineSupervisor {
    /// Spawn the engine process and start watching it.
    pub fn spawn(config: EngineLaunchConfig, errors: Arc<RecentErrorLog>) -> Result<Self> {
        info!(
            node_id = %config.node_id,
            "Starting index engine: {} {}",
            config.binary_path.display(),
            config.args.join(" ")
        );

        let mut child = Command::new(&config.binary_path)
            .args(&config.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                SearchError::startup(format!(
                    "failed to spawn index engine {}: {}",
                    config.binary_path.display(),
                    e
                ))
            })?;

        let pid = child.id();
        info!(node_id = %config.node_id, "Index engine started with PID {:?}", pid);

        let (status_tx, status_rx) = watch::channel(EngineStatus::Starting);
        let status_tx = Arc::new(status_tx);

        if let Some(stdout) = child.stdout.take() {
            let status_tx = Arc::clone(&status_tx);
            let marker = config.ready_marker.clone();
            let node_id = config.node_id.clone();
            tokio::spawn(drain_lines(stdout, move |line| {
                debug!(node_id = %node_id, "engine: {}", line);
                if line.contains(&marker) {
                    let signaled = status_tx.send_if_modified(|status| {
                        if *status == EngineStatus::Starting {
                            *status = EngineStatus::Ready;
                            true
                        } else {
                            false
                        }
                    });
                    if signaled {
                        info!(node_id = %node_id, "Index engine is ready");
                    }
                }
            }));
        }

        if let Some(stderr) = child.stderr.take() {
            let errors = Arc::clone(&errors);
            let node_id = config.node_id.clone();
            tokio::spawn(drain_lines(stderr, move |line| {
                if line.trim().is_empty() {
                    return;
                }
                let prefix = truncate_chars(&line, EngineConfig::STDERR_PREFIX_CHARS);
                warn!(node_id = %node_id, "engine stderr: {}", prefix);
                errors.record(format!("Index engine stderr ({}): {}", node_id, prefix));
            }));
        }

        let (stop_tx, stop_rx) = oneshot::channel();
        let waiter = tokio::spawn(watch_process(
            child,
            stop_rx,
            Arc::clone(&status_tx),
            errors,
            config.node_id.clone(),
            config.stop_timeout,
        ));

        Ok(Self {
            config,
            pid,
            status: status_rx,
            stop: Mutex::new(Some(stop_tx)),
            waiter: Mutex::new(Some(waiter)),
        })
    }

    /// Wait until the engine announces readiness.
    ///
    /// Fails if the engine exits first or the timeout elapses.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<()> {
        let mut status = self.status.clone();
        let wait = async {
            loop {
                match *status.borrow_and_update() {
                    EngineStatus::Ready => return Ok(()),
                    EngineStatus::Exited { code, .. } => {
                        return Err(SearchError::startup(format!(
                            "index engine exited with code {:?} before becoming ready",
                            code
                        )))
                    }
                    EngineStatus::Starting => {}
                }
                if status.changed().await.is_err() {
                    return Err(SearchError::startup(
                        "index engine supervisor stopped before readiness",
                    ));
                }
            }
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            SearchError::startup(format!(
                "index engine did not become ready within {:?}",
                timeout
            ))
        })?
    }

    /// Current engine status.
    pub fn status(&self) -> EngineStatus {
        *self.status.borrow()
    }

    /// Subscribe to status changes.
    pub fn subscribe(&self) -> watch::Receiver<EngineStatus> {
        self.status.clone()
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub fn config(&self) -> &EngineLaunchConfig {
        &self.config
    }

    /// Stop the engine: SIGTERM, then kill after the stop timeout.
    pub async fn shutdown(&self) {
        let stop = self.stop.lock().ok().and_then(|mut s| s.take());
        if let Some(stop) = stop {
            let _ = stop.send(());
        }
        let waiter = self.waiter.lock().ok().and_then(|mut w| w.take());
        if let Some(waiter) = waiter {
            let _ = waiter.await;
        }
    }
}

/// Read `reader` line by line until EOF.
///
/// Invalid UTF-8 is replaced rather than ending the read, so the pipe keeps
/// draining for the lifetime of the process.
async fn drain_lines<R, F>(reader: R, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(String),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match read_line_lossy(&mut reader, &mut buf).await {
            Ok(Some(line)) => on_line(line),
            Ok(None) => break,
            Err(e) => {
                debug!("Engine output stream closed: {}", e);
                break;
            }
        }
    }
}

async fn read_line_lossy<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    buf: &mut Vec<u8>,
) -> std::io::Result<Option<String>> {
    if reader.read_until(b'\n', buf).await? == 0 {
        return Ok(None);
    }
    let line = String::from_utf8_lossy(&buf[..]);
    Ok(Some(line.trim_end_matches(['\n', '\r']).to_string()))
}

async fn watch_process(
    mut child: Child,
    stop: oneshot::Receiver<()>,
    status: Arc<watch::Sender<EngineStatus>>,
    errors: Arc<RecentErrorLog>,
    node_id: String,
    stop_timeout: Duration,
) {
    let exit = tokio::select! {
        exit = child.wait() => exit,
        _ = stop => {
            info!(node_id = %node_id, "Stopping index engine");
            terminate(&mut child, stop_timeout).await
        }
    };

    let code = match &exit {
        Ok(exit) => exit.code(),
        Err(e) => {
            warn!(node_id = %node_id, "Failed to wait for index engine: {}", e);
            None
        }
    };

    let before_ready = *status.borrow() != EngineStatus::Ready;
    if before_ready {
        error!(
            node_id = %node_id,
            "Index engine exited with code {:?} before becoming ready", code
        );
        errors.record(format!(
            "Index engine ({}) exited with code {:?} before becoming ready",
            node_id, code
        ));
    } else {
        error!(node_id = %node_id, "Index engine exited with code {:?}", code);
        errors.record(format!(
            "Index engine ({}) exited with code {:?}",
            node_id, code
        ));
    }

    status.send_replace(EngineStatus::Exited { code, before_ready });
}

#[cfg(unix)]
async fn terminate(
    child: &mut Child,
    stop_timeout: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        debug!("Sending SIGTERM to index engine {}", pid);
        if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            if e != nix::errno::Errno::ESRCH {
                warn!("Failed to send SIGTERM to {}: {}", pid, e);
            }
        }
        if let Ok(exit) = tokio::time::timeout(stop_timeout, child.wait()).await {
            return exit;
        }
        debug!("Index engine {} still running, killing", pid);
    }
    child.kill().await?;
    child.wait().await
}

#[cfg(not(unix))]
async fn terminate(
    child: &mut Child,
    _stop_timeout: Duration,
) -> std::io::Result<std::process::ExitStatus> {
    child.kill().await?;
    child.wait().await
}
