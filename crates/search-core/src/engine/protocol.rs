//! Index engine channel protocol.
//!
//! The engine speaks a line-oriented protocol over TCP, one command and one
//! reply per `\n`-terminated line:
//!
//! ```text
//! <- CONNECTED <sonic-server v1.4.9>
//! -> START search SecretPassword
//! <- STARTED search protocol(1) buffer(20000)
//! -> QUERY items search "chair" LIMIT(10) OFFSET(0)
//! <- PENDING Bt2m2gYa
//! <- EVENT QUERY Bt2m2gYa 6650a1 6650a2
//! -> PUSH items search 6650a1 "red chair"
//! <- OK
//! -> FLUSHC items
//! <- RESULT 2
//! ```
//!
//! Any command may instead be answered with `ERR <reason>`.

use crate::config::IndexConfig;
use crate::{Result, SearchError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Bytes reserved in each command for everything but the pushed text.
const COMMAND_OVERHEAD_BYTES: usize = 512;

/// Channel mode negotiated with `START`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelMode {
    Ingest,
    Search,
}

impl ChannelMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelMode::Ingest => "ingest",
            ChannelMode::Search => "search",
        }
    }
}

impl std::fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A request sent over an established channel.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexRequest {
    Push {
        collection: String,
        bucket: String,
        object: String,
        text: String,
    },
    Query {
        collection: String,
        bucket: String,
        terms: String,
        limit: u32,
        offset: u32,
    },
    FlushCollection {
        collection: String,
    },
    FlushObject {
        collection: String,
        bucket: String,
        object: String,
    },
}

impl IndexRequest {
    /// Command keyword, for logging and error messages.
    pub fn keyword(&self) -> &'static str {
        match self {
            IndexRequest::Push { .. } => "PUSH",
            IndexRequest::Query { .. } => "QUERY",
            IndexRequest::FlushCollection { .. } => "FLUSHC",
            IndexRequest::FlushObject { .. } => "FLUSHO",
        }
    }
}

/// Outcome of a successful request.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexReply {
    Done,
    Ids(Vec<String>),
    Count(u64),
}

/// One parsed reply line.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Connected(String),
    Started { buffer_size: Option<usize> },
    Ok,
    Pending(String),
    Event {
        kind: String,
        marker: String,
        items: Vec<String>,
    },
    Result(u64),
    Ended(String),
    Err(String),
}

/// Parse a single reply line.
pub fn parse_reply(line: &str) -> Result<Reply> {
    let line = line.trim_end_matches(['\r', '\n']);
    let (keyword, rest) = match line.split_once(' ') {
        Some((k, r)) => (k, r.trim()),
        None => (line, ""),
    };

    let reply = match keyword {
        "CONNECTED" => Reply::Connected(rest.to_string()),
        "STARTED" => Reply::Started {
            buffer_size: parse_buffer_size(rest),
        },
        "OK" => Reply::Ok,
        "PENDING" => Reply::Pending(rest.to_string()),
        "EVENT" => {
            let mut parts = rest.split_whitespace();
            let kind = parts.next().unwrap_or_default().to_string();
            let marker = parts.next().unwrap_or_default().to_string();
            Reply::Event {
                kind,
                marker,
                items: parts.map(String::from).collect(),
            }
        }
        "RESULT" => Reply::Result(rest.parse().map_err(|_| malformed(line))?),
        "ENDED" => Reply::Ended(rest.to_string()),
        "ERR" => Reply::Err(rest.to_string()),
        _ => return Err(malformed(line)),
    };
    Ok(reply)
}

fn parse_buffer_size(started: &str) -> Option<usize> {
    started
        .split_whitespace()
        .find_map(|part| part.strip_prefix("buffer("))
        .and_then(|v| v.strip_suffix(')'))
        .and_then(|v| v.parse().ok())
}

fn malformed(line: &str) -> SearchError {
    SearchError::Protocol {
        command: "reply".to_string(),
        reason: format!("unexpected line from engine: {:?}", line),
    }
}

/// Escape text for a quoted protocol argument.
pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => escaped.push_str("\\\\"),
            '"' => escaped.push_str("\\\""),
            '\n' => escaped.push_str("\\n"),
            '\r' => {}
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Split `text` into chunks of at most `max_bytes` bytes.
///
/// Prefers to break on whitespace; a single word longer than `max_bytes` is
/// split on a character boundary.
pub fn split_text(text: &str, max_bytes: usize) -> Vec<&str> {
    let max_bytes = max_bytes.max(4);
    let mut chunks = Vec::new();
    let mut rest = text.trim();

    while rest.len() > max_bytes {
        let mut cut = max_bytes;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        let split_at = match rest[..cut].rfind(char::is_whitespace) {
            Some(ws) if ws > 0 => ws,
            _ => cut,
        };
        chunks.push(rest[..split_at].trim_end());
        rest = rest[split_at..].trim_start();
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Encode a request into one or more command lines (without terminator).
pub fn encode_request(request: &IndexRequest, buffer_size: usize) -> Vec<String> {
    match request {
        IndexRequest::Push {
            collection,
            bucket,
            object,
            text,
        } => {
            let max_text = buffer_size.saturating_sub(COMMAND_OVERHEAD_BYTES) / 2;
            split_text(text, max_text)
                .into_iter()
                .map(|chunk| {
                    format!(
                        "PUSH {} {} {} \"{}\"",
                        collection,
                        bucket,
                        object,
                        escape_text(chunk)
                    )
                })
                .collect()
        }
        IndexRequest::Query {
            collection,
            bucket,
            terms,
            limit,
            offset,
        } => vec![format!(
            "QUERY {} {} \"{}\" LIMIT({}) OFFSET({})",
            collection,
            bucket,
            escape_text(terms),
            limit,
            offset
        )],
        IndexRequest::FlushCollection { collection } => vec![format!("FLUSHC {}", collection)],
        IndexRequest::FlushObject {
            collection,
            bucket,
            object,
        } => vec![format!("FLUSHO {} {} {}", collection, bucket, object)],
    }
}

/// An established, authenticated channel connection.
#[derive(Debug)]
pub struct EngineConnection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    writer: OwnedWriteHalf,
    mode: ChannelMode,
    buffer_size: usize,
}

impl EngineConnection {
    /// Connect to `address` and start a channel in `mode`.
    pub async fn open(
        address: &str,
        mode: ChannelMode,
        password: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(address))
            .await
            .map_err(|_| SearchError::Timeout(timeout))??;
        stream.set_nodelay(true).ok();

        let (reader, writer) = stream.into_split();
        let mut conn = Self {
            lines: BufReader::new(reader).lines(),
            writer,
            mode,
            buffer_size: IndexConfig::DEFAULT_BUFFER_BYTES,
        };

        tokio::time::timeout(timeout, conn.handshake(password))
            .await
            .map_err(|_| SearchError::Timeout(timeout))??;

        debug!("{} channel started against {}", mode, address);
        Ok(conn)
    }

    async fn handshake(&mut self, password: &str) -> Result<()> {
        match self.read_reply().await? {
            Reply::Connected(_) => {}
            other => return Err(unexpected("CONNECTED", &other)),
        }

        self.write_line(&format!("START {} {}", self.mode, password))
            .await?;
        match self.read_reply().await? {
            Reply::Started { buffer_size } => {
                if let Some(size) = buffer_size {
                    self.buffer_size = size;
                }
                Ok(())
            }
            Reply::Err(reason) => Err(SearchError::Protocol {
                command: "START".to_string(),
                reason,
            }),
            other => Err(unexpected("STARTED", &other)),
        }
    }

    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Buffer size announced by the engine.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Execute one request and wait for its final reply.
    pub async fn execute(&mut self, request: &IndexRequest) -> Result<IndexReply> {
        match request {
            IndexRequest::Push { .. } => {
                for line in encode_request(request, self.buffer_size) {
                    self.write_line(&line).await?;
                    self.expect_ok(request).await?;
                }
                Ok(IndexReply::Done)
            }
            IndexRequest::Query { .. } => {
                self.send(request).await?;
                let marker = match self.read_reply().await? {
                    Reply::Pending(marker) => marker,
                    Reply::Err(reason) => return Err(rejected(request, reason)),
                    other => return Err(unexpected("PENDING", &other)),
                };
                loop {
                    match self.read_reply().await? {
                        Reply::Event {
                            marker: event_marker,
                            items,
                            ..
                        } if event_marker == marker => return Ok(IndexReply::Ids(items)),
                        Reply::Event { marker: stale, .. } => {
                            debug!("Ignoring event for stale query marker {}", stale);
                        }
                        Reply::Err(reason) => return Err(rejected(request, reason)),
                        other => return Err(unexpected("EVENT", &other)),
                    }
                }
            }
            IndexRequest::FlushCollection { .. } | IndexRequest::FlushObject { .. } => {
                self.send(request).await?;
                match self.read_reply().await? {
                    Reply::Result(count) => Ok(IndexReply::Count(count)),
                    Reply::Err(reason) => Err(rejected(request, reason)),
                    other => Err(unexpected("RESULT", &other)),
                }
            }
        }
    }

    /// Politely end the channel.
    pub async fn quit(mut self) -> Result<()> {
        self.write_line("QUIT").await?;
        let _ = self.read_reply().await;
        Ok(())
    }

    async fn send(&mut self, request: &IndexRequest) -> Result<()> {
        for line in encode_request(request, self.buffer_size) {
            self.write_line(&line).await?;
        }
        Ok(())
    }

    async fn expect_ok(&mut self, request: &IndexRequest) -> Result<()> {
        match self.read_reply().await? {
            Reply::Ok => Ok(()),
            Reply::Err(reason) => Err(rejected(request, reason)),
            other => Err(unexpected("OK", &other)),
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<Reply> {
        match self.lines.next_line().await? {
            Some(line) => {
                let reply = parse_reply(&line)?;
                if let Reply::Ended(reason) = &reply {
                    return Err(SearchError::Transport {
                        message: format!("engine ended the {} channel: {}", self.mode, reason),
                        source: None,
                    });
                }
                Ok(reply)
            }
            None => Err(SearchError::Transport {
                message: format!("engine closed the {} channel", self.mode),
                source: None,
            }),
        }
    }
}

fn rejected(request: &IndexRequest, reason: String) -> SearchError {
    SearchError::Protocol {
        command: request.keyword().to_string(),
        reason,
    }
}

fn unexpected(expected: &str, got: &Reply) -> SearchError {
    SearchError::Protocol {
        command: expected.to_string(),
        reason: format!("unexpected reply {:?}", got),
    }
}
