//! In-process fake index engine speaking the channel line protocol.
//!
//! Like the real engine, PUSH appends to an object's text instead of
//! replacing it.

#![allow(dead_code)]

use catalog_search::{ChannelSettings, RetryConfig};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::AbortHandle;

pub const PASSWORD: &str = "SecretPassword";

#[derive(Debug, Clone)]
struct Entry {
    collection: String,
    bucket: String,
    object: String,
    words: Vec<String>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: Vec<Entry>,
    failing: HashSet<String>,
    commands: Vec<String>,
    query_delay: Duration,
    stall_search_start: bool,
    next_marker: u64,
}

/// Handle to a running fake engine.
pub struct FakeEngine {
    addr: SocketAddr,
    inner: Arc<Mutex<Inner>>,
    tasks: Arc<Mutex<Vec<AbortHandle>>>,
}

impl FakeEngine {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let inner = Arc::new(Mutex::new(Inner::default()));
        let tasks = Arc::new(Mutex::new(Vec::new()));

        let accept = {
            let inner = Arc::clone(&inner);
            let tasks = Arc::clone(&tasks);
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let conn = tokio::spawn(serve(stream, Arc::clone(&inner)));
                    tasks.lock().unwrap().push(conn.abort_handle());
                }
            })
        };
        tasks.lock().unwrap().push(accept.abort_handle());

        Self { addr, inner, tasks }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Channel settings with short timeouts for tests.
    pub fn settings(&self) -> ChannelSettings {
        ChannelSettings::new("127.0.0.1", self.port())
            .with_password(PASSWORD)
            .with_connect_timeout(Duration::from_millis(500))
            .with_operation_timeout(Duration::from_secs(2))
            .with_reconnect(fast_retry(3))
    }

    /// Stop listening and drop every open connection.
    pub fn shutdown(&self) {
        for task in self.tasks.lock().unwrap().drain(..) {
            task.abort();
        }
    }

    /// Entry left over from an earlier process.
    pub fn seed(&self, collection: &str, bucket: &str, object: &str, text: &str) {
        self.inner.lock().unwrap().entries.push(Entry {
            collection: collection.into(),
            bucket: bucket.into(),
            object: object.into(),
            words: words(text),
        });
    }

    pub fn fail_push_for(&self, object: &str) {
        self.inner.lock().unwrap().failing.insert(object.into());
    }

    pub fn set_query_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().query_delay = delay;
    }

    /// Never answer `START search`.
    pub fn stall_search_start(&self) {
        self.inner.lock().unwrap().stall_search_start = true;
    }

    /// Answer search handshakes again. Connections already stalled stay stalled.
    pub fn resume_search_start(&self) {
        self.inner.lock().unwrap().stall_search_start = false;
    }

    /// Command keywords received so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.inner.lock().unwrap().commands.clone()
    }

    /// Words currently indexed for an object.
    pub fn text_of(&self, object: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .entries
            .iter()
            .filter(|e| e.object == object)
            .flat_map(|e| e.words.clone())
            .collect()
    }
}

impl Drop for FakeEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryConfig {
    RetryConfig::new()
        .with_base_delay(Duration::from_millis(20))
        .with_max_delay(Duration::from_millis(50))
        .with_max_attempts(max_attempts)
}

fn words(text: &str) -> Vec<String> {
    text.split_whitespace().map(str::to_lowercase).collect()
}

fn unquote(arg: &str) -> String {
    let arg = arg.trim();
    let inner = arg
        .strip_prefix('"')
        .and_then(|a| a.strip_suffix('"'))
        .unwrap_or(arg);
    let mut out = String::new();
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('n') => out.push('\n'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

async fn serve(stream: TcpStream, inner: Arc<Mutex<Inner>>) {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();
    let _ = writer.write_all(b"CONNECTED <fake-engine v1.0>\r\n").await;

    while let Ok(Some(line)) = lines.next_line().await {
        let (keyword, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        inner.lock().unwrap().commands.push(keyword.to_string());

        let replies: Vec<String> = match keyword {
            "START" => {
                let mut parts = rest.split_whitespace();
                let mode = parts.next().unwrap_or_default().to_string();
                let password = parts.next().unwrap_or_default();
                let stall = mode == "search" && inner.lock().unwrap().stall_search_start;
                if stall {
                    std::future::pending::<()>().await;
                }
                if password == PASSWORD {
                    vec![format!("STARTED {} protocol(1) buffer(20000)", mode)]
                } else {
                    vec!["ENDED authentication_failed".to_string()]
                }
            }
            "PUSH" => handle_push(&inner, rest),
            "QUERY" => {
                let delay = inner.lock().unwrap().query_delay;
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                handle_query(&inner, rest)
            }
            "FLUSHC" => {
                let collection = rest.trim();
                let mut state = inner.lock().unwrap();
                let before = state.entries.len();
                state.entries.retain(|e| e.collection != collection);
                vec![format!("RESULT {}", before - state.entries.len())]
            }
            "FLUSHO" => {
                let parts: Vec<&str> = rest.split_whitespace().collect();
                let mut state = inner.lock().unwrap();
                let before = state.entries.len();
                state.entries.retain(|e| {
                    !(e.collection == parts[0] && e.bucket == parts[1] && e.object == parts[2])
                });
                vec![format!("RESULT {}", before - state.entries.len())]
            }
            "QUIT" => {
                let _ = writer.write_all(b"ENDED quit\r\n").await;
                return;
            }
            _ => vec!["ERR unknown_command".to_string()],
        };

        for reply in replies {
            if writer.write_all(format!("{}\r\n", reply).as_bytes()).await.is_err() {
                return;
            }
        }
    }
}

fn handle_push(inner: &Arc<Mutex<Inner>>, rest: &str) -> Vec<String> {
    let Some(quote) = rest.find('"') else {
        return vec!["ERR invalid_format(PUSH <collection> <bucket> <object> \"<text>\")".into()];
    };
    let parts: Vec<&str> = rest[..quote].split_whitespace().collect();
    if parts.len() != 3 {
        return vec!["ERR invalid_format(PUSH <collection> <bucket> <object> \"<text>\")".into()];
    }
    let text = unquote(&rest[quote..]);

    let mut state = inner.lock().unwrap();
    if state.failing.contains(parts[2]) {
        return vec!["ERR internal_error".into()];
    }
    state.entries.push(Entry {
        collection: parts[0].into(),
        bucket: parts[1].into(),
        object: parts[2].into(),
        words: words(&text),
    });
    vec!["OK".into()]
}

fn handle_query(inner: &Arc<Mutex<Inner>>, rest: &str) -> Vec<String> {
    let (Some(open), Some(close)) = (rest.find('"'), rest.rfind('"')) else {
        return vec!["ERR invalid_format".into()];
    };
    let parts: Vec<&str> = rest[..open].split_whitespace().collect();
    let terms = words(&unquote(&rest[open..=close]));
    let limit: usize = rest[close + 1..]
        .split_whitespace()
        .find_map(|p| p.strip_prefix("LIMIT(")?.strip_suffix(')')?.parse().ok())
        .unwrap_or(10);

    let mut state = inner.lock().unwrap();
    state.next_marker += 1;
    let marker = format!("m{}", state.next_marker);

    let mut ids: Vec<String> = Vec::new();
    for entry in &state.entries {
        if entry.collection != parts[0] || entry.bucket != parts[1] {
            continue;
        }
        // Words of all entries of the object count together.
        let object_words: Vec<&String> = state
            .entries
            .iter()
            .filter(|e| {
                e.object == entry.object
                    && e.collection == entry.collection
                    && e.bucket == entry.bucket
            })
            .flat_map(|e| e.words.iter())
            .collect();
        if terms.iter().all(|t| object_words.contains(&t)) && !ids.contains(&entry.object) {
            ids.push(entry.object.clone());
        }
    }
    ids.truncate(limit);

    vec![
        format!("PENDING {}", marker),
        format!("EVENT QUERY {} {}", marker, ids.join(" ")).trim_end().to_string(),
    ]
}
