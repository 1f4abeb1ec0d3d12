//! In-memory `SearchIndex` for unit tests.

use crate::engine::{NodeConnectionState, SearchIndex};
use crate::{Result, SearchError};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
struct Entry {
    collection: String,
    bucket: String,
    object: String,
    text: String,
}

/// Word-match index with upsert semantics and scriptable failures.
#[derive(Debug, Default)]
pub struct MockIndex {
    state: Mutex<NodeConnectionState>,
    entries: Mutex<Vec<Entry>>,
    failing: Mutex<HashSet<String>>,
    pushed: Mutex<Vec<String>>,
    push_attempts: AtomicUsize,
    queries: AtomicUsize,
    flushes: AtomicUsize,
}

impl MockIndex {
    pub fn connected() -> Self {
        let index = Self::default();
        index.set_state(true, true);
        index
    }

    pub fn disconnected() -> Self {
        Self::default()
    }

    pub fn set_state(&self, ingest_connected: bool, search_connected: bool) {
        *self.state.lock().unwrap() = NodeConnectionState {
            ingest_connected,
            search_connected,
        };
    }

    /// Make every push of `object` fail.
    pub fn fail_push_for(&self, object: &str) {
        self.failing.lock().unwrap().insert(object.to_string());
    }

    /// Insert an entry without counting it as a push.
    pub fn seed(&self, collection: &str, bucket: &str, object: &str, text: &str) {
        self.entries.lock().unwrap().push(Entry {
            collection: collection.into(),
            bucket: bucket.into(),
            object: object.into(),
            text: text.into(),
        });
    }

    pub fn push_attempts(&self) -> usize {
        self.push_attempts.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }

    pub fn flushes(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    /// Objects successfully pushed, in push order.
    pub fn pushed_objects(&self) -> Vec<String> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SearchIndex for MockIndex {
    fn connection_state(&self) -> NodeConnectionState {
        *self.state.lock().unwrap()
    }

    async fn push(&self, collection: &str, bucket: &str, object: &str, text: &str) -> Result<()> {
        if !self.connection_state().ingest_connected {
            return Err(SearchError::IngestUnavailable);
        }
        self.push_attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(object) {
            return Err(SearchError::Protocol {
                command: "PUSH".into(),
                reason: "scripted failure".into(),
            });
        }

        let mut entries = self.entries.lock().unwrap();
        entries.retain(|e| !(e.collection == collection && e.bucket == bucket && e.object == object));
        entries.push(Entry {
            collection: collection.into(),
            bucket: bucket.into(),
            object: object.into(),
            text: text.into(),
        });
        self.pushed.lock().unwrap().push(object.to_string());
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
        self.queries.fetch_add(1, Ordering::SeqCst);

        let wanted: Vec<String> = terms.split_whitespace().map(str::to_lowercase).collect();
        let entries = self.entries.lock().unwrap();
        Ok(entries
            .iter()
            .filter(|e| e.collection == collection && e.bucket == bucket)
            .filter(|e| {
                let words: Vec<&str> = e.text.split_whitespace().collect();
                wanted.iter().all(|w| words.contains(&w.as_str()))
            })
            .map(|e| e.object.clone())
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn flush(&self, collection: &str) -> Result<u64> {
        if !self.connection_state().ingest_connected {
            return Err(SearchError::IngestUnavailable);
        }
        self.flushes.fetch_add(1, Ordering::SeqCst);
        let mut entries = self.entries.lock().unwrap();
        let before = entries.len();
        entries.retain(|e| e.collection != collection);
        Ok((before - entries.len()) as u64)
    }
}
