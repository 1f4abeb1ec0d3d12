//! Bounded log of recent node errors for status reporting.
//!
//! Entries are kept in a fixed-capacity ring buffer: once full, recording a
//! new entry evicts the oldest one.

use crate::config::StatusConfig;
use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::VecDeque;
use std::sync::Mutex;

/// A single recorded error.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

impl std::fmt::Display for ErrorEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}",
            self.at.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.message
        )
    }
}

/// Append-only, fixed-capacity error log shared across the node.
#[derive(Debug)]
pub struct RecentErrorLog {
    entries: Mutex<VecDeque<ErrorEntry>>,
    capacity: usize,
}

impl Default for RecentErrorLog {
    fn default() -> Self {
        Self::new(StatusConfig::ERROR_LOG_CAPACITY)
    }
}

impl RecentErrorLog {
    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    /// Record an error message stamped with the current time.
    pub fn record(&self, message: impl Into<String>) {
        self.push(ErrorEntry {
            at: Utc::now(),
            message: message.into(),
        });
    }

    fn push(&self, entry: ErrorEntry) {
        let mut entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<ErrorEntry> {
        let entries = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    /// The most recent entries formatted for the status response.
    pub fn recent_messages(&self) -> Vec<String> {
        self.recent(StatusConfig::RECENT_ERRORS)
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// Number of entries currently held.
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Truncate `text` to at most `max_chars` characters.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
