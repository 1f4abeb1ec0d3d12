//! Search load test against a running node.

use catalog_search::models::SearchRequest;
use catalog_search::RemoteConnectionManager;
use futures::stream::{self, StreamExt};
use rand::seq::IndexedRandom;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_TERMS: [&str; 5] = ["table", "soft", "intelligent", "small", "car"];

/// Outcome of a load test.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BenchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: Duration,
}

/// Send `requests` searches with random terms, at most `concurrency` in flight.
pub async fn run_bench(
    manager: &Arc<RemoteConnectionManager>,
    terms: &[String],
    requests: usize,
    concurrency: usize,
    limit: u32,
) -> BenchReport {
    let started = Instant::now();
    let progress_every = (requests / 10).max(1);

    let (succeeded, failed) = stream::iter(0..requests)
        .map(|i| {
            let term = terms
                .choose(&mut rand::rng())
                .cloned()
                .unwrap_or_default();
            async move {
                let result = manager
                    .search_and_fetch_items(&SearchRequest::new(term.clone(), limit))
                    .await;
                if (i + 1) % progress_every == 0 {
                    info!("Sent {}/{} requests", i + 1, requests);
                }
                match result {
                    Ok(_) => true,
                    Err(e) => {
                        debug!("Request {} for {:?} failed: {}", i + 1, term, e);
                        false
                    }
                }
            }
        })
        .buffer_unordered(concurrency.max(1))
        .fold((0usize, 0usize), |(ok, err), success| async move {
            if success {
                (ok + 1, err)
            } else {
                (ok, err + 1)
            }
        })
        .await;

    BenchReport {
        total: requests,
        succeeded,
        failed,
        elapsed: started.elapsed(),
    }
}
