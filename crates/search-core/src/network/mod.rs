//! Network resilience helpers.

pub mod retry;

pub use retry::{BackoffState, RetryConfig};
