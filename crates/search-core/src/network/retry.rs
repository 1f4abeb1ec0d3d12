//! Exponential backoff for connection attempts.
//!
//! Provides configurable retry behavior with:
//! - Exponential backoff (delay multiplied by a fixed factor each attempt)
//! - A delay ceiling and a maximum attempt count
//! - Optional jitter to prevent thundering herd
//! - `BackoffState` to track one attempt sequence

use crate::config::RemoteConfig;
use rand::Rng;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the first one).
    pub max_attempts: u32,
    /// Initial delay between retries.
    pub base_delay: Duration,
    /// Maximum delay cap.
    pub max_delay: Duration,
    /// Exponential base (1.5 for the node connection defaults).
    pub exponential_base: f64,
    /// Whether to add random jitter to delays.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: RemoteConfig::MAX_RETRIES,
            base_delay: RemoteConfig::INITIAL_RETRY_DELAY,
            max_delay: RemoteConfig::MAX_RETRY_DELAY,
            exponential_base: RemoteConfig::BACKOFF_MULTIPLIER,
            jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of attempts.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts.max(1);
        self
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Set the maximum delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the multiplier applied after each failed attempt.
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.exponential_base = multiplier;
        self
    }

    /// Enable or disable jitter.
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    /// Calculate the delay for a given attempt number (0-indexed).
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        // Exponential backoff: base * (exponential_base ^ attempt)
        let multiplier = self.exponential_base.powi(attempt as i32);
        let delay_secs = self.base_delay.as_secs_f64() * multiplier;
        let capped_secs = delay_secs.min(self.max_delay.as_secs_f64());

        let final_secs = if self.jitter {
            // Multiply by a random factor between 0.5 and 1.5, never past the cap.
            let mut rng = rand::rng();
            let jitter_factor = rng.random_range(0.5..1.5);
            (capped_secs * jitter_factor).min(self.max_delay.as_secs_f64())
        } else {
            capped_secs
        };

        Duration::from_secs_f64(final_secs)
    }
}

/// Progress of one attempt sequence.
///
/// Created when a sequence starts, advanced on each failure and discarded on
/// success or exhaustion.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffState {
    /// Number of failed attempts so far.
    pub attempt: u32,
    /// Delay that will be applied after the next failure.
    pub current_delay: Duration,
}

impl BackoffState {
    /// Start a new sequence.
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            attempt: 0,
            current_delay: config.calculate_delay(0),
        }
    }

    /// Record a failed attempt.
    ///
    /// Returns the delay to wait before the next attempt, or `None` once
    /// `max_attempts` failures have been recorded.
    pub fn on_failure(&mut self, config: &RetryConfig) -> Option<Duration> {
        self.attempt += 1;
        if self.attempt >= config.max_attempts {
            return None;
        }
        let delay = self.current_delay;
        self.current_delay = config.calculate_delay(self.attempt);
        Some(delay)
    }

    /// Reset after a successful attempt.
    pub fn reset(&mut self, config: &RetryConfig) {
        *self = Self::new(config);
    }

    /// Whether the sequence ran out of attempts.
    pub fn is_exhausted(&self, config: &RetryConfig) -> bool {
        self.attempt >= config.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node_backoff(max_attempts: u32) -> RetryConfig {
        RetryConfig::new()
            .with_base_delay(Duration::from_millis(5000))
            .with_multiplier(1.5)
            .with_max_delay(Duration::from_millis(60_000))
            .with_max_attempts(max_attempts)
            .with_jitter(false)
    }

    #[test]
    fn test_delay_calculation_no_jitter() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(1))
            .with_multiplier(2.0)
            .with_jitter(false);

        assert_eq!(config.calculate_delay(0), Duration::from_secs(1));
        assert_eq!(config.calculate_delay(1), Duration::from_secs(2));
        assert_eq!(config.calculate_delay(2), Duration::from_secs(4));
    }

    #[test]
    fn test_delay_capped_at_max() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(10))
            .with_max_delay(Duration::from_secs(30))
            .with_multiplier(2.0)
            .with_jitter(false);

        // 10 * 2^3 = 80s, but capped at 30s
        assert_eq!(config.calculate_delay(3), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_with_jitter_stays_in_band() {
        let config = RetryConfig::new()
            .with_base_delay(Duration::from_secs(2))
            .with_multiplier(2.0)
            .with_jitter(true);

        for _ in 0..20 {
            let delay = config.calculate_delay(0);
            assert!(
                delay >= Duration::from_secs(1) && delay <= Duration::from_secs(3),
                "Delay {:?} should be between 1s and 3s",
                delay
            );
        }
    }

    #[test]
    fn test_backoff_sequence_for_consecutive_failures() {
        let config = node_backoff(4);
        let mut state = BackoffState::new(&config);

        let delays: Vec<Duration> = (0..3).filter_map(|_| state.on_failure(&config)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(5000),
                Duration::from_millis(7500),
                Duration::from_millis(11250),
            ]
        );

        // The fourth failure exhausts the sequence.
        assert_eq!(state.on_failure(&config), None);
        assert!(state.is_exhausted(&config));
    }

    #[test]
    fn test_backoff_sequence_respects_ceiling() {
        let config = node_backoff(20).with_max_delay(Duration::from_millis(10_000));
        let mut state = BackoffState::new(&config);

        let delays: Vec<Duration> = (0..4).filter_map(|_| state.on_failure(&config)).collect();
        assert_eq!(delays[2], Duration::from_millis(10_000));
        assert_eq!(delays[3], Duration::from_millis(10_000));
    }

    #[test]
    fn test_backoff_reset() {
        let config = node_backoff(5);
        let mut state = BackoffState::new(&config);
        state.on_failure(&config);
        state.on_failure(&config);

        state.reset(&config);
        assert_eq!(state.attempt, 0);
        assert_eq!(state.current_delay, Duration::from_millis(5000));
    }
}
