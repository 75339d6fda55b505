//! Coordinator and retry settings.

use driftsync_protocol::Task;
use rand::Rng;
use std::time::Duration;

/// Settings for one table's [`SyncCoordinator`](crate::SyncCoordinator).
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Wire name of the synchronized table, e.g. `tasks`.
    pub table: String,
    /// Base URL the transport posts to.
    pub server_url: String,
    /// Per-request deadline handed to the HTTP client.
    pub timeout: Duration,
    /// Backoff policy for [`sync_with_retry`](crate::SyncCoordinator::sync_with_retry).
    pub retry: RetryConfig,
    /// Period of the background scheduler; `None` means the default.
    pub sync_interval: Option<Duration>,
}

impl SyncConfig {
    /// Scheduler period when none is set.
    pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

    /// Request deadline when none is set.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Settings for `table` on the server at `server_url`.
    pub fn new(table: impl Into<String>, server_url: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            server_url: server_url.into(),
            timeout: Self::DEFAULT_TIMEOUT,
            retry: RetryConfig::default(),
            sync_interval: None,
        }
    }

    /// Replaces the backoff policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the scheduler period.
    pub fn with_sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Sets the per-request deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The period the scheduler runs at.
    pub fn effective_sync_interval(&self) -> Duration {
        self.sync_interval.unwrap_or(Self::DEFAULT_SYNC_INTERVAL)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(Task::TABLE, "")
    }
}

/// Exponential backoff between whole sync cycles.
///
/// Attempt `n` (counting from 0) waits
/// `min(initial_delay * backoff_multiplier^(n-1), max_delay)`, plus up to a
/// quarter of that again when jitter is on. Attempt 0 never waits.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Cycles to try in total, including the first.
    pub max_attempts: u32,
    /// Wait before the first retry.
    pub initial_delay: Duration,
    /// Upper bound on any single wait, before jitter.
    pub max_delay: Duration,
    /// Growth factor between consecutive waits.
    pub backoff_multiplier: f64,
    /// Spread retries of many replicas apart.
    pub add_jitter: bool,
}

impl RetryConfig {
    /// Up to `max_attempts` cycles, starting at 100ms and doubling, capped
    /// at 30s, with jitter.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            add_jitter: true,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            add_jitter: false,
        }
    }

    /// Sets the first wait.
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the cap on a single wait.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth factor.
    pub fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Turns jitter on or off.
    pub fn with_jitter(mut self, add_jitter: bool) -> Self {
        self.add_jitter = add_jitter;
        self
    }

    /// How long to sleep before `attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let Some(retry) = attempt.checked_sub(1) else {
            return Duration::ZERO;
        };

        let growth = self
            .backoff_multiplier
            .powi(i32::try_from(retry).unwrap_or(i32::MAX));
        let max = self.max_delay.as_secs_f64();
        let raw = self.initial_delay.as_secs_f64() * growth;
        let capped = if raw.is_finite() { raw.clamp(0.0, max) } else { max };
        if !self.add_jitter || capped <= 0.0 {
            return Duration::from_secs_f64(capped);
        }

        let spread: f64 = rand::thread_rng().gen_range(0.0..0.25);
        Duration::from_secs_f64(capped * (1.0 + spread))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = SyncConfig::new("tasks", "https://sync.example.com")
            .with_timeout(Duration::from_secs(60))
            .with_sync_interval(Duration::from_secs(5))
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.table, "tasks");
        assert_eq!(config.server_url, "https://sync.example.com");
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.effective_sync_interval(), Duration::from_secs(5));
        assert_eq!(config.retry.max_attempts, 1);
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.table, Task::TABLE);
        assert_eq!(config.timeout, SyncConfig::DEFAULT_TIMEOUT);
        assert_eq!(
            config.effective_sync_interval(),
            SyncConfig::DEFAULT_SYNC_INTERVAL
        );
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn first_attempt_never_waits() {
        assert_eq!(RetryConfig::new(5).delay_for_attempt(0), Duration::ZERO);
        assert_eq!(RetryConfig::no_retry().delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn waits_double_without_jitter() {
        let config = RetryConfig::new(5)
            .with_initial_delay(Duration::from_millis(100))
            .with_jitter(false);

        let waits: Vec<_> = (1..=4).map(|n| config.delay_for_attempt(n)).collect();
        assert_eq!(
            waits,
            [100, 200, 400, 800].map(Duration::from_millis).to_vec()
        );
    }

    #[test]
    fn jitter_adds_at_most_a_quarter() {
        let config = RetryConfig::new(5).with_initial_delay(Duration::from_millis(200));
        for _ in 0..50 {
            let wait = config.delay_for_attempt(1);
            assert!(wait >= Duration::from_millis(200));
            assert!(wait <= Duration::from_millis(250));
        }
    }

    #[test]
    fn waits_are_capped() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_secs(1))
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(10.0)
            .with_jitter(false);
        assert_eq!(config.delay_for_attempt(6), Duration::from_secs(5));
    }

    #[test]
    fn degenerate_multipliers_never_go_negative() {
        let negative = RetryConfig::new(5)
            .with_backoff_multiplier(-2.0)
            .with_jitter(false);
        assert_eq!(negative.delay_for_attempt(2), Duration::ZERO);

        let nan = RetryConfig::new(5)
            .with_max_delay(Duration::from_secs(5))
            .with_backoff_multiplier(f64::NAN)
            .with_jitter(false);
        assert_eq!(nan.delay_for_attempt(2), Duration::from_secs(5));
    }
}
