use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the queue system.
///
/// Use [`QueueConfig::builder()`] for ergonomic construction, or
/// [`QueueConfig::default()`] for sensible defaults (in-memory DB, two
/// concurrent jobs, three attempts).
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Path to SQLite database file. `None` = in-memory database.
    pub db_path: Option<PathBuf>,

    /// Polling interval for checking runnable jobs.
    pub poll_interval: Duration,

    /// Number of jobs processed in parallel. Kept small: the downstream
    /// LLM endpoint is a shared resource that cannot be flooded.
    pub concurrency: usize,

    /// Attempts per job before it settles into terminal `failed`.
    pub max_attempts: u32,

    /// Retry backoff base; attempt N is rescheduled after
    /// `base * 2^(N-1)`.
    pub backoff_base: Duration,

    /// Default per-job wall-clock timeout, overridable per job.
    pub job_timeout: Duration,

    /// Finished jobs older than this many days are pruned.
    pub retention_days: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            poll_interval: Duration::from_secs(1),
            concurrency: 2,
            max_attempts: 3,
            backoff_base: Duration::from_secs(5),
            job_timeout: Duration::from_secs(120),
            retention_days: 7,
        }
    }
}

impl QueueConfig {
    /// Start building a config with the builder pattern.
    pub fn builder() -> QueueConfigBuilder {
        QueueConfigBuilder::default()
    }
}

/// Builder for [`QueueConfig`].
#[derive(Default)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Set the SQLite database path for persistence. Omit for in-memory.
    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.config.db_path = Some(path);
        self
    }

    /// Set the polling interval for checking runnable jobs.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    /// Set the number of jobs processed in parallel.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    /// Set the attempt budget per job.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts.max(1);
        self
    }

    /// Set the exponential backoff base for retries.
    pub fn with_backoff_base(mut self, base: Duration) -> Self {
        self.config.backoff_base = base;
        self
    }

    /// Set the default per-job timeout.
    pub fn with_job_timeout(mut self, timeout: Duration) -> Self {
        self.config.job_timeout = timeout;
        self
    }

    /// Set the retention window for finished jobs.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.config.retention_days = days;
        self
    }

    /// Build the final [`QueueConfig`].
    pub fn build(self) -> QueueConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_overrides_defaults() {
        let config = QueueConfig::builder()
            .with_concurrency(4)
            .with_max_attempts(5)
            .with_backoff_base(Duration::from_secs(1))
            .build();
        assert_eq!(config.concurrency, 4);
        assert_eq!(config.max_attempts, 5);
        assert_eq!(config.backoff_base, Duration::from_secs(1));
        assert!(config.db_path.is_none());
    }

    #[test]
    fn zero_values_are_clamped() {
        let config = QueueConfig::builder()
            .with_concurrency(0)
            .with_max_attempts(0)
            .build();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_attempts, 1);
    }
}
