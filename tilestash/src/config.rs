//! Configuration for the cache worker.

use std::path::PathBuf;
use std::time::Duration;

/// Default totals refresh threshold while the queue is shallow.
pub const DEFAULT_SHORT_TOTALS_INTERVAL: Duration = Duration::from_secs(2);

/// Default totals refresh threshold while the queue is deep.
pub const DEFAULT_LONG_TOTALS_INTERVAL: Duration = Duration::from_secs(5);

/// Default wait before the worker shuts itself down with an empty queue.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default maximum number of tiles examined by a single prune pass.
pub const DEFAULT_PRUNE_BATCH: usize = 128;

/// Cache worker configuration.
///
/// Built with `CacheConfig::new(path)` and the `with_*` methods; every field
/// except the database path has a sensible default.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Path of the SQLite database file
    pub database_path: PathBuf,
    /// Totals refresh threshold when fewer than 25 tasks are queued
    pub short_totals_interval: Duration,
    /// Totals refresh threshold when more than 100 tasks are queued
    pub long_totals_interval: Duration,
    /// How long the worker idles on an empty queue before exiting
    pub idle_timeout: Duration,
    /// Upper bound on tiles examined per prune pass
    pub prune_batch: usize,
    /// Byte pattern of a provider's "no tile at this zoom" placeholder.
    ///
    /// When set, tiles matching this blob are deleted once per installation
    /// during worker startup.
    pub no_tile_bytes: Option<Vec<u8>>,
}

impl CacheConfig {
    /// Create a configuration for the database at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            database_path: path.into(),
            short_totals_interval: DEFAULT_SHORT_TOTALS_INTERVAL,
            long_totals_interval: DEFAULT_LONG_TOTALS_INTERVAL,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            prune_batch: DEFAULT_PRUNE_BATCH,
            no_tile_bytes: None,
        }
    }

    /// Set the short totals refresh threshold.
    pub fn with_short_totals_interval(mut self, interval: Duration) -> Self {
        self.short_totals_interval = interval;
        self
    }

    /// Set the long totals refresh threshold.
    pub fn with_long_totals_interval(mut self, interval: Duration) -> Self {
        self.long_totals_interval = interval;
        self
    }

    /// Set the idle shutdown timeout.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the per-pass prune batch cap.
    pub fn with_prune_batch(mut self, batch: usize) -> Self {
        self.prune_batch = batch;
        self
    }

    /// Set the known "no tile" placeholder bytes to scrub at startup.
    pub fn with_no_tile_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.no_tile_bytes = Some(bytes);
        self
    }
}
