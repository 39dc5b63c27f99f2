//! Run configuration.
//!
//! [`ProfileConfig`] carries the three options every pipeline recognizes
//! (`delimiter`, `worker_count`, `batch_size`) plus queue bounding and the
//! set of per-column statistics to track. It can be built in code with the
//! `with_*` setters or loaded from JSON; missing JSON fields take defaults.
//!
//! ```
//! use colprofile::{ProfileConfig, StatsSelection};
//!
//! let cfg = ProfileConfig::default()
//!     .with_delimiter(',')
//!     .with_workers(4)
//!     .with_stats(StatsSelection::fill_only());
//! assert_eq!(cfg.workers(), 4);
//! ```

use crate::error::{ProfileError, Result};
use crate::stats::AverageBasis;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default number of rows (splitter) or lines (aggregator) per queue item.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Default field delimiter.
pub const DEFAULT_DELIMITER: char = '|';

/// Which per-column statistics an accumulator maintains.
///
/// Statistics that are not tracked come back as `None` in the results.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsSelection {
    pub fill_count: bool,
    pub min_len: bool,
    pub max_len: bool,
    pub sum_len: bool,
}

impl StatsSelection {
    #[must_use]
    pub const fn all() -> Self {
        Self {
            fill_count: true,
            min_len: true,
            max_len: true,
            sum_len: true,
        }
    }

    /// Track only the non-empty count of each column.
    #[must_use]
    pub const fn fill_only() -> Self {
        Self {
            fill_count: true,
            min_len: false,
            max_len: false,
            sum_len: false,
        }
    }

    /// Track only value lengths (min, max and the sum used for averages).
    #[must_use]
    pub const fn lengths_only() -> Self {
        Self {
            fill_count: false,
            min_len: true,
            max_len: true,
            sum_len: true,
        }
    }
}

impl Default for StatsSelection {
    fn default() -> Self {
        Self::all()
    }
}

/// How the aggregator schedules its workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecMode {
    /// One worker, driven in the calling thread over an in-process queue.
    Sequential,
    /// `workers` threads (default: the configured worker count) over a shared channel.
    Parallel { workers: Option<usize> },
}

impl Default for ExecMode {
    fn default() -> Self {
        Self::Parallel { workers: None }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub delimiter: char,
    /// `None` resolves to the number of available cores.
    pub worker_count: Option<usize>,
    pub batch_size: usize,
    /// Capacity (in batches) of every queue; `None` means unbounded.
    pub queue_capacity: Option<usize>,
    pub stats: StatsSelection,
    pub average_basis: AverageBasis,
}

impl Default for ProfileConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            worker_count: None,
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: None,
            stats: StatsSelection::all(),
            average_basis: AverageBasis::AllRows,
        }
    }
}

impl ProfileConfig {
    #[must_use]
    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    #[must_use]
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.worker_count = Some(workers);
        self
    }

    #[must_use]
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity);
        self
    }

    #[must_use]
    pub fn with_stats(mut self, stats: StatsSelection) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_average_basis(mut self, basis: AverageBasis) -> Self {
        self.average_basis = basis;
        self
    }

    /// Effective worker count.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.worker_count.unwrap_or_else(num_cpus::get).max(1)
    }

    /// Reject settings no pipeline can run with.
    ///
    /// # Errors
    /// Returns [`ProfileError::Config`] describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(ProfileError::Config("batch_size must be at least 1".into()));
        }
        if self.worker_count == Some(0) {
            return Err(ProfileError::Config("worker_count must be at least 1".into()));
        }
        if self.queue_capacity == Some(0) {
            return Err(ProfileError::Config("queue_capacity must be at least 1".into()));
        }
        if matches!(self.delimiter, '\n' | '\r') {
            return Err(ProfileError::Config(format!(
                "delimiter {:?} collides with the line terminator",
                self.delimiter
            )));
        }
        Ok(())
    }

    /// Parse a configuration from a JSON document.
    ///
    /// # Errors
    /// Fails on malformed JSON or when [`validate`](Self::validate) rejects the result.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("parse profile config")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load a configuration from a JSON file.
    ///
    /// # Errors
    /// Fails if the file cannot be read or parsed, or the config is invalid.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read config {}", path.display()))?;
        Self::from_json_str(&text)
    }
}
