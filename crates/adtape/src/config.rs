//! Tunables for the tape and for parallel regions.

#[cfg(feature = "parallel")]
use std::sync::{Arc, OnceLock};

use log::warn;

/// Environment variable overriding [`TapeConfig::chunk_capacity`].
pub const CHUNK_CAPACITY_ENV: &str = "ADTAPE_CHUNK_CAPACITY";

/// Default number of nodes per arena chunk.
pub const DEFAULT_CHUNK_CAPACITY: usize = 4096;

/// Configuration of a thread's tape.
///
/// # Example
///
/// ```
/// use adtape::TapeConfig;
///
/// let config = TapeConfig::default().with_chunk_capacity(256);
/// assert_eq!(config.chunk_capacity, 256);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TapeConfig {
    /// Number of nodes stored in each arena chunk.
    pub chunk_capacity: usize,
}

impl TapeConfig {
    /// Set the chunk capacity. Values below 1 are raised to 1.
    pub fn with_chunk_capacity(mut self, chunk_capacity: usize) -> Self {
        self.chunk_capacity = chunk_capacity.max(1);
        self
    }

    /// Build a configuration from the environment, falling back to defaults.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let config = Self::default();
        match std::env::var(CHUNK_CAPACITY_ENV) {
            Ok(raw) => match raw.trim().parse::<usize>() {
                Ok(n) => config.with_chunk_capacity(n),
                Err(_) => {
                    warn!("ignoring {CHUNK_CAPACITY_ENV}={raw:?}: not a positive integer");
                    config
                }
            },
            Err(_) => config,
        }
    }
}

impl Default for TapeConfig {
    fn default() -> Self {
        Self {
            chunk_capacity: DEFAULT_CHUNK_CAPACITY,
        }
    }
}

/// Configuration of a parallel elementwise region.
///
/// A dedicated pool is built on first use and cached in the config, so
/// reusing one config (or its clones) across regions reuses its workers.
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Size of a dedicated worker pool. `None` uses the global rayon pool.
    pub num_threads: Option<usize>,
    /// Regions with fewer elements run sequentially on the calling thread.
    pub min_parallel_len: usize,
    #[cfg(feature = "parallel")]
    pub(crate) pool: Arc<OnceLock<rayon::ThreadPool>>,
}

impl ParallelConfig {
    /// Run on a dedicated pool with `n` workers.
    pub fn with_num_threads(mut self, n: usize) -> Self {
        self.num_threads = Some(n.max(1));
        #[cfg(feature = "parallel")]
        {
            self.pool = Arc::default();
        }
        self
    }

    /// Set the sequential cutoff.
    pub fn with_min_parallel_len(mut self, len: usize) -> Self {
        self.min_parallel_len = len;
        self
    }

    /// Always run on the calling thread.
    pub fn sequential() -> Self {
        Self {
            min_parallel_len: usize::MAX,
            ..Self::default()
        }
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            num_threads: None,
            min_parallel_len: 32,
            #[cfg(feature = "parallel")]
            pool: Arc::default(),
        }
    }
}

impl PartialEq for ParallelConfig {
    fn eq(&self, other: &Self) -> bool {
        self.num_threads == other.num_threads && self.min_parallel_len == other.min_parallel_len
    }
}

impl Eq for ParallelConfig {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_capacity_clamped() {
        let config = TapeConfig::default().with_chunk_capacity(0);
        assert_eq!(config.chunk_capacity, 1);
    }

    #[test]
    fn test_default_config() {
        assert_eq!(TapeConfig::default().chunk_capacity, DEFAULT_CHUNK_CAPACITY);
        assert_eq!(ParallelConfig::default().num_threads, None);
    }

    #[test]
    fn test_sequential_config() {
        let config = ParallelConfig::sequential();
        assert_eq!(config.min_parallel_len, usize::MAX);
        assert_eq!(config.with_num_threads(0).num_threads, Some(1));
    }
}
