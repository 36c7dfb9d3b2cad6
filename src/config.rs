//! Tilestitch global configuration options.

use std::sync::{OnceLock, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Global configuration options for the tilestitch crate.
///
/// Retrieve the global [`Config`] with [`global_config`] and modify it with [`global_config_mut`].
///
/// ## Generation Retries
/// > default: `10`
///
/// The number of times manifest generation is retried for a single source file before the file is considered unreadable.
/// Retries are counted per file, not per batch.
///
/// ## Generation Concurrent Limit
/// > default: [`std::thread::available_parallelism`]`()`
///
/// The maximum number of source files for which manifests are generated concurrently.
/// The concurrent limit is disabled if set to zero.
///
/// ## Non-Split Dimensions
/// > default: `["time", "zt", "zm"]`
///
/// Dimension names that are never used to choose a subset and are never concatenation targets.
/// These are the temporal dimension and the vertical (level) dimensions.
#[derive(Debug)]
pub struct Config {
    generation_retries: usize,
    generation_concurrent_limit: usize,
    non_split_dimensions: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            generation_retries: 10,
            generation_concurrent_limit: std::thread::available_parallelism()
                .map_or(1, std::num::NonZeroUsize::get),
            non_split_dimensions: ["time", "zt", "zm"].map(String::from).to_vec(),
        }
    }
}

impl Config {
    /// Get the [generation retries](#generation-retries) configuration.
    #[must_use]
    pub fn generation_retries(&self) -> usize {
        self.generation_retries
    }

    /// Set the [generation retries](#generation-retries) configuration.
    pub fn set_generation_retries(&mut self, generation_retries: usize) {
        self.generation_retries = generation_retries;
    }

    /// Get the [generation concurrent limit](#generation-concurrent-limit) configuration.
    #[must_use]
    pub fn generation_concurrent_limit(&self) -> usize {
        self.generation_concurrent_limit
    }

    /// Set the [generation concurrent limit](#generation-concurrent-limit) configuration.
    pub fn set_generation_concurrent_limit(&mut self, concurrent_limit: usize) {
        self.generation_concurrent_limit = concurrent_limit;
    }

    /// Get the [non-split dimensions](#non-split-dimensions) configuration.
    #[must_use]
    pub fn non_split_dimensions(&self) -> &[String] {
        &self.non_split_dimensions
    }

    /// Set the [non-split dimensions](#non-split-dimensions) configuration.
    pub fn set_non_split_dimensions(&mut self, non_split_dimensions: Vec<String>) {
        self.non_split_dimensions = non_split_dimensions;
    }
}

static CONFIG: OnceLock<RwLock<Config>> = OnceLock::new();

/// Returns a reference to the global tilestitch configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config() -> RwLockReadGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .read()
        .unwrap()
}

/// Returns a mutable reference to the global tilestitch configuration.
///
/// # Panics
/// This function panics if the underlying lock has been poisoned and might panic if the global config is already held by the current thread.
pub fn global_config_mut() -> RwLockWriteGuard<'static, Config> {
    CONFIG
        .get_or_init(|| RwLock::new(Config::default()))
        .write()
        .unwrap()
}
