use serde::Deserialize;

use std::num::NonZeroUsize;
use std::thread;

/// Execution settings of an extraction run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Scan blocks on a pool of worker threads instead of the calling thread.
    pub multiprocess: bool,
    /// Number of workers; defaults to the available parallelism minus one.
    pub workers: Option<usize>,
    /// Draw a progress bar per scan phase on stderr.
    pub progress_bar: bool,
}

impl ExtractConfig {
    pub fn serial() -> Self {
        Self::default()
    }

    pub fn parallel() -> Self {
        Self {
            multiprocess: true,
            ..Self::default()
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Size of the worker pool, never less than one.
    pub fn worker_count(&self) -> usize {
        match self.workers {
            Some(workers) => workers.max(1),
            None => {
                let cpus = thread::available_parallelism().map_or(1, NonZeroUsize::get);
                cpus.saturating_sub(1).max(1)
            }
        }
    }
}
