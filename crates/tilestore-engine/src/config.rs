use std::path::PathBuf;

/// Process-level settings of a [`StoreContext`](crate::StoreContext).
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Run tile loops on the worker pool. When false every loop runs inline.
    pub enable_parallel: bool,
    pub max_threads: Option<usize>,
    /// Ranges shorter than this are not split further by the separable loop.
    pub separable_min_len: usize,
    /// Tiles per batch between suspend checkpoints; 0 means the pool width.
    pub suspend_batch: usize,
    /// Directory for temporary file-backed arrays. Defaults to the system
    /// temp dir.
    pub tmp_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            enable_parallel: true,
            max_threads: None,
            separable_min_len: 64 * 1024,
            suspend_batch: 0,
            tmp_dir: None,
        }
    }
}

impl StoreConfig {
    pub fn with_parallel(mut self, enable: bool) -> Self {
        self.enable_parallel = enable;
        self
    }

    pub fn with_max_threads(mut self, n: usize) -> Self {
        self.max_threads = Some(n);
        self
    }

    pub fn with_separable_min_len(mut self, len: usize) -> Self {
        self.separable_min_len = len.max(1);
        self
    }

    pub fn with_suspend_batch(mut self, batch: usize) -> Self {
        self.suspend_batch = batch;
        self
    }

    pub fn with_tmp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmp_dir = Some(dir.into());
        self
    }
}
