//! Long-lived process resources shared by arrays and loops.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::{
    config::StoreConfig,
    parallel::{SuspendToken, TileLoop},
    safe_writer::SafeWriterRegistry,
};

/// Owns the configuration, the safe-writer registry, the worker pool and
/// the suspend token. Constructors that need any of these take
/// `&Arc<StoreContext>`.
#[derive(Debug)]
pub struct StoreContext {
    config: StoreConfig,
    writers: Arc<SafeWriterRegistry>,
    tile_loop: TileLoop,
    suspend: SuspendToken,
    tmp_counter: AtomicU64,
}

impl StoreContext {
    pub fn new(config: StoreConfig) -> Arc<Self> {
        let tile_loop = TileLoop::new(&config);
        Arc::new(StoreContext {
            writers: SafeWriterRegistry::new(),
            tile_loop,
            suspend: SuspendToken::default(),
            tmp_counter: AtomicU64::new(0),
            config,
        })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn writers(&self) -> &Arc<SafeWriterRegistry> {
        &self.writers
    }

    pub fn tile_loop(&self) -> &TileLoop {
        &self.tile_loop
    }

    pub fn suspend_token(&self) -> &SuspendToken {
        &self.suspend
    }

    /// A fresh file stem for a temporary array, unique within this process.
    pub fn next_tmp_path(&self, tag: &str) -> PathBuf {
        let n = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let dir = self.config.tmp_dir.clone().unwrap_or_else(std::env::temp_dir);
        dir.join(format!("tilestore-{}-{n}.{tag}", std::process::id()))
    }
}
