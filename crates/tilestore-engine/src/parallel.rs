//! Tile-level scheduling on a shared worker pool.

use std::{
    ops::Range,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use rayon::{ThreadPoolBuilder, prelude::*};
use tilestore_common::{Progress, StorageResult, TileId};

use crate::config::StoreConfig;

/// Raised by a caller that wants long-running loops to yield between
/// batches.
#[derive(Debug, Clone, Default)]
pub struct SuspendToken(Arc<AtomicBool>);

impl SuspendToken {
    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct TileLoop {
    pool: Option<Arc<rayon::ThreadPool>>,
    separable_min_len: usize,
    suspend_batch: usize,
}

impl TileLoop {
    pub fn new(config: &StoreConfig) -> Self {
        let pool = if config.enable_parallel {
            let mut builder = ThreadPoolBuilder::new().thread_name(|i| format!("tile-worker-{i}"));
            if let Some(max_threads) = config.max_threads {
                builder = builder.num_threads(max_threads);
            }
            // without a pool every loop runs inline
            builder.build().ok().map(Arc::new)
        } else {
            None
        };
        TileLoop {
            pool,
            separable_min_len: config.separable_min_len.max(1),
            suspend_batch: config.suspend_batch,
        }
    }

    pub fn sequential() -> Self {
        Self::new(&StoreConfig::default().with_parallel(false))
    }

    pub fn is_parallel(&self) -> bool {
        self.pool.is_some()
    }

    pub fn nr_workers(&self) -> usize {
        self.pool.as_ref().map_or(1, |p| p.current_num_threads())
    }

    /// Calls `f` once for every tile in `0..n`, in no particular order.
    pub fn parallel_tileloop<F>(&self, n: usize, f: F)
    where
        F: Fn(TileId) + Send + Sync,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("parallel_tileloop", n, workers = self.nr_workers()).entered();
        let n = n as TileId;
        match &self.pool {
            Some(pool) if n > 1 => pool.install(|| (0..n).into_par_iter().for_each(&f)),
            _ => (0..n).for_each(f),
        }
    }

    /// Like [`parallel_tileloop`](Self::parallel_tileloop), but stops
    /// scheduling further tiles once one fails and returns that error.
    pub fn try_parallel_tileloop<F>(&self, n: usize, f: F) -> StorageResult<()>
    where
        F: Fn(TileId) -> StorageResult<()> + Send + Sync,
    {
        #[cfg(feature = "tracing")]
        let _span =
            tracing::debug_span!("try_parallel_tileloop", n, workers = self.nr_workers()).entered();
        self.run_range(0..n as TileId, &f)
    }

    fn run_range<F>(&self, tiles: Range<TileId>, f: &F) -> StorageResult<()>
    where
        F: Fn(TileId) -> StorageResult<()> + Send + Sync,
    {
        match &self.pool {
            Some(pool) if tiles.len() > 1 => pool.install(|| tiles.into_par_iter().try_for_each(f)),
            _ => tiles.into_iter().try_for_each(f),
        }
    }

    /// Processes tiles `*cursor..n` in batches, checking `token` before each
    /// batch. Returns `Pending` with `cursor` at the first unprocessed tile
    /// when suspended; calling again resumes there.
    pub fn resumable_tileloop<F>(
        &self,
        n: usize,
        cursor: &mut usize,
        token: &SuspendToken,
        f: F,
    ) -> Progress<()>
    where
        F: Fn(TileId) -> StorageResult<()> + Send + Sync,
    {
        let batch = match self.suspend_batch {
            0 => self.nr_workers(),
            b => b,
        };
        while *cursor < n {
            if token.is_raised() {
                #[cfg(feature = "tracing")]
                tracing::debug!(cursor = *cursor, n, "tile loop suspended");
                return Progress::Pending;
            }
            let end = (*cursor + batch).min(n);
            if let Err(e) = self.run_range(*cursor as TileId..end as TileId, &f) {
                return Progress::Failed(e);
            }
            *cursor = end;
        }
        Progress::Done(())
    }

    /// Evaluates `f` over `range`, splitting it in halves that run as
    /// parallel tasks while they are longer than the configured minimum, and
    /// combines partial results with `reduce`.
    pub fn separable<T, F, R>(&self, range: Range<usize>, f: F, reduce: R) -> T
    where
        T: Send,
        F: Fn(Range<usize>) -> T + Send + Sync,
        R: Fn(T, T) -> T + Send + Sync,
    {
        match &self.pool {
            Some(pool) => pool.install(|| split(range, self.separable_min_len, &f, &reduce)),
            None => f(range),
        }
    }
}

fn split<T, F, R>(range: Range<usize>, min_len: usize, f: &F, reduce: &R) -> T
where
    T: Send,
    F: Fn(Range<usize>) -> T + Send + Sync,
    R: Fn(T, T) -> T + Send + Sync,
{
    if range.len() <= min_len {
        return f(range);
    }
    let mid = range.start + range.len() / 2;
    let (lo, hi) = rayon::join(
        || split(range.start..mid, min_len, f, reduce),
        || split(mid..range.end, min_len, f, reduce),
    );
    reduce(lo, hi)
}
