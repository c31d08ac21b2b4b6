//! Compute-once caches.
//!
//! An entry is computed at most once per distinct key and stays until it is
//! removed or the cache is cleared; there is no eviction. The table lock is
//! only held to find or insert the entry's cell, so a computation may itself
//! consult the cache for other keys. Concurrent requests for the same key
//! wait for the single computation in flight.

use std::{
    hash::Hash,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use once_cell::sync::OnceCell;
use rustc_hash::FxHashMap;

use crate::locks::{LeveledMutex, LockLevel};

type Slot<R> = Arc<OnceCell<Arc<R>>>;

pub struct MemoCache<K, R> {
    entries: LeveledMutex<FxHashMap<K, Slot<R>>>,
    nr_computed: AtomicUsize,
}

impl<K: Eq + Hash + Clone, R> MemoCache<K, R> {
    pub fn new() -> Self {
        Self::with_level(LockLevel::MemoTable)
    }

    pub fn with_level(level: LockLevel) -> Self {
        MemoCache {
            entries: LeveledMutex::new(level, FxHashMap::default()),
            nr_computed: AtomicUsize::new(0),
        }
    }

    fn cell(&self, key: &K) -> Slot<R> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(cell) => Arc::clone(cell),
            None => {
                let cell: Slot<R> = Arc::new(OnceCell::new());
                entries.insert(key.clone(), Arc::clone(&cell));
                cell
            }
        }
    }

    pub fn get_or_compute(&self, key: &K, compute: impl FnOnce(&K) -> R) -> Arc<R> {
        let cell = self.cell(key);
        Arc::clone(cell.get_or_init(|| {
            self.nr_computed.fetch_add(1, Ordering::Relaxed);
            Arc::new(compute(key))
        }))
    }

    /// A failed computation is not cached; the next request tries again.
    pub fn try_get_or_compute<Er>(
        &self,
        key: &K,
        compute: impl FnOnce(&K) -> Result<R, Er>,
    ) -> Result<Arc<R>, Er> {
        let cell = self.cell(key);
        cell.get_or_try_init(|| {
            self.nr_computed.fetch_add(1, Ordering::Relaxed);
            compute(key).map(Arc::new)
        })
        .map(Arc::clone)
    }

    pub fn get(&self, key: &K) -> Option<Arc<R>> {
        let entries = self.entries.lock();
        entries.get(key).and_then(|c| c.get().cloned())
    }

    pub fn remove(&self, key: &K) -> Option<Arc<R>> {
        let cell = self.entries.lock().remove(key)?;
        cell.get().cloned()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of computations started over the cache's life.
    pub fn nr_computed(&self) -> usize {
        self.nr_computed.load(Ordering::Relaxed)
    }
}

impl<K: Eq + Hash + Clone, R> Default for MemoCache<K, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, R> std::fmt::Debug for MemoCache<K, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoCache")
            .field("level", &self.entries.level())
            .field("nr_computed", &self.nr_computed.load(Ordering::Relaxed))
            .finish()
    }
}

/// A function bundled with the cache of its results.
pub struct Memoized<K, R, F> {
    cache: MemoCache<K, R>,
    func: F,
}

impl<K, R, F> Memoized<K, R, F>
where
    K: Eq + Hash + Clone,
    F: Fn(&K) -> R,
{
    pub fn new(func: F) -> Self {
        Memoized {
            cache: MemoCache::new(),
            func,
        }
    }

    pub fn apply(&self, key: &K) -> Arc<R> {
        self.cache.get_or_compute(key, &self.func)
    }

    pub fn remove(&self, key: &K) -> Option<Arc<R>> {
        self.cache.remove(key)
    }

    pub fn clear(&self) {
        self.cache.clear()
    }

    pub fn cache(&self) -> &MemoCache<K, R> {
        &self.cache
    }
}
