//! File-backed tiles whose mapping is shared by everyone using the tile.
//!
//! The tile keeps a weak reference to its current [`TileMapping`]. Asking for
//! a mapping upgrades that reference when possible and maps the file
//! otherwise; the file is unmapped when the last strong reference drops.
//! Both transitions happen under the tile's slot mutex, so a tile is mapped
//! and unmapped exactly once per mapping lifetime no matter how many holders
//! share it.

use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Weak,
        atomic::{AtomicUsize, Ordering},
    },
};

use parking_lot::{Condvar, Mutex, RwLock};
use tilestore_common::{RwMode, StorageResult};

use crate::{
    element::Element,
    seq::SequenceObj,
    view::{TileReadView, TileWriteView},
};

pub struct FileTile<E: Element> {
    seq: Arc<RwLock<SequenceObj<E>>>,
    slot: Mutex<Weak<TileMapping<E>>>,
    unmapped: Condvar,
    lock_mode: RwMode,
    path: Option<PathBuf>,
    maps: AtomicUsize,
    unmaps: AtomicUsize,
}

/// Proof that a file tile is mapped. Clones share one mapping.
pub struct TileMapping<E: Element> {
    tile: Arc<FileTile<E>>,
}

impl<E: Element> FileTile<E> {
    /// `seq` must be opened and unlocked.
    pub fn new(seq: SequenceObj<E>, lock_mode: RwMode) -> Arc<Self> {
        assert!(!seq.is_locked(), "file tile built from a locked sequence");
        let path = seq.file_name().map(Path::to_path_buf);
        Arc::new(FileTile {
            seq: Arc::new(RwLock::new(seq)),
            slot: Mutex::new(Weak::new()),
            unmapped: Condvar::new(),
            lock_mode,
            path,
            maps: AtomicUsize::new(0),
            unmaps: AtomicUsize::new(0),
        })
    }

    pub fn map(self: &Arc<Self>) -> StorageResult<Arc<TileMapping<E>>> {
        let mut slot = self.slot.lock();
        loop {
            if let Some(mapping) = slot.upgrade() {
                return Ok(mapping);
            }
            // the previous mapping lost its last holder but has not been torn
            // down yet
            if !self.seq.read().is_locked() {
                break;
            }
            self.unmapped.wait(&mut slot);
        }
        self.seq.write().lock(self.lock_mode)?;
        self.maps.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(path = ?self.path, "file tile mapped");
        let mapping = Arc::new(TileMapping {
            tile: Arc::clone(self),
        });
        *slot = Arc::downgrade(&mapping);
        Ok(mapping)
    }

    fn unmap(&self) {
        let _slot = self.slot.lock();
        let _ = self.seq.write().unlock();
        self.unmaps.fetch_add(1, Ordering::Relaxed);
        #[cfg(feature = "tracing")]
        tracing::trace!(path = ?self.path, "file tile unmapped");
        self.unmapped.notify_all();
    }

    pub fn read(self: &Arc<Self>) -> StorageResult<TileReadView<E>> {
        let mapping = self.map()?;
        let guard = mapping.tile.seq.read_arc();
        Ok(TileReadView::new(guard, Some(mapping)))
    }

    pub fn write(self: &Arc<Self>) -> StorageResult<TileWriteView<E>> {
        assert!(self.lock_mode.is_writable(), "write access to a read-only file tile");
        let mapping = self.map()?;
        let guard = mapping.tile.seq.write_arc();
        Ok(TileWriteView::new(guard, Some(mapping)))
    }

    pub fn is_mapped(&self) -> bool {
        self.slot.lock().strong_count() > 0
    }

    /// `(times mapped, times unmapped)` over the tile's life.
    pub fn mapping_counts(&self) -> (usize, usize) {
        (
            self.maps.load(Ordering::Relaxed),
            self.unmaps.load(Ordering::Relaxed),
        )
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Realized element count; maps the tile if nobody else has.
    pub fn len(self: &Arc<Self>) -> StorageResult<usize> {
        Ok(self.read()?.len())
    }

    /// Persists the tile under its final name. No view may be alive.
    pub fn commit(self: &Arc<Self>) -> StorageResult<()> {
        let mapping = self.map()?;
        let mut seq = mapping
            .tile
            .seq
            .try_write()
            .unwrap_or_else(|| panic!("commit of {:?} while a view is alive", self.path));
        seq.commit()
    }

    /// Discards the tile's file. No view may be alive.
    pub fn drop_storage(&self) -> StorageResult<()> {
        let slot = self.slot.lock();
        assert!(
            slot.strong_count() == 0,
            "drop of {:?} while it is mapped",
            self.path
        );
        self.seq.write().drop_storage()
    }
}

impl<E: Element> Drop for TileMapping<E> {
    fn drop(&mut self) {
        self.tile.unmap();
    }
}

impl<E: Element> std::fmt::Debug for FileTile<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let (maps, unmaps) = self.mapping_counts();
        f.debug_struct("FileTile")
            .field("path", &self.path)
            .field("maps", &maps)
            .field("unmaps", &unmaps)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{provider::MappedSequence, safe_writer::SafeWriterRegistry};
    use std::{sync::Barrier, thread};

    fn open_tile(path: &Path, n: usize) -> Arc<FileTile<i64>> {
        let mut seq = SequenceObj::<i64>::new(Box::new(MappedSequence::new(path)));
        seq.open(n, RwMode::WriteOnlyMustZero, true, Some(&SafeWriterRegistry::new()))
            .unwrap();
        FileTile::new(seq, RwMode::ReadWrite)
    }

    #[test]
    fn concurrent_holders_share_one_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let tile = open_tile(&dir.path().join("t.bin"), 64);
        let n = 8;
        let barrier = Arc::new(Barrier::new(n));
        let release = Arc::new(Barrier::new(n + 1));
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let (tile, barrier, release) = (tile.clone(), barrier.clone(), release.clone());
                thread::spawn(move || {
                    let view = tile.read().unwrap();
                    barrier.wait();
                    release.wait();
                    assert_eq!(view.len(), 64);
                })
            })
            .collect();
        // every thread now holds a view
        while tile.mapping_counts().0 == 0 {
            thread::yield_now();
        }
        assert_eq!(tile.mapping_counts(), (1, 0));
        assert!(tile.is_mapped());
        release.wait();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tile.mapping_counts(), (1, 1));
        assert!(!tile.is_mapped());
    }

    #[test]
    fn remaps_after_last_holder_leaves() {
        let dir = tempfile::tempdir().unwrap();
        let tile = open_tile(&dir.path().join("t.bin"), 4);
        {
            let mut w = tile.write().unwrap();
            w.set(1, 11).unwrap();
        }
        assert_eq!(tile.mapping_counts(), (1, 1));
        let a = tile.map().unwrap();
        let b = tile.map().unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(tile.read().unwrap().get(1).unwrap(), 11);
        drop(a);
        assert!(tile.is_mapped());
        drop(b);
        assert_eq!(tile.mapping_counts(), (2, 2));
    }
}
