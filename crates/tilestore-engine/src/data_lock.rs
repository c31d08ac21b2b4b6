//! Read/write lock discipline over a named, committed array.
//!
//! A [`DataItem`] publishes at most one committed array. Readers take a
//! snapshot of it; a writer builds a replacement that only becomes visible
//! when [`DataWriteLock::commit`] succeeds. A write lock released without
//! commit discards its array, leaving the previous committed state intact.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};
use tilestore_common::{RwMode, StorageError, StorageResult, TileId, TiledRange};

use crate::{
    array::{
        DataRead, DataWrite, Persistence, TileFunctor, TileFunctorExt, TileSel,
        create_tile_array_with_mode,
    },
    context::StoreContext,
    element::Element,
    locks::{LeveledMutex, LockLevel},
    view::{TileReadView, TileWriteView},
};

pub struct DataItem<E: Element> {
    name: String,
    ctx: Arc<StoreContext>,
    range: Arc<TiledRange>,
    persistence: Persistence,
    committed: LeveledMutex<Option<Arc<dyn TileFunctor<E>>>>,
    writer: Mutex<()>,
}

impl<E: Element> DataItem<E> {
    pub fn new(
        ctx: &Arc<StoreContext>,
        name: impl Into<String>,
        range: Arc<TiledRange>,
        persistence: Persistence,
    ) -> Self {
        DataItem {
            name: name.into(),
            ctx: Arc::clone(ctx),
            range,
            persistence,
            committed: LeveledMutex::new(LockLevel::DataItem, None),
            writer: Mutex::new(()),
        }
    }

    /// Item whose committed content is an existing file array at `path`.
    /// Later write locks write to the same path.
    pub fn open_file(
        ctx: &Arc<StoreContext>,
        name: impl Into<String>,
        range: Arc<TiledRange>,
        path: impl Into<std::path::PathBuf>,
    ) -> StorageResult<Self> {
        let path = path.into();
        let existing = create_tile_array_with_mode::<E>(
            ctx,
            Arc::clone(&range),
            &Persistence::ReadOnlyFile(path.clone()),
            RwMode::ReadOnly,
        )?;
        let item = Self::new(ctx, name, range, Persistence::File(path));
        *item.committed.lock() = Some(existing);
        Ok(item)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tiled_range(&self) -> &Arc<TiledRange> {
        &self.range
    }

    pub fn persistence(&self) -> &Persistence {
        &self.persistence
    }

    pub fn is_committed(&self) -> bool {
        self.committed.lock().is_some()
    }

    fn committed(&self) -> Option<Arc<dyn TileFunctor<E>>> {
        self.committed.lock().clone()
    }

    /// Snapshot of the committed array. Stays valid across later commits.
    pub fn read_lock(&self) -> StorageResult<DataReadLock<E>> {
        self.committed()
            .map(|array| DataReadLock { array })
            .ok_or_else(|| StorageError::NoData(self.name.clone()))
    }

    /// Waits for any other writer of this item, then prepares a fresh array.
    pub fn write_lock(&self, mode: RwMode) -> StorageResult<DataWriteLock<'_, E>> {
        let gate = self.writer.lock();
        self.begin_write(gate, mode)
    }

    /// `None` when another write lock on this item is alive.
    pub fn try_write_lock(&self, mode: RwMode) -> StorageResult<Option<DataWriteLock<'_, E>>> {
        match self.writer.try_lock() {
            Some(gate) => self.begin_write(gate, mode).map(Some),
            None => Ok(None),
        }
    }

    fn begin_write<'a>(
        &'a self,
        gate: MutexGuard<'a, ()>,
        mode: RwMode,
    ) -> StorageResult<DataWriteLock<'a, E>> {
        assert!(
            matches!(
                mode,
                RwMode::ReadWrite | RwMode::WriteOnlyAll | RwMode::WriteOnlyMustZero
            ),
            "write lock on {} with mode {mode:?}",
            self.name
        );
        assert!(
            !matches!(self.persistence, Persistence::ReadOnlyFile(_)),
            "write lock on read-only item {}",
            self.name
        );
        #[cfg(feature = "tracing")]
        tracing::debug!(item = %self.name, ?mode, "write lock");
        let array = create_tile_array_with_mode::<E>(
            &self.ctx,
            Arc::clone(&self.range),
            &self.persistence,
            mode,
        )?;
        let lock = DataWriteLock {
            item: self,
            array,
            committed: false,
            _gate: gate,
        };
        // persistent file writers copy the previous content through the safe writer
        if mode == RwMode::ReadWrite
            && !matches!(self.persistence, Persistence::File(_))
            && let Some(prev) = self.committed()
        {
            lock.copy_from(prev.as_ref())?;
        }
        Ok(lock)
    }
}

impl<E: Element> std::fmt::Debug for DataItem<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataItem")
            .field("name", &self.name)
            .field("persistence", &self.persistence)
            .field("committed", &self.is_committed())
            .finish()
    }
}

/// Shared read access to a committed array.
#[derive(Debug, Clone)]
pub struct DataReadLock<E: Element> {
    array: Arc<dyn TileFunctor<E>>,
}

impl<E: Element> DataReadLock<E> {
    pub fn array(&self) -> &Arc<dyn TileFunctor<E>> {
        &self.array
    }

    pub fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>> {
        self.array.get_tile(t)
    }

    pub fn get_data_read(&self, sel: TileSel) -> StorageResult<DataRead<E>> {
        self.array.get_data_read(sel)
    }

    pub fn get_value(&self, index: usize) -> StorageResult<E> {
        self.array.get_value(index)
    }
}

/// Exclusive write access to an uncommitted replacement array.
pub struct DataWriteLock<'a, E: Element> {
    item: &'a DataItem<E>,
    array: Arc<dyn TileFunctor<E>>,
    committed: bool,
    _gate: MutexGuard<'a, ()>,
}

impl<E: Element> DataWriteLock<'_, E> {
    pub fn array(&self) -> &Arc<dyn TileFunctor<E>> {
        &self.array
    }

    pub fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>> {
        self.array.get_writable_tile(t, mode)
    }

    pub fn get_data_write(&self, sel: TileSel, mode: RwMode) -> StorageResult<DataWrite<E>> {
        self.array.get_data_write(sel, mode)
    }

    pub fn set_value(&self, index: usize, value: E) -> StorageResult<()> {
        self.array.set_value(index, value)
    }

    fn copy_from(&self, prev: &dyn TileFunctor<E>) -> StorageResult<()> {
        let (range, array) = (&self.item.range, &self.array);
        self.item
            .ctx
            .tile_loop()
            .try_parallel_tileloop(range.nr_tiles(), |t| {
                let src = prev.get_tile(t)?;
                let mut dst = array.get_writable_tile(t, RwMode::WriteOnlyAll)?;
                let n = src.len().min(range.tile_size(t));
                dst.seq_mut().copy_from(0, src.seq(), 0, n)
            })
    }

    /// Checks the array and publishes it as the item's committed state.
    /// On failure the lock is consumed and the write rolled back.
    pub fn commit(mut self) -> StorageResult<()> {
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("data_commit", item = %self.item.name).entered();
        self.array.commit()?;
        *self.item.committed.lock() = Some(Arc::clone(&self.array));
        self.committed = true;
        Ok(())
    }
}

impl<E: Element> Drop for DataWriteLock<'_, E> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(item = %self.item.name, "write lock released without commit");
        if let Err(_e) = self.array.drop_storage() {
            #[cfg(feature = "tracing")]
            tracing::warn!(item = %self.item.name, error = %_e, "rollback failed");
        }
    }
}

impl<E: Element> std::fmt::Debug for DataWriteLock<'_, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataWriteLock")
            .field("item", &self.item.name)
            .field("array", &self.array)
            .finish()
    }
}
