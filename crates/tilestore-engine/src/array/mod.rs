//! Tiled arrays: the externally visible array abstraction.
//!
//! Every implementation hands out locked per-tile views; whole-array access
//! over more than one tile goes through a shadow buffer (see [`shadow`]).

use std::{fmt, path::PathBuf, sync::Arc};

use tilestore_common::{RwMode, StorageError, StorageResult, TileId, TiledRange};

use crate::{
    context::StoreContext,
    element::Element,
    seq::SequenceObj,
    view::{TileReadView, TileWriteView},
};

mod any;
mod file;
mod heap;
mod lazy;
pub mod shadow;

pub use any::{AnyTileArray, ArrayVisitor};
pub use file::{FileTileArray, tile_file_name, tile_suffix};
pub use heap::{HeapSingleArray, HeapSingleValue, HeapTileArray};
pub use lazy::{LazyTileFunctor, TileGenerator};
pub use shadow::{ReadShadow, WriteShadow};

/// Array of `E` partitioned by a [`TiledRange`].
pub trait TileFunctor<E: Element>: Send + Sync + fmt::Debug {
    fn tiled_range(&self) -> &Arc<TiledRange>;

    fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>>;

    /// `WriteOnlyMustZero` presents a zeroed tile; `WriteOnlyAll` leaves the
    /// content unspecified.
    fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>>;

    /// Checks that every tile holds exactly the number of elements the tiled
    /// range prescribes and makes file content durable.
    fn commit(&self) -> StorageResult<()>;

    /// Discards uncommitted backing storage.
    fn drop_storage(&self) -> StorageResult<()> {
        Ok(())
    }

    fn file_name(&self) -> Option<PathBuf> {
        None
    }

    fn is_file_backed(&self) -> bool {
        self.file_name().is_some()
    }

    fn can_write(&self) -> bool {
        true
    }
}

/// Which part of an array a data view covers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TileSel {
    Tile(TileId),
    All,
}

/// Storage choice made by the caller at array creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Persistence {
    Heap,
    /// File-backed, deleted when the array goes away.
    TmpFile,
    File(PathBuf),
    ReadOnlyFile(PathBuf),
}

impl Persistence {
    pub fn default_mode(&self) -> RwMode {
        match self {
            Persistence::Heap | Persistence::TmpFile => RwMode::WriteOnlyMustZero,
            Persistence::File(_) => RwMode::ReadWrite,
            Persistence::ReadOnlyFile(_) => RwMode::ReadOnly,
        }
    }
}

pub fn create_tile_array<E: Element>(
    ctx: &Arc<StoreContext>,
    range: Arc<TiledRange>,
    persistence: &Persistence,
) -> StorageResult<Arc<dyn TileFunctor<E>>> {
    create_tile_array_with_mode(ctx, range, persistence, persistence.default_mode())
}

/// Picks the cheapest strategy for the range: a single value, a single heap
/// tile, independent heap tiles, or one mapped file per tile.
pub fn create_tile_array_with_mode<E: Element>(
    ctx: &Arc<StoreContext>,
    range: Arc<TiledRange>,
    persistence: &Persistence,
    mode: RwMode,
) -> StorageResult<Arc<dyn TileFunctor<E>>> {
    Ok(match persistence {
        Persistence::Heap if range.is_single_tile() && range.range_size() == 1 => {
            Arc::new(HeapSingleValue::new(range)?)
        }
        Persistence::Heap if range.is_single_tile() => Arc::new(HeapSingleArray::new(range)?),
        Persistence::Heap => Arc::new(HeapTileArray::new(range)),
        Persistence::TmpFile => {
            let base = ctx.next_tmp_path(E::CLASS.name());
            Arc::new(FileTileArray::create(ctx, range, base, mode, true)?)
        }
        Persistence::File(base) => {
            Arc::new(FileTileArray::create(ctx, range, base.clone(), mode, false)?)
        }
        Persistence::ReadOnlyFile(base) => Arc::new(FileTileArray::create(
            ctx,
            range,
            base.clone(),
            RwMode::ReadOnly,
            false,
        )?),
    })
}

/// Compares realized tile lengths against the tiled range.
pub(crate) fn check_tile_size(range: &TiledRange, t: TileId, actual: usize) -> StorageResult<()> {
    let expected = range.tile_size(t);
    if actual != expected {
        return Err(StorageError::TileSizeMismatch {
            tile: t,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Read access to one tile or to the whole array.
pub enum DataRead<E: Element> {
    Tile(TileReadView<E>),
    Shadow(ReadShadow<E>),
}

impl<E: Element> DataRead<E> {
    fn seq(&self) -> &SequenceObj<E> {
        match self {
            DataRead::Tile(v) => v.seq(),
            DataRead::Shadow(s) => s.seq(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> StorageResult<E> {
        self.seq().get(index)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = E> + '_ {
        self.seq().iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.seq().to_vec()
    }

    pub fn blocks(&self) -> &[E::Block] {
        self.seq().blocks()
    }
}

/// Write access to one tile or to the whole array.
pub enum DataWrite<E: Element> {
    Tile(TileWriteView<E>),
    Shadow(WriteShadow<E>),
}

impl<E: Element> DataWrite<E> {
    fn seq(&self) -> &SequenceObj<E> {
        match self {
            DataWrite::Tile(v) => v.seq(),
            DataWrite::Shadow(s) => s.seq(),
        }
    }

    fn seq_mut(&mut self) -> &mut SequenceObj<E> {
        match self {
            DataWrite::Tile(v) => v.seq_mut(),
            DataWrite::Shadow(s) => s.seq_mut(),
        }
    }

    pub fn len(&self) -> usize {
        self.seq().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> StorageResult<E> {
        self.seq().get(index)
    }

    pub fn set(&mut self, index: usize, value: E) -> StorageResult<()> {
        self.seq_mut().set(index, value)
    }

    pub fn fill(&mut self, value: E) {
        self.seq_mut().fill(value)
    }

    pub fn write_slice(&mut self, offset: usize, values: &[E]) -> StorageResult<()> {
        self.seq_mut().write_slice(offset, values)
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.seq().to_vec()
    }

    pub fn blocks_mut(&mut self) -> &mut [E::Block] {
        self.seq_mut().blocks_mut()
    }

    /// Writes a shadow back to its tiles now, reporting copy errors that a
    /// plain drop would have to swallow.
    pub fn finish(self) -> StorageResult<()> {
        match self {
            DataWrite::Tile(_) => Ok(()),
            DataWrite::Shadow(s) => s.finish(),
        }
    }
}

/// Whole-array and element-level conveniences available on every tiled
/// array.
pub trait TileFunctorExt<E: Element>: TileFunctor<E> {
    fn nr_tiles(&self) -> usize {
        self.tiled_range().nr_tiles()
    }

    fn get_data_read(&self, sel: TileSel) -> StorageResult<DataRead<E>> {
        match sel {
            TileSel::Tile(t) => Ok(DataRead::Tile(self.get_tile(t)?)),
            TileSel::All if self.tiled_range().is_single_tile() => {
                Ok(DataRead::Tile(self.get_tile(0)?))
            }
            TileSel::All => Ok(DataRead::Shadow(ReadShadow::new(self)?)),
        }
    }

    fn get_data_write(&self, sel: TileSel, mode: RwMode) -> StorageResult<DataWrite<E>> {
        match sel {
            TileSel::Tile(t) => Ok(DataWrite::Tile(self.get_writable_tile(t, mode)?)),
            TileSel::All if self.tiled_range().is_single_tile() => {
                Ok(DataWrite::Tile(self.get_writable_tile(0, mode)?))
            }
            TileSel::All => Ok(DataWrite::Shadow(WriteShadow::new(self, mode)?)),
        }
    }

    fn get_value(&self, index: usize) -> StorageResult<E> {
        let (t, offset) = self.tiled_range().tiled_location(index)?;
        self.get_tile(t)?.get(offset)
    }

    fn set_value(&self, index: usize, value: E) -> StorageResult<()> {
        let (t, offset) = self.tiled_range().tiled_location(index)?;
        self.get_writable_tile(t, RwMode::ReadWrite)?
            .set(offset, value)
    }

    /// Contiguous copy of the whole array.
    fn read_all(&self) -> StorageResult<Vec<E>> {
        Ok(self.get_data_read(TileSel::All)?.to_vec())
    }

    /// Overwrites the whole array with `values`, one element per index.
    fn write_all(&self, values: &[E]) -> StorageResult<()> {
        let size = self.tiled_range().range_size();
        if values.len() != size {
            return Err(StorageError::IndexOutOfRange {
                index: values.len(),
                len: size,
            });
        }
        let mut all = self.get_data_write(TileSel::All, RwMode::WriteOnlyAll)?;
        all.write_slice(0, values)?;
        all.finish()
    }
}

impl<E: Element, T: TileFunctor<E> + ?Sized> TileFunctorExt<E> for T {}
