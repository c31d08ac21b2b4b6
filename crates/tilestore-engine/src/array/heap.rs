use std::sync::Arc;

use once_cell::sync::OnceCell;
use tilestore_common::{RwMode, StorageError, StorageResult, TileId, TiledRange};

use super::{TileFunctor, check_tile_size};
use crate::{
    element::Element,
    tile::Tile,
    view::{TileReadView, TileWriteView},
};

fn zero_if_required<E: Element>(view: &mut TileWriteView<E>, mode: RwMode, fresh: bool) {
    if mode.must_zero() && !fresh {
        view.fill(E::default());
    }
}

/// Independent heap tiles, each allocated on first access.
pub struct HeapTileArray<E: Element> {
    range: Arc<TiledRange>,
    tiles: Box<[OnceCell<Tile<E>>]>,
}

impl<E: Element> HeapTileArray<E> {
    pub fn new(range: Arc<TiledRange>) -> Self {
        let tiles = (0..range.nr_tiles()).map(|_| OnceCell::new()).collect();
        HeapTileArray { range, tiles }
    }

    /// Returns the tile and whether this call allocated it.
    fn tile(&self, t: TileId) -> StorageResult<(&Tile<E>, bool)> {
        self.range.check_tile(t)?;
        let cell = &self.tiles[t as usize];
        let mut fresh = false;
        let tile = cell.get_or_try_init(|| {
            fresh = true;
            Tile::heap(self.range.tile_size(t))
        })?;
        Ok((tile, fresh))
    }

    pub fn nr_allocated(&self) -> usize {
        self.tiles.iter().filter(|c| c.get().is_some()).count()
    }
}

impl<E: Element> TileFunctor<E> for HeapTileArray<E> {
    fn tiled_range(&self) -> &Arc<TiledRange> {
        &self.range
    }

    fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>> {
        Ok(self.tile(t)?.0.read())
    }

    fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>> {
        let (tile, fresh) = self.tile(t)?;
        let mut view = tile.write();
        zero_if_required(&mut view, mode, fresh);
        Ok(view)
    }

    fn commit(&self) -> StorageResult<()> {
        // tiles never touched are allocated at their prescribed size on demand
        for (t, cell) in self.tiles.iter().enumerate() {
            if let Some(tile) = cell.get() {
                let view = tile
                    .try_read()
                    .unwrap_or_else(|| panic!("commit while tile {t} is write-locked"));
                check_tile_size(&self.range, t as TileId, view.len())?;
            }
        }
        Ok(())
    }
}

impl<E: Element> std::fmt::Debug for HeapTileArray<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapTileArray")
            .field("nr_tiles", &self.range.nr_tiles())
            .field("allocated", &self.nr_allocated())
            .finish()
    }
}

/// The whole range in one heap tile.
pub struct HeapSingleArray<E: Element> {
    range: Arc<TiledRange>,
    tile: Tile<E>,
}

impl<E: Element> HeapSingleArray<E> {
    pub fn new(range: Arc<TiledRange>) -> StorageResult<Self> {
        assert!(range.is_single_tile(), "HeapSingleArray needs a single-tile range");
        let tile = Tile::heap(range.range_size())?;
        Ok(HeapSingleArray { range, tile })
    }
}

impl<E: Element> TileFunctor<E> for HeapSingleArray<E> {
    fn tiled_range(&self) -> &Arc<TiledRange> {
        &self.range
    }

    fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>> {
        self.range.check_tile(t)?;
        Ok(self.tile.read())
    }

    fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>> {
        self.range.check_tile(t)?;
        let mut view = self.tile.write();
        zero_if_required(&mut view, mode, false);
        Ok(view)
    }

    fn commit(&self) -> StorageResult<()> {
        let view = self
            .tile
            .try_read()
            .unwrap_or_else(|| panic!("commit while the tile is write-locked"));
        check_tile_size(&self.range, 0, view.len())
    }
}

impl<E: Element> std::fmt::Debug for HeapSingleArray<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeapSingleArray")
            .field("size", &self.range.range_size())
            .finish()
    }
}

/// A range of exactly one element.
pub struct HeapSingleValue<E: Element> {
    range: Arc<TiledRange>,
    tile: Tile<E>,
}

impl<E: Element> HeapSingleValue<E> {
    pub fn new(range: Arc<TiledRange>) -> StorageResult<Self> {
        if range.range_size() != 1 || !range.is_single_tile() {
            return Err(StorageError::CapacityExceeded {
                requested: range.range_size(),
                capacity: 1,
            });
        }
        Ok(HeapSingleValue {
            range,
            tile: Tile::single_value()?,
        })
    }

    pub fn value(&self) -> StorageResult<E> {
        self.tile.read().get(0)
    }
}

impl<E: Element> TileFunctor<E> for HeapSingleValue<E> {
    fn tiled_range(&self) -> &Arc<TiledRange> {
        &self.range
    }

    fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>> {
        self.range.check_tile(t)?;
        Ok(self.tile.read())
    }

    fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>> {
        self.range.check_tile(t)?;
        let mut view = self.tile.write();
        zero_if_required(&mut view, mode, false);
        Ok(view)
    }

    fn commit(&self) -> StorageResult<()> {
        let view = self
            .tile
            .try_read()
            .unwrap_or_else(|| panic!("commit while the value is write-locked"));
        check_tile_size(&self.range, 0, view.len())
    }
}

impl<E: Element> std::fmt::Debug for HeapSingleValue<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("HeapSingleValue")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::{TileFunctorExt, TileSel};

    #[test]
    fn tiles_are_allocated_lazily() {
        let range = Arc::new(TiledRange::regular(10, 4).unwrap());
        let arr = HeapTileArray::<u8>::new(range);
        assert_eq!(arr.nr_allocated(), 0);
        assert_eq!(arr.get_tile(2).unwrap().len(), 2);
        assert_eq!(arr.nr_allocated(), 1);
        assert!(matches!(
            arr.get_tile(3),
            Err(StorageError::NoSuchTile { tile: 3, .. })
        ));
        arr.commit().unwrap();
    }

    #[test]
    fn must_zero_clears_existing_tile() {
        let range = Arc::new(TiledRange::regular(8, 4).unwrap());
        let arr = HeapTileArray::<i16>::new(range);
        arr.get_writable_tile(1, RwMode::WriteOnlyAll)
            .unwrap()
            .fill(5);
        let view = arr.get_writable_tile(1, RwMode::WriteOnlyMustZero).unwrap();
        assert_eq!(view.to_vec(), vec![0; 4]);
        drop(view);
        arr.get_writable_tile(1, RwMode::ReadWrite).unwrap().set(0, 3).unwrap();
        assert_eq!(arr.get_tile(1).unwrap().to_vec(), vec![3, 0, 0, 0]);
    }

    #[test]
    fn commit_rejects_resized_tile() {
        let range = Arc::new(TiledRange::regular(8, 4).unwrap());
        let arr = HeapTileArray::<f32>::new(range);
        arr.get_writable_tile(0, RwMode::ReadWrite).unwrap().push(1.0).unwrap();
        let err = arr.commit().unwrap_err();
        assert!(matches!(
            err,
            StorageError::TileSizeMismatch {
                tile: 0,
                expected: 4,
                actual: 5
            }
        ));
    }

    #[test]
    fn single_value_round_trip() {
        let arr = HeapSingleValue::<u64>::new(Arc::new(TiledRange::single(1))).unwrap();
        arr.set_value(0, 77).unwrap();
        assert_eq!(arr.value().unwrap(), 77);
        assert!(HeapSingleValue::<u64>::new(Arc::new(TiledRange::single(2))).is_err());
    }

    #[test]
    fn single_array_whole_access_needs_no_shadow() {
        let arr = HeapSingleArray::<u32>::new(Arc::new(TiledRange::single(3))).unwrap();
        let data = arr.get_data_read(TileSel::All).unwrap();
        assert!(matches!(data, crate::array::DataRead::Tile(_)));
        assert_eq!(data.len(), 3);
    }
}
