//! Partitioning of a logical index domain into tiles.

use crate::{StorageError, StorageResult};

pub type TileId = u32;

/// Ordered partition of `[0, range_size)` into tiles.
///
/// Immutable after construction; arrays share it through `Arc`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TiledRange {
    /// `starts[t]` is the first index of tile `t`; the final entry is the
    /// range size.
    starts: Vec<usize>,
}

impl TiledRange {
    /// One tile covering the whole range.
    pub fn single(size: usize) -> Self {
        TiledRange {
            starts: vec![0, size],
        }
    }

    /// Tiles of `tile_size` elements, the last one possibly shorter.
    pub fn regular(size: usize, tile_size: usize) -> StorageResult<Self> {
        if tile_size == 0 {
            return Err(StorageError::ZeroTileSize { size });
        }
        if size == 0 {
            return Ok(Self::single(0));
        }
        let nr_tiles = size.div_ceil(tile_size);
        if TileId::try_from(nr_tiles).is_err() {
            return Err(StorageError::Overflow { what: "tile count" });
        }
        let mut starts: Vec<usize> = (0..nr_tiles).map(|t| t * tile_size).collect();
        starts.push(size);
        Ok(TiledRange { starts })
    }

    pub fn from_tile_sizes<I>(sizes: I) -> StorageResult<Self>
    where
        I: IntoIterator<Item = usize>,
    {
        let mut starts = vec![0usize];
        let mut acc = 0usize;
        for s in sizes {
            acc = acc
                .checked_add(s)
                .ok_or(StorageError::Overflow { what: "tile sizes" })?;
            starts.push(acc);
        }
        if starts.len() == 1 {
            starts.push(0);
        }
        if TileId::try_from(starts.len() - 1).is_err() {
            return Err(StorageError::Overflow { what: "tile count" });
        }
        Ok(TiledRange { starts })
    }

    pub fn nr_tiles(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn is_single_tile(&self) -> bool {
        self.nr_tiles() == 1
    }

    pub fn range_size(&self) -> usize {
        self.starts[self.nr_tiles()]
    }

    pub fn tile_size(&self, t: TileId) -> usize {
        let t = t as usize;
        self.starts[t + 1] - self.starts[t]
    }

    pub fn max_tile_size(&self) -> usize {
        self.starts
            .windows(2)
            .map(|w| w[1] - w[0])
            .max()
            .unwrap_or(0)
    }

    pub fn first_index(&self, t: TileId) -> usize {
        self.starts[t as usize]
    }

    pub fn contains_tile(&self, t: TileId) -> bool {
        (t as usize) < self.nr_tiles()
    }

    pub fn check_tile(&self, t: TileId) -> StorageResult<()> {
        if self.contains_tile(t) {
            Ok(())
        } else {
            Err(StorageError::NoSuchTile {
                tile: t,
                nr_tiles: self.nr_tiles(),
            })
        }
    }

    /// Maps a global index to `(tile, offset within tile)`.
    pub fn tiled_location(&self, index: usize) -> StorageResult<(TileId, usize)> {
        if index >= self.range_size() {
            return Err(StorageError::IndexOutOfRange {
                index,
                len: self.range_size(),
            });
        }
        // last start that is <= index; empty tiles share a start with their
        // successor and are skipped by taking the last match
        let t = self.starts.partition_point(|&s| s <= index) - 1;
        Ok((t as TileId, index - self.starts[t]))
    }

    pub fn row_index(&self, t: TileId, offset: usize) -> usize {
        debug_assert!(offset <= self.tile_size(t));
        self.first_index(t) + offset
    }

    pub fn tile_ids(&self) -> impl ExactSizeIterator<Item = TileId> + use<> {
        0..self.nr_tiles() as TileId
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn zero_tile_size_is_an_error() {
        assert!(matches!(
            TiledRange::regular(10, 0),
            Err(StorageError::ZeroTileSize { size: 10 })
        ));
        assert!(TiledRange::regular(0, 0).is_err());
    }

    #[test]
    fn regular_partition_has_short_tail() {
        let r = TiledRange::regular(100_000, 25_000).unwrap();
        assert_eq!(r.nr_tiles(), 4);
        assert_eq!(r.tile_size(2), 25_000);
        assert_eq!(r.first_index(2), 50_000);

        let r = TiledRange::regular(10, 4).unwrap();
        assert_eq!(r.nr_tiles(), 3);
        assert_eq!(r.tile_size(2), 2);
        assert_eq!(r.max_tile_size(), 4);
        assert_eq!(r.tiled_location(9).unwrap(), (2, 1));
        assert!(r.tiled_location(10).is_err());
    }

    #[test]
    fn empty_tiles_are_skipped_by_location() {
        let r = TiledRange::from_tile_sizes([3, 0, 2]).unwrap();
        assert_eq!(r.range_size(), 5);
        assert_eq!(r.tiled_location(3).unwrap(), (2, 0));
        assert!(r.check_tile(3).is_err());
    }

    #[test]
    fn accumulation_overflow_is_reported() {
        let err = TiledRange::from_tile_sizes([usize::MAX, 1]).unwrap_err();
        assert!(matches!(err, StorageError::Overflow { .. }));
    }

    #[test]
    fn empty_domain_has_one_empty_tile() {
        let r = TiledRange::regular(0, 16).unwrap();
        assert_eq!(r.nr_tiles(), 1);
        assert_eq!(r.range_size(), 0);
        let r = TiledRange::from_tile_sizes(Vec::new()).unwrap();
        assert_eq!(r.nr_tiles(), 1);
    }

    proptest! {
        #[test]
        fn location_inverts_row_index(size in 1usize..5000, tile in 1usize..700, pick in 0usize..5000) {
            let r = TiledRange::regular(size, tile).unwrap();
            let index = pick % size;
            let (t, off) = r.tiled_location(index).unwrap();
            prop_assert!(off < r.tile_size(t));
            prop_assert_eq!(r.row_index(t, off), index);
        }
    }
}
