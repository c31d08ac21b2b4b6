use std::{
    fmt::Write as _,
    path::{Path, PathBuf},
    sync::Arc,
};

use tilestore_common::{RwMode, StorageResult, TileId, TiledRange};

use super::{TileFunctor, check_tile_size};
use crate::{
    context::StoreContext,
    element::Element,
    file_tiles::FileTile,
    provider::{ConstMappedSequence, MappedSequence, SequenceProvider},
    seq::SequenceObj,
    view::{TileReadView, TileWriteView},
};

/// `/t<hex>.` for each byte of `t`, least significant first.
pub fn tile_suffix(mut t: TileId) -> String {
    let mut suffix = String::new();
    loop {
        let _ = write!(suffix, "/t{:x}.", t % 0x100);
        t /= 0x100;
        if t == 0 {
            break;
        }
    }
    suffix
}

/// File of tile `t`. A single-tile array lives at `base` itself; otherwise
/// `base` is a directory and every tile gets its suffix, tile 0 included,
/// since `base` cannot be a file and a directory at once.
pub fn tile_file_name(base: &Path, t: TileId, nr_tiles: usize) -> PathBuf {
    if nr_tiles == 1 {
        return base.to_path_buf();
    }
    let mut name = base.as_os_str().to_owned();
    name.push(tile_suffix(t));
    PathBuf::from(name)
}

/// Removes `dir` and its subdirectories bottom-up, as far as they are empty.
/// Anything still holding a file stays.
fn prune_empty_dirs(dir: &Path) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            prune_empty_dirs(&path);
        }
    }
    let _ = std::fs::remove_dir(dir);
}

/// One mapped file per tile.
pub struct FileTileArray<E: Element> {
    range: Arc<TiledRange>,
    base: PathBuf,
    tiles: Box<[Arc<FileTile<E>>]>,
    mode: RwMode,
    is_tmp: bool,
}

impl<E: Element> FileTileArray<E> {
    /// Opens every tile file. Read-only and check-only modes require the
    /// files to exist with the expected sizes; writable modes create them.
    pub fn create(
        ctx: &Arc<StoreContext>,
        range: Arc<TiledRange>,
        base: PathBuf,
        mode: RwMode,
        is_tmp: bool,
    ) -> StorageResult<Self> {
        let nr_tiles = range.nr_tiles();
        let lock_mode = if mode.is_writable() {
            RwMode::ReadWrite
        } else {
            RwMode::ReadOnly
        };
        let mut tiles = Vec::with_capacity(nr_tiles);
        for t in range.tile_ids() {
            let path = tile_file_name(&base, t, nr_tiles);
            let provider: Box<dyn SequenceProvider<E>> = if mode.is_writable() {
                Box::new(MappedSequence::new(path))
            } else {
                Box::new(ConstMappedSequence::new(path))
            };
            let mut seq = SequenceObj::new(provider);
            seq.open(range.tile_size(t), mode, is_tmp, Some(ctx.writers()))?;
            tiles.push(FileTile::new(seq, lock_mode));
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(base = ?base, nr_tiles, ?mode, is_tmp, "opened file tile array");
        Ok(FileTileArray {
            range,
            base,
            tiles: tiles.into_boxed_slice(),
            mode,
            is_tmp,
        })
    }

    pub fn tile(&self, t: TileId) -> StorageResult<&Arc<FileTile<E>>> {
        self.range.check_tile(t)?;
        Ok(&self.tiles[t as usize])
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn is_tmp(&self) -> bool {
        self.is_tmp
    }

    pub fn nr_mapped(&self) -> usize {
        self.tiles.iter().filter(|t| t.is_mapped()).count()
    }

    fn owns_tile_dir(&self) -> bool {
        self.mode.is_writable() && self.range.nr_tiles() > 1
    }
}

impl<E: Element> TileFunctor<E> for FileTileArray<E> {
    fn tiled_range(&self) -> &Arc<TiledRange> {
        &self.range
    }

    fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>> {
        self.tile(t)?.read()
    }

    fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>> {
        assert!(self.mode.is_writable(), "write access to read-only array {:?}", self.base);
        let mut view = self.tile(t)?.write()?;
        if mode.must_zero() {
            view.fill(E::default());
        }
        Ok(view)
    }

    fn commit(&self) -> StorageResult<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        let _span = tracing::info_span!("file_array_commit", base = ?self.base).entered();
        for (t, tile) in self.tiles.iter().enumerate() {
            check_tile_size(&self.range, t as TileId, tile.len()?)?;
        }
        for tile in self.tiles.iter() {
            tile.commit()?;
        }
        Ok(())
    }

    fn drop_storage(&self) -> StorageResult<()> {
        if !self.mode.is_writable() {
            return Ok(());
        }
        let mut first_err = None;
        for tile in self.tiles.iter() {
            if let Err(e) = tile.drop_storage() {
                first_err.get_or_insert(e);
            }
        }
        if self.owns_tile_dir() {
            prune_empty_dirs(&self.base);
        }
        first_err.map_or(Ok(()), Err)
    }

    fn file_name(&self) -> Option<PathBuf> {
        Some(self.base.clone())
    }

    fn can_write(&self) -> bool {
        self.mode.is_writable()
    }
}

impl<E: Element> Drop for FileTileArray<E> {
    fn drop(&mut self) {
        if !self.owns_tile_dir() {
            return;
        }
        // tiles remove their temporary files as they go
        drop(std::mem::take(&mut self.tiles));
        prune_empty_dirs(&self.base);
    }
}

impl<E: Element> std::fmt::Debug for FileTileArray<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileTileArray")
            .field("base", &self.base)
            .field("nr_tiles", &self.range.nr_tiles())
            .field("mode", &self.mode)
            .field("is_tmp", &self.is_tmp)
            .finish()
    }
}
