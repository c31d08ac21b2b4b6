//! Contiguous whole-array buffers over multi-tile arrays.
//!
//! A shadow holds the lock of every underlying tile for its whole lifetime,
//! acquired in tile order: read locks for a [`ReadShadow`], write locks for a
//! [`WriteShadow`]. No other writer can touch the tiles while a shadow is
//! alive, so the copy-back of a write shadow never races with anything.

use std::sync::Arc;

use tilestore_common::{RwMode, StorageResult, TiledRange};

use super::TileFunctor;
use crate::{
    element::Element,
    seq::SequenceObj,
    view::{TileReadView, TileWriteView},
};

pub struct ReadShadow<E: Element> {
    buffer: SequenceObj<E>,
    _tiles: Vec<TileReadView<E>>,
}

impl<E: Element> ReadShadow<E> {
    pub fn new<F: TileFunctor<E> + ?Sized>(array: &F) -> StorageResult<Self> {
        let range = array.tiled_range();
        let tiles = range
            .tile_ids()
            .map(|t| array.get_tile(t))
            .collect::<StorageResult<Vec<_>>>()?;
        let mut buffer = SequenceObj::heap(range.range_size())?;
        for (t, view) in range.tile_ids().zip(&tiles) {
            let n = view.len().min(range.tile_size(t));
            buffer.copy_from(range.first_index(t), view.seq(), 0, n)?;
        }
        Ok(ReadShadow {
            buffer,
            _tiles: tiles,
        })
    }

    pub(crate) fn seq(&self) -> &SequenceObj<E> {
        &self.buffer
    }
}

pub struct WriteShadow<E: Element> {
    buffer: SequenceObj<E>,
    tiles: Vec<TileWriteView<E>>,
    range: Arc<TiledRange>,
    written_back: bool,
}

impl<E: Element> WriteShadow<E> {
    /// `ReadWrite` copies the current content in; the write-only modes start
    /// from a zeroed buffer.
    pub fn new<F: TileFunctor<E> + ?Sized>(array: &F, mode: RwMode) -> StorageResult<Self> {
        let range = Arc::clone(array.tiled_range());
        let tile_mode = if mode.keeps_content() {
            RwMode::ReadWrite
        } else {
            RwMode::WriteOnlyAll
        };
        let tiles = range
            .tile_ids()
            .map(|t| array.get_writable_tile(t, tile_mode))
            .collect::<StorageResult<Vec<_>>>()?;
        let mut buffer = SequenceObj::heap(range.range_size())?;
        if mode.keeps_content() {
            for (t, view) in range.tile_ids().zip(&tiles) {
                let n = view.len().min(range.tile_size(t));
                buffer.copy_from(range.first_index(t), view.seq(), 0, n)?;
            }
        }
        Ok(WriteShadow {
            buffer,
            tiles,
            range,
            written_back: false,
        })
    }

    pub(crate) fn seq(&self) -> &SequenceObj<E> {
        &self.buffer
    }

    pub(crate) fn seq_mut(&mut self) -> &mut SequenceObj<E> {
        &mut self.buffer
    }

    fn write_back(&mut self) -> StorageResult<()> {
        self.written_back = true;
        for (t, view) in self.range.tile_ids().zip(self.tiles.iter_mut()) {
            let n = view.len().min(self.range.tile_size(t));
            view.seq_mut()
                .copy_from(0, &self.buffer, self.range.first_index(t), n)?;
        }
        Ok(())
    }

    /// Copies the buffer out to the tiles and releases their locks.
    pub fn finish(mut self) -> StorageResult<()> {
        self.write_back()
    }
}

impl<E: Element> Drop for WriteShadow<E> {
    fn drop(&mut self) {
        if !self.written_back {
            let _ = self.write_back();
        }
    }
}
