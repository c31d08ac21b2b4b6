//! Locked views of a single tile.
//!
//! A view owns the tile's lock guard for as long as it lives, and for file
//! tiles also a share of the tile's mapping, so the memory it exposes stays
//! valid without borrowing the array it came from.

use std::sync::Arc;

use parking_lot::{
    RawRwLock,
    lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard},
};
use tilestore_common::StorageResult;

use crate::{
    element::{Element, FixedElement},
    file_tiles::TileMapping,
    seq::SequenceObj,
};

pub(crate) type ReadGuard<E> = ArcRwLockReadGuard<RawRwLock, SequenceObj<E>>;
pub(crate) type WriteGuard<E> = ArcRwLockWriteGuard<RawRwLock, SequenceObj<E>>;

/// Shared, read-locked access to one tile.
pub struct TileReadView<E: Element> {
    // dropped before the mapping it points into
    guard: ReadGuard<E>,
    _mapping: Option<Arc<TileMapping<E>>>,
}

impl<E: Element> TileReadView<E> {
    pub(crate) fn new(guard: ReadGuard<E>, mapping: Option<Arc<TileMapping<E>>>) -> Self {
        TileReadView {
            guard,
            _mapping: mapping,
        }
    }

    pub(crate) fn seq(&self) -> &SequenceObj<E> {
        &self.guard
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }

    pub fn get(&self, index: usize) -> StorageResult<E> {
        self.guard.get(index)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = E> + '_ {
        self.guard.iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.guard.to_vec()
    }

    pub fn blocks(&self) -> &[E::Block] {
        self.guard.blocks()
    }

    pub fn content_eq(&self, other: &TileReadView<E>) -> bool {
        self.guard.content_eq(&other.guard)
    }
}

impl<E: FixedElement> TileReadView<E> {
    pub fn as_slice(&self) -> &[E] {
        self.guard.as_slice()
    }
}

impl<E: Element> std::fmt::Debug for TileReadView<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileReadView")
            .field("len", &self.len())
            .finish()
    }
}

/// Exclusive, write-locked access to one tile.
pub struct TileWriteView<E: Element> {
    guard: WriteGuard<E>,
    _mapping: Option<Arc<TileMapping<E>>>,
}

impl<E: Element> TileWriteView<E> {
    pub(crate) fn new(guard: WriteGuard<E>, mapping: Option<Arc<TileMapping<E>>>) -> Self {
        TileWriteView {
            guard,
            _mapping: mapping,
        }
    }

    pub(crate) fn seq(&self) -> &SequenceObj<E> {
        &self.guard
    }

    pub(crate) fn seq_mut(&mut self) -> &mut SequenceObj<E> {
        &mut self.guard
    }

    pub fn len(&self) -> usize {
        self.guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard.is_empty()
    }

    pub fn get(&self, index: usize) -> StorageResult<E> {
        self.guard.get(index)
    }

    pub fn set(&mut self, index: usize, value: E) -> StorageResult<()> {
        self.guard.set(index, value)
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = E> + '_ {
        self.guard.iter()
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.guard.to_vec()
    }

    pub fn fill(&mut self, value: E) {
        self.guard.fill(value)
    }

    pub fn write_slice(&mut self, offset: usize, values: &[E]) -> StorageResult<()> {
        self.guard.write_slice(offset, values)
    }

    pub fn resize(&mut self, new_size: usize, must_clear: bool) -> StorageResult<()> {
        self.guard.resize(new_size, must_clear)
    }

    pub fn cut(&mut self, new_size: usize) {
        self.guard.cut(new_size)
    }

    pub fn push(&mut self, value: E) -> StorageResult<()> {
        self.guard.push(value)
    }

    pub fn blocks(&self) -> &[E::Block] {
        self.guard.blocks()
    }

    pub fn blocks_mut(&mut self) -> &mut [E::Block] {
        self.guard.blocks_mut()
    }
}

impl<E: FixedElement> TileWriteView<E> {
    pub fn as_slice(&self) -> &[E] {
        self.guard.as_slice()
    }

    pub fn as_mut_slice(&mut self) -> &mut [E] {
        self.guard.as_mut_slice()
    }
}

impl<E: Element> std::fmt::Debug for TileWriteView<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileWriteView")
            .field("len", &self.len())
            .finish()
    }
}
