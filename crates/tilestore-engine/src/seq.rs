//! A provider together with the block it manages.

use std::{cmp::Ordering, path::Path, sync::Arc};

use tilestore_common::{RwMode, StorageError, StorageResult};

use crate::{
    alloc::AllocBlock,
    element::{Element, FixedElement},
    provider::{HeapSequence, SequenceProvider, SingleValueSequence},
    safe_writer::SafeWriterRegistry,
};

/// Element storage that may only be dereferenced while locked.
#[derive(Debug)]
pub struct SequenceObj<E: Element> {
    provider: Box<dyn SequenceProvider<E>>,
    block: AllocBlock<E>,
    locked: Option<RwMode>,
}

impl<E: Element> SequenceObj<E> {
    pub fn new(provider: Box<dyn SequenceProvider<E>>) -> Self {
        SequenceObj {
            provider,
            block: AllocBlock::empty(),
            locked: None,
        }
    }

    /// Opened and locked heap storage of `nr_elem` zeroed elements.
    pub fn heap(nr_elem: usize) -> StorageResult<Self> {
        Self::resident(Box::new(HeapSequence::new()), nr_elem)
    }

    pub fn single_value() -> StorageResult<Self> {
        Self::resident(Box::new(SingleValueSequence::new()), 1)
    }

    fn resident(provider: Box<dyn SequenceProvider<E>>, nr_elem: usize) -> StorageResult<Self> {
        let mut seq = Self::new(provider);
        seq.open(nr_elem, RwMode::WriteOnlyMustZero, true, None)?;
        seq.lock(RwMode::ReadWrite)?;
        Ok(seq)
    }

    pub fn open(
        &mut self,
        nr_elem: usize,
        mode: RwMode,
        is_tmp: bool,
        writers: Option<&Arc<SafeWriterRegistry>>,
    ) -> StorageResult<()> {
        assert!(self.locked.is_none(), "open of a locked sequence");
        self.provider
            .open(&mut self.block, nr_elem, mode, is_tmp, writers)
    }

    pub fn lock(&mut self, mode: RwMode) -> StorageResult<()> {
        assert!(self.locked.is_none(), "nested lock of a sequence");
        assert!(self.provider.is_open(), "lock of an unopened sequence");
        assert!(
            !mode.is_writable() || self.provider.can_write(),
            "write lock on a read-only sequence"
        );
        self.provider.lock(&mut self.block, mode)?;
        self.locked = Some(mode);
        Ok(())
    }

    pub fn unlock(&mut self) -> StorageResult<()> {
        if self.locked.take().is_some() {
            self.provider.unlock(&mut self.block)?;
        }
        Ok(())
    }

    pub fn close(&mut self) -> StorageResult<()> {
        self.unlock()?;
        if self.provider.is_open() {
            self.provider.close(&mut self.block)?;
        }
        Ok(())
    }

    pub fn drop_storage(&mut self) -> StorageResult<()> {
        assert!(self.locked.is_none(), "drop of a locked sequence");
        self.provider.drop_storage(&mut self.block)
    }

    pub fn commit(&mut self) -> StorageResult<()> {
        self.provider.commit(&mut self.block)
    }

    pub fn is_locked(&self) -> bool {
        self.locked.is_some()
    }

    pub fn lock_mode(&self) -> Option<RwMode> {
        self.locked
    }

    pub fn is_open(&self) -> bool {
        self.provider.is_open()
    }

    pub fn can_write(&self) -> bool {
        self.provider.can_write()
    }

    pub fn is_heap_allocated(&self) -> bool {
        self.provider.is_heap_allocated()
    }

    pub fn file_name(&self) -> Option<&Path> {
        self.provider.file_name()
    }

    fn assert_locked(&self) {
        assert!(self.locked.is_some(), "dereference of an unlocked sequence");
    }

    fn assert_writable(&self) {
        assert!(
            self.locked.is_some_and(RwMode::is_writable),
            "mutation without a write lock"
        );
    }

    pub fn len(&self) -> usize {
        self.assert_locked();
        self.block.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.assert_locked();
        self.block.capacity()
    }

    pub fn blocks(&self) -> &[E::Block] {
        self.assert_locked();
        unsafe { self.block.blocks() }
    }

    pub fn blocks_mut(&mut self) -> &mut [E::Block] {
        self.assert_writable();
        unsafe { self.block.blocks_mut() }
    }

    fn check_index(&self, index: usize) -> StorageResult<()> {
        let len = self.len();
        if index >= len {
            return Err(StorageError::IndexOutOfRange { index, len });
        }
        Ok(())
    }

    pub fn get(&self, index: usize) -> StorageResult<E> {
        self.check_index(index)?;
        Ok(E::read(self.blocks(), index))
    }

    pub fn set(&mut self, index: usize, value: E) -> StorageResult<()> {
        self.check_index(index)?;
        E::write(self.blocks_mut(), index, value);
        Ok(())
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = E> + '_ {
        let blocks = self.blocks();
        (0..self.len()).map(move |i| E::read(blocks, i))
    }

    pub fn to_vec(&self) -> Vec<E> {
        self.iter().collect()
    }

    pub fn fill(&mut self, value: E) {
        let len = self.len();
        E::fill(self.blocks_mut(), 0..len, value);
    }

    /// Overwrites `[offset, offset + values.len())`.
    pub fn write_slice(&mut self, offset: usize, values: &[E]) -> StorageResult<()> {
        let len = self.len();
        let end = offset
            .checked_add(values.len())
            .filter(|end| *end <= len)
            .ok_or(StorageError::IndexOutOfRange {
                index: offset.saturating_add(values.len()),
                len,
            })?;
        let blocks = self.blocks_mut();
        for (i, v) in (offset..end).zip(values) {
            E::write(blocks, i, *v);
        }
        Ok(())
    }

    pub fn reserve(&mut self, capacity: usize) -> StorageResult<()> {
        self.assert_writable();
        self.provider.reserve(&mut self.block, capacity)
    }

    pub fn resize(&mut self, new_size: usize, must_clear: bool) -> StorageResult<()> {
        self.assert_writable();
        self.provider.resize(&mut self.block, new_size, must_clear)
    }

    pub fn cut(&mut self, new_size: usize) {
        self.assert_writable();
        self.provider.cut(&mut self.block, new_size)
    }

    pub fn clear(&mut self) {
        self.assert_writable();
        self.provider.clear(&mut self.block)
    }

    pub fn push(&mut self, value: E) -> StorageResult<()> {
        let n = self.len();
        self.resize(n + 1, false)?;
        E::write(self.blocks_mut(), n, value);
        Ok(())
    }

    /// Copies `n` elements from `src[src_off..]` to `self[dst_off..]`.
    pub fn copy_from(
        &mut self,
        dst_off: usize,
        src: &SequenceObj<E>,
        src_off: usize,
        n: usize,
    ) -> StorageResult<()> {
        let (src_len, dst_len) = (src.len(), self.len());
        if src_off + n > src_len {
            return Err(StorageError::IndexOutOfRange {
                index: src_off + n,
                len: src_len,
            });
        }
        if dst_off + n > dst_len {
            return Err(StorageError::IndexOutOfRange {
                index: dst_off + n,
                len: dst_len,
            });
        }
        E::copy_run(src.blocks(), src_off, self.blocks_mut(), dst_off, n);
        Ok(())
    }

    pub fn content_eq(&self, other: &SequenceObj<E>) -> bool {
        self.len() == other.len() && E::runs_eq(self.blocks(), other.blocks(), self.len())
    }

    pub fn content_cmp(&self, other: &SequenceObj<E>) -> Ordering {
        E::runs_cmp(self.blocks(), self.len(), other.blocks(), other.len())
    }
}

impl<E: FixedElement> SequenceObj<E> {
    pub fn as_slice(&self) -> &[E] {
        self.blocks()
    }

    pub fn as_mut_slice(&mut self) -> &mut [E] {
        self.blocks_mut()
    }
}

impl<E: Element> Drop for SequenceObj<E> {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
