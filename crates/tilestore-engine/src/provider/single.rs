use std::{marker::PhantomData, sync::Arc};

use tilestore_common::{RwMode, StorageError, StorageResult};

use super::SequenceProvider;
use crate::{
    alloc::{AllocBlock, alloc_blocks, free_blocks},
    element::Element,
    safe_writer::SafeWriterRegistry,
};

/// Storage for at most one element.
#[derive(Debug)]
pub struct SingleValueSequence<E: Element> {
    open: bool,
    _marker: PhantomData<E>,
}

impl<E: Element> SingleValueSequence<E> {
    pub fn new() -> Self {
        SingleValueSequence {
            open: false,
            _marker: PhantomData,
        }
    }
}

impl<E: Element> Default for SingleValueSequence<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element> SequenceProvider<E> for SingleValueSequence<E> {
    fn open(
        &mut self,
        block: &mut AllocBlock<E>,
        nr_elem: usize,
        _mode: RwMode,
        _is_tmp: bool,
        _writers: Option<&Arc<SafeWriterRegistry>>,
    ) -> StorageResult<()> {
        assert!(!self.open, "single value sequence opened twice");
        self.reserve(block, nr_elem)?;
        block.set_size(nr_elem);
        self.open = true;
        Ok(())
    }

    fn lock(&mut self, _block: &mut AllocBlock<E>, _mode: RwMode) -> StorageResult<()> {
        assert!(self.open, "lock of an unopened single value sequence");
        Ok(())
    }

    fn unlock(&mut self, _block: &mut AllocBlock<E>) -> StorageResult<()> {
        Ok(())
    }

    fn close(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        self.free(block);
        self.open = false;
        Ok(())
    }

    fn drop_storage(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        self.close(block)
    }

    /// The single slot is allocated once; any request beyond it fails.
    fn reserve(&mut self, block: &mut AllocBlock<E>, capacity: usize) -> StorageResult<()> {
        if capacity > 1 {
            return Err(StorageError::CapacityExceeded {
                requested: capacity,
                capacity: 1,
            });
        }
        if block.capacity() == 0 {
            let data = alloc_blocks::<E::Block>(E::nr_blocks(1));
            *block = unsafe { AllocBlock::from_raw(data, 0, 1) };
        }
        Ok(())
    }

    fn free(&mut self, block: &mut AllocBlock<E>) {
        if block.capacity() > 0 {
            unsafe { free_blocks(block.data(), E::nr_blocks(1)) };
        }
        block.reset();
    }

    fn can_write(&self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn is_heap_allocated(&self) -> bool {
        true
    }
}
