use std::{marker::PhantomData, sync::Arc};

use tilestore_common::{RwMode, StorageResult};

use super::SequenceProvider;
use crate::{
    alloc::{AllocBlock, alloc_blocks, free_blocks},
    element::Element,
    safe_writer::SafeWriterRegistry,
};

/// Content in zero-initialised heap memory owned through the block.
#[derive(Debug)]
pub struct HeapSequence<E: Element> {
    open: bool,
    _marker: PhantomData<E>,
}

impl<E: Element> HeapSequence<E> {
    pub fn new() -> Self {
        HeapSequence {
            open: false,
            _marker: PhantomData,
        }
    }
}

impl<E: Element> Default for HeapSequence<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Element> SequenceProvider<E> for HeapSequence<E> {
    fn open(
        &mut self,
        block: &mut AllocBlock<E>,
        nr_elem: usize,
        _mode: RwMode,
        _is_tmp: bool,
        _writers: Option<&Arc<SafeWriterRegistry>>,
    ) -> StorageResult<()> {
        assert!(!self.open, "heap sequence opened twice");
        self.reserve(block, nr_elem)?;
        block.set_size(nr_elem);
        self.open = true;
        Ok(())
    }

    fn lock(&mut self, _block: &mut AllocBlock<E>, _mode: RwMode) -> StorageResult<()> {
        assert!(self.open, "lock of an unopened heap sequence");
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

    fn reserve(&mut self, block: &mut AllocBlock<E>, capacity: usize) -> StorageResult<()> {
        if capacity <= block.capacity() {
            return Ok(());
        }
        let new_blocks = E::nr_blocks(capacity);
        let data = alloc_blocks::<E::Block>(new_blocks);
        let size = block.size();
        unsafe {
            let used = E::nr_blocks(size);
            std::ptr::copy_nonoverlapping(block.data().as_ptr(), data.as_ptr(), used);
        }
        self.free(block);
        *block = unsafe { AllocBlock::from_raw(data, size, capacity) };
        Ok(())
    }

    fn free(&mut self, block: &mut AllocBlock<E>) {
        if block.capacity() > 0 {
            unsafe { free_blocks(block.data(), E::nr_blocks(block.capacity())) };
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
