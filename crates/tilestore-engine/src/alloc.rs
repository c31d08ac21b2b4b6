//! Geometry of one contiguous run of stored elements.

use std::{marker::PhantomData, ptr::NonNull};

use crate::element::Element;

/// `(data, size, capacity)` over elements of type `E`.
///
/// The block never owns its memory. A sequence provider points it at heap
/// memory or a file mapping while locked and resets it on unlock; sizes are
/// counted in elements, not blocks.
pub struct AllocBlock<E: Element> {
    data: NonNull<E::Block>,
    size: usize,
    capacity: usize,
    _marker: PhantomData<E>,
}

// Access is mediated by SequenceObj, which only hands out slices while the
// owning tile lock is held.
unsafe impl<E: Element> Send for AllocBlock<E> {}
unsafe impl<E: Element> Sync for AllocBlock<E> {}

impl<E: Element> AllocBlock<E> {
    pub fn empty() -> Self {
        AllocBlock {
            data: NonNull::dangling(),
            size: 0,
            capacity: 0,
            _marker: PhantomData,
        }
    }

    /// # Safety
    /// `data` must be valid for reads and writes of
    /// `E::nr_blocks(capacity)` blocks until the block is reset.
    pub unsafe fn from_raw(data: NonNull<E::Block>, size: usize, capacity: usize) -> Self {
        debug_assert!(size <= capacity);
        AllocBlock {
            data,
            size,
            capacity,
            _marker: PhantomData,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::empty();
    }

    pub fn data(&self) -> NonNull<E::Block> {
        self.data
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn set_size(&mut self, size: usize) {
        assert!(size <= self.capacity, "size {size} exceeds capacity {}", self.capacity);
        self.size = size;
    }

    pub fn nr_blocks(&self) -> usize {
        E::nr_blocks(self.size)
    }

    /// # Safety
    /// The memory the block points at must still be live.
    pub unsafe fn blocks(&self) -> &[E::Block] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), E::nr_blocks(self.size)) }
    }

    /// # Safety
    /// The memory must be live and writable.
    pub unsafe fn blocks_mut(&mut self) -> &mut [E::Block] {
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), E::nr_blocks(self.size)) }
    }

    /// All blocks up to capacity, including those past the logical size.
    ///
    /// # Safety
    /// The memory must be live and writable.
    pub unsafe fn capacity_blocks_mut(&mut self) -> &mut [E::Block] {
        unsafe {
            std::slice::from_raw_parts_mut(self.data.as_ptr(), E::nr_blocks(self.capacity))
        }
    }
}

impl<E: Element> Default for AllocBlock<E> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<E: Element> std::fmt::Debug for AllocBlock<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AllocBlock")
            .field("size", &self.size)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Zero-initialised heap storage for `nr_blocks` blocks.
pub(crate) fn alloc_blocks<B: crate::element::Block>(nr_blocks: usize) -> NonNull<B> {
    let boxed: Box<[B]> = vec![B::default(); nr_blocks].into_boxed_slice();
    let raw = Box::into_raw(boxed) as *mut B;
    // Box never yields null; an empty box yields a dangling, aligned pointer.
    NonNull::new(raw).unwrap_or(NonNull::dangling())
}

/// # Safety
/// `data` must come from `alloc_blocks::<B>(nr_blocks)` and not be freed yet.
pub(crate) unsafe fn free_blocks<B: crate::element::Block>(data: NonNull<B>, nr_blocks: usize) {
    unsafe {
        let slice = std::ptr::slice_from_raw_parts_mut(data.as_ptr(), nr_blocks);
        drop(Box::from_raw(slice));
    }
}
