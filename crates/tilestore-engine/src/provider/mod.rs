//! Pluggable backing stores for one sequence of elements.
//!
//! A provider holds no element content of its own. All content is reached
//! through the [`AllocBlock`] it is handed, which it points at heap memory or
//! at a file mapping.

use std::{path::Path, sync::Arc};

use tilestore_common::{RwMode, StorageResult};

use crate::{alloc::AllocBlock, element::Element, safe_writer::SafeWriterRegistry};

mod header;
mod heap;
mod mapped;
mod single;

pub use header::{FileHeader, FORMAT_VERSION, HEADER_LEN, MAGIC};
pub use heap::HeapSequence;
pub use mapped::{ConstMappedSequence, MappedSequence};
pub use single::SingleValueSequence;

/// Growth step used when a resize exceeds the current capacity: at least
/// doubles small sequences and grows large ones by 1 Mi elements.
pub const MAX_GROWTH_STEP: usize = 1 << 20;

pub fn grown_capacity(capacity: usize, requested: usize) -> usize {
    requested.max(capacity.saturating_add(capacity.min(MAX_GROWTH_STEP)))
}

/// Backing-store strategy of a [`SequenceObj`](crate::seq::SequenceObj).
///
/// Lifecycle: `open`, then any number of `lock`/`unlock` pairs, then `close`
/// or `drop_storage`. Size management calls are only made while locked. A
/// provider is not safe for concurrent use; its owner serializes access.
pub trait SequenceProvider<E: Element>: Send + Sync + std::fmt::Debug {
    fn open(
        &mut self,
        block: &mut AllocBlock<E>,
        nr_elem: usize,
        mode: RwMode,
        is_tmp: bool,
        writers: Option<&Arc<SafeWriterRegistry>>,
    ) -> StorageResult<()>;

    /// Makes the block dereferenceable.
    fn lock(&mut self, block: &mut AllocBlock<E>, mode: RwMode) -> StorageResult<()>;

    /// Releases what `lock` materialized; file stores persist their size.
    fn unlock(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()>;

    /// Releases the store but keeps persistent content.
    fn close(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()>;

    /// Discards the backing store irrecoverably. Only legal while unlocked.
    fn drop_storage(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()>;

    fn reserve(&mut self, block: &mut AllocBlock<E>, capacity: usize) -> StorageResult<()>;

    /// Elements below `min(old, new)` are preserved; growth is zeroed only
    /// with `must_clear`.
    fn resize(
        &mut self,
        block: &mut AllocBlock<E>,
        new_size: usize,
        must_clear: bool,
    ) -> StorageResult<()> {
        if new_size > block.capacity() {
            self.reserve(block, grown_capacity(block.capacity(), new_size))?;
        }
        set_logical_size(block, new_size, must_clear);
        Ok(())
    }

    fn cut(&mut self, block: &mut AllocBlock<E>, new_size: usize) {
        assert!(new_size <= block.size(), "cut cannot grow a sequence");
        set_logical_size(block, new_size, false);
    }

    fn clear(&mut self, block: &mut AllocBlock<E>) {
        self.cut(block, 0);
    }

    /// Releases capacity as far as the store allows.
    fn free(&mut self, block: &mut AllocBlock<E>);

    /// Makes written content durable under the store's final name.
    fn commit(&mut self, _block: &mut AllocBlock<E>) -> StorageResult<()> {
        Ok(())
    }

    fn can_write(&self) -> bool;
    fn is_open(&self) -> bool;
    fn is_heap_allocated(&self) -> bool;

    fn file_name(&self) -> Option<&Path> {
        None
    }
}

/// Moves the logical end of `block` within its capacity, keeping packed tail
/// bits zero after a shrink.
pub(crate) fn set_logical_size<E: Element>(block: &mut AllocBlock<E>, new_size: usize, must_clear: bool) {
    let old = block.size();
    if new_size < old {
        block.set_size(new_size);
        unsafe { E::clear_tail(block.capacity_blocks_mut(), new_size) };
    } else if new_size > old {
        block.set_size(new_size);
        if must_clear {
            unsafe { E::fill(block.blocks_mut(), old..new_size, E::default()) };
        }
    }
}
