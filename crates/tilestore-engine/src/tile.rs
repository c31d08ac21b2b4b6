//! Heap-resident tiles.

use std::sync::Arc;

use parking_lot::RwLock;
use tilestore_common::StorageResult;

use crate::{
    element::Element,
    seq::SequenceObj,
    view::{TileReadView, TileWriteView},
};

/// One tile's sequence behind its own reader/writer lock.
///
/// Heap tiles stay locked at the sequence level for their whole life; the
/// `RwLock` is the per-tile lock that serializes writers.
pub struct Tile<E: Element> {
    seq: Arc<RwLock<SequenceObj<E>>>,
}

impl<E: Element> Clone for Tile<E> {
    fn clone(&self) -> Self {
        Tile {
            seq: Arc::clone(&self.seq),
        }
    }
}

impl<E: Element> Tile<E> {
    pub fn heap(nr_elem: usize) -> StorageResult<Self> {
        Ok(Self::from_seq(SequenceObj::heap(nr_elem)?))
    }

    pub fn single_value() -> StorageResult<Self> {
        Ok(Self::from_seq(SequenceObj::single_value()?))
    }

    pub(crate) fn from_seq(seq: SequenceObj<E>) -> Self {
        debug_assert!(seq.is_locked());
        Tile {
            seq: Arc::new(RwLock::new(seq)),
        }
    }

    pub fn read(&self) -> TileReadView<E> {
        TileReadView::new(self.seq.read_arc(), None)
    }

    pub fn write(&self) -> TileWriteView<E> {
        TileWriteView::new(self.seq.write_arc(), None)
    }

    pub fn try_read(&self) -> Option<TileReadView<E>> {
        self.seq.try_read_arc().map(|g| TileReadView::new(g, None))
    }

    pub fn is_heap_allocated(&self) -> bool {
        self.seq.read().is_heap_allocated()
    }
}

impl<E: Element> std::fmt::Debug for Tile<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.seq.try_read() {
            Some(seq) => f.debug_struct("Tile").field("len", &seq.len()).finish(),
            None => f.write_str("Tile(<locked>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Barrier, thread};

    #[test]
    fn readers_share_writers_exclude() {
        let tile = Tile::<u32>::heap(8).unwrap();
        let r1 = tile.read();
        let r2 = tile.read();
        assert_eq!(r1.len() + r2.len(), 16);
        drop((r1, r2));

        let mut w = tile.write();
        assert!(tile.try_read().is_none());
        w.set(3, 42).unwrap();
        drop(w);
        assert_eq!(tile.read().get(3).unwrap(), 42);
    }

    #[test]
    fn writes_from_threads_are_serialized() {
        let tile = Tile::<u64>::heap(1).unwrap();
        let barrier = Arc::new(Barrier::new(4));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tile = tile.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..1000 {
                        let mut w = tile.write();
                        let v = w.get(0).unwrap();
                        w.set(0, v + 1).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tile.read().get(0).unwrap(), 4000);
    }
}
