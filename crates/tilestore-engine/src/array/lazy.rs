//! Tiles computed on first access.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tilestore_common::{RwMode, StorageError, StorageResult, TileId, TiledRange};

use super::{TileFunctor, check_tile_size};
use crate::{
    element::Element,
    tile::Tile,
    view::{TileReadView, TileWriteView},
};

/// Fills one freshly allocated, zeroed tile in place.
pub type TileGenerator<E> =
    dyn Fn(TileId, &mut TileWriteView<E>) -> StorageResult<()> + Send + Sync;

/// Array whose tiles are produced by a generator, once each.
///
/// A tile slot is published together with its write lock already held by
/// the thread that will run the generator. Concurrent requesters find the
/// slot and block on that tile's lock until generation finishes, so the
/// generator runs once per tile without any lock beyond the tile's own.
/// A generator failure is sticky: every later access reports it.
pub struct LazyTileFunctor<E: Element> {
    range: Arc<TiledRange>,
    slots: Mutex<Vec<Option<Tile<E>>>>,
    generator: Box<TileGenerator<E>>,
    failure: OnceCell<Arc<StorageError>>,
    nr_generated: AtomicUsize,
}

impl<E: Element> LazyTileFunctor<E> {
    pub fn new<G>(range: Arc<TiledRange>, generator: G) -> Self
    where
        G: Fn(TileId, &mut TileWriteView<E>) -> StorageResult<()> + Send + Sync + 'static,
    {
        let slots = Mutex::new(vec![None; range.nr_tiles()]);
        LazyTileFunctor {
            range,
            slots,
            generator: Box::new(generator),
            failure: OnceCell::new(),
            nr_generated: AtomicUsize::new(0),
        }
    }

    /// Runs `prepare` for every tile now and `fill` lazily, handing each tile
    /// the state prepared for it.
    pub fn prepared<S, P, F>(range: Arc<TiledRange>, prepare: P, fill: F) -> StorageResult<Self>
    where
        S: Send + 'static,
        P: Fn(TileId) -> StorageResult<S>,
        F: Fn(TileId, S, &mut TileWriteView<E>) -> StorageResult<()> + Send + Sync + 'static,
    {
        let states = range
            .tile_ids()
            .map(|t| prepare(t).map(|s| Mutex::new(Some(s))))
            .collect::<StorageResult<Vec<_>>>()?;
        Ok(Self::new(range, move |t, view| {
            let state = states[t as usize]
                .lock()
                .take()
                .ok_or_else(|| StorageError::generator(t, "prepared state already consumed"))?;
            fill(t, state, view)
        }))
    }

    pub fn nr_generated(&self) -> usize {
        self.nr_generated.load(Ordering::Relaxed)
    }

    pub fn is_materialized(&self, t: TileId) -> bool {
        self.slots
            .lock()
            .get(t as usize)
            .is_some_and(|s| s.is_some())
    }

    fn check_failed(&self) -> StorageResult<()> {
        match self.failure.get() {
            Some(e) => Err(StorageError::Failed(Arc::clone(e))),
            None => Ok(()),
        }
    }

    fn materialize(&self, t: TileId) -> StorageResult<Tile<E>> {
        self.range.check_tile(t)?;
        self.check_failed()?;
        let (tile, mut view) = {
            let mut slots = self.slots.lock();
            if let Some(tile) = &slots[t as usize] {
                return Ok(tile.clone());
            }
            let tile = Tile::heap(self.range.tile_size(t))?;
            let view = tile.write();
            slots[t as usize] = Some(tile.clone());
            (tile, view)
        };
        #[cfg(feature = "tracing")]
        let _span = tracing::debug_span!("generate_tile", tile = t).entered();
        if let Err(e) = (self.generator)(t, &mut view) {
            #[cfg(feature = "tracing")]
            tracing::warn!(tile = t, error = %e, "tile generation failed");
            let e = Arc::new(e);
            let _ = self.failure.set(Arc::clone(&e));
            return Err(StorageError::Failed(e));
        }
        self.nr_generated.fetch_add(1, Ordering::Relaxed);
        Ok(tile)
    }
}

impl<E: Element> TileFunctor<E> for LazyTileFunctor<E> {
    fn tiled_range(&self) -> &Arc<TiledRange> {
        &self.range
    }

    fn get_tile(&self, t: TileId) -> StorageResult<TileReadView<E>> {
        let view = self.materialize(t)?.read();
        // a waiter may have blocked on a tile whose generator then failed
        self.check_failed()?;
        Ok(view)
    }

    fn get_writable_tile(&self, t: TileId, mode: RwMode) -> StorageResult<TileWriteView<E>> {
        let mut view = self.materialize(t)?.write();
        self.check_failed()?;
        if mode.must_zero() {
            view.fill(E::default());
        }
        Ok(view)
    }

    fn commit(&self) -> StorageResult<()> {
        self.check_failed()?;
        let slots = self.slots.lock();
        for (t, slot) in slots.iter().enumerate() {
            if let Some(tile) = slot {
                let view = tile
                    .try_read()
                    .unwrap_or_else(|| panic!("commit while tile {t} is write-locked"));
                check_tile_size(&self.range, t as TileId, view.len())?;
            }
        }
        Ok(())
    }
}

impl<E: Element> std::fmt::Debug for LazyTileFunctor<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LazyTileFunctor")
            .field("nr_tiles", &self.range.nr_tiles())
            .field("nr_generated", &self.nr_generated())
            .field("failed", &self.failure.get().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::TileFunctorExt;
    use std::{sync::Barrier, thread, time::Duration};

    fn ramp(range: Arc<TiledRange>) -> LazyTileFunctor<u32> {
        let first = range.clone();
        LazyTileFunctor::new(range, move |t, view| {
            let start = first.first_index(t) as u32;
            for i in 0..view.len() {
                view.set(i, start + i as u32)?;
            }
            Ok(())
        })
    }

    #[test]
    fn tiles_are_generated_on_demand() {
        let arr = ramp(Arc::new(TiledRange::regular(10, 4).unwrap()));
        assert_eq!(arr.nr_generated(), 0);
        assert_eq!(arr.get_tile(1).unwrap().to_vec(), vec![4, 5, 6, 7]);
        assert!(arr.is_materialized(1));
        assert!(!arr.is_materialized(0));
        assert_eq!(arr.get_value(9).unwrap(), 9);
        assert_eq!(arr.nr_generated(), 2);
        arr.get_tile(1).unwrap();
        assert_eq!(arr.nr_generated(), 2);
    }

    #[test]
    fn concurrent_requests_generate_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = calls.clone();
        let arr = Arc::new(LazyTileFunctor::<f64>::new(
            Arc::new(TiledRange::regular(100, 50).unwrap()),
            move |_, view| {
                counted.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                view.fill(1.5);
                Ok(())
            },
        ));
        let n = 16;
        let barrier = Arc::new(Barrier::new(n));
        let handles: Vec<_> = (0..n)
            .map(|_| {
                let (arr, barrier) = (arr.clone(), barrier.clone());
                thread::spawn(move || {
                    barrier.wait();
                    arr.get_tile(1).unwrap().iter().sum::<f64>()
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 75.0);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failure_is_sticky() {
        let arr = LazyTileFunctor::<i8>::new(Arc::new(TiledRange::regular(4, 2).unwrap()), |t, _| {
            if t == 1 {
                Err(StorageError::generator(t, "no source"))
            } else {
                Ok(())
            }
        });
        assert!(arr.get_tile(0).is_ok());
        let err = arr.get_tile(1).unwrap_err();
        assert!(err.to_string().contains("no source"));
        assert!(matches!(arr.get_tile(0), Err(StorageError::Failed(_))));
        assert!(arr.commit().is_err());
    }

    #[test]
    fn prepared_state_is_consumed_once_per_tile() {
        let arr = LazyTileFunctor::<u16>::prepared(
            Arc::new(TiledRange::regular(6, 3).unwrap()),
            |t| Ok(t as u16 * 100),
            |_, base, view| {
                view.fill(base);
                Ok(())
            },
        )
        .unwrap();
        assert_eq!(arr.read_all().unwrap(), vec![0, 0, 0, 100, 100, 100]);
        assert_eq!(arr.get_tile(1).unwrap().get(0).unwrap(), 100);
    }
}
