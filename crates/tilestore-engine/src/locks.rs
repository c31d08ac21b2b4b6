//! Mutexes for long-lived shared state, ordered by level.
//!
//! A thread may only acquire a leveled lock whose level is strictly above
//! every leveled lock it already holds. Debug builds check this on every
//! acquisition and panic on an inversion; release builds skip the
//! bookkeeping.

use std::{
    cell::RefCell,
    ops::{Deref, DerefMut},
};

use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LockLevel {
    /// The committed-array slot of a data item.
    DataItem = 10,
    /// Entry table of a memo cache.
    MemoTable = 20,
    /// The set of paths with an active safe writer.
    WriterRegistry = 30,
    /// Counters and other leaf state.
    Leaf = 40,
}

thread_local! {
    static HELD: RefCell<SmallVec<[LockLevel; 8]>> = RefCell::new(SmallVec::new());
}

#[derive(Debug)]
pub struct LeveledMutex<T> {
    level: LockLevel,
    inner: Mutex<T>,
}

impl<T> LeveledMutex<T> {
    pub const fn new(level: LockLevel, value: T) -> Self {
        LeveledMutex {
            level,
            inner: Mutex::new(value),
        }
    }

    pub fn level(&self) -> LockLevel {
        self.level
    }

    pub fn lock(&self) -> LeveledGuard<'_, T> {
        #[cfg(debug_assertions)]
        enter_level(self.level);
        LeveledGuard {
            guard: self.inner.lock(),
            level: self.level,
        }
    }

    pub fn into_inner(self) -> T {
        self.inner.into_inner()
    }
}

#[cfg(debug_assertions)]
fn enter_level(level: LockLevel) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(top) = held.iter().max() {
            assert!(
                level > *top,
                "lock order violation: acquiring {level:?} while holding {top:?}"
            );
        }
        held.push(level);
    });
}

#[cfg(debug_assertions)]
fn leave_level(level: LockLevel) {
    HELD.with(|held| {
        let mut held = held.borrow_mut();
        if let Some(pos) = held.iter().rposition(|l| *l == level) {
            held.remove(pos);
        }
    });
}

/// Levels held by the current thread, lowest first. Always empty in release
/// builds.
pub fn held_levels() -> Vec<LockLevel> {
    HELD.with(|held| held.borrow().to_vec())
}

pub struct LeveledGuard<'a, T> {
    guard: MutexGuard<'a, T>,
    #[cfg_attr(not(debug_assertions), allow(dead_code))]
    level: LockLevel,
}

impl<T> Deref for LeveledGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for LeveledGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

impl<T> Drop for LeveledGuard<'_, T> {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        leave_level(self.level);
    }
}
