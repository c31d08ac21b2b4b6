//! Tiled array storage in one dependency.
//!
//! With `common`, the vocabulary types are exported at the root:
//! [`TiledRange`], [`RwMode`], [`ValueClass`], [`Progress`] and
//! [`StorageError`]. `engine` (on by default) adds the arrays and their
//! entry points: [`create_tile_array`] for heap and file-backed tiles,
//! [`LazyTileFunctor`] for tiles generated on first access, [`DataItem`]
//! for commit-or-rollback ownership, and [`MemoCache`]. `tracing` turns on
//! the engine's log events. Everything else is under [`common`] and
//! [`engine`].

#[cfg(feature = "common")]
pub use tilestore_common as common;

#[cfg(feature = "engine")]
pub use tilestore_engine as engine;

#[cfg(feature = "common")]
pub use tilestore_common::{
    Progress, RwMode, StorageError, StorageResult, TileId, TiledRange, ValueClass,
};

#[cfg(feature = "engine")]
pub use tilestore_engine::{
    AnyTileArray, DataItem, DataReadLock, DataWriteLock, Element, LazyTileFunctor, MemoCache,
    Persistence, StoreConfig, StoreContext, TileFunctor, TileFunctorExt, TileSel,
    create_tile_array,
};
