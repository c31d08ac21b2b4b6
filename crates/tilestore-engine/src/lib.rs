//! Tiled array storage engine.
//!
//! Arrays are split into tiles that are allocated, locked and mapped
//! independently. Tiles live on the heap or in memory-mapped files, sub-byte
//! element types are bit-packed, and tiles may be generated on first access.

pub mod alloc;
pub mod array;
pub mod bits;
pub mod cache;
pub mod config;
pub mod context;
pub mod data_lock;
pub mod element;
pub mod expr;
pub mod file_tiles;
pub mod locks;
pub mod parallel;
pub mod provider;
pub mod safe_writer;
pub mod seq;
pub mod telemetry;
pub mod tile;
pub mod view;

pub use array::{
    AnyTileArray, ArrayVisitor, DataRead, DataWrite, FileTileArray, HeapSingleArray,
    HeapSingleValue, HeapTileArray, LazyTileFunctor, Persistence, TileFunctor, TileFunctorExt,
    TileSel, create_tile_array, create_tile_array_with_mode,
};
pub use bits::{UInt2, UInt4};
pub use cache::{MemoCache, Memoized};
pub use config::StoreConfig;
pub use context::StoreContext;
pub use data_lock::{DataItem, DataReadLock, DataWriteLock};
pub use element::{Element, FixedElement, ValueVisitor, visit_value_class};
pub use expr::{Bindings, ExprCache, LispExpr};
pub use parallel::{SuspendToken, TileLoop};
pub use seq::SequenceObj;
pub use tile::Tile;
pub use view::{TileReadView, TileWriteView};

pub use tilestore_common::*;

#[cfg(test)]
mod tests;
