//! Recoverable storage errors.
//!
//! Broken invariants (nested locks, dereferencing an unlocked sequence,
//! mutating a read-only provider) are not represented here; those panic at
//! the point of violation.

use std::{io, path::PathBuf, sync::Arc};

use crate::{TileId, ValueClass};

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("i/o failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{path:?} is not a valid tile file: {reason}")]
    Format { path: PathBuf, reason: String },
    #[error("{path:?} holds {filed} elements, expected {expected}")]
    SizeMismatch {
        path: PathBuf,
        filed: u64,
        expected: u64,
    },
    #[error("{path:?} holds {found} values, expected {expected}")]
    ValueClassMismatch {
        path: PathBuf,
        expected: ValueClass,
        found: ValueClass,
    },
    #[error("{path:?} is already opened for writing")]
    WriterConflict { path: PathBuf },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("requested {requested} elements, capacity is {capacity}")]
    CapacityExceeded { requested: usize, capacity: usize },
    #[error("numeric overflow while accumulating {what}")]
    Overflow { what: &'static str },
    #[error("tile {tile} holds {actual} elements, the tiled range expects {expected}")]
    TileSizeMismatch {
        tile: TileId,
        expected: usize,
        actual: usize,
    },
    #[error("tile size must be positive, got 0 for a range of {size}")]
    ZeroTileSize { size: usize },
    #[error("tile {tile} does not exist in a range of {nr_tiles} tiles")]
    NoSuchTile { tile: TileId, nr_tiles: usize },
    #[error("generating tile {tile} failed: {message}")]
    Generator { tile: TileId, message: String },
    #[error("earlier failure: {0}")]
    Failed(#[source] Arc<StorageError>),
    #[error("no committed data for {0}")]
    NoData(String),
    #[error("element count {0} does not fit the target index type")]
    TooLarge(u64),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }

    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        StorageError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn generator(tile: TileId, message: impl Into<String>) -> Self {
        StorageError::Generator {
            tile,
            message: message.into(),
        }
    }

    /// True for errors that come from the backing medium rather than from the
    /// data or the caller.
    pub fn is_io(&self) -> bool {
        match self {
            StorageError::Io { .. } => true,
            StorageError::Failed(inner) => inner.is_io(),
            _ => false,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Converts an element count read from disk into `usize`.
pub fn to_usize(n: u64) -> StorageResult<usize> {
    usize::try_from(n).map_err(|_| StorageError::TooLarge(n))
}
