//! Fixed 32-byte header at the start of every tile file.
//!
//! ```text
//! 0..4    magic "TSQ1"
//! 4..6    format version, little endian
//! 6       value class tag
//! 7       byte order of the payload (1 = little endian)
//! 8..16   filed size in elements, little endian
//! 16..24  filed capacity in elements, little endian
//! 24..32  reserved, zero
//! ```
//!
//! The element payload starts at `HEADER_LEN` and spans the capacity.

use std::path::Path;

use tilestore_common::{StorageError, StorageResult, ValueClass};

pub const MAGIC: [u8; 4] = *b"TSQ1";
pub const FORMAT_VERSION: u16 = 1;
pub const HEADER_LEN: usize = 32;

const LITTLE_ENDIAN: u8 = 1;
const BIG_ENDIAN: u8 = 2;

fn native_order() -> u8 {
    if cfg!(target_endian = "little") {
        LITTLE_ENDIAN
    } else {
        BIG_ENDIAN
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub class: ValueClass,
    pub size: u64,
    pub capacity: u64,
}

impl FileHeader {
    pub fn encode(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        out[0..4].copy_from_slice(&MAGIC);
        out[4..6].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        out[6] = self.class.tag();
        out[7] = native_order();
        out[8..16].copy_from_slice(&self.size.to_le_bytes());
        out[16..24].copy_from_slice(&self.capacity.to_le_bytes());
        out
    }

    pub fn decode(bytes: &[u8], path: &Path) -> StorageResult<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(StorageError::format(path, "file shorter than its header"));
        }
        if bytes[0..4] != MAGIC {
            return Err(StorageError::format(path, "bad magic"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != FORMAT_VERSION {
            return Err(StorageError::format(
                path,
                format!("unsupported format version {version}"),
            ));
        }
        let class = ValueClass::from_tag(bytes[6])
            .ok_or_else(|| StorageError::format(path, format!("unknown value tag {}", bytes[6])))?;
        if bytes[7] != native_order() {
            return Err(StorageError::format(path, "payload byte order differs from host"));
        }
        let word = |r: std::ops::Range<usize>| {
            let mut b = [0u8; 8];
            b.copy_from_slice(&bytes[r]);
            u64::from_le_bytes(b)
        };
        let header = FileHeader {
            class,
            size: word(8..16),
            capacity: word(16..24),
        };
        if header.size > header.capacity {
            return Err(StorageError::format(path, "filed size exceeds filed capacity"));
        }
        Ok(header)
    }

    /// Checks that the header belongs to a file of `class` elements.
    pub fn expect_class(&self, class: ValueClass, path: &Path) -> StorageResult<()> {
        if self.class != class {
            return Err(StorageError::ValueClassMismatch {
                path: path.to_path_buf(),
                expected: class,
                found: self.class,
            });
        }
        Ok(())
    }
}
