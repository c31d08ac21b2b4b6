//! Memory-mapped tile files.

use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    marker::PhantomData,
    path::{Path, PathBuf},
    ptr::NonNull,
    sync::Arc,
};

use memmap2::{Mmap, MmapMut};
use tilestore_common::{RwMode, StorageError, StorageResult, to_usize};

use super::{FileHeader, HEADER_LEN, SequenceProvider, set_logical_size};
use crate::{
    alloc::AllocBlock,
    element::Element,
    safe_writer::{SafeFileWriter, SafeWriterRegistry},
};

fn file_len_for<E: Element>(capacity: usize) -> StorageResult<u64> {
    E::byte_len(capacity)
        .and_then(|b| b.checked_add(HEADER_LEN))
        .map(|b| b as u64)
        .ok_or(StorageError::Overflow {
            what: "tile file length",
        })
}

fn read_header(file: &mut File, path: &Path) -> StorageResult<FileHeader> {
    let mut bytes = [0u8; HEADER_LEN];
    file.seek(SeekFrom::Start(0))
        .and_then(|_| file.read_exact(&mut bytes))
        .map_err(|e| StorageError::io(path, e))?;
    FileHeader::decode(&bytes, path)
}

/// Validates an existing file against the expected class and element count,
/// returning its filed `(size, capacity)`.
fn validate<E: Element>(
    file: &mut File,
    path: &Path,
    nr_elem: usize,
) -> StorageResult<(usize, usize)> {
    let header = read_header(file, path)?;
    header.expect_class(E::CLASS, path)?;
    let len = file
        .metadata()
        .map_err(|e| StorageError::io(path, e))?
        .len();
    let capacity = to_usize(header.capacity)?;
    if len < file_len_for::<E>(capacity)? {
        return Err(StorageError::format(path, "file shorter than its filed capacity"));
    }
    if header.size != nr_elem as u64 {
        return Err(StorageError::SizeMismatch {
            path: path.to_path_buf(),
            filed: header.size,
            expected: nr_elem as u64,
        });
    }
    Ok((to_usize(header.size)?, capacity))
}

fn payload_ptr<B>(base: *const u8, path: &Path) -> StorageResult<NonNull<B>> {
    let p = unsafe { base.add(HEADER_LEN) } as *mut B;
    NonNull::new(p).ok_or_else(|| StorageError::format(path, "mapping returned a null address"))
}

/// Read-write mapped file, written through a [`SafeFileWriter`].
#[derive(Debug)]
pub struct MappedSequence<E: Element> {
    path: PathBuf,
    writer: Option<SafeFileWriter>,
    file: Option<File>,
    map: Option<MmapMut>,
    filed_size: usize,
    filed_capacity: usize,
    is_tmp: bool,
    _marker: PhantomData<E>,
}

impl<E: Element> MappedSequence<E> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        MappedSequence {
            path: path.into(),
            writer: None,
            file: None,
            map: None,
            filed_size: 0,
            filed_capacity: 0,
            is_tmp: false,
            _marker: PhantomData,
        }
    }

    pub fn working_path(&self) -> &Path {
        self.writer
            .as_ref()
            .map(|w| w.working_path())
            .unwrap_or(&self.path)
    }

    fn header(&self, size: usize, capacity: usize) -> FileHeader {
        FileHeader {
            class: E::CLASS,
            size: size as u64,
            capacity: capacity as u64,
        }
    }

    fn map_file(&mut self) -> StorageResult<NonNull<E::Block>> {
        let path = self.working_path().to_path_buf();
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| StorageError::format(&path, "file is not open"))?;
        let mut map = unsafe { MmapMut::map_mut(file) }.map_err(|e| StorageError::io(&path, e))?;
        let data = payload_ptr(map.as_mut_ptr(), &path)?;
        self.map = Some(map);
        Ok(data)
    }

    fn write_header_to_map(&mut self, size: usize, capacity: usize) {
        let bytes = self.header(size, capacity).encode();
        if let Some(map) = self.map.as_mut() {
            map[..HEADER_LEN].copy_from_slice(&bytes);
        }
    }
}

impl<E: Element> SequenceProvider<E> for MappedSequence<E> {
    fn open(
        &mut self,
        block: &mut AllocBlock<E>,
        nr_elem: usize,
        mode: RwMode,
        is_tmp: bool,
        writers: Option<&Arc<SafeWriterRegistry>>,
    ) -> StorageResult<()> {
        assert!(self.file.is_none(), "mapped sequence opened twice");
        assert!(mode.is_writable(), "read-only access goes through ConstMappedSequence");
        let Some(writers) = writers else {
            panic!("writable mapping of {:?} without a writer registry", self.path)
        };
        let writer = writers.begin(&self.path, mode.keeps_content(), is_tmp)?;
        let working = writer.working_path().to_path_buf();
        self.is_tmp = is_tmp;
        self.writer = Some(writer);

        let keep = mode.keeps_content() && working.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(!keep)
            .open(&working)
            .map_err(|e| StorageError::io(&working, e))?;

        if keep {
            let (size, capacity) = validate::<E>(&mut file, &working, nr_elem)?;
            self.filed_size = size;
            self.filed_capacity = capacity;
        } else {
            file.set_len(file_len_for::<E>(nr_elem)?)
                .and_then(|_| file.seek(SeekFrom::Start(0)))
                .and_then(|_| file.write_all(&self.header(nr_elem, nr_elem).encode()))
                .map_err(|e| StorageError::io(&working, e))?;
            self.filed_size = nr_elem;
            self.filed_capacity = nr_elem;
        }
        self.file = Some(file);
        block.reset();
        Ok(())
    }

    fn lock(&mut self, block: &mut AllocBlock<E>, _mode: RwMode) -> StorageResult<()> {
        assert!(self.file.is_some(), "lock of an unopened mapped sequence");
        assert!(self.map.is_none(), "nested lock of a mapped sequence");
        let data = self.map_file()?;
        #[cfg(feature = "tracing")]
        tracing::trace!(path = ?self.working_path(), size = self.filed_size, "mapped tile file");
        *block = unsafe { AllocBlock::from_raw(data, self.filed_size, self.filed_capacity) };
        Ok(())
    }

    fn unlock(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        if self.map.is_none() {
            return Ok(());
        }
        self.filed_size = block.size();
        self.filed_capacity = block.capacity();
        if !self.is_tmp {
            self.write_header_to_map(self.filed_size, self.filed_capacity);
        }
        self.map = None;
        block.reset();
        Ok(())
    }

    fn close(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        assert!(self.map.is_none(), "close of a locked mapped sequence");
        self.file = None;
        block.reset();
        Ok(())
    }

    fn drop_storage(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        assert!(self.map.is_none(), "drop of a locked mapped sequence");
        self.file = None;
        block.reset();
        match self.writer.take() {
            Some(mut writer) => writer.rollback(),
            None => Ok(()),
        }
    }

    fn reserve(&mut self, block: &mut AllocBlock<E>, capacity: usize) -> StorageResult<()> {
        assert!(self.map.is_some(), "reserve on an unlocked mapped sequence");
        if capacity <= block.capacity() {
            return Ok(());
        }
        let size = block.size();
        let new_len = file_len_for::<E>(capacity)?;
        self.map = None;
        block.reset();
        let path = self.working_path().to_path_buf();
        if let Some(file) = self.file.as_ref() {
            file.set_len(new_len).map_err(|e| StorageError::io(&path, e))?;
        }
        let data = self.map_file()?;
        self.filed_capacity = capacity;
        *block = unsafe { AllocBlock::from_raw(data, size, capacity) };
        Ok(())
    }

    fn free(&mut self, block: &mut AllocBlock<E>) {
        if self.map.is_some() {
            set_logical_size(block, 0, false);
        }
    }

    fn commit(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        if self.is_tmp {
            return Ok(());
        }
        if self.map.is_some() {
            let (size, capacity) = (block.size(), block.capacity());
            self.write_header_to_map(size, capacity);
        }
        let path = self.working_path().to_path_buf();
        if let Some(map) = self.map.as_ref() {
            map.flush().map_err(|e| StorageError::io(&path, e))?;
        } else if let Some(file) = self.file.as_ref() {
            file.sync_data().map_err(|e| StorageError::io(&path, e))?;
        }
        match self.writer.as_mut() {
            Some(writer) => writer.commit(),
            None => Ok(()),
        }
    }

    fn can_write(&self) -> bool {
        true
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_heap_allocated(&self) -> bool {
        false
    }

    fn file_name(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

impl<E: Element> Drop for MappedSequence<E> {
    fn drop(&mut self) {
        self.map = None;
        self.file = None;
        if self.is_tmp {
            let _ = std::fs::remove_file(self.working_path());
        }
    }
}

/// Read-only mapping of an existing tile file.
#[derive(Debug)]
pub struct ConstMappedSequence<E: Element> {
    path: PathBuf,
    file: Option<File>,
    map: Option<Mmap>,
    filed_size: usize,
    filed_capacity: usize,
    _marker: PhantomData<E>,
}

impl<E: Element> ConstMappedSequence<E> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        ConstMappedSequence {
            path: path.into(),
            file: None,
            map: None,
            filed_size: 0,
            filed_capacity: 0,
            _marker: PhantomData,
        }
    }

    fn illegal(&self, op: &str) -> ! {
        panic!("{op} on read-only mapped sequence {:?}", self.path)
    }
}

impl<E: Element> SequenceProvider<E> for ConstMappedSequence<E> {
    fn open(
        &mut self,
        block: &mut AllocBlock<E>,
        nr_elem: usize,
        mode: RwMode,
        _is_tmp: bool,
        writers: Option<&Arc<SafeWriterRegistry>>,
    ) -> StorageResult<()> {
        assert!(self.file.is_none(), "mapped sequence opened twice");
        assert!(
            matches!(mode, RwMode::ReadOnly | RwMode::CheckOnly),
            "ConstMappedSequence only supports read-only and check-only access"
        );
        if writers.is_some_and(|w| w.is_writing(&self.path)) {
            return Err(StorageError::WriterConflict {
                path: self.path.clone(),
            });
        }
        let mut file = File::open(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        let (size, capacity) = validate::<E>(&mut file, &self.path, nr_elem)?;
        self.filed_size = size;
        self.filed_capacity = capacity;
        if mode == RwMode::ReadOnly {
            self.file = Some(file);
        }
        block.reset();
        Ok(())
    }

    fn lock(&mut self, block: &mut AllocBlock<E>, mode: RwMode) -> StorageResult<()> {
        assert!(!mode.is_writable(), "write lock on a read-only mapped sequence");
        assert!(self.map.is_none(), "nested lock of a mapped sequence");
        let file = self
            .file
            .as_ref()
            .unwrap_or_else(|| self.illegal("lock without open"));
        let map = unsafe { Mmap::map(file) }.map_err(|e| StorageError::io(&self.path, e))?;
        let data = payload_ptr(map.as_ptr(), &self.path)?;
        self.map = Some(map);
        *block = unsafe { AllocBlock::from_raw(data, self.filed_size, self.filed_capacity) };
        Ok(())
    }

    fn unlock(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        self.map = None;
        block.reset();
        Ok(())
    }

    fn close(&mut self, block: &mut AllocBlock<E>) -> StorageResult<()> {
        assert!(self.map.is_none(), "close of a locked mapped sequence");
        self.file = None;
        block.reset();
        Ok(())
    }

    fn drop_storage(&mut self, _block: &mut AllocBlock<E>) -> StorageResult<()> {
        self.illegal("drop")
    }

    fn reserve(&mut self, _block: &mut AllocBlock<E>, _capacity: usize) -> StorageResult<()> {
        self.illegal("reserve")
    }

    fn resize(
        &mut self,
        _block: &mut AllocBlock<E>,
        _new_size: usize,
        _must_clear: bool,
    ) -> StorageResult<()> {
        self.illegal("resize")
    }

    fn cut(&mut self, _block: &mut AllocBlock<E>, _new_size: usize) {
        self.illegal("cut")
    }

    fn clear(&mut self, _block: &mut AllocBlock<E>) {
        self.illegal("clear")
    }

    fn free(&mut self, block: &mut AllocBlock<E>) {
        self.map = None;
        block.reset();
    }

    fn can_write(&self) -> bool {
        false
    }

    fn is_open(&self) -> bool {
        self.file.is_some()
    }

    fn is_heap_allocated(&self) -> bool {
        false
    }

    fn file_name(&self) -> Option<&Path> {
        Some(&self.path)
    }
}
