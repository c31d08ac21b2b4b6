//! Crash-safe replacement of persistent files.
//!
//! Writing to a file that already exists goes to `<file>.tmp`. Committing
//! moves the original to `<file>.old`, promotes the working copy and removes
//! the backup; rolling back removes the working copy and leaves the original
//! untouched. The registry tracks which paths have a writer so that two
//! providers never write the same file, and a reader never maps a file that
//! is being rewritten underneath it.

use std::{
    ffi::OsString,
    fs, io,
    path::{Path, PathBuf},
    sync::Arc,
};

use rustc_hash::FxHashSet;
use tilestore_common::{StorageError, StorageResult};

use crate::locks::{LeveledMutex, LockLevel};

pub(crate) fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

fn remove_if_exists(path: &Path) -> StorageResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StorageError::io(path, e)),
    }
}

#[derive(Debug)]
pub struct SafeWriterRegistry {
    active: LeveledMutex<FxHashSet<PathBuf>>,
}

impl SafeWriterRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(SafeWriterRegistry {
            active: LeveledMutex::new(LockLevel::WriterRegistry, FxHashSet::default()),
        })
    }

    /// Registers a writer for `path`.
    ///
    /// With `keep_content` an existing file is copied to the working path
    /// first. Temporary files are written in place and never promoted.
    pub fn begin(
        self: &Arc<Self>,
        path: &Path,
        keep_content: bool,
        is_tmp: bool,
    ) -> StorageResult<SafeFileWriter> {
        {
            let mut active = self.active.lock();
            if !active.insert(path.to_path_buf()) {
                return Err(StorageError::WriterConflict {
                    path: path.to_path_buf(),
                });
            }
        }
        match self.prepare(path, keep_content, is_tmp) {
            Ok(writer) => Ok(writer),
            Err(e) => {
                self.release(path);
                Err(e)
            }
        }
    }

    fn prepare(
        self: &Arc<Self>,
        path: &Path,
        keep_content: bool,
        is_tmp: bool,
    ) -> StorageResult<SafeFileWriter> {
        let existed = path.exists();
        let use_copy = existed && !is_tmp;
        let working = if use_copy {
            with_suffix(path, ".tmp")
        } else {
            path.to_path_buf()
        };
        if let Some(parent) = working.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StorageError::io(parent, e))?;
        }
        if use_copy {
            remove_if_exists(&working)?;
            if keep_content {
                fs::copy(path, &working).map_err(|e| StorageError::io(&working, e))?;
            }
        }
        Ok(SafeFileWriter {
            registry: Arc::clone(self),
            target: path.to_path_buf(),
            working,
            existed,
            use_copy,
            finished: false,
        })
    }

    fn release(&self, path: &Path) {
        self.active.lock().remove(path);
    }

    pub fn is_writing(&self, path: &Path) -> bool {
        self.active.lock().contains(path)
    }

    pub fn nr_active(&self) -> usize {
        self.active.lock().len()
    }
}

/// One registered writer. Dropping it without [`commit`](Self::commit)
/// rolls back.
#[derive(Debug)]
pub struct SafeFileWriter {
    registry: Arc<SafeWriterRegistry>,
    target: PathBuf,
    working: PathBuf,
    existed: bool,
    use_copy: bool,
    finished: bool,
}

impl SafeFileWriter {
    pub fn working_path(&self) -> &Path {
        &self.working
    }

    pub fn target_path(&self) -> &Path {
        &self.target
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn commit(&mut self) -> StorageResult<()> {
        if self.finished {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(target_path = ?self.target, copy = self.use_copy, "safe writer commit");
        if self.use_copy {
            let old = with_suffix(&self.target, ".old");
            remove_if_exists(&old)?;
            fs::rename(&self.target, &old).map_err(|e| StorageError::io(&self.target, e))?;
            fs::rename(&self.working, &self.target)
                .map_err(|e| StorageError::io(&self.working, e))?;
            remove_if_exists(&old)?;
            self.working = self.target.clone();
        }
        self.finish();
        Ok(())
    }

    pub fn rollback(&mut self) -> StorageResult<()> {
        if self.finished {
            return Ok(());
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(target_path = ?self.target, "safe writer rollback");
        let result = if self.use_copy || !self.existed {
            remove_if_exists(&self.working)
        } else {
            Ok(())
        };
        self.finish();
        result
    }

    fn finish(&mut self) {
        self.finished = true;
        self.registry.release(&self.target);
    }
}

impl Drop for SafeFileWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.rollback();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commit_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"old").unwrap();
        let reg = SafeWriterRegistry::new();

        let mut w = reg.begin(&path, true, false).unwrap();
        assert_eq!(w.working_path(), with_suffix(&path, ".tmp"));
        assert_eq!(fs::read(w.working_path()).unwrap(), b"old");
        fs::write(w.working_path(), b"new").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"old");

        w.commit().unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert!(!with_suffix(&path, ".tmp").exists());
        assert!(!with_suffix(&path, ".old").exists());
        assert_eq!(reg.nr_active(), 0);
    }

    #[test]
    fn drop_without_commit_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"keep").unwrap();
        let reg = SafeWriterRegistry::new();
        {
            let w = reg.begin(&path, false, false).unwrap();
            fs::write(w.working_path(), b"discard").unwrap();
        }
        assert_eq!(fs::read(&path).unwrap(), b"keep");
        assert!(!with_suffix(&path, ".tmp").exists());
        assert!(!reg.is_writing(&path));
    }

    #[test]
    fn fresh_file_is_written_in_place_and_removed_on_rollback() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("fresh.bin");
        let reg = SafeWriterRegistry::new();
        let mut w = reg.begin(&path, true, false).unwrap();
        assert_eq!(w.working_path(), path.as_path());
        fs::write(w.working_path(), b"x").unwrap();
        w.rollback().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn second_writer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        let reg = SafeWriterRegistry::new();
        let _w = reg.begin(&path, false, false).unwrap();
        let err = reg.begin(&path, false, false).unwrap_err();
        assert!(matches!(err, StorageError::WriterConflict { .. }));
        assert!(reg.is_writing(&path));
    }
}
