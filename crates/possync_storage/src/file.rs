//! The on-device log file.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Log bytes kept in a single file.
///
/// Appends go to the end of the file and are only durable after
/// [`StorageBackend::sync`]. [`StorageBackend::rewrite`] builds the new
/// contents in `<name>.tmp` next to the log and renames it into place, so a
/// crash during compaction leaves either the old log or the new one.
pub struct FileBackend {
    path: PathBuf,
    handle: Mutex<Handle>,
}

struct Handle {
    file: File,
    len: u64,
}

impl FileBackend {
    /// Opens the log at `path`, creating it and any missing parent
    /// directories.
    pub fn open(path: &Path) -> StorageResult<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let file = open_log(path)?;
        let len = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            handle: Mutex::new(Handle { file, len }),
        })
    }

    /// Location of the log file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn staging_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map_or_else(|| OsString::from("store.log"), OsString::from);
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("len", &self.handle.lock().len)
            .finish()
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut handle = self.handle.lock();
        let size = handle.len;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }

        let mut bytes = vec![0u8; len];
        if len > 0 {
            handle.file.seek(SeekFrom::Start(offset))?;
            handle.file.read_exact(&mut bytes)?;
        }
        Ok(bytes)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let handle = self.handle.get_mut();
        let start = handle.len;
        if !data.is_empty() {
            handle.file.seek(SeekFrom::End(0))?;
            handle.file.write_all(data)?;
            handle.len += data.len() as u64;
        }
        Ok(start)
    }

    fn flush(&mut self) -> StorageResult<()> {
        self.handle.get_mut().file.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.handle.lock().len)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.handle.get_mut().file.sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let handle = self.handle.get_mut();
        if new_size > handle.len {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("log is {} bytes, cannot grow it to {new_size}", handle.len),
            )
            .into());
        }
        handle.file.set_len(new_size)?;
        handle.file.sync_all()?;
        handle.len = new_size;
        Ok(())
    }

    fn rewrite(&mut self, data: &[u8]) -> StorageResult<()> {
        let staging = self.staging_path();
        let mut next = File::create(&staging)?;
        next.write_all(data)?;
        next.sync_all()?;
        drop(next);

        fs::rename(&staging, &self.path)?;
        let handle = self.handle.get_mut();
        handle.file = open_log(&self.path)?;
        handle.len = data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const FRAME_A: &[u8] = b"PLOG-frame-a";
    const FRAME_B: &[u8] = b"PLOG-frame-b";

    #[test]
    fn opening_creates_missing_directories() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("terminal-01").join("store.log");

        let log = FileBackend::open(&path).unwrap();
        assert!(path.is_file());
        assert_eq!(log.size().unwrap(), 0);
        assert_eq!(log.path(), path.as_path());
    }

    #[test]
    fn frames_read_back_by_offset() {
        let dir = tempdir().unwrap();
        let mut log = FileBackend::open(&dir.path().join("store.log")).unwrap();

        let a = log.append(FRAME_A).unwrap();
        let b = log.append(FRAME_B).unwrap();
        assert_eq!((a, b), (0, FRAME_A.len() as u64));
        assert_eq!(log.read_at(b, FRAME_B.len()).unwrap(), FRAME_B);

        let whole = log.size().unwrap();
        assert!(matches!(
            log.read_at(whole - 2, 4),
            Err(StorageError::ReadPastEnd { size, .. }) if size == whole
        ));
        assert!(log.read_at(whole, 0).unwrap().is_empty());
    }

    #[test]
    fn synced_frames_outlive_the_handle() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let mut log = FileBackend::open(&path).unwrap();
        log.append(FRAME_A).unwrap();
        log.sync().unwrap();
        drop(log);

        let mut log = FileBackend::open(&path).unwrap();
        assert_eq!(log.size().unwrap(), FRAME_A.len() as u64);
        assert_eq!(log.append(FRAME_B).unwrap(), FRAME_A.len() as u64);
    }

    #[test]
    fn torn_frame_is_cut_off() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let mut log = FileBackend::open(&path).unwrap();
        log.append(FRAME_A).unwrap();
        log.append(&FRAME_B[..5]).unwrap();
        log.truncate(FRAME_A.len() as u64).unwrap();
        assert!(log.truncate(1_000).is_err());
        drop(log);

        assert_eq!(fs::read(&path).unwrap(), FRAME_A);
    }

    #[test]
    fn compaction_swaps_in_new_contents() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("store.log");

        let mut log = FileBackend::open(&path).unwrap();
        for _ in 0..4 {
            log.append(FRAME_A).unwrap();
        }
        log.rewrite(FRAME_B).unwrap();
        assert!(!dir.path().join("store.log.tmp").exists());
        assert_eq!(log.append(FRAME_A).unwrap(), FRAME_B.len() as u64);
        log.sync().unwrap();
        drop(log);

        assert_eq!(fs::read(&path).unwrap(), [FRAME_B, FRAME_A].concat());
    }
}
