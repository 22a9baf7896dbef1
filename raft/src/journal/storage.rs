//! A growable, memory-mapped byte store addressed by offset.

use super::JournalError;
use fs2::FileExt;
use memmap2::{MmapMut, MmapOptions};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const ZEROS: [u8; 4096] = [0; 4096];

pub(crate) struct ResizableFile {
    path: PathBuf,
    file: File,
    map: MmapMut,
    resize_factor: f64,
}

impl ResizableFile {
    /// Opens (creating if needed) and exclusively locks `path`, growing it to
    /// at least `initial_size` bytes. Also returns the file length as found on
    /// disk, before any growth.
    pub(crate) fn open(
        path: &Path,
        initial_size: u64,
        resize_factor: f64,
    ) -> Result<(Self, u64), JournalError> {
        let io_error = |source| JournalError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(io_error)?;
        FileExt::try_lock_exclusive(&file).map_err(|_| JournalError::Locked {
            path: path.to_path_buf(),
        })?;

        let found = file.metadata().map_err(io_error)?.len();
        if found < initial_size {
            set_size(path, &file, initial_size)?;
        }
        let store = Self {
            path: path.to_path_buf(),
            map: map(&file).map_err(io_error)?,
            file,
            resize_factor,
        };
        Ok((store, found))
    }

    pub(crate) fn size(&self) -> usize {
        self.map.len()
    }

    /// `None` when the range is not fully inside the mapped region.
    pub(crate) fn read(&self, offset: usize, size: usize) -> Option<&[u8]> {
        self.map.get(offset..offset.checked_add(size)?)
    }

    pub(crate) fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<(), JournalError> {
        let end = offset + bytes.len();
        if end > self.size() {
            self.grow(end as u64)?;
        }
        self.map[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    pub(crate) fn flush(&self) -> Result<(), JournalError> {
        self.map.flush().map_err(|e| self.io_error(e))
    }

    fn grow(&mut self, required: u64) -> Result<(), JournalError> {
        let mut size = (self.size() as u64).max(1);
        while size < required {
            let next = (size as f64 * self.resize_factor).ceil() as u64;
            size = if next > size { next } else { required };
        }
        tracing::debug!(path = %self.path.display(), from = self.size(), to = size, "growing journal file");
        self.resize(size)
    }

    fn resize(&mut self, size: u64) -> Result<(), JournalError> {
        self.flush()?;
        set_size(&self.path, &self.file, size)?;
        self.map = map(&self.file).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn io_error(&self, source: io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

fn set_size(path: &Path, file: &File, size: u64) -> Result<(), JournalError> {
    if let Err(e) = file.set_len(size) {
        tracing::warn!(path = %path.display(), error = %e, "set_len failed, extending by appending");
        extend(path, file, size).map_err(|source| JournalError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn extend(path: &Path, file: &File, size: u64) -> io::Result<()> {
    let mut missing = size.saturating_sub(file.metadata()?.len());
    let mut appender = OpenOptions::new().append(true).open(path)?;
    while missing > 0 {
        let chunk = missing.min(ZEROS.len() as u64) as usize;
        appender.write_all(&ZEROS[..chunk])?;
        missing -= chunk as u64;
    }
    appender.sync_all()
}

#[allow(unsafe_code)]
fn map(file: &File) -> io::Result<MmapMut> {
    // SAFETY: the file is held under an exclusive lock for the lifetime of
    // the mapping, and nothing in this process writes to it except through
    // the map.
    unsafe { MmapOptions::new().map_mut(file) }
}
