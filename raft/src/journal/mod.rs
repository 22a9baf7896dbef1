//! The operation journal: an ordered, append-only sequence of entries with
//! a separately persisted commit index.
//!
//! Two backings implement [`Journal`]: [`MemoryJournal`] keeps everything in
//! process memory, [`FileJournal`] writes records into a memory-mapped file
//! and replays them on open. Only the thread that ticks the consensus node
//! touches a journal, so neither backing locks internally.

mod file;
mod memory;
mod storage;

pub use file::FileJournal;
pub use memory::MemoryJournal;

use crate::entry::Entry;
use crate::{LogIndex, Term};
use quorum_core::PersistenceError;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum JournalError {
    #[error("journal I/O error on {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("journal {path} is locked by another writer")]
    Locked { path: PathBuf },

    #[error("{path} is not a journal file of a supported format")]
    ForeignFile { path: PathBuf },

    #[error("journal {path} would outgrow its 32-bit record offsets")]
    TooLarge { path: PathBuf },

    #[error("entry index {got} does not extend the journal, expected {expected}")]
    NonContiguous { expected: LogIndex, got: LogIndex },

    #[error("journal metadata: {0}")]
    Meta(#[from] PersistenceError),
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JournalOptions {
    /// Size the backing file is grown to when opened, in bytes.
    pub initial_size: u64,
    /// Multiplier applied to the mapped size whenever a write overflows it.
    pub resize_factor: f64,
}

impl Default for JournalOptions {
    fn default() -> Self {
        Self {
            initial_size: 1024,
            resize_factor: 2.0,
        }
    }
}

pub trait Journal: Send {
    fn append(&mut self, command: Vec<u8>, index: LogIndex, term: Term) -> Result<(), JournalError>;

    /// Drops every entry whose index is `index` or greater.
    fn truncate_from(&mut self, index: LogIndex) -> Result<(), JournalError>;

    /// Drops every entry whose index is below `index`.
    fn truncate_to(&mut self, index: LogIndex) -> Result<(), JournalError>;

    fn get(&self, index: LogIndex) -> Option<&Entry>;

    fn entries(&self) -> &[Entry];

    fn len(&self) -> usize {
        self.entries().len()
    }

    fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    fn first_index(&self) -> Option<LogIndex> {
        self.entries().first().map(|e| e.index)
    }

    fn last_index(&self) -> Option<LogIndex> {
        self.entries().last().map(|e| e.index)
    }

    /// Index the next appended entry must carry.
    fn next_index(&self) -> LogIndex {
        self.last_index().map_or(1, |last| last + 1)
    }

    fn set_commit_index(&mut self, index: LogIndex);

    fn commit_index(&self) -> LogIndex;

    /// Periodic hook, expected about once a second. Persists state that is
    /// deliberately not written on every change.
    fn on_timer(&mut self) -> Result<(), JournalError> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), JournalError> {
        self.on_timer()
    }
}

/// Opens a durable journal at `path`, or an ephemeral one when there is none.
pub fn open_journal(
    path: Option<&Path>,
    options: JournalOptions,
) -> Result<Box<dyn Journal>, JournalError> {
    Ok(match path {
        Some(path) => Box::new(FileJournal::open(path, options)?),
        None => Box::new(MemoryJournal::new()),
    })
}

fn check_extends(entries: &[Entry], index: LogIndex) -> Result<(), JournalError> {
    let expected = entries.last().map_or(1, |e| e.index + 1);
    let fits = match entries.last() {
        Some(_) => index == expected,
        None => index >= 1,
    };
    if fits {
        Ok(())
    } else {
        Err(JournalError::NonContiguous {
            expected,
            got: index,
        })
    }
}

/// Number of leading entries whose index is below `index`.
fn count_below(entries: &[Entry], index: LogIndex) -> usize {
    match entries.first() {
        Some(first) => usize::try_from(index.saturating_sub(first.index))
            .unwrap_or(usize::MAX)
            .min(entries.len()),
        None => 0,
    }
}

fn lookup(entries: &[Entry], index: LogIndex) -> Option<&Entry> {
    let first = entries.first()?.index;
    let position = usize::try_from(index.checked_sub(first)?).ok()?;
    entries.get(position)
}
