//! Durable journal backed by a memory-mapped file.
//!
//! Layout, all integers little-endian:
//!
//! ```text
//! 0   application tag, 24 bytes, NUL padded
//! 24  application version, 8 bytes, NUL padded
//! 32  format version, u32
//! 36  offset one past the last record, u32
//! 40  records: u32 len | u64 index | u64 term | command | u32 len
//! ```
//!
//! `len` covers index, term and command and is repeated after the record,
//! so a record whose two lengths disagree is recognised as torn.

use super::storage::ResizableFile;
use super::{check_extends, count_below, lookup, Journal, JournalError, JournalOptions};
use crate::entry::Entry;
use crate::{LogIndex, Term};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use quorum_core::{JsonFile, PersistenceLayer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Cursor, Write};
use std::path::{Path, PathBuf};

const APP_TAG: &[u8] = b"QUORUM-JOURNAL";
const APP_VERSION: &[u8] = env!("CARGO_PKG_VERSION").as_bytes();
const TAG_SIZE: usize = 24;
const VERSION_SIZE: usize = 8;
const FORMAT_VERSION: u32 = 1;
const FORMAT_VERSION_OFFSET: usize = TAG_SIZE + VERSION_SIZE;
const END_OFFSET_OFFSET: usize = FORMAT_VERSION_OFFSET + 4;
const FIRST_RECORD_OFFSET: usize = END_OFFSET_OFFSET + 4;
/// index + term
const RECORD_HEADER: usize = 16;
/// length prefix + length suffix
const RECORD_FRAMING: usize = 8;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
struct JournalMeta {
    #[serde(rename = "raftCommitIndex", default)]
    commit_index: LogIndex,
    #[serde(flatten)]
    other: BTreeMap<String, serde_json::Value>,
}

pub struct FileJournal {
    path: PathBuf,
    file: ResizableFile,
    entries: Vec<Entry>,
    /// Start offset of the record of each entry.
    offsets: Vec<usize>,
    end: usize,
    meta_store: JsonFile<JournalMeta>,
    meta: JournalMeta,
    meta_dirty: bool,
}

impl FileJournal {
    /// Opens the journal at `path`, creating it when missing, and replays
    /// every intact record. A torn or corrupt tail is cut off, not reported.
    pub fn open(path: impl AsRef<Path>, options: JournalOptions) -> Result<Self, JournalError> {
        let path = path.as_ref().to_path_buf();
        let initial_size = options.initial_size.max(2 * FIRST_RECORD_OFFSET as u64);
        let (file, found) = ResizableFile::open(&path, initial_size, options.resize_factor)?;

        let meta_store = JsonFile::new(meta_path(&path));
        let meta = match meta_store.load() {
            Ok(meta) => meta.unwrap_or_default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable journal metadata, starting empty");
                JournalMeta::default()
            }
        };

        let mut journal = Self {
            path,
            file,
            entries: Vec::new(),
            offsets: Vec::new(),
            end: FIRST_RECORD_OFFSET,
            meta_store,
            meta,
            meta_dirty: false,
        };
        if found < FIRST_RECORD_OFFSET as u64 || journal.header_is_blank() {
            journal.write_header()?;
        } else {
            journal.check_header()?;
            journal.replay()?;
        }
        Ok(journal)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A header that never reached the disk reads back as zeros.
    fn header_is_blank(&self) -> bool {
        self.file
            .read(0, FIRST_RECORD_OFFSET)
            .is_some_and(|header| header.iter().all(|&b| b == 0))
    }

    /// Writes a fresh header and syncs it right away.
    fn write_header(&mut self) -> Result<(), JournalError> {
        let header = encode_header().map_err(|e| self.io_error(e))?;
        self.file.write(0, &header)?;
        self.file.flush()
    }

    fn check_header(&self) -> Result<(), JournalError> {
        let tag = self.file.read(0, TAG_SIZE);
        let tag_ok = tag.is_some_and(|tag| {
            tag.starts_with(APP_TAG) && tag[APP_TAG.len()..].iter().all(|&b| b == 0)
        });
        if tag_ok && self.read_u32(FORMAT_VERSION_OFFSET) == Some(FORMAT_VERSION) {
            Ok(())
        } else {
            Err(JournalError::ForeignFile {
                path: self.path.clone(),
            })
        }
    }

    fn replay(&mut self) -> Result<(), JournalError> {
        let stored_end = self.read_u32(END_OFFSET_OFFSET).unwrap_or(0) as usize;
        let limit = stored_end.min(self.file.size());
        let mut offset = FIRST_RECORD_OFFSET;

        while offset < limit {
            let Some((entry, next)) = self.read_record(offset, limit) else {
                break;
            };
            if check_extends(&self.entries, entry.index).is_err() {
                break;
            }
            self.entries.push(entry);
            self.offsets.push(offset);
            offset = next;
        }
        self.end = offset;

        if offset != stored_end {
            tracing::warn!(
                path = %self.path.display(),
                kept = self.entries.len(),
                stored_end,
                valid_end = offset,
                "journal tail is torn or corrupt, truncating to the last valid record"
            );
            self.store_end()?;
        } else {
            tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "journal replayed");
        }
        Ok(())
    }

    fn read_record(&self, offset: usize, limit: usize) -> Option<(Entry, usize)> {
        let len = self.read_u32(offset)? as usize;
        let next = offset.checked_add(len)?.checked_add(RECORD_FRAMING)?;
        if len < RECORD_HEADER || next > limit {
            return None;
        }
        if self.read_u32(next - 4)? as usize != len {
            return None;
        }
        let payload = self.file.read(offset + 4, len)?;
        let mut cursor = Cursor::new(payload);
        let index = cursor.read_u64::<LittleEndian>().ok()?;
        let term = cursor.read_u64::<LittleEndian>().ok()?;
        if index == 0 {
            return None;
        }
        let entry = Entry::new(payload[RECORD_HEADER..].to_vec(), index, Term::new(term));
        Some((entry, next))
    }

    fn read_u32(&self, offset: usize) -> Option<u32> {
        let mut bytes = self.file.read(offset, 4)?;
        bytes.read_u32::<LittleEndian>().ok()
    }

    fn store_end(&mut self) -> Result<(), JournalError> {
        let end = u32::try_from(self.end).map_err(|_| JournalError::TooLarge {
            path: self.path.clone(),
        })?;
        let mut bytes = Vec::with_capacity(4);
        bytes
            .write_u32::<LittleEndian>(end)
            .map_err(|e| self.io_error(e))?;
        self.file.write(END_OFFSET_OFFSET, &bytes)
    }

    fn io_error(&self, source: io::Error) -> JournalError {
        JournalError::Io {
            path: self.path.clone(),
            source,
        }
    }

    fn write_record(&mut self, entry: Entry) -> Result<(), JournalError> {
        let len = RECORD_HEADER + entry.command.len();
        let next = self.end + len + RECORD_FRAMING;
        let (Ok(len32), Ok(_)) = (u32::try_from(len), u32::try_from(next)) else {
            return Err(JournalError::TooLarge {
                path: self.path.clone(),
            });
        };

        let record = encode_record(&entry, len32).map_err(|e| self.io_error(e))?;
        self.file.write(self.end, &record)?;
        self.offsets.push(self.end);
        self.entries.push(entry);
        self.end = next;
        self.store_end()
    }
}

impl Journal for FileJournal {
    fn append(&mut self, command: Vec<u8>, index: LogIndex, term: Term) -> Result<(), JournalError> {
        check_extends(&self.entries, index)?;
        self.write_record(Entry::new(command, index, term))
    }

    fn truncate_from(&mut self, index: LogIndex) -> Result<(), JournalError> {
        let keep = count_below(&self.entries, index);
        if keep == self.entries.len() {
            return Ok(());
        }
        self.end = self.offsets[keep];
        self.entries.truncate(keep);
        self.offsets.truncate(keep);
        self.store_end()
    }

    fn truncate_to(&mut self, index: LogIndex) -> Result<(), JournalError> {
        let dropped = count_below(&self.entries, index);
        if dropped == 0 {
            return Ok(());
        }
        let survivors: Vec<Entry> = self.entries.drain(dropped..).collect();
        self.entries.clear();
        self.offsets.clear();
        self.end = FIRST_RECORD_OFFSET;
        for entry in survivors {
            self.write_record(entry)?;
        }
        self.store_end()
    }

    fn get(&self, index: LogIndex) -> Option<&Entry> {
        lookup(&self.entries, index)
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn set_commit_index(&mut self, index: LogIndex) {
        if self.meta.commit_index != index {
            self.meta.commit_index = index;
            self.meta_dirty = true;
        }
    }

    fn commit_index(&self) -> LogIndex {
        self.meta.commit_index
    }

    fn on_timer(&mut self) -> Result<(), JournalError> {
        if self.meta_dirty {
            self.meta_store.save(&self.meta)?;
            self.meta_dirty = false;
        }
        self.file.flush()
    }
}

impl Drop for FileJournal {
    fn drop(&mut self) {
        if let Err(e) = self.on_timer() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to flush journal on drop");
        }
    }
}

fn encode_header() -> io::Result<Vec<u8>> {
    let mut header = Vec::with_capacity(FIRST_RECORD_OFFSET);
    header.write_all(APP_TAG)?;
    header.resize(TAG_SIZE, 0);
    header.write_all(&APP_VERSION[..APP_VERSION.len().min(VERSION_SIZE)])?;
    header.resize(FORMAT_VERSION_OFFSET, 0);
    header.write_u32::<LittleEndian>(FORMAT_VERSION)?;
    header.write_u32::<LittleEndian>(FIRST_RECORD_OFFSET as u32)?;
    Ok(header)
}

fn encode_record(entry: &Entry, len: u32) -> io::Result<Vec<u8>> {
    let mut record = Vec::with_capacity(len as usize + RECORD_FRAMING);
    record.write_u32::<LittleEndian>(len)?;
    record.write_u64::<LittleEndian>(entry.index)?;
    record.write_u64::<LittleEndian>(entry.term.get())?;
    record.write_all(&entry.command)?;
    record.write_u32::<LittleEndian>(len)?;
    Ok(record)
}

fn meta_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".meta");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::ByteOrder;
    use std::fs::{self, OpenOptions};

    fn options() -> JournalOptions {
        JournalOptions {
            initial_size: 128,
            resize_factor: 2.0,
        }
    }

    #[test]
    fn fresh_file_gets_a_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        drop(FileJournal::open(&path, options()).unwrap());

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(APP_TAG));
        assert_eq!(LittleEndian::read_u32(&bytes[32..36]), 1);
        assert_eq!(LittleEndian::read_u32(&bytes[36..40]), 40);
    }

    #[test]
    fn record_layout_is_length_framed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        {
            let mut journal = FileJournal::open(&path, options()).unwrap();
            journal.append(b"hello".to_vec(), 1, Term::new(3)).unwrap();
        }
        let bytes = fs::read(&path).unwrap();
        let record = &bytes[40..40 + 4 + 21 + 4];
        assert_eq!(LittleEndian::read_u32(&record[..4]), 21);
        assert_eq!(LittleEndian::read_u64(&record[4..12]), 1);
        assert_eq!(LittleEndian::read_u64(&record[12..20]), 3);
        assert_eq!(&record[20..25], b"hello");
        assert_eq!(LittleEndian::read_u32(&record[25..]), 21);
        assert_eq!(LittleEndian::read_u32(&bytes[36..40]), 69);
    }

    #[test]
    fn grows_past_the_initial_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        let command = vec![0xab; 100];
        {
            let mut journal = FileJournal::open(&path, options()).unwrap();
            for i in 1..=20 {
                journal.append(command.clone(), i, Term::new(1)).unwrap();
            }
        }
        assert!(fs::metadata(&path).unwrap().len() >= 40 + 20 * 124);

        let journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.len(), 20);
        assert!(journal.entries().iter().all(|e| e.command == command));
    }

    #[test]
    fn truncations_are_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        {
            let mut journal = FileJournal::open(&path, options()).unwrap();
            for i in 1..=6 {
                journal.append(format!("c{i}").into_bytes(), i, Term::new(1)).unwrap();
            }
            journal.truncate_from(5).unwrap();
            journal.truncate_to(2).unwrap();
            journal.append(b"c5'".to_vec(), 5, Term::new(2)).unwrap();
        }

        let journal = FileJournal::open(&path, options()).unwrap();
        let commands: Vec<_> = journal.entries().iter().map(|e| e.command.clone()).collect();
        assert_eq!(commands, vec![b"c2".to_vec(), b"c3".to_vec(), b"c4".to_vec(), b"c5'".to_vec()]);
        assert_eq!(journal.first_index(), Some(2));
        assert_eq!(journal.get(5).unwrap().term, Term::new(2));
    }

    #[test]
    fn commit_index_is_written_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        let meta = dir.path().join("raft.journal.meta");

        let mut journal = FileJournal::open(&path, options()).unwrap();
        journal.set_commit_index(3);
        assert!(!meta.exists());
        journal.on_timer().unwrap();

        let stored: serde_json::Value = serde_json::from_slice(&fs::read(&meta).unwrap()).unwrap();
        assert_eq!(stored["raftCommitIndex"], 3);

        drop(journal);
        let journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.commit_index(), 3);
    }

    #[test]
    fn unknown_meta_keys_are_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        let meta = dir.path().join("raft.journal.meta");
        fs::write(&meta, br#"{"raftCommitIndex": 1, "snapshot": "s-7"}"#).unwrap();

        let mut journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.commit_index(), 1);
        journal.set_commit_index(2);
        journal.close().unwrap();

        let stored: serde_json::Value = serde_json::from_slice(&fs::read(&meta).unwrap()).unwrap();
        assert_eq!(stored["raftCommitIndex"], 2);
        assert_eq!(stored["snapshot"], "s-7");
    }

    #[test]
    fn corrupt_meta_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        fs::write(dir.path().join("raft.journal.meta"), b"\x80garbage").unwrap();
        let journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.commit_index(), 0);
    }

    #[test]
    fn foreign_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        fs::write(&path, vec![b'x'; 200]).unwrap();
        assert!(matches!(
            FileJournal::open(&path, options()),
            Err(JournalError::ForeignFile { .. })
        ));
    }

    #[test]
    fn blank_header_is_reinitialised() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        fs::write(&path, vec![0u8; 1024]).unwrap();

        let mut journal = FileJournal::open(&path, options()).unwrap();
        assert!(journal.is_empty());
        journal.append(b"first".to_vec(), 1, Term::new(1)).unwrap();
        drop(journal);

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(APP_TAG));
        let journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.get(1).unwrap().command, b"first");
    }

    #[test]
    fn header_is_on_disk_before_any_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        let journal = FileJournal::open(&path, options()).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(APP_TAG));
        assert_eq!(LittleEndian::read_u32(&bytes[36..40]), 40);
        drop(journal);
    }

    #[test]
    fn torn_length_suffix_stops_replay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raft.journal");
        {
            let mut journal = FileJournal::open(&path, options()).unwrap();
            for i in 1..=3 {
                journal.append(vec![i as u8; 8], i, Term::new(1)).unwrap();
            }
        }
        // each record is 4 + 16 + 8 + 4 = 32 bytes; damage the suffix of the second
        let file = OpenOptions::new().write(true).open(&path).unwrap();
        use std::os::unix::fs::FileExt as _;
        file.write_at(&[0xff], 40 + 32 + 28).unwrap();
        drop(file);

        let mut journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.len(), 1);
        journal.append(b"again".to_vec(), 2, Term::new(2)).unwrap();
        drop(journal);

        let journal = FileJournal::open(&path, options()).unwrap();
        assert_eq!(journal.len(), 2);
        assert_eq!(journal.get(2).unwrap().command, b"again");
    }
}
