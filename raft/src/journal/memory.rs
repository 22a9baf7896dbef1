use super::{check_extends, count_below, lookup, Journal, JournalError};
use crate::entry::Entry;
use crate::{LogIndex, Term};

/// Journal that lives and dies with the process.
#[derive(Debug, Default)]
pub struct MemoryJournal {
    entries: Vec<Entry>,
    commit_index: LogIndex,
}

impl MemoryJournal {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Journal for MemoryJournal {
    fn append(&mut self, command: Vec<u8>, index: LogIndex, term: Term) -> Result<(), JournalError> {
        check_extends(&self.entries, index)?;
        self.entries.push(Entry::new(command, index, term));
        Ok(())
    }

    fn truncate_from(&mut self, index: LogIndex) -> Result<(), JournalError> {
        let keep = count_below(&self.entries, index);
        self.entries.truncate(keep);
        Ok(())
    }

    fn truncate_to(&mut self, index: LogIndex) -> Result<(), JournalError> {
        let dropped = count_below(&self.entries, index);
        self.entries.drain(..dropped);
        Ok(())
    }

    fn get(&self, index: LogIndex) -> Option<&Entry> {
        lookup(&self.entries, index)
    }

    fn entries(&self) -> &[Entry] {
        &self.entries
    }

    fn set_commit_index(&mut self, index: LogIndex) {
        self.commit_index = index;
    }

    fn commit_index(&self) -> LogIndex {
        self.commit_index
    }
}
