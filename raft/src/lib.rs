#![deny(unsafe_code)]
//#![cfg_attr(not(any(test, fuzzing)), deny(missing_docs))]

pub mod command;
pub mod config;
mod effects;
pub mod entry;
mod error;
pub mod journal;
pub mod protocol;
pub mod rpc;
pub mod state;
pub mod status;

pub use config::NodeConfig;
pub use entry::Entry;
pub use error::Error;
pub use journal::{open_journal, FileJournal, Journal, JournalError, JournalOptions, MemoryJournal};
pub use protocol::RaftNode;
pub use state::Role;
pub use status::NodeStatus;

use std::fmt;

/// Time is divided into terms, and each term begins
/// with an election.
/// Election Safety: at most one leader can be elected in a
/// given term.
#[derive(Clone, Copy, Debug, Default, PartialEq, PartialOrd, Eq, Ord, Hash)]
pub struct Term(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("term counter overflow")]
pub struct TermOverflow;

impl Term {
    pub const fn new(term: u64) -> Self {
        Self(term)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub(crate) fn increment(&mut self) -> Result<(), TermOverflow> {
        self.0 = self.0.checked_add(1).ok_or(TermOverflow)?;
        Ok(())
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Position of an entry in the journal; the first entry ever written has
/// index 1.
pub type LogIndex = u64;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn term_increment_is_checked() {
        let mut term = Term::new(41);
        term.increment().unwrap();
        assert_eq!(term, Term::new(42));

        let mut last = Term::new(u64::MAX);
        assert_eq!(last.increment(), Err(TermOverflow));
        assert_eq!(last.get(), u64::MAX);
    }
}
