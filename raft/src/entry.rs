use crate::{LogIndex, Term};

/// A journal record: an encoded command, its position in the log, and the
/// term of the leader that appended it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub command: Vec<u8>,
    pub index: LogIndex,
    pub term: Term,
}

impl Entry {
    pub fn new(command: Vec<u8>, index: LogIndex, term: Term) -> Self {
        Self {
            command,
            index,
            term,
        }
    }
}
