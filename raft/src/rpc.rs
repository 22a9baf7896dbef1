//! Wire messages exchanged between nodes: whitespace separated UTF-8 text.

use crate::Term;
use quorum_core::NodeId;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Message {
    /// Invoked by candidates to gather votes.
    VoteRequest {
        /// candidate's term
        term: Term,
        /// candidate requesting vote
        candidate: NodeId,
    },
    /// A vote granted to the candidate of `term`.
    Vote {
        term: Term,
        voter: NodeId,
    },
    /// Leader heartbeat. Carries no entries.
    AppendEntries {
        /// leader's term
        term: Term,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed message {text:?}")]
pub struct MalformedMessage {
    pub text: String,
}

impl Message {
    pub fn term(&self) -> Term {
        match self {
            Message::VoteRequest { term, .. }
            | Message::Vote { term, .. }
            | Message::AppendEntries { term } => *term,
        }
    }
}

impl FromStr for Message {
    type Err = MalformedMessage;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedMessage {
            text: text.to_owned(),
        };
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let term = |token: &str| token.parse::<u64>().map(Term::new).map_err(|_| malformed());

        match tokens.as_slice() {
            ["VoteRequest", t, candidate] => Ok(Message::VoteRequest {
                term: term(*t)?,
                candidate: NodeId::from(*candidate),
            }),
            ["Vote", t, voter] => Ok(Message::Vote {
                term: term(*t)?,
                voter: NodeId::from(*voter),
            }),
            ["AppendEntries", t] => Ok(Message::AppendEntries { term: term(*t)? }),
            _ => Err(malformed()),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::VoteRequest { term, candidate } => write!(f, "VoteRequest {term} {candidate}"),
            Message::Vote { term, voter } => write!(f, "Vote {term} {voter}"),
            Message::AppendEntries { term } => write!(f, "AppendEntries {term}"),
        }
    }
}
