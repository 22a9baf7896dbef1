//! Read-only view of a node for consoles and logs.

use crate::state::Role;
use crate::{LogIndex, Term};
use quorum_core::{Inbound, NodeId};
use std::fmt;
use std::time::Duration;

#[derive(Clone, Debug, PartialEq)]
pub struct NodeStatus {
    pub id: NodeId,
    pub role: Role,
    pub term: Term,
    pub voted_for: Option<NodeId>,
    pub is_leader: bool,
    /// Time left until the election deadline; leaders have none.
    pub election_in: Option<Duration>,
    /// Votes gathered so far, only while a candidate.
    pub votes: Option<Vec<NodeId>>,
    pub commit_index: LogIndex,
    pub journal_len: usize,
    /// Messages waiting in the inbound queue, oldest first.
    pub inbound: Vec<Inbound>,
}

impl fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "node:      {}", self.id)?;
        writeln!(f, "role:      {}", self.role)?;
        writeln!(f, "term:      {}", self.term)?;
        match &self.voted_for {
            Some(candidate) => writeln!(f, "voted for: {candidate}")?,
            None => writeln!(f, "voted for: -")?,
        }
        writeln!(f, "leader:    {}", self.is_leader)?;
        if let Some(left) = self.election_in {
            writeln!(f, "election:  in {:.1}s", left.as_secs_f64())?;
        }
        if let Some(votes) = &self.votes {
            let voters: Vec<&str> = votes.iter().map(NodeId::as_str).collect();
            writeln!(f, "votes:     {} ({})", votes.len(), voters.join(", "))?;
        }
        writeln!(f, "commit:    {}", self.commit_index)?;
        writeln!(f, "journal:   {} entries", self.journal_len)?;
        write!(f, "inbound:   {} queued", self.inbound.len())?;
        for message in &self.inbound {
            write!(f, "\n  {} <- {}", message.text, message.from)?;
        }
        Ok(())
    }
}
