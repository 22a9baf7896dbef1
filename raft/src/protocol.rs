//! The consensus node: a role machine driven one step per tick.
//!
//! A node never spawns work and never waits on the network. Whoever owns it
//! calls [`RaftNode::tick`] on a fixed cadence; each tick fires at most one
//! transition of the role machine and, about once a second, lets the journal
//! persist what it holds back.

use crate::command;
use crate::config::NodeConfig;
use crate::effects::election_deadline;
use crate::error::Error;
use crate::journal::{open_journal, Journal, JournalError, JournalOptions};
use crate::state::{self, Consensus, Deferred, Role};
use crate::status::NodeStatus;
use crate::Term;
use quorum_core::{Clock, Machine, NodeId, SystemClock, Transition, Transport};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

const FLUSH_PERIOD: Duration = Duration::from_secs(1);

pub struct RaftNode {
    machine: Machine<Role, Consensus, Deferred>,
    consensus: Consensus,
    next_flush: Instant,
}

impl RaftNode {
    /// Builds a follower on the system clock, opening the journal named by
    /// the config (or an in-memory one).
    pub fn new(config: &NodeConfig, transport: impl Transport + 'static) -> Result<Self, Error> {
        config.validate()?;
        let journal = open_journal(config.journal_path.as_deref(), JournalOptions::default())?;
        Self::with_parts(config, Box::new(transport), journal, Arc::new(SystemClock))
    }

    pub fn with_parts(
        config: &NodeConfig,
        transport: Box<dyn Transport>,
        mut journal: Box<dyn Journal>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        config.validate()?;
        if journal.is_empty() {
            journal.append(command::encode_no_op(), 1, Term::default())?;
        }

        let now = clock.now();
        let election_timeout = config.election_timeout();
        let consensus = Consensus {
            id: config.address.clone(),
            peers: config.peers.clone(),
            term: Term::default(),
            voted_for: None,
            votes: BTreeSet::new(),
            election_deadline: election_deadline(now, &election_timeout),
            next_heartbeat: now,
            election_timeout,
            heartbeat_interval: config.heartbeat(),
            journal,
            transport,
            clock,
        };
        tracing::info!(
            node = %consensus.id,
            peers = consensus.peers.len(),
            entries = consensus.journal.len(),
            "node started as follower"
        );

        Ok(Self {
            machine: Machine::new(config.address.to_string(), Role::Follower, state::rules()),
            next_flush: now + FLUSH_PERIOD,
            consensus,
        })
    }

    /// Advances the node by at most one transition.
    pub fn tick(&mut self) -> Option<Transition<Role>> {
        let transition = self.machine.fire(&mut self.consensus);
        if let Some(t) = transition.as_ref().filter(|t| t.changed()) {
            tracing::info!(node = %self.consensus.id, term = %self.consensus.term, from = %t.from, to = %t.to, "role changed");
        }

        let now = self.consensus.now();
        if now >= self.next_flush {
            if let Err(e) = self.consensus.journal.on_timer() {
                tracing::error!(node = %self.consensus.id, error = %e, "journal flush failed");
            }
            self.next_flush = now + FLUSH_PERIOD;
        }
        transition
    }

    pub fn id(&self) -> &NodeId {
        &self.consensus.id
    }

    pub fn role(&self) -> Role {
        *self.machine.state()
    }

    pub fn term(&self) -> Term {
        self.consensus.term
    }

    pub fn voted_for(&self) -> Option<&NodeId> {
        self.consensus.voted_for.as_ref()
    }

    pub fn is_leader(&self) -> bool {
        self.role() == Role::Leader
    }

    pub fn journal(&self) -> &dyn Journal {
        self.consensus.journal.as_ref()
    }

    pub fn status(&self) -> NodeStatus {
        let role = self.role();
        let election_in = (role != Role::Leader).then(|| {
            self.consensus
                .election_deadline
                .saturating_duration_since(self.consensus.now())
        });
        let votes = (role == Role::Candidate)
            .then(|| self.consensus.votes.iter().cloned().collect());
        NodeStatus {
            id: self.consensus.id.clone(),
            role,
            term: self.consensus.term,
            voted_for: self.consensus.voted_for.clone(),
            is_leader: role == Role::Leader,
            election_in,
            votes,
            commit_index: self.consensus.journal.commit_index(),
            journal_len: self.consensus.journal.len(),
            inbound: self.consensus.transport.pending(),
        }
    }

    /// Persists everything the journal holds back. The node can keep
    /// ticking afterwards.
    pub fn close(&mut self) -> Result<(), JournalError> {
        tracing::info!(node = %self.consensus.id, "closing journal");
        self.consensus.journal.close()
    }
}
