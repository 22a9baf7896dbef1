use crate::command;
use crate::effects::election_deadline;
use crate::journal::Journal;
use crate::rpc::Message;
use crate::Term;
use quorum_core::{Clock, Inbound, NodeId, Rule, Transport};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    Follower,
    Candidate,
    Leader,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Follower => "follower",
            Role::Candidate => "candidate",
            Role::Leader => "leader",
        };
        f.write_str(name)
    }
}

/// Work a matched guard hands over to its action.
pub(crate) type Deferred = Box<dyn FnOnce(&mut Consensus)>;

/// Everything the role machine reads and mutates. The current role itself is
/// held by the machine, never here.
pub(crate) struct Consensus {
    pub(crate) id: NodeId,
    pub(crate) peers: Vec<NodeId>,
    /// latest term server has seen (initialized to 0
    /// on first boot, increases monotonically)
    pub(crate) term: Term,
    /// candidateId that received vote in current
    /// term (or null if none)
    pub(crate) voted_for: Option<NodeId>,
    /// Voters backing the current candidacy, self included.
    pub(crate) votes: BTreeSet<NodeId>,
    pub(crate) election_deadline: Instant,
    pub(crate) next_heartbeat: Instant,
    pub(crate) election_timeout: Range<Duration>,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) journal: Box<dyn Journal>,
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) clock: Arc<dyn Clock>,
}

impl Consensus {
    pub(crate) fn now(&self) -> Instant {
        self.clock.now()
    }

    fn head(&self) -> Option<Message> {
        self.transport.peek()?.text.parse().ok()
    }

    fn reset_election_deadline(&mut self) {
        self.election_deadline = election_deadline(self.now(), &self.election_timeout);
    }

    fn pop(&mut self) {
        self.transport.pop();
    }

    // guards

    pub(crate) fn timeout_expired(&self) -> Option<()> {
        (self.now() > self.election_deadline).then_some(())
    }

    /// Votes from a majority of servers: more than half of the peers
    /// besides self, with self counted among the votes.
    pub(crate) fn majority_votes(&self) -> Option<()> {
        (self.votes.len() > self.peers.len() / 2).then_some(())
    }

    pub(crate) fn heartbeat_due(&self) -> Option<()> {
        (self.now() >= self.next_heartbeat).then_some(())
    }

    pub(crate) fn append_entries(&self) -> Option<Term> {
        match self.head()? {
            Message::AppendEntries { term } if term >= self.term => Some(term),
            _ => None,
        }
    }

    pub(crate) fn vote_request(&self) -> Option<(Term, NodeId)> {
        match self.head()? {
            Message::VoteRequest { term, candidate }
                if term > self.term
                    || (term == self.term
                        && self.voted_for.as_ref().map_or(true, |v| *v == candidate)) =>
            {
                Some((term, candidate))
            }
            _ => None,
        }
    }

    pub(crate) fn vote(&self) -> Option<(Term, NodeId)> {
        match self.head()? {
            Message::Vote { term, voter } if term == self.term => Some((term, voter)),
            _ => None,
        }
    }

    pub(crate) fn unhandled_head(&self) -> Option<Inbound> {
        self.transport.peek()
    }

    // actions

    /// On conversion to candidate, start election:
    /// increment currentTerm, vote for self, reset election timer,
    /// send RequestVote RPCs to all other servers.
    pub(crate) fn become_candidate(&mut self, _: ()) {
        if let Err(e) = self.term.increment() {
            tracing::error!(node = %self.id, term = %self.term, error = %e, "cannot start an election");
        }
        self.voted_for = Some(self.id.clone());
        self.votes = BTreeSet::from([self.id.clone()]);
        let request = Message::VoteRequest {
            term: self.term,
            candidate: self.id.clone(),
        };
        self.transport.broadcast(&request.to_string());
        self.reset_election_deadline();
        tracing::debug!(node = %self.id, term = %self.term, "election started");
    }

    /// Marks the start of the term in the journal with a NO_OP entry and
    /// heartbeats right away.
    pub(crate) fn become_leader(&mut self, _: ()) {
        self.next_heartbeat = self.now();
        self.votes.clear();
        let index = self.journal.next_index();
        if let Err(e) = self
            .journal
            .append(command::encode_no_op(), index, self.term)
        {
            tracing::error!(node = %self.id, term = %self.term, index, error = %e, "cannot journal leadership NO_OP");
        }
    }

    pub(crate) fn revert_on_timeout(&mut self, _: ()) {
        self.voted_for = None;
        self.votes.clear();
        self.reset_election_deadline();
        tracing::debug!(node = %self.id, term = %self.term, "election timed out");
    }

    /// If RPC request or response contains term T > currentTerm:
    /// set currentTerm = T, convert to follower.
    pub(crate) fn handle_append_entries(&mut self, term: Term) {
        if term > self.term {
            self.term = term;
            self.voted_for = None;
        }
        self.votes.clear();
        self.pop();
        self.reset_election_deadline();
    }

    pub(crate) fn handle_vote_request(&mut self, (term, candidate): (Term, NodeId)) {
        if term > self.term && self.voted_for.is_none() {
            let vote = Message::Vote {
                term,
                voter: self.id.clone(),
            };
            self.transport.unicast(&candidate, &vote.to_string());
            tracing::debug!(node = %self.id, %term, %candidate, "vote granted");
            self.voted_for = Some(candidate);
        }
        self.pop();
        self.reset_election_deadline();
    }

    pub(crate) fn handle_vote(&mut self, (term, voter): (Term, NodeId)) {
        if term == self.term {
            self.votes.insert(voter);
        }
        self.pop();
        self.reset_election_deadline();
    }

    pub(crate) fn ignore_vote(&mut self, _: (Term, NodeId)) {
        self.pop();
        self.reset_election_deadline();
    }

    pub(crate) fn ignore_vote_request(&mut self, _: (Term, NodeId)) {
        self.pop();
        self.reset_election_deadline();
    }

    pub(crate) fn send_heartbeat(&mut self, _: ()) {
        let heartbeat = Message::AppendEntries { term: self.term };
        self.transport.broadcast(&heartbeat.to_string());
        self.next_heartbeat = self.now() + self.heartbeat_interval;
    }

    pub(crate) fn discard_head(&mut self, head: Inbound) {
        self.pop();
        tracing::debug!(node = %self.id, from = %head.from, text = %head.text, "dropped unhandled message");
    }
}

/// Binds a typed guard to its action. The payload travels from one to the
/// other inside the deferred closure.
pub(crate) fn rule<P: 'static>(
    from: Role,
    guard: fn(&Consensus) -> Option<P>,
    to: Role,
    action: fn(&mut Consensus, P),
) -> Rule<Role, Consensus, Deferred> {
    Rule::new(
        from,
        move |node: &Consensus| {
            guard(node).map(|payload| Box::new(move |node: &mut Consensus| action(node, payload)) as Deferred)
        },
        to,
        |node: &mut Consensus, deferred: Deferred| deferred(node),
    )
}

/// Transition table. Within a role the first matching rule wins, and the
/// trailing `discard_head` keeps an unusable message from blocking the queue.
pub(crate) fn rules() -> Vec<Rule<Role, Consensus, Deferred>> {
    use Role::*;
    vec![
        rule(Follower, Consensus::timeout_expired, Candidate, Consensus::become_candidate),
        rule(Follower, Consensus::append_entries, Follower, Consensus::handle_append_entries),
        rule(Follower, Consensus::vote_request, Follower, Consensus::handle_vote_request),
        rule(Follower, Consensus::vote, Follower, Consensus::ignore_vote),
        rule(Follower, Consensus::unhandled_head, Follower, Consensus::discard_head),
        rule(Candidate, Consensus::timeout_expired, Follower, Consensus::revert_on_timeout),
        rule(Candidate, Consensus::majority_votes, Leader, Consensus::become_leader),
        rule(Candidate, Consensus::append_entries, Follower, Consensus::handle_append_entries),
        rule(Candidate, Consensus::vote_request, Candidate, Consensus::handle_vote_request),
        rule(Candidate, Consensus::vote, Candidate, Consensus::handle_vote),
        rule(Candidate, Consensus::unhandled_head, Candidate, Consensus::discard_head),
        rule(Leader, Consensus::append_entries, Follower, Consensus::handle_append_entries),
        rule(Leader, Consensus::vote_request, Leader, Consensus::ignore_vote_request),
        rule(Leader, Consensus::vote, Leader, Consensus::ignore_vote),
        rule(Leader, Consensus::heartbeat_due, Leader, Consensus::send_heartbeat),
        rule(Leader, Consensus::unhandled_head, Leader, Consensus::discard_head),
    ]
}
