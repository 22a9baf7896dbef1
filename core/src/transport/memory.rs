use super::{Inbox, Transport};
use crate::node::NodeId;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug)]
struct Member {
    inbox: Inbox,
    connected: bool,
}

/// An in-process network: every member's sends are pushed straight into the
/// other members' inboxes. Members can be cut off and reattached to script
/// partitions.
#[derive(Clone, Debug, Default)]
pub struct MemoryNetwork {
    members: Arc<Mutex<BTreeMap<NodeId, Member>>>,
}

impl MemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, id: impl Into<NodeId>) -> MemoryTransport {
        let id = id.into();
        let inbox = Inbox::new();
        self.members.lock().insert(
            id.clone(),
            Member {
                inbox: inbox.clone(),
                connected: true,
            },
        );
        MemoryTransport {
            id,
            inbox,
            network: self.clone(),
        }
    }

    pub fn disconnect(&self, id: &NodeId) {
        if let Some(member) = self.members.lock().get_mut(id) {
            member.connected = false;
        }
    }

    pub fn reconnect(&self, id: &NodeId) {
        if let Some(member) = self.members.lock().get_mut(id) {
            member.connected = true;
        }
    }

    fn deliver(&self, from: &NodeId, to: Option<&NodeId>, text: &str) {
        let members = self.members.lock();
        if !members.get(from).is_some_and(|m| m.connected) {
            tracing::debug!(%from, text, "sender is disconnected, message dropped");
            return;
        }
        for (id, member) in members.iter() {
            if id == from || to.is_some_and(|to| to != id) {
                continue;
            }
            if member.connected {
                member.inbox.push(from.clone(), text);
            } else {
                tracing::debug!(%from, to = %id, text, "peer is disconnected, message dropped");
            }
        }
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    id: NodeId,
    inbox: Inbox,
    network: MemoryNetwork,
}

impl MemoryTransport {
    pub fn id(&self) -> &NodeId {
        &self.id
    }
}

impl Transport for MemoryTransport {
    fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    fn unicast(&self, to: &NodeId, text: &str) {
        self.network.deliver(&self.id, Some(to), text);
    }

    fn broadcast(&self, text: &str) {
        self.network.deliver(&self.id, None, text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broadcast_reaches_everyone_but_the_sender() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");
        let c = network.join("c");

        a.broadcast("AppendEntries 1");

        assert!(a.pending().is_empty());
        assert_eq!(b.pop().unwrap().text, "AppendEntries 1");
        let at_c = c.pop().unwrap();
        assert_eq!(at_c.from, *a.id());
    }

    #[test]
    fn unicast_reaches_only_the_target() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");
        let c = network.join("c");

        b.unicast(&NodeId::from("a"), "Vote 1 b");

        assert_eq!(a.peek().unwrap().text, "Vote 1 b");
        assert!(c.pending().is_empty());
    }

    #[test]
    fn disconnected_members_neither_send_nor_receive() {
        let network = MemoryNetwork::new();
        let a = network.join("a");
        let b = network.join("b");

        network.disconnect(b.id());
        a.broadcast("AppendEntries 2");
        b.broadcast("VoteRequest 3 b");
        assert!(a.pending().is_empty());
        assert!(b.pending().is_empty());

        network.reconnect(b.id());
        a.broadcast("AppendEntries 2");
        assert_eq!(b.pending().len(), 1);
    }
}
