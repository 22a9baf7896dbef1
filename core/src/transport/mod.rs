//! The seam between the consensus node and whatever moves its messages.
//!
//! A transport owns an [`Inbox`]: producers (socket readers, an in-process
//! network) push address-tagged text onto it, and the single consumer peeks
//! and pops from the head. Sends are fire-and-forget; a failing link is
//! dropped by the transport and never reported back to the caller.

mod memory;
mod tcp;

pub use memory::{MemoryNetwork, MemoryTransport};
pub use tcp::TcpTransport;

use crate::node::NodeId;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inbound {
    pub from: NodeId,
    pub text: String,
}

/// Multi-producer, single-consumer FIFO of inbound messages. Clones share
/// the same queue.
#[derive(Clone, Debug, Default)]
pub struct Inbox {
    queue: Arc<Mutex<VecDeque<Inbound>>>,
}

impl Inbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, from: NodeId, text: impl Into<String>) {
        self.queue.lock().push_back(Inbound {
            from,
            text: text.into(),
        });
    }

    pub fn peek(&self) -> Option<Inbound> {
        self.queue.lock().front().cloned()
    }

    pub fn pop(&self) -> Option<Inbound> {
        self.queue.lock().pop_front()
    }

    pub fn snapshot(&self) -> Vec<Inbound> {
        self.queue.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }
}

pub trait Transport: Send {
    fn inbox(&self) -> &Inbox;

    fn unicast(&self, to: &NodeId, text: &str);

    fn broadcast(&self, text: &str);

    fn peek(&self) -> Option<Inbound> {
        self.inbox().peek()
    }

    fn pop(&self) -> Option<Inbound> {
        self.inbox().pop()
    }

    fn pending(&self) -> Vec<Inbound> {
        self.inbox().snapshot()
    }
}
