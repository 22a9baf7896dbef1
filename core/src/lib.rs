#![forbid(unsafe_code)]
//#![cfg_attr(not(any(test, fuzzing)), deny(missing_docs))]

pub mod clock;
pub mod machine;
pub mod node;
pub mod persistence;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use machine::{Machine, Rule, Transition};
pub use node::NodeId;
pub use persistence::{JsonFile, PersistenceError, PersistenceLayer};
pub use transport::{Inbound, Inbox, MemoryNetwork, MemoryTransport, TcpTransport, Transport};
