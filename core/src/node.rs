use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of a cluster member. It is the address other members dial,
/// e.g. `127.0.0.1:7001`, and is compared as an opaque string.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for NodeId {
    fn from(address: String) -> Self {
        Self(address)
    }
}
