use quorum_core::NodeId;
use serde::Deserialize;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Upper bound for every configured duration, in seconds.
pub const MAX_SECONDS: f64 = 86_400.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("election timeout range [{min}, {max}) is empty or outside [0, 86400] seconds")]
    InvalidTimeoutRange { min: f64, max: f64 },

    #[error("{name} must be a positive number of seconds up to 86400, got {value}")]
    InvalidInterval { name: &'static str, value: f64 },

    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Static configuration of one cluster member. Durations are in seconds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// This node's address, also its identity on the wire.
    pub address: NodeId,
    /// Every other member of the cluster.
    pub peers: Vec<NodeId>,
    pub election_timeout_min: f64,
    pub election_timeout_max: f64,
    pub heartbeat_interval: f64,
    /// Durable journal location; the journal is kept in memory when absent.
    pub journal_path: Option<PathBuf>,
    /// How often the driver ticks the node.
    pub tick_interval: f64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: NodeId::from("127.0.0.1:7001"),
            peers: Vec::new(),
            election_timeout_min: 4.0,
            election_timeout_max: 10.0,
            heartbeat_interval: 1.0,
            journal_path: None,
            tick_interval: 1.0,
        }
    }
}

impl NodeConfig {
    pub fn new(address: impl Into<NodeId>) -> Self {
        Self {
            address: address.into(),
            ..Default::default()
        }
    }

    pub fn with_peer(mut self, peer: impl Into<NodeId>) -> Self {
        self.peers.push(peer.into());
        self
    }

    pub fn with_election_timeout(mut self, min: f64, max: f64) -> Self {
        self.election_timeout_min = min;
        self.election_timeout_max = max;
        self
    }

    pub fn with_heartbeat_interval(mut self, secs: f64) -> Self {
        self.heartbeat_interval = secs;
        self
    }

    pub fn with_journal(mut self, path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(path.into());
        self
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let (min, max) = (self.election_timeout_min, self.election_timeout_max);
        if !(min >= 0.0 && min < max && max <= MAX_SECONDS) {
            return Err(ConfigError::InvalidTimeoutRange { min, max });
        }
        for (name, value) in [
            ("heartbeat_interval", self.heartbeat_interval),
            ("tick_interval", self.tick_interval),
        ] {
            if !(value > 0.0 && value <= MAX_SECONDS) {
                return Err(ConfigError::InvalidInterval { name, value });
            }
        }
        Ok(())
    }

    /// Only meaningful after [`NodeConfig::validate`] succeeded.
    pub fn election_timeout(&self) -> Range<Duration> {
        Duration::from_secs_f64(self.election_timeout_min)
            ..Duration::from_secs_f64(self.election_timeout_max)
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs_f64(self.heartbeat_interval)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_secs_f64(self.tick_interval)
    }
}
