use clap::Parser;
use quorum_core::{NodeId, TcpTransport};
use quorum_raft::{NodeConfig, RaftNode};
use std::path::PathBuf;
use tokio::time::MissedTickBehavior;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quorum-node")]
#[command(version)]
#[command(about = "A Raft-style election node with a durable journal")]
struct Args {
    /// JSON config file; flags below override its values
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to listen on, also this node's identity
    #[arg(long, short = 'a')]
    address: Option<String>,

    /// Peer addresses (comma-separated)
    /// Example: "127.0.0.1:7002,127.0.0.1:7003"
    #[arg(long, value_delimiter = ',')]
    peers: Vec<String>,

    /// Journal file; the journal is kept in memory when omitted
    #[arg(long, short = 'j')]
    journal: Option<PathBuf>,

    /// Lower bound of the election timeout, in seconds
    #[arg(long)]
    election_timeout_min: Option<f64>,

    /// Upper bound of the election timeout, in seconds
    #[arg(long)]
    election_timeout_max: Option<f64>,

    /// Heartbeat interval, in seconds
    #[arg(long)]
    heartbeat: Option<f64>,

    /// Tick interval, in seconds
    #[arg(long)]
    tick: Option<f64>,
}

impl Args {
    fn into_config(self) -> Result<NodeConfig, quorum_raft::Error> {
        let mut config = match &self.config {
            Some(path) => NodeConfig::load(path)?,
            None => NodeConfig::default(),
        };
        if let Some(address) = self.address {
            config.address = NodeId::from(address);
        }
        if !self.peers.is_empty() {
            config.peers = self.peers.into_iter().map(NodeId::from).collect();
        }
        if let Some(journal) = self.journal {
            config.journal_path = Some(journal);
        }
        if let Some(min) = self.election_timeout_min {
            config.election_timeout_min = min;
        }
        if let Some(max) = self.election_timeout_max {
            config.election_timeout_max = max;
        }
        if let Some(heartbeat) = self.heartbeat {
            config.heartbeat_interval = heartbeat;
        }
        if let Some(tick) = self.tick {
            config.tick_interval = tick;
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    let transport = TcpTransport::bind(config.address.as_str()).await?;
    tracing::info!(address = %config.address, listening = %transport.local_addr(), "transport up");
    for peer in &config.peers {
        transport.connect(peer.clone());
    }

    let mut node = RaftNode::new(&config, transport)?;
    let mut ticker = tokio::time::interval(config.tick());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if node.tick().is_some_and(|t| t.changed()) {
                    tracing::info!("\n{}", node.status());
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    node.close()?;
    Ok(())
}
