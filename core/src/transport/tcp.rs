use super::{Inbox, Transport};
use crate::node::NodeId;
use futures::channel::mpsc;
use futures::StreamExt;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};

const RECONNECT_DELAY: Duration = Duration::from_secs(2);
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

type Links = Arc<Mutex<HashMap<NodeId, mpsc::UnboundedSender<String>>>>;

/// Persistent per-peer TCP streams carrying newline-terminated text.
///
/// Inbound messages are tagged with the remote socket address of the stream
/// they arrived on. Outbound links are keyed by the peer address that was
/// dialed. Must be created inside a tokio runtime.
pub struct TcpTransport {
    local_addr: SocketAddr,
    inbox: Inbox,
    links: Links,
}

impl TcpTransport {
    pub async fn bind(addr: impl ToSocketAddrs) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        let inbox = Inbox::new();
        tokio::spawn(accept_loop(listener, inbox.clone()));
        tracing::info!(%local_addr, "listening for peers");
        Ok(Self {
            local_addr,
            inbox,
            links: Links::default(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Keeps dialing `peer` until it answers, and redials whenever the link
    /// breaks.
    pub fn connect(&self, peer: NodeId) {
        tokio::spawn(dial_loop(peer, self.links.clone()));
    }

    pub fn connected_peers(&self) -> Vec<NodeId> {
        let mut peers: Vec<_> = self.links.lock().keys().cloned().collect();
        peers.sort();
        peers
    }
}

impl Transport for TcpTransport {
    fn inbox(&self) -> &Inbox {
        &self.inbox
    }

    fn unicast(&self, to: &NodeId, text: &str) {
        let mut links = self.links.lock();
        let Some(link) = links.get(to) else {
            tracing::debug!(%to, text, "no link to peer, message dropped");
            return;
        };
        if link.unbounded_send(frame(text)).is_err() {
            tracing::warn!(peer = %to, "link closed, dropping connection");
            links.remove(to);
        }
    }

    fn broadcast(&self, text: &str) {
        let line = frame(text);
        self.links.lock().retain(|peer, link| {
            let alive = link.unbounded_send(line.clone()).is_ok();
            if !alive {
                tracing::warn!(%peer, "link closed, dropping connection");
            }
            alive
        });
    }
}

fn frame(text: &str) -> String {
    format!("{text}\n")
}

async fn accept_loop(listener: TcpListener, inbox: Inbox) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                tracing::info!(%remote, "peer connected");
                tokio::spawn(read_loop(stream, NodeId::new(remote.to_string()), inbox.clone()));
            }
            Err(e) => accept_failed(e).await,
        }
    }
}

/// Backs off after a failed accept. Errors such as running out of file
/// descriptors persist, and retrying at once would spin.
async fn accept_failed(error: io::Error) {
    tracing::warn!(%error, "accept failed, retrying");
    tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
}

async fn read_loop(stream: TcpStream, from: NodeId, inbox: Inbox) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let text = line.trim();
                if text.is_empty() {
                    continue;
                }
                tracing::debug!(%from, text, "recv");
                inbox.push(from.clone(), text);
            }
            Ok(None) => break,
            Err(e) => {
                tracing::debug!(%from, error = %e, "read failed");
                break;
            }
        }
    }
    tracing::info!(%from, "peer disconnected");
}

async fn dial_loop(peer: NodeId, links: Links) {
    loop {
        match TcpStream::connect(peer.as_str()).await {
            Ok(mut stream) => {
                let (sender, mut outgoing) = mpsc::unbounded::<String>();
                links.lock().insert(peer.clone(), sender);
                tracing::info!(%peer, "connected to peer");
                while let Some(line) = outgoing.next().await {
                    if let Err(e) = stream.write_all(line.as_bytes()).await {
                        tracing::warn!(%peer, error = %e, "send failed");
                        break;
                    }
                }
                links.lock().remove(&peer);
            }
            Err(e) => tracing::debug!(%peer, error = %e, "connect failed, retrying"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..300 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn delivers_line_framed_messages_in_order() {
        let a = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let b = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        let b_id = NodeId::new(b.local_addr().to_string());

        a.connect(b_id.clone());
        wait_until(|| a.connected_peers() == vec![b_id.clone()]).await;

        a.broadcast("VoteRequest 1 a");
        a.unicast(&b_id, "AppendEntries 1");
        wait_until(|| b.pending().len() == 2).await;

        let received: Vec<_> = b.pending().into_iter().map(|m| m.text).collect();
        assert_eq!(received, vec!["VoteRequest 1 a", "AppendEntries 1"]);
    }

    #[tokio::test]
    async fn failed_accept_backs_off() {
        let start = tokio::time::Instant::now();
        accept_failed(io::Error::new(io::ErrorKind::Other, "too many open files")).await;
        assert!(start.elapsed() >= ACCEPT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn unicast_without_link_is_dropped() {
        let a = TcpTransport::bind("127.0.0.1:0").await.unwrap();
        a.unicast(&NodeId::from("127.0.0.1:1"), "Vote 1 a");
        assert!(a.connected_peers().is_empty());
    }
}
