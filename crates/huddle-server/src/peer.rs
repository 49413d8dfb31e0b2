use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use huddle_core::ids::ConnectionId;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);
const PEER_TIMEOUT: Duration = Duration::from_secs(90);

/// A live WebSocket connection's outbound side.
pub struct Peer {
    pub id: ConnectionId,
    tx: mpsc::Sender<String>,
    connected: AtomicBool,
    last_pong: AtomicU64,
}

impl Peer {
    fn new(id: ConnectionId, tx: mpsc::Sender<String>) -> Self {
        Self {
            id,
            tx,
            connected: AtomicBool::new(true),
            last_pong: AtomicU64::new(now_secs()),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    fn mark_disconnected(&self) {
        self.connected.store(false, Ordering::Relaxed);
    }

    pub fn record_pong(&self) {
        self.last_pong.store(now_secs(), Ordering::Relaxed);
    }

    pub fn is_alive(&self) -> bool {
        let last = self.last_pong.load(Ordering::Relaxed);
        now_secs().saturating_sub(last) < PEER_TIMEOUT.as_secs()
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Registry of all connected WebSocket peers.
///
/// Distinct from the room registry's connection index: this maps a
/// connection to its outbound send queue; delivery is best-effort and a
/// slow peer has messages dropped rather than blocking anyone else.
pub struct PeerRegistry {
    peers: DashMap<ConnectionId, Arc<Peer>>,
    max_send_queue: usize,
}

impl PeerRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            peers: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a new peer under a fresh connection id.
    pub fn register(&self) -> (ConnectionId, mpsc::Receiver<String>) {
        let id = ConnectionId::new();
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        self.peers
            .insert(id.clone(), Arc::new(Peer::new(id.clone(), tx)));
        (id, rx)
    }

    pub fn unregister(&self, id: &ConnectionId) {
        if let Some((_, peer)) = self.peers.remove(id) {
            peer.mark_disconnected();
        }
    }

    pub fn get(&self, id: &ConnectionId) -> Option<Arc<Peer>> {
        self.peers.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Send to one peer. Drops the message (with a warning) if its queue
    /// is full.
    pub fn send_to(&self, id: &ConnectionId, message: String) -> bool {
        let Some(peer) = self.peers.get(id) else {
            return false;
        };
        match peer.tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(msg)) => {
                tracing::warn!(
                    connection_id = %id,
                    msg_len = msg.len(),
                    "Send queue full, dropping message"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    pub fn send_many(&self, ids: &[ConnectionId], message: &str) {
        for id in ids {
            self.send_to(id, message.to_string());
        }
    }

    pub fn broadcast_all(&self, message: &str) {
        for entry in self.peers.iter() {
            let peer = entry.value();
            if peer.is_connected() {
                let _ = peer.tx.try_send(message.to_string());
            }
        }
    }

    pub fn count(&self) -> usize {
        self.peers.len()
    }

    /// Remove peers that stopped answering pings.
    pub fn reap_dead(&self) -> Vec<ConnectionId> {
        let dead: Vec<ConnectionId> = self
            .peers
            .iter()
            .filter(|entry| !entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();

        for id in &dead {
            self.unregister(id);
            tracing::info!(connection_id = %id, "Reaped unresponsive peer");
        }
        dead
    }
}

/// Drive one WebSocket connection: a writer task drains the peer's queue
/// and pings periodically, a reader task feeds inbound text frames to the
/// dispatcher and tracks pongs. Returns when either side closes.
pub async fn handle_ws_connection(
    socket: WebSocket,
    connection_id: ConnectionId,
    mut rx: mpsc::Receiver<String>,
    registry: Arc<PeerRegistry>,
    on_message: mpsc::Sender<(ConnectionId, String)>,
) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer_peer = registry.get(&connection_id);
    let writer = tokio::spawn(async move {
        let mut ping_interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        ping_interval.tick().await; // consume first immediate tick

        loop {
            tokio::select! {
                msg = rx.recv() => {
                    match msg {
                        Some(text) => {
                            if ws_tx.send(WsMessage::Text(text.into())).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                _ = ping_interval.tick() => {
                    if ws_tx.send(WsMessage::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(peer) = writer_peer {
            peer.mark_disconnected();
        }
    });

    let reader_peer = registry.get(&connection_id);
    let reader_id = connection_id.clone();
    let reader = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                WsMessage::Text(text) => {
                    let _ = on_message.send((reader_id.clone(), text.to_string())).await;
                }
                WsMessage::Pong(_) => {
                    if let Some(peer) = &reader_peer {
                        peer.record_pong();
                    }
                }
                WsMessage::Close(_) => break,
                WsMessage::Ping(_) => {} // axum answers pings itself
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = writer => {},
        _ = reader => {},
    }

    registry.unregister(&connection_id);
}

/// Periodically reap peers that stopped answering pings.
pub fn start_reaper_task(
    registry: Arc<PeerRegistry>,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let reaped = registry.reap_dead();
            if !reaped.is_empty() {
                tracing::info!(reaped = reaped.len(), "Dead peer cleanup");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_assigns_fresh_connection_ids() {
        let registry = PeerRegistry::new(32);
        let (a, _rx_a) = registry.register();
        let (b, _rx_b) = registry.register();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("conn_"));
        assert_eq!(registry.count(), 2);
    }

    #[test]
    fn unregister_removes_and_marks_disconnected() {
        let registry = PeerRegistry::new(32);
        let (id, _rx) = registry.register();
        let peer = registry.get(&id).unwrap();

        registry.unregister(&id);
        assert_eq!(registry.count(), 0);
        assert!(!peer.is_connected());
    }

    #[tokio::test]
    async fn send_to_delivers() {
        let registry = PeerRegistry::new(32);
        let (id, mut rx) = registry.register();

        assert!(registry.send_to(&id, "hello".into()));
        assert_eq!(rx.recv().await.unwrap(), "hello");
    }

    #[test]
    fn send_to_unknown_peer_is_false() {
        let registry = PeerRegistry::new(32);
        assert!(!registry.send_to(&ConnectionId::from_raw("conn_ghost"), "x".into()));
    }

    #[test]
    fn send_to_full_queue_drops() {
        let registry = PeerRegistry::new(2);
        let (id, _rx) = registry.register();

        assert!(registry.send_to(&id, "1".into()));
        assert!(registry.send_to(&id, "2".into()));
        assert!(!registry.send_to(&id, "3".into()));
    }

    #[test]
    fn broadcast_reaches_every_peer() {
        let registry = PeerRegistry::new(32);
        let (_a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        registry.broadcast_all("ping");
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn send_many_targets_only_listed_peers() {
        let registry = PeerRegistry::new(32);
        let (a, mut rx_a) = registry.register();
        let (_b, mut rx_b) = registry.register();

        registry.send_many(&[a], "hi");
        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn reap_removes_expired_peers() {
        let registry = PeerRegistry::new(32);
        let (id, _rx) = registry.register();
        registry.get(&id).unwrap().last_pong.store(0, Ordering::Relaxed);

        let reaped = registry.reap_dead();
        assert_eq!(reaped, vec![id]);
        assert_eq!(registry.count(), 0);
    }

    #[test]
    fn pong_tracking_keeps_peer_alive() {
        let (tx, _rx) = mpsc::channel(1);
        let peer = Peer::new(ConnectionId::new(), tx);
        assert!(peer.is_alive());
        peer.record_pong();
        assert!(peer.is_alive());
    }
}
