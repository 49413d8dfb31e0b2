use std::sync::Arc;

use tokio::sync::broadcast;

use huddle_core::events::{Notification, Target};

use crate::peer::PeerRegistry;

/// Subscribes to the registry's notification broadcast and forwards each
/// event to its target peers.
pub struct NotificationBridge {
    peers: Arc<PeerRegistry>,
}

impl NotificationBridge {
    pub fn new(peers: Arc<PeerRegistry>) -> Self {
        Self { peers }
    }

    /// Start the bridge. Spawns a task that reads from the broadcast
    /// channel, serializes each event once, and routes it by target.
    pub fn start(&self, mut rx: broadcast::Receiver<Notification>) -> tokio::task::JoinHandle<()> {
        let peers = Arc::clone(&self.peers);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(notification) => deliver(&peers, notification),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!(skipped = n, "Notification bridge lagged, dropped events");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Notification channel closed");
                        break;
                    }
                }
            }
        })
    }
}

/// Create a notification bridge wired to a broadcast channel.
pub fn create_bridge(
    peers: Arc<PeerRegistry>,
    rx: broadcast::Receiver<Notification>,
) -> tokio::task::JoinHandle<()> {
    let bridge = NotificationBridge::new(peers);
    bridge.start(rx)
}

fn deliver(peers: &PeerRegistry, notification: Notification) {
    let json = match serde_json::to_string(&notification.event) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(error = %e, event = notification.event.event_type(), "Event serialization failed");
            return;
        }
    };

    match notification.target {
        Target::All => peers.broadcast_all(&json),
        Target::Peer(conn) => {
            peers.send_to(&conn, json);
        }
        Target::Peers(conns) => peers.send_many(&conns, &json),
    }
}
