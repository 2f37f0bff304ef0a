//! Channel fan-out to subscribed WebSocket clients.
//!
//! Publishers push onto one bounded queue and never wait. A single worker
//! drains it and offers each message to every subscriber without waiting
//! either; a subscriber whose own queue is full simply misses the message.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use gate_core::{GateError, Publisher};
use metrics::counter;
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::connection::Delivery;
use super::envelope::{Envelope, Outbound};
use super::manager::ConnectionManager;
use crate::metrics::{BROADCASTS_PUBLISHED_TOTAL, WS_BROADCAST_DROPS_TOTAL};

/// A serialized message bound for one channel.
#[derive(Clone, Debug)]
pub struct BroadcastMessage {
    /// Target channel.
    pub channel: String,
    /// Serialized `broadcast` envelope.
    pub payload: Arc<str>,
}

/// Shared broadcast queue plus its fan-out worker.
pub struct BroadcastEngine {
    tx: mpsc::Sender<BroadcastMessage>,
    rx: Mutex<Option<mpsc::Receiver<BroadcastMessage>>>,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl BroadcastEngine {
    /// Create an engine with a queue of `capacity` messages.
    pub fn new(manager: Arc<ConnectionManager>, capacity: usize, shutdown: CancellationToken) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            manager,
            shutdown,
            dropped: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Spawn the fan-out worker on `tracker`.
    ///
    /// Returns `false` if the worker was already started.
    pub fn start(&self, tracker: &TaskTracker) -> bool {
        let Some(rx) = self.rx.lock().take() else {
            return false;
        };
        let _handle = tracker.spawn(fan_out(
            rx,
            Arc::clone(&self.manager),
            self.shutdown.clone(),
            Arc::clone(&self.dropped),
        ));
        true
    }

    /// Messages dropped for full subscriber queues since startup.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Publisher for BroadcastEngine {
    fn broadcast(&self, channel: &str, data: Value) -> Result<(), GateError> {
        if self.shutdown.is_cancelled() {
            return Err(GateError::ShuttingDown);
        }
        let envelope = Envelope::new(
            Outbound::Broadcast {
                channel: channel.to_owned(),
                data,
            },
            None,
        );
        let payload = envelope
            .to_json()
            .map_err(|e| GateError::internal(format!("failed to serialize broadcast: {e}")))?;

        let message = BroadcastMessage {
            channel: channel.to_owned(),
            payload: Arc::from(payload),
        };
        match self.tx.try_send(message) {
            Ok(()) => {
                counter!(BROADCASTS_PUBLISHED_TOTAL).increment(1);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                warn!(channel, "broadcast queue full, message rejected");
                Err(GateError::BroadcastQueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(GateError::ShuttingDown),
        }
    }
}

async fn fan_out(
    mut rx: mpsc::Receiver<BroadcastMessage>,
    manager: Arc<ConnectionManager>,
    shutdown: CancellationToken,
    dropped: Arc<AtomicU64>,
) {
    loop {
        let message = tokio::select! {
            biased;
            () = shutdown.cancelled() => break,
            message = rx.recv() => match message {
                Some(message) => message,
                None => break,
            },
        };
        deliver(&message, &manager, &dropped);
    }
    rx.close();
    debug!("broadcast worker stopped");
}

fn deliver(message: &BroadcastMessage, manager: &ConnectionManager, dropped: &AtomicU64) {
    let recipients = manager.subscribers(&message.channel);
    debug!(channel = %message.channel, recipients = recipients.len(), "fan-out");
    for client in recipients {
        match client.send(Arc::clone(&message.payload)) {
            Delivery::Queued | Delivery::Closed => {}
            Delivery::Full => {
                let _ = dropped.fetch_add(1, Ordering::Relaxed);
                counter!(WS_BROADCAST_DROPS_TOTAL).increment(1);
                warn!(
                    conn_id = %client.id(),
                    channel = %message.channel,
                    "subscriber queue full, broadcast dropped"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::websocket::connection::ClientConnection;
    use gate_core::{Connection, TransportKind};
    use serde_json::json;
    use std::time::Duration;

    fn make_client(
        mgr: &ConnectionManager,
        id: &str,
        capacity: usize,
        channels: &[&str],
    ) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = Connection::with_id(id, TransportKind::WebSocket, "peer");
        for ch in channels {
            let _ = conn.subscribe(ch);
        }
        let client = Arc::new(ClientConnection::new(conn, tx, CancellationToken::new()));
        mgr.insert(Arc::clone(&client));
        (client, rx)
    }

    async fn recv(rx: &mut mpsc::Receiver<Arc<str>>) -> Value {
        let msg = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        serde_json::from_str(&msg).unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_exactly_one_envelope() {
        let mgr = Arc::new(ConnectionManager::new());
        let (_c1, mut rx1) = make_client(&mgr, "c1", 8, &["news"]);
        let (_c2, mut rx2) = make_client(&mgr, "c2", 8, &["sports"]);

        let tracker = TaskTracker::new();
        let engine = BroadcastEngine::new(Arc::clone(&mgr), 8, CancellationToken::new());
        assert!(engine.start(&tracker));
        assert!(!engine.start(&tracker));

        engine.broadcast("news", json!({"headline": "hi"})).unwrap();

        let got = recv(&mut rx1).await;
        assert_eq!(got, json!({"type": "broadcast", "channel": "news", "data": {"headline": "hi"}}));

        // A second publish to another channel proves nothing else was queued for c1.
        engine.broadcast("sports", json!(1)).unwrap();
        let got = recv(&mut rx2).await;
        assert_eq!(got["channel"], "sports");
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn full_subscriber_queue_is_counted_not_blocking() {
        let mgr = Arc::new(ConnectionManager::new());
        let (slow, _slow_rx) = make_client(&mgr, "slow", 1, &["c"]);
        let (_fast, mut fast_rx) = make_client(&mgr, "fast", 8, &["c", "marker"]);

        let tracker = TaskTracker::new();
        let engine = BroadcastEngine::new(Arc::clone(&mgr), 8, CancellationToken::new());
        let _ = engine.start(&tracker);

        engine.broadcast("c", json!(1)).unwrap();
        engine.broadcast("c", json!(2)).unwrap();

        assert_eq!(recv(&mut fast_rx).await["data"], 1);
        assert_eq!(recv(&mut fast_rx).await["data"], 2);
        // The worker is sequential: once the marker arrives, every earlier
        // fan-out has finished.
        engine.broadcast("marker", json!(null)).unwrap();
        assert_eq!(recv(&mut fast_rx).await["channel"], "marker");
        assert_eq!(engine.dropped(), 1);
        assert_eq!(slow.drop_count(), 1);
    }

    #[test]
    fn full_broadcast_queue_fails_fast() {
        let mgr = Arc::new(ConnectionManager::new());
        // Worker not started, so nothing drains the queue.
        let engine = BroadcastEngine::new(mgr, 1, CancellationToken::new());
        engine.broadcast("c", json!(1)).unwrap();
        let err = engine.broadcast("c", json!(2)).unwrap_err();
        assert!(matches!(err, GateError::BroadcastQueueFull));
    }

    #[test]
    fn broadcast_after_shutdown_is_rejected() {
        let token = CancellationToken::new();
        let engine = BroadcastEngine::new(Arc::new(ConnectionManager::new()), 4, token.clone());
        token.cancel();
        let err = engine.broadcast("c", json!(null)).unwrap_err();
        assert!(matches!(err, GateError::ShuttingDown));
    }

    #[tokio::test]
    async fn worker_exits_on_shutdown() {
        let token = CancellationToken::new();
        let tracker = TaskTracker::new();
        let engine = BroadcastEngine::new(Arc::new(ConnectionManager::new()), 4, token.clone());
        let _ = engine.start(&tracker);
        token.cancel();
        let _ = tracker.close();
        tokio::time::timeout(Duration::from_secs(2), tracker.wait())
            .await
            .unwrap();
    }
}
