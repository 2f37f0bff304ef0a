//! WebSocket client state: the shared connection plus its outbound queue.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use gate_core::Connection;
use parking_lot::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

/// Result of a non-blocking enqueue.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// The message is on the outbound queue.
    Queued,
    /// The queue is at capacity; the message was dropped.
    Full,
    /// The queue has been closed.
    Closed,
}

/// A connected WebSocket client.
pub struct ClientConnection {
    conn: Arc<Connection>,
    /// Sender half of the outbound queue. `None` once closed.
    tx: Mutex<Option<mpsc::Sender<Arc<str>>>>,
    /// Cancelled when the session must end.
    cancel: CancellationToken,
    /// Messages dropped because the queue was full.
    dropped_messages: AtomicU64,
}

impl ClientConnection {
    /// Wrap `conn` with an outbound queue.
    pub fn new(conn: Connection, tx: mpsc::Sender<Arc<str>>, cancel: CancellationToken) -> Self {
        Self {
            conn: Arc::new(conn),
            tx: Mutex::new(Some(tx)),
            cancel,
            dropped_messages: AtomicU64::new(0),
        }
    }

    /// Connection ID.
    pub fn id(&self) -> &str {
        &self.conn.id
    }

    /// The transport-neutral connection.
    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Token the session's workers observe.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Enqueue a text frame without waiting.
    pub fn send(&self, message: Arc<str>) -> Delivery {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            return Delivery::Closed;
        };
        match tx.try_send(message) {
            Ok(()) => Delivery::Queued,
            Err(TrySendError::Full(_)) => {
                let _ = self.dropped_messages.fetch_add(1, Ordering::Relaxed);
                Delivery::Full
            }
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }

    /// Serialize a JSON value and enqueue it.
    pub fn send_json(&self, value: &serde_json::Value) -> Delivery {
        match serde_json::to_string(value) {
            Ok(json) => self.send(Arc::from(json)),
            Err(_) => Delivery::Closed,
        }
    }

    /// Close the outbound queue and signal the workers.
    ///
    /// Returns `true` only for the call that actually closed it.
    pub fn close(&self) -> bool {
        let was_open = self.tx.lock().take().is_some();
        self.cancel.cancel();
        was_open
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.tx.lock().is_none()
    }

    /// Whether the connection is subscribed to `channel`.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.conn.is_subscribed(channel)
    }

    /// Messages dropped for this client because its queue was full.
    pub fn drop_count(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.conn.connected_at.elapsed()
    }
}
