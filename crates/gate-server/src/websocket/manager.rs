//! Table of live WebSocket sessions.

use std::collections::HashMap;
use std::sync::Arc;

use metrics::{counter, gauge, histogram};
use parking_lot::RwLock;
use tracing::{debug, info};

use super::connection::ClientConnection;
use crate::metrics::{WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL, WS_DISCONNECTIONS_TOTAL};

/// Live sessions keyed by connection ID.
///
/// Each operation takes the lock once and touches nothing else while holding
/// it.
#[derive(Default)]
pub struct ConnectionManager {
    sessions: RwLock<HashMap<String, Arc<ClientConnection>>>,
}

impl ConnectionManager {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a freshly upgraded session.
    pub fn insert(&self, client: Arc<ClientConnection>) {
        let id = client.id().to_owned();
        let _ = self.sessions.write().insert(id.clone(), client);
        counter!(WS_CONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);
        debug!(conn_id = %id, "session registered");
    }

    /// Remove a session and close its queue.
    ///
    /// Safe to call any number of times; only the first call has an effect.
    pub fn remove(&self, id: &str) -> bool {
        let Some(client) = self.sessions.write().remove(id) else {
            return false;
        };
        let _ = client.close();
        counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
        gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
        histogram!(WS_CONNECTION_DURATION_SECONDS).record(client.age().as_secs_f64());
        info!(
            conn_id = %id,
            dropped = client.drop_count(),
            "session removed"
        );
        true
    }

    /// Look up a session.
    pub fn get(&self, id: &str) -> Option<Arc<ClientConnection>> {
        self.sessions.read().get(id).cloned()
    }

    /// Sessions currently subscribed to `channel`.
    pub fn subscribers(&self, channel: &str) -> Vec<Arc<ClientConnection>> {
        self.sessions
            .read()
            .values()
            .filter(|c| c.is_subscribed(channel))
            .cloned()
            .collect()
    }

    /// Signal every session to close. Each session removes itself.
    pub fn close_all(&self) -> usize {
        let clients: Vec<_> = self.sessions.read().values().cloned().collect();
        for client in &clients {
            client.cancel_token().cancel();
        }
        clients.len()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether there are no live sessions.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gate_core::{Connection, TransportKind};
    use tokio::sync::mpsc;
    use tokio_util::sync::CancellationToken;

    fn make_client(id: &str) -> (Arc<ClientConnection>, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(8);
        let conn = Connection::with_id(id, TransportKind::WebSocket, "peer");
        (Arc::new(ClientConnection::new(conn, tx, CancellationToken::new())), rx)
    }

    #[test]
    fn insert_and_get() {
        let mgr = ConnectionManager::new();
        let (c1, _rx) = make_client("c1");
        mgr.insert(c1);
        assert_eq!(mgr.len(), 1);
        assert!(mgr.get("c1").is_some());
        assert!(mgr.get("c2").is_none());
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let mgr = ConnectionManager::new();
        let (c1, mut rx) = make_client("c1");
        mgr.insert(Arc::clone(&c1));

        assert!(mgr.remove("c1"));
        assert!(!mgr.remove("c1"));
        assert!(!mgr.remove("never_existed"));
        assert!(mgr.is_empty());
        assert!(c1.is_closed());
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn subscribers_filters_by_channel() {
        let mgr = ConnectionManager::new();
        let (c1, _r1) = make_client("c1");
        let (c2, _r2) = make_client("c2");
        let (c3, _r3) = make_client("c3");
        let _ = c1.connection().subscribe("news");
        let _ = c3.connection().subscribe("news");
        let _ = c2.connection().subscribe("sports");
        mgr.insert(c1);
        mgr.insert(c2);
        mgr.insert(c3);

        let mut ids: Vec<String> = mgr
            .subscribers("news")
            .iter()
            .map(|c| c.id().to_owned())
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["c1", "c3"]);
        assert!(mgr.subscribers("weather").is_empty());
    }

    #[test]
    fn close_all_cancels_every_session() {
        let mgr = ConnectionManager::new();
        let (c1, _r1) = make_client("c1");
        let (c2, _r2) = make_client("c2");
        mgr.insert(Arc::clone(&c1));
        mgr.insert(Arc::clone(&c2));

        assert_eq!(mgr.close_all(), 2);
        assert!(c1.cancel_token().is_cancelled());
        assert!(c2.cancel_token().is_cancelled());
    }
}
