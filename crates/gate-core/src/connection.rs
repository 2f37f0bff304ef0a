//! Per-client identity and subscription state, shared by all transports.

use std::collections::HashSet;
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::Value;
use uuid::Uuid;

use crate::types::TransportKind;

/// Session data attached to a connection.
///
/// Storage and cookie handling live elsewhere; a connection only carries
/// what was loaded for it.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionData {
    /// Session ID.
    pub id: String,
    /// Cookie the session was read from.
    pub cookie_name: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// Arbitrary session payload.
    pub data: serde_json::Map<String, Value>,
}

/// One client of the gateway.
///
/// HTTP creates one per request, WebSocket one per socket, the CLI one per
/// invocation.
#[derive(Debug)]
pub struct Connection {
    /// Unique connection ID.
    pub id: String,
    /// Transport this connection arrived on.
    pub kind: TransportKind,
    /// Remote identifier (peer address, `cli:<user>`, ...).
    pub identifier: String,
    /// When this connection was established.
    pub connected_at: Instant,
    session: RwLock<Option<SessionData>>,
    subscriptions: RwLock<HashSet<String>>,
}

impl Connection {
    /// Create a connection with a fresh ID.
    pub fn new(kind: TransportKind, identifier: impl Into<String>) -> Self {
        Self::with_id(Uuid::now_v7().to_string(), kind, identifier)
    }

    /// Create a connection with a caller-chosen ID.
    pub fn with_id(id: impl Into<String>, kind: TransportKind, identifier: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            identifier: identifier.into(),
            connected_at: Instant::now(),
            session: RwLock::new(None),
            subscriptions: RwLock::new(HashSet::new()),
        }
    }

    /// Add a channel. Returns `false` if already subscribed.
    pub fn subscribe(&self, channel: &str) -> bool {
        self.subscriptions.write().insert(channel.to_owned())
    }

    /// Remove a channel. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, channel: &str) -> bool {
        self.subscriptions.write().remove(channel)
    }

    /// Whether the connection listens on `channel`.
    pub fn is_subscribed(&self, channel: &str) -> bool {
        self.subscriptions.read().contains(channel)
    }

    /// Sorted snapshot of subscribed channels.
    pub fn subscriptions(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.subscriptions.read().iter().cloned().collect();
        channels.sort();
        channels
    }

    /// Attach session data.
    pub fn set_session(&self, session: SessionData) {
        *self.session.write() = Some(session);
    }

    /// Current session data, if loaded.
    pub fn session(&self) -> Option<SessionData> {
        self.session.read().clone()
    }

    /// Whether session data has been attached.
    pub fn is_session_loaded(&self) -> bool {
        self.session.read().is_some()
    }
}
