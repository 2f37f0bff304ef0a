//! Capability to push a message to channel subscribers.

use serde_json::Value;

use crate::errors::GateError;

/// Fire-and-forget publishing onto a named channel.
///
/// Delivery is at most once. Implementations fail fast instead of waiting
/// for queue space.
pub trait Publisher: Send + Sync {
    /// Queue `data` for every connection subscribed to `channel`.
    fn broadcast(&self, channel: &str, data: Value) -> Result<(), GateError>;
}
