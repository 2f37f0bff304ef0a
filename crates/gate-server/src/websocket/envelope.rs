//! Outbound WebSocket envelopes.

use gate_core::{ErrorBody, GateError};
use serde::Serialize;
use serde_json::Value;

/// Body of an outbound frame, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Outbound {
    /// Result of an action call, or an error for a bad envelope.
    Response {
        /// Whether `data` or `error` is set.
        success: bool,
        /// Action result.
        #[serde(skip_serializing_if = "Option::is_none")]
        data: Option<Value>,
        /// Failure.
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
    /// Subscription confirmed.
    Subscribed {
        /// Channel joined.
        channel: String,
    },
    /// Unsubscription confirmed.
    Unsubscribed {
        /// Channel left.
        channel: String,
    },
    /// Message published on a channel.
    Broadcast {
        /// Channel name.
        channel: String,
        /// Published payload.
        data: Value,
    },
}

impl Outbound {
    /// Response envelope for an action result.
    pub fn from_result(result: Result<Value, GateError>) -> Self {
        match result {
            Ok(data) => Self::Response {
                success: true,
                data: Some(data),
                error: None,
            },
            Err(err) => Self::error(&err),
        }
    }

    /// Failure response envelope.
    pub fn error(err: &GateError) -> Self {
        Self::Response {
            success: false,
            data: None,
            error: Some(err.to_error_body()),
        }
    }
}

/// An outbound frame, echoing the caller's `messageId` when one was sent.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Envelope {
    /// Typed body.
    #[serde(flatten)]
    pub body: Outbound,
    /// Correlation ID copied from the request.
    #[serde(rename = "messageId", skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Value>,
}

impl Envelope {
    /// Wrap a body with an optional correlation ID.
    pub fn new(body: Outbound, message_id: Option<Value>) -> Self {
        Self { body, message_id }
    }

    /// Serialize to a JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
