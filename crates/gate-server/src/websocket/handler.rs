//! Inbound WebSocket envelope handling.
//!
//! Every text frame produces exactly one reply. Bad envelopes get an error
//! response and the connection stays open.

use gate_core::{Connection, Dispatcher, GateError, Params};
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use super::envelope::{Envelope, Outbound};

/// Method label used for WebSocket dispatches.
pub const WEBSOCKET_METHOD: &str = "WEBSOCKET";

/// Handle one inbound text frame and build the reply.
#[instrument(skip_all, fields(conn_id = %conn.id, kind))]
pub async fn handle_message(
    text: &str,
    conn: &Connection,
    dispatcher: &Dispatcher,
    locator: &str,
) -> Envelope {
    let object = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(object)) => object,
        Ok(_) => {
            return reply(
                None,
                Err(GateError::InvalidMessage {
                    message: "Message must be a JSON object".into(),
                }),
            );
        }
        Err(e) => {
            debug!(error = %e, "invalid JSON received");
            return reply(
                None,
                Err(GateError::InvalidMessage {
                    message: format!("Invalid JSON: {e}"),
                }),
            );
        }
    };

    let message_id = object.get("messageId").cloned();
    let body = route(&object, conn, dispatcher, locator).await;
    reply(message_id, body)
}

async fn route(
    object: &Map<String, Value>,
    conn: &Connection,
    dispatcher: &Dispatcher,
    locator: &str,
) -> Result<Outbound, GateError> {
    let Some(kind) = non_empty_str(object, "type") else {
        return Err(invalid("Message type is required"));
    };
    let _ = tracing::Span::current().record("kind", kind);

    match kind {
        "action" => {
            let name = non_empty_str(object, "action").ok_or_else(|| invalid("Action name is required"))?;
            let params: Params = object
                .get("params")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default();
            let outcome = dispatcher
                .dispatch(conn, name, params, WEBSOCKET_METHOD, locator)
                .await;
            Ok(Outbound::from_result(outcome.into_result()))
        }
        "subscribe" => {
            let channel = non_empty_str(object, "channel").ok_or_else(|| invalid("Channel name is required"))?;
            if !conn.subscribe(channel) {
                debug!(channel, "already subscribed");
            }
            Ok(Outbound::Subscribed {
                channel: channel.to_owned(),
            })
        }
        "unsubscribe" => {
            let channel = non_empty_str(object, "channel").ok_or_else(|| invalid("Channel name is required"))?;
            if !conn.unsubscribe(channel) {
                debug!(channel, "was not subscribed");
            }
            Ok(Outbound::Unsubscribed {
                channel: channel.to_owned(),
            })
        }
        other => Err(GateError::UnknownMessageType { kind: other.to_owned() }),
    }
}

fn reply(message_id: Option<Value>, body: Result<Outbound, GateError>) -> Envelope {
    let body = body.unwrap_or_else(|err| Outbound::error(&err));
    Envelope::new(body, message_id)
}

fn non_empty_str<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    object.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn invalid(message: &str) -> GateError {
    GateError::InvalidMessage {
        message: message.to_owned(),
    }
}
