//! Error codes and error types shared by every transport.

use serde::{Deserialize, Serialize};

// ── Error code constants ────────────────────────────────────────────

/// No action registered under the requested name.
pub const ACTION_NOT_FOUND: &str = "ACTION_NOT_FOUND";
/// No route matched the request method and path.
pub const ROUTE_NOT_FOUND: &str = "ROUTE_NOT_FOUND";
/// Request body or query could not be parsed.
pub const INVALID_REQUEST: &str = "INVALID_REQUEST";
/// WebSocket envelope is malformed or missing a field.
pub const INVALID_MESSAGE: &str = "INVALID_MESSAGE";
/// WebSocket envelope carries an unrecognized `type`.
pub const UNKNOWN_MESSAGE_TYPE: &str = "UNKNOWN_MESSAGE_TYPE";
/// A required input is absent.
pub const PARAM_REQUIRED: &str = "PARAM_REQUIRED";
/// An input has the wrong shape.
pub const PARAM_VALIDATION: &str = "PARAM_VALIDATION";
/// An action with the same name is already registered.
pub const DUPLICATE_ACTION: &str = "DUPLICATE_ACTION";
/// Default code for an error raised by an action.
pub const ACTION_ERROR: &str = "ACTION_ERROR";
/// Action exceeded its time budget.
pub const ACTION_TIMEOUT: &str = "ACTION_TIMEOUT";
/// Broadcast rejected because the gateway is stopping.
pub const SHUTTING_DOWN: &str = "SHUTTING_DOWN";
/// Broadcast rejected because the shared queue is full.
pub const BROADCAST_QUEUE_FULL: &str = "BROADCAST_QUEUE_FULL";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Request-path error: everything a caller of an action can observe.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The action name is not registered.
    #[error("action '{name}' not found")]
    ActionNotFound {
        /// Requested action name.
        name: String,
    },

    /// No route matched.
    #[error("no route for {method} {path}")]
    RouteNotFound {
        /// Request method.
        method: String,
        /// Request path, after prefix stripping.
        path: String,
    },

    /// Body or query could not be decoded.
    #[error("{message}")]
    MalformedRequest {
        /// Decoder message.
        message: String,
    },

    /// WebSocket envelope is missing a field or is not a JSON object.
    #[error("{message}")]
    InvalidMessage {
        /// What is wrong with the envelope.
        message: String,
    },

    /// WebSocket envelope type is not recognized.
    #[error("Unknown message type: {kind}")]
    UnknownMessageType {
        /// The offending `type` value.
        kind: String,
    },

    /// A required input is missing.
    #[error("missing required param '{key}'")]
    ParamRequired {
        /// Input name.
        key: String,
    },

    /// An input failed validation.
    #[error("invalid param '{key}': {message}")]
    ParamInvalid {
        /// Input name.
        key: String,
        /// Validation failure.
        message: String,
    },

    /// Registration of a name that already exists.
    #[error("action '{name}' is already registered")]
    DuplicateAction {
        /// Conflicting name.
        name: String,
    },

    /// Error surfaced by an action; treated as data.
    #[error("{message}")]
    Execution {
        /// Machine-readable code chosen by the action.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The action did not finish in time.
    #[error("action '{name}' timed out after {secs}s")]
    Timeout {
        /// Action name.
        name: String,
        /// Budget that was exceeded.
        secs: u64,
    },

    /// The gateway is stopping.
    #[error("server is shutting down")]
    ShuttingDown,

    /// The broadcast queue is at capacity.
    #[error("broadcast channel is full")]
    BroadcastQueueFull,

    /// Unexpected failure.
    #[error("{message}")]
    Internal {
        /// Description.
        message: String,
    },
}

impl GateError {
    /// Shorthand for an action error with the default code.
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            code: ACTION_ERROR.to_owned(),
            message: message.into(),
        }
    }

    /// Shorthand for an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Machine-readable error code for this variant.
    pub fn code(&self) -> &str {
        match self {
            Self::ActionNotFound { .. } => ACTION_NOT_FOUND,
            Self::RouteNotFound { .. } => ROUTE_NOT_FOUND,
            Self::MalformedRequest { .. } => INVALID_REQUEST,
            Self::InvalidMessage { .. } => INVALID_MESSAGE,
            Self::UnknownMessageType { .. } => UNKNOWN_MESSAGE_TYPE,
            Self::ParamRequired { .. } => PARAM_REQUIRED,
            Self::ParamInvalid { .. } => PARAM_VALIDATION,
            Self::DuplicateAction { .. } => DUPLICATE_ACTION,
            Self::Execution { code, .. } => code,
            Self::Timeout { .. } => ACTION_TIMEOUT,
            Self::ShuttingDown => SHUTTING_DOWN,
            Self::BroadcastQueueFull => BROADCAST_QUEUE_FULL,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }

    /// HTTP status that best describes this error.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ActionNotFound { .. } | Self::RouteNotFound { .. } => 404,
            Self::MalformedRequest { .. }
            | Self::InvalidMessage { .. }
            | Self::UnknownMessageType { .. }
            | Self::ParamRequired { .. }
            | Self::ParamInvalid { .. } => 400,
            Self::DuplicateAction { .. } => 409,
            Self::Execution { .. } => 422,
            Self::Timeout { .. } => 504,
            Self::ShuttingDown | Self::BroadcastQueueFull => 503,
            Self::Internal { .. } => 500,
        }
    }

    /// Convert to the wire-format error body.
    ///
    /// Internal errors are reported with a generic message; the full text
    /// only goes to the log.
    pub fn to_error_body(&self) -> ErrorBody {
        let message = match self {
            Self::Internal { .. } => "Internal error".to_owned(),
            other => other.to_string(),
        };
        ErrorBody {
            code: self.code().to_owned(),
            message,
        }
    }
}

/// Structured error body inside a failure envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code (e.g. `ROUTE_NOT_FOUND`).
    pub code: String,
    /// Human-readable message.
    pub message: String,
}

/// Lifecycle misuse or a component failure during startup/shutdown.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// `start` called while running.
    #[error("api is already running")]
    AlreadyRunning,

    /// `stop` called while not running.
    #[error("api is not running")]
    NotRunning,

    /// `initialize` called twice.
    #[error("api is already initialized")]
    AlreadyInitialized,

    /// `start` called before `initialize`.
    #[error("api is not initialized")]
    NotInitialized,

    /// The orchestrator has been stopped and cannot be reused.
    #[error("api has been stopped")]
    Stopped,

    /// A component hook failed.
    #[error("failed to {phase} {name}: {source}")]
    Component {
        /// `initialize`, `start`, or `stop`.
        phase: &'static str,
        /// Component name.
        name: String,
        /// Underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_codes_map_to_404() {
        let err = GateError::ActionNotFound { name: "x".into() };
        assert_eq!(err.code(), ACTION_NOT_FOUND);
        assert_eq!(err.http_status(), 404);

        let err = GateError::RouteNotFound {
            method: "GET".into(),
            path: "/nope".into(),
        };
        assert_eq!(err.code(), ROUTE_NOT_FOUND);
        assert_eq!(err.http_status(), 404);
        assert_eq!(err.to_string(), "no route for GET /nope");
    }

    #[test]
    fn internal_maps_to_500() {
        let err = GateError::internal("failed at /var/lib/gate/state: disk full");
        assert_eq!(err.code(), INTERNAL_ERROR);
        assert_eq!(err.http_status(), 500);
        assert_eq!(err.to_error_body().message, "Internal error");
    }

    #[test]
    fn execution_keeps_action_code() {
        let err = GateError::Execution {
            code: "USER_EXISTS".into(),
            message: "taken".into(),
        };
        assert_eq!(err.code(), "USER_EXISTS");
        let body = err.to_error_body();
        assert_eq!(body.code, "USER_EXISTS");
        assert_eq!(body.message, "taken");
    }

    #[test]
    fn execution_shorthand_uses_default_code() {
        assert_eq!(GateError::execution("nope").code(), ACTION_ERROR);
    }

    #[test]
    fn unknown_message_type_text() {
        let err = GateError::UnknownMessageType { kind: "ping".into() };
        assert_eq!(err.to_string(), "Unknown message type: ping");
        assert_eq!(err.http_status(), 400);
    }

    #[test]
    fn broadcast_errors_are_unavailable() {
        assert_eq!(GateError::ShuttingDown.http_status(), 503);
        assert_eq!(GateError::BroadcastQueueFull.code(), BROADCAST_QUEUE_FULL);
    }

    #[test]
    fn component_error_names_phase_and_component() {
        let err = LifecycleError::Component {
            phase: "start",
            name: "web".into(),
            source: anyhow::anyhow!("address in use"),
        };
        assert_eq!(err.to_string(), "failed to start web: address in use");
    }
}
