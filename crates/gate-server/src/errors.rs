//! Gateway server errors.

use std::io;

/// Failure while building or running the gateway.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A route pattern did not compile.
    #[error("failed to compile route '{pattern}' for action {action}: {source}")]
    InvalidRoute {
        /// Owning action.
        action: String,
        /// Pattern as declared.
        pattern: String,
        /// Regex failure.
        source: regex::Error,
    },

    /// A configured header value is not valid header text.
    #[error("invalid value for header {name}: {value:?}")]
    InvalidHeader {
        /// Header name.
        name: String,
        /// Rejected value.
        value: String,
    },

    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Requested address.
        addr: String,
        /// I/O failure.
        source: io::Error,
    },

    /// `listen` called twice.
    #[error("gateway is already listening")]
    AlreadyListening,

    /// The gateway was stopped and cannot listen again.
    #[error("gateway has been shut down")]
    ShutDown,
}
