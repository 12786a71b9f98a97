//! The error hierarchy shared by every component of the protocol engine.

use thiserror::Error;

/// Something went wrong somewhere in the STOMP protocol engine.
#[derive(Debug, Error)]
pub enum StompError {
    /// Malformed wire bytes: bad command, missing header separator, illegal
    /// body for the command/version, or an undecodable escape sequence.
    #[error("frame error: {0}")]
    Frame(String),

    /// A frame or session operation that is semantically illegal for the
    /// current state, negotiated version, or bookkeeping.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The transport is unavailable or was closed unexpectedly.
    #[error("connection error: {0}")]
    Connection(String),

    /// The failover iterator exhausted its configured attempt budget.
    #[error("connect timeout: {0}")]
    ConnectTimeout(String),

    /// An exclusive operation was started while one was already in flight.
    ///
    /// Reserved for the async client collaborator; the core never raises it.
    #[error("already running: {0}")]
    AlreadyRunning(String),

    /// An exclusive operation was queried while none was in flight.
    ///
    /// Reserved for the async client collaborator; the core never raises it.
    #[error("not running: {0}")]
    NotRunning(String),
}

impl StompError {
    pub(crate) fn frame(msg: impl Into<String>) -> Self {
        StompError::Frame(msg.into())
    }

    pub(crate) fn protocol(msg: impl Into<String>) -> Self {
        StompError::Protocol(msg.into())
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StompError>;
