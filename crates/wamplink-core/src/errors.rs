//! Error types for the router link
//!
//! One taxonomy drives the whole retry policy: `ConnectionRefused` is the
//! single transient kind (router not listening yet) and is retried with a
//! fixed backoff; every other failure during the handshake abandons the
//! attempt so configuration mistakes are not masked by an infinite loop.

use thiserror::Error;

/// Failures surfaced by a [`crate::RouterSession`] operation
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// Nothing is accepting connections at the endpoint
    #[error("connection refused by router")]
    ConnectionRefused,

    /// Transport-level failure (socket closed, framing error, ...)
    #[error("transport error: {0}")]
    Transport(String),

    /// The router violated or rejected the protocol exchange
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The router refused the realm join
    #[error("realm {realm} rejected the session: {reason}")]
    AuthenticationRejected { realm: String, reason: String },

    /// Operation issued against a session that already left or stopped
    #[error("session closed: {0}")]
    Closed(String),

    /// No procedure registered under the requested name
    #[error("no such procedure: {0}")]
    NoSuchProcedure(String),

    /// A provided procedure declined the call (bad arguments, backpressure)
    #[error("call rejected: {0}")]
    CallRejected(String),
}

impl SessionError {
    /// True for the one failure mode worth retrying: the router is simply
    /// not up yet.
    pub fn is_transient(&self) -> bool {
        matches!(self, SessionError::ConnectionRefused)
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
