//! Line Relay error types.
//!
//! Session-local I/O failures are not represented here: they are terminal to
//! the owning task only and are logged where they occur. `RelayError` covers
//! the failures that cross component boundaries.

use thiserror::Error;

/// Line Relay error type.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Accepting a connection on the listener failed. Terminal for the
    /// acceptor loop; the binary converts it into a shutdown trigger.
    #[error("Accept error: {0}")]
    Accept(#[source] std::io::Error),

    /// Registry is draining (shutdown in progress); new sessions are
    /// rejected and torn down.
    #[error("Server is draining")]
    Draining,

    /// Session outbound queue is gone (session already torn down).
    #[error("Session is closed")]
    SessionClosed,

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}
