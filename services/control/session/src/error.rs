//! Control session error types.

use control_wire::WireError;
use thiserror::Error;

use crate::session::{LoopKind, SessionState};

/// Errors raised by the control transport and session
#[derive(Error, Debug)]
pub enum ControlError {
    /// Connect, send or receive failed at the socket layer
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    /// Frame boundary lost (short read) or frame rejected
    #[error("protocol error: {0}")]
    Protocol(#[from] WireError),

    /// A background loop could not be launched
    #[error("failed to start {0} loop: {1}")]
    LoopStart(LoopKind, String),

    /// A background loop panicked
    #[error("{0} loop panicked: {1}")]
    LoopPanicked(LoopKind, String),

    /// The handshake did not complete within its deadline
    #[error("timed out during {0}")]
    Timeout(&'static str),

    /// The transport has been closed
    #[error("transport closed")]
    Closed,

    /// Operation not valid in the current lifecycle state
    #[error("invalid session state: {0:?}")]
    InvalidState(SessionState),

    /// The stream configuration could not be serialized
    #[error("config serialization failed: {0}")]
    Config(String),
}

impl ControlError {
    /// Platform error code of the underlying socket error, if any
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            ControlError::Socket(e) => e.raw_os_error(),
            _ => None,
        }
    }

    /// Whether this error means the connection is gone
    pub fn is_connection_loss(&self) -> bool {
        matches!(
            self,
            ControlError::Socket(_) | ControlError::Protocol(_) | ControlError::Closed
        )
    }
}

/// Map a failed read into the error taxonomy: a peer that goes away in the
/// middle of a frame breaks frame alignment.
pub(crate) fn read_error(err: std::io::Error) -> ControlError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ControlError::Protocol(WireError::Incomplete)
    } else {
        ControlError::Socket(err)
    }
}
