//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Incomplete frame (need more data)
    #[error("incomplete frame")]
    Incomplete,

    /// Declared payload length exceeds the configured maximum
    #[error("size limit exceeded: {0}")]
    Size(usize),

    /// Unknown packet type
    #[error("unknown type {0:#06x}")]
    Type(u16),

    /// Fixed-size payload has the wrong length
    #[error("payload for type {typ:#06x} must be {expected} bytes, got {actual}")]
    PayloadLength {
        /// Packet type code
        typ: u16,
        /// Length mandated by the protocol
        expected: usize,
        /// Length actually supplied
        actual: usize,
    },
}
