//! Control-stream framing for remote streaming sessions.
//!
//! This crate provides the low-level wire protocol of the session control
//! connection: the fixed 4-byte frame header, the small closed set of packet
//! types, frame encoding/decoding with a bounded payload size, and the two
//! fixed-size payloads (jitter reports and resync requests).
//!
//! ## Wire Format
//!
//! ```text
//! +----------------------+----------------------------+
//! | u16 type (LE)        | packet type code           |
//! +----------------------+----------------------------+
//! | u16 length (LE)      | payload bytes that follow  |
//! +----------------------+----------------------------+
//! | payload              | exactly `length` bytes     |
//! +----------------------+----------------------------+
//! ```
//!
//! ## Packet Types
//!
//! | Name       | Code   | Payload |
//! |------------|--------|---------|
//! | KEEPALIVE  | 0x13ff | 0       |
//! | HEARTBEAT  | 0x1401 | 0       |
//! | RESYNC     | 0x1404 | 16      |
//! | HANDSHAKE2 | 0x1405 | 0       |
//! | JITTER     | 0x140c | 16      |

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod frame;
pub mod header;
pub mod payload;

// Re-export main types
pub use error::WireError;
pub use frame::{ControlFrame, FrameDecoder, DEFAULT_MAX_PAYLOAD_SIZE, HARD_MAX_PAYLOAD_SIZE};
pub use header::{FrameHeader, PacketType, FRAME_HEADER_SIZE};
pub use payload::{JitterReport, ResyncRequest, FIXED_PAYLOAD_SIZE, FULL_RESYNC_LAST_FRAME};
