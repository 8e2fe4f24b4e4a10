//! Control frame header and packet type codes.
//!
//! Every control frame starts with a 4-byte header: a 16-bit packet type
//! followed by a 16-bit payload length, both little-endian.

use bytes::{Buf, BufMut};

/// Control frame header size in bytes
pub const FRAME_HEADER_SIZE: usize = 4;

/// Packet types used on the control stream
#[repr(u16)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    /// First handshake probe ("ping pong")
    Keepalive = 0x13ff,
    /// Periodic liveness frame
    Heartbeat = 0x1401,
    /// Reference-frame resync request
    Resync = 0x1404,
    /// Second handshake message
    Handshake2 = 0x1405,
    /// Link-quality report
    Jitter = 0x140c,
}

impl PacketType {
    /// Every packet type this client knows about
    pub const ALL: [PacketType; 5] = [
        PacketType::Keepalive,
        PacketType::Heartbeat,
        PacketType::Resync,
        PacketType::Handshake2,
        PacketType::Jitter,
    ];

    /// Wire code of this packet type
    pub fn code(self) -> u16 {
        self as u16
    }

    /// Payload length the protocol mandates for this packet type
    pub fn payload_len(self) -> usize {
        match self {
            PacketType::Keepalive | PacketType::Heartbeat | PacketType::Handshake2 => 0,
            PacketType::Resync | PacketType::Jitter => 16,
        }
    }

    /// Short name for logs
    pub fn name(self) -> &'static str {
        match self {
            PacketType::Keepalive => "KEEPALIVE",
            PacketType::Heartbeat => "HEARTBEAT",
            PacketType::Resync => "RESYNC",
            PacketType::Handshake2 => "HANDSHAKE2",
            PacketType::Jitter => "JITTER",
        }
    }
}

impl TryFrom<u16> for PacketType {
    type Error = crate::WireError;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0x13ff => Ok(PacketType::Keepalive),
            0x1401 => Ok(PacketType::Heartbeat),
            0x1404 => Ok(PacketType::Resync),
            0x1405 => Ok(PacketType::Handshake2),
            0x140c => Ok(PacketType::Jitter),
            _ => Err(crate::WireError::Type(value)),
        }
    }
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.name())
    }
}

/// Fixed 4-byte control frame header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw packet type code (replies from the host may carry unknown codes)
    pub typ: u16,
    /// Number of payload bytes following the header
    pub payload_len: u16,
}

impl FrameHeader {
    /// Create a header
    pub fn new(typ: u16, payload_len: u16) -> Self {
        Self { typ, payload_len }
    }

    /// Encode the header into a buffer
    pub fn encode<B: BufMut>(&self, buf: &mut B) {
        buf.put_u16_le(self.typ);
        buf.put_u16_le(self.payload_len);
    }

    /// Decode a header from a buffer
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self, crate::WireError> {
        if buf.remaining() < FRAME_HEADER_SIZE {
            return Err(crate::WireError::Incomplete);
        }

        let typ = buf.get_u16_le();
        let payload_len = buf.get_u16_le();

        Ok(Self { typ, payload_len })
    }

    /// Decode a header from exactly [`FRAME_HEADER_SIZE`] bytes
    pub fn from_bytes(raw: [u8; FRAME_HEADER_SIZE]) -> Self {
        Self {
            typ: u16::from_le_bytes([raw[0], raw[1]]),
            payload_len: u16::from_le_bytes([raw[2], raw[3]]),
        }
    }

    /// Packet type if the code is known
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::try_from(self.typ).ok()
    }
}
