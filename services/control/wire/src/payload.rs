//! Fixed-size payloads carried by JITTER and RESYNC frames.

use crate::frame::ControlFrame;
use crate::header::PacketType;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the JITTER and RESYNC payloads
pub const FIXED_PAYLOAD_SIZE: usize = 16;

/// Last frame index of a full reference-frame resync request
pub const FULL_RESYNC_LAST_FRAME: u64 = 0xFFFFF;

/// Link-quality report sent in JITTER frames.
///
/// Four little-endian `u32` fields: reserved, jitter (ms), packets lost,
/// report sequence number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JitterReport {
    /// Interarrival jitter in milliseconds
    pub jitter_ms: u32,
    /// Cumulative number of lost packets
    pub packets_lost: u32,
    /// Report sequence number
    pub sequence: u32,
}

impl JitterReport {
    /// Encode the 16-byte payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FIXED_PAYLOAD_SIZE);
        buf.put_u32_le(0);
        buf.put_u32_le(self.jitter_ms);
        buf.put_u32_le(self.packets_lost);
        buf.put_u32_le(self.sequence);
        buf.freeze()
    }

    /// Decode a 16-byte payload
    pub fn decode(mut payload: &[u8]) -> Result<Self, crate::WireError> {
        check_len(PacketType::Jitter, payload.len())?;

        let _reserved = payload.get_u32_le();
        Ok(Self {
            jitter_ms: payload.get_u32_le(),
            packets_lost: payload.get_u32_le(),
            sequence: payload.get_u32_le(),
        })
    }

    /// Build the complete JITTER frame
    pub fn into_frame(self) -> ControlFrame {
        ControlFrame::new(PacketType::Jitter.code(), self.encode())
    }
}

/// Reference-frame resync request sent in RESYNC frames.
///
/// Two little-endian `u64` fields: first and last frame of the range to
/// re-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResyncRequest {
    /// First frame of the range
    pub first_frame: u64,
    /// Last frame of the range
    pub last_frame: u64,
}

impl ResyncRequest {
    /// Request a full reference-frame (IDR) resync
    pub fn full() -> Self {
        Self {
            first_frame: 0,
            last_frame: FULL_RESYNC_LAST_FRAME,
        }
    }

    /// Encode the 16-byte payload
    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(FIXED_PAYLOAD_SIZE);
        buf.put_u64_le(self.first_frame);
        buf.put_u64_le(self.last_frame);
        buf.freeze()
    }

    /// Decode a 16-byte payload
    pub fn decode(mut payload: &[u8]) -> Result<Self, crate::WireError> {
        check_len(PacketType::Resync, payload.len())?;

        Ok(Self {
            first_frame: payload.get_u64_le(),
            last_frame: payload.get_u64_le(),
        })
    }

    /// Build the complete RESYNC frame
    pub fn into_frame(self) -> ControlFrame {
        ControlFrame::new(PacketType::Resync.code(), self.encode())
    }
}

impl Default for ResyncRequest {
    fn default() -> Self {
        Self::full()
    }
}

fn check_len(typ: PacketType, actual: usize) -> Result<(), crate::WireError> {
    if actual != typ.payload_len() {
        return Err(crate::WireError::PayloadLength {
            typ: typ.code(),
            expected: typ.payload_len(),
            actual,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jitter_payload_layout() {
        let report = JitterReport {
            jitter_ms: 12,
            packets_lost: 3,
            sequence: 0x0102_0304,
        };
        let payload = report.encode();

        assert_eq!(payload.len(), FIXED_PAYLOAD_SIZE);
        assert_eq!(&payload[0..4], &[0, 0, 0, 0]);
        assert_eq!(&payload[4..8], &12u32.to_le_bytes());
        assert_eq!(&payload[8..12], &3u32.to_le_bytes());
        assert_eq!(&payload[12..16], &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(JitterReport::decode(&payload).unwrap(), report);
    }

    #[test]
    fn test_full_resync_payload() {
        let payload = ResyncRequest::full().encode();

        assert_eq!(payload.len(), FIXED_PAYLOAD_SIZE);
        assert_eq!(&payload[0..8], &[0u8; 8]);
        assert_eq!(&payload[8..16], &0xFFFFFu64.to_le_bytes());
        assert_eq!(ResyncRequest::decode(&payload).unwrap(), ResyncRequest::full());
    }

    #[test]
    fn test_frames_carry_fixed_lengths() {
        let jitter = JitterReport::default().into_frame();
        assert_eq!(jitter.packet_type(), Some(PacketType::Jitter));
        assert_eq!(jitter.header().unwrap().payload_len, 16);

        let resync = ResyncRequest::full().into_frame();
        assert_eq!(resync.packet_type(), Some(PacketType::Resync));
        assert_eq!(resync.header().unwrap().payload_len, 16);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            JitterReport::decode(&[0u8; 8]),
            Err(crate::WireError::PayloadLength { expected: 16, actual: 8, .. })
        ));
        assert!(ResyncRequest::decode(&[]).is_err());
    }
}
