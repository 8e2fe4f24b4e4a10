//! Control frame encoding and decoding.
//!
//! A control frame is a [`FrameHeader`] followed by exactly `payload_len`
//! payload bytes. There is no resynchronization: once a frame boundary is
//! lost the connection is considered dead.

use crate::header::{FrameHeader, PacketType, FRAME_HEADER_SIZE};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::trace;

/// Default maximum payload size accepted from the host (4 KiB)
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 4 * 1024;
/// Hard maximum payload size, bounded by the 16-bit length field
pub const HARD_MAX_PAYLOAD_SIZE: usize = u16::MAX as usize;

/// Complete control frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlFrame {
    /// Raw packet type code
    pub typ: u16,
    /// Payload bytes
    pub payload: Bytes,
}

impl ControlFrame {
    /// Create a frame with a raw type code
    pub fn new(typ: u16, payload: Bytes) -> Self {
        Self { typ, payload }
    }

    /// Create a frame of a known packet type, checking its fixed payload length
    pub fn typed(typ: PacketType, payload: Bytes) -> Result<Self, crate::WireError> {
        if payload.len() != typ.payload_len() {
            return Err(crate::WireError::PayloadLength {
                typ: typ.code(),
                expected: typ.payload_len(),
                actual: payload.len(),
            });
        }

        Ok(Self::new(typ.code(), payload))
    }

    /// Create a zero-payload frame
    pub fn empty(typ: PacketType) -> Self {
        Self::new(typ.code(), Bytes::new())
    }

    /// Packet type if the code is known
    pub fn packet_type(&self) -> Option<PacketType> {
        PacketType::try_from(self.typ).ok()
    }

    /// Header describing this frame; fails if the payload does not fit the
    /// 16-bit length field
    pub fn header(&self) -> Result<FrameHeader, crate::WireError> {
        let len = u16::try_from(self.payload.len())
            .map_err(|_| crate::WireError::Size(self.payload.len()))?;
        Ok(FrameHeader::new(self.typ, len))
    }

    /// Get the total frame size when encoded
    pub fn encoded_size(&self) -> usize {
        FRAME_HEADER_SIZE + self.payload.len()
    }

    /// Encode frame to a contiguous buffer
    pub fn encode(&self, max_payload_size: usize) -> Result<Bytes, crate::WireError> {
        let limit = max_payload_size.min(HARD_MAX_PAYLOAD_SIZE);
        if self.payload.len() > limit {
            return Err(crate::WireError::Size(self.payload.len()));
        }

        let mut buf = BytesMut::with_capacity(self.encoded_size());
        self.header()?.encode(&mut buf);
        buf.put_slice(&self.payload);

        Ok(buf.freeze())
    }
}

/// Frame decoder for parsing incoming frames out of a byte buffer
#[derive(Debug)]
pub struct FrameDecoder {
    max_payload_size: usize,
}

impl FrameDecoder {
    /// Create a new frame decoder with the default payload limit
    pub fn new() -> Self {
        Self::with_max_payload(DEFAULT_MAX_PAYLOAD_SIZE)
    }

    /// Create a decoder that rejects payloads above `max_payload_size`
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self {
            max_payload_size: max_payload_size.min(HARD_MAX_PAYLOAD_SIZE),
        }
    }

    /// Largest payload this decoder accepts
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Validate a header against the payload limit
    pub fn check_header(&self, header: &FrameHeader) -> Result<(), crate::WireError> {
        let len = header.payload_len as usize;
        if len > self.max_payload_size {
            return Err(crate::WireError::Size(len));
        }
        Ok(())
    }

    /// Decode one frame from a buffer
    pub fn decode(&mut self, buf: &mut BytesMut) -> Result<Option<ControlFrame>, crate::WireError> {
        if buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }

        // Peek at the header without consuming it
        let header = FrameHeader::from_bytes([buf[0], buf[1], buf[2], buf[3]]);
        self.check_header(&header)?;

        let payload_len = header.payload_len as usize;
        if buf.len() < FRAME_HEADER_SIZE + payload_len {
            return Ok(None);
        }

        buf.advance(FRAME_HEADER_SIZE);
        let payload = buf.split_to(payload_len).freeze();
        trace!("Decoded frame type {:#06x} ({} payload bytes)", header.typ, payload_len);

        Ok(Some(ControlFrame::new(header.typ, payload)))
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WireError;

    #[test]
    fn test_frame_roundtrip() {
        let cases = [
            ControlFrame::empty(PacketType::Heartbeat),
            ControlFrame::new(PacketType::Jitter.code(), Bytes::from(vec![7u8; 16])),
            ControlFrame::new(0xbeef, Bytes::from_static(b"host reply")),
        ];

        let mut decoder = FrameDecoder::new();
        for frame in cases {
            let encoded = frame.encode(DEFAULT_MAX_PAYLOAD_SIZE).unwrap();
            assert_eq!(encoded.len(), frame.encoded_size());

            let mut buf = BytesMut::from(encoded.as_ref());
            let decoded = decoder.decode(&mut buf).unwrap().unwrap();
            assert_eq!(decoded, frame);
            assert!(buf.is_empty());
        }
    }

    #[test]
    fn test_zero_length_payload_is_header_only() {
        let encoded = ControlFrame::empty(PacketType::Keepalive)
            .encode(DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap();
        assert_eq!(&encoded[..], &[0xff, 0x13, 0x00, 0x00]);
    }

    #[test]
    fn test_decode_waits_for_complete_frame() {
        let encoded = ControlFrame::new(PacketType::Resync.code(), Bytes::from(vec![1u8; 16]))
            .encode(DEFAULT_MAX_PAYLOAD_SIZE)
            .unwrap();

        let mut decoder = FrameDecoder::new();
        let mut buf = BytesMut::from(&encoded[..10]);
        assert!(decoder.decode(&mut buf).unwrap().is_none());
        assert_eq!(buf.len(), 10, "partial frame must not be consumed");

        buf.extend_from_slice(&encoded[10..]);
        let frame = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(frame.packet_type(), Some(PacketType::Resync));
    }

    #[test]
    fn test_decode_back_to_back_frames() {
        let mut buf = BytesMut::new();
        for typ in [PacketType::Keepalive, PacketType::Handshake2] {
            buf.extend_from_slice(&ControlFrame::empty(typ).encode(64).unwrap());
        }

        let mut decoder = FrameDecoder::new();
        let first = decoder.decode(&mut buf).unwrap().unwrap();
        let second = decoder.decode(&mut buf).unwrap().unwrap();
        assert_eq!(first.packet_type(), Some(PacketType::Keepalive));
        assert_eq!(second.packet_type(), Some(PacketType::Handshake2));
        assert!(decoder.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn test_oversize_declared_length_rejected() {
        let mut decoder = FrameDecoder::with_max_payload(32);
        let mut buf = BytesMut::from(&[0x01, 0x14, 0x00, 0x10][..]);
        assert_eq!(decoder.decode(&mut buf), Err(WireError::Size(4096)));
    }

    #[test]
    fn test_encode_respects_limit() {
        let frame = ControlFrame::new(0x1000, Bytes::from(vec![0u8; 100]));
        assert_eq!(frame.encode(64), Err(WireError::Size(100)));
    }

    #[test]
    fn test_header_rejects_unrepresentable_length() {
        let frame = ControlFrame::new(0x0200, Bytes::from(vec![0u8; HARD_MAX_PAYLOAD_SIZE + 1]));
        assert_eq!(frame.header(), Err(WireError::Size(HARD_MAX_PAYLOAD_SIZE + 1)));

        let frame = ControlFrame::new(0x0200, Bytes::from(vec![0u8; HARD_MAX_PAYLOAD_SIZE]));
        assert_eq!(frame.header().unwrap().payload_len, u16::MAX);
    }

    #[test]
    fn test_typed_checks_payload_length() {
        assert!(ControlFrame::typed(PacketType::Jitter, Bytes::from(vec![0u8; 16])).is_ok());
        assert_eq!(
            ControlFrame::typed(PacketType::Heartbeat, Bytes::from_static(b"x")),
            Err(WireError::PayloadLength {
                typ: 0x1401,
                expected: 0,
                actual: 1
            })
        );
    }
}
