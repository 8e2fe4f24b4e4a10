//! Stream configuration and its serialization into the opening blob.
//!
//! The configuration blob is the first thing written on a fresh control
//! connection. It is written raw, outside the 4-byte frame format, and must
//! be self-delimiting.

use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};

/// Client-chosen streaming parameters, fixed for the life of a session
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfiguration {
    /// Video width in pixels
    pub width: u32,
    /// Video height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: u32,
    /// Target bitrate in kbit/s
    pub bitrate_kbps: u32,
    /// Maximum video packet size in bytes
    pub packet_size: u32,
}

impl Default for StreamConfiguration {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            fps: 60,
            bitrate_kbps: 10_000,
            packet_size: 1024,
        }
    }
}

/// Turns a [`StreamConfiguration`] into the blob sent when the session starts
pub trait ConfigSerializer: Send + Sync {
    /// Serialize the configuration into a self-delimited blob
    fn serialize(&self, config: &StreamConfiguration) -> Result<Bytes, String>;
}

/// Tags used by [`TlvConfigSerializer`]
pub mod config_tag {
    /// Video width
    pub const WIDTH: u16 = 1;
    /// Video height
    pub const HEIGHT: u16 = 2;
    /// Frames per second
    pub const FPS: u16 = 3;
    /// Bitrate in kbit/s
    pub const BITRATE_KBPS: u16 = 4;
    /// Packet size
    pub const PACKET_SIZE: u16 = 5;
}

/// Built-in serializer.
///
/// Layout: `u32` body length, then entries of `u16` tag, `u16` value length
/// and a `u32` value, all little-endian.
#[derive(Clone, Copy, Debug, Default)]
pub struct TlvConfigSerializer;

impl ConfigSerializer for TlvConfigSerializer {
    fn serialize(&self, config: &StreamConfiguration) -> Result<Bytes, String> {
        let entries = [
            (config_tag::WIDTH, config.width),
            (config_tag::HEIGHT, config.height),
            (config_tag::FPS, config.fps),
            (config_tag::BITRATE_KBPS, config.bitrate_kbps),
            (config_tag::PACKET_SIZE, config.packet_size),
        ];

        let body_len = entries.len() * 8;
        let mut buf = BytesMut::with_capacity(4 + body_len);
        buf.put_u32_le(body_len as u32);
        for (tag, value) in entries {
            buf.put_u16_le(tag);
            buf.put_u16_le(4);
            buf.put_u32_le(value);
        }

        Ok(buf.freeze())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Buf;

    #[test]
    fn test_tlv_blob_is_self_delimited() {
        let config = StreamConfiguration {
            width: 1920,
            height: 1080,
            fps: 30,
            bitrate_kbps: 20_000,
            packet_size: 1392,
        };
        let blob = TlvConfigSerializer.serialize(&config).unwrap();

        let mut buf = blob.clone();
        let body_len = buf.get_u32_le() as usize;
        assert_eq!(body_len, buf.remaining());
        assert_eq!(blob.len(), 44);

        let mut values = Vec::new();
        while buf.has_remaining() {
            let tag = buf.get_u16_le();
            assert_eq!(buf.get_u16_le(), 4);
            values.push((tag, buf.get_u32_le()));
        }
        assert_eq!(
            values,
            vec![
                (config_tag::WIDTH, 1920),
                (config_tag::HEIGHT, 1080),
                (config_tag::FPS, 30),
                (config_tag::BITRATE_KBPS, 20_000),
                (config_tag::PACKET_SIZE, 1392),
            ]
        );
    }
}
