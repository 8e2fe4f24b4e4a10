//! Encoding and decoding control-stream frames.

use bytes::BytesMut;
use control_wire::{
    ControlFrame, FrameDecoder, JitterReport, PacketType, ResyncRequest, DEFAULT_MAX_PAYLOAD_SIZE,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Control Stream Framing Example ===\n");

    println!("Packet types:");
    for typ in PacketType::ALL {
        println!("   {:<10} {:#06x}  payload {} bytes", typ, typ.code(), typ.payload_len());
    }

    // A client's outbound traffic, concatenated as it would be on the socket
    let mut stream = BytesMut::new();
    for frame in [
        ControlFrame::empty(PacketType::Keepalive),
        ControlFrame::empty(PacketType::Handshake2),
        ControlFrame::empty(PacketType::Heartbeat),
        JitterReport {
            jitter_ms: 4,
            packets_lost: 1,
            sequence: 0,
        }
        .into_frame(),
        ResyncRequest::full().into_frame(),
    ] {
        stream.extend_from_slice(&frame.encode(DEFAULT_MAX_PAYLOAD_SIZE)?);
    }
    println!("\nEncoded stream: {} bytes", stream.len());

    // Feed it to the decoder a few bytes at a time
    let mut decoder = FrameDecoder::new();
    let mut buf = BytesMut::new();
    for chunk in stream.chunks(7) {
        buf.extend_from_slice(chunk);
        while let Some(frame) = decoder.decode(&mut buf)? {
            match frame.packet_type() {
                Some(PacketType::Jitter) => {
                    println!("   JITTER     {:?}", JitterReport::decode(&frame.payload)?)
                }
                Some(PacketType::Resync) => {
                    println!("   RESYNC     {:?}", ResyncRequest::decode(&frame.payload)?)
                }
                Some(typ) => println!("   {}", typ),
                None => println!("   unknown type {:#06x}", frame.typ),
            }
        }
    }

    Ok(())
}
