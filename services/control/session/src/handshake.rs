//! Session setup handshake.
//!
//! Runs on the session owner's task before any background loop exists:
//!
//! 1. the serialized stream configuration, written raw;
//! 2. a KEEPALIVE round-trip;
//! 3. a HANDSHAKE2 round-trip.
//!
//! Each round-trip must be answered by some frame from the host; reply
//! contents are discarded. The steps are strictly ordered and never overlap.

use bytes::Bytes;
use control_wire::{ControlFrame, PacketType};
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use crate::error::ControlError;
use crate::stream_config::{ConfigSerializer, StreamConfiguration};
use crate::transport::Transport;

/// Serialize the stream configuration and write it as a single raw message
pub async fn send_stream_config(
    transport: &Transport,
    serializer: &dyn ConfigSerializer,
    config: &StreamConfiguration,
) -> Result<(), ControlError> {
    let blob = serializer.serialize(config).map_err(ControlError::Config)?;
    transport.send_raw(&blob).await?;
    debug!(
        "Sent stream configuration to {} ({} bytes)",
        transport.peer_addr(),
        blob.len()
    );
    Ok(())
}

/// Send a zero-payload frame and wait for any reply frame
pub async fn exchange(transport: &Transport, typ: PacketType) -> Result<ControlFrame, ControlError> {
    let reply = transport.send_and_receive(typ, Bytes::new()).await?;
    debug!(
        "{} acknowledged by {} with frame type {:#06x} ({} bytes)",
        typ,
        transport.peer_addr(),
        reply.typ,
        reply.payload.len()
    );
    Ok(reply)
}

/// Run the full handshake, bounded by `deadline`
pub async fn perform_handshake(
    transport: &Transport,
    serializer: &dyn ConfigSerializer,
    config: &StreamConfiguration,
    deadline: Duration,
) -> Result<(), ControlError> {
    let until = Instant::now() + deadline;

    timeout_at(until, send_stream_config(transport, serializer, config))
        .await
        .map_err(|_| ControlError::Timeout("stream configuration"))??;

    timeout_at(until, exchange(transport, PacketType::Keepalive))
        .await
        .map_err(|_| ControlError::Timeout("keepalive exchange"))??;

    timeout_at(until, exchange(transport, PacketType::Handshake2))
        .await
        .map_err(|_| ControlError::Timeout("handshake2 exchange"))??;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream_config::TlvConfigSerializer;
    use crate::transport::read_frame;
    use control_wire::DEFAULT_MAX_PAYLOAD_SIZE;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    async fn pair() -> (Transport, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(
            Transport::connect(addr, DEFAULT_MAX_PAYLOAD_SIZE),
            listener.accept()
        );
        (client.unwrap(), accepted.unwrap().0)
    }

    async fn read_blob(host: &mut TcpStream) -> Vec<u8> {
        let len = host.read_u32_le().await.unwrap() as usize;
        let mut body = vec![0u8; len];
        host.read_exact(&mut body).await.unwrap();
        body
    }

    #[tokio::test]
    async fn test_handshake_order() {
        let (transport, mut host) = pair().await;

        let host_task = tokio::spawn(async move {
            let body = read_blob(&mut host).await;
            assert_eq!(body.len(), 40);

            let mut seen = Vec::new();
            for _ in 0..2 {
                let frame = read_frame(&mut host, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
                assert!(frame.payload.is_empty());
                seen.push(frame.packet_type().unwrap());
                // Any reply will do, including one with a payload
                host.write_all(&[0x00, 0x00, 0x02, 0x00, 0xaa, 0xbb]).await.unwrap();
            }
            seen
        });

        perform_handshake(
            &transport,
            &TlvConfigSerializer,
            &StreamConfiguration::default(),
            Duration::from_secs(2),
        )
        .await
        .unwrap();

        let seen = host_task.await.unwrap();
        assert_eq!(seen, vec![PacketType::Keepalive, PacketType::Handshake2]);
    }

    #[tokio::test]
    async fn test_handshake_fails_when_host_hangs_up() {
        let (transport, mut host) = pair().await;

        tokio::spawn(async move {
            read_blob(&mut host).await;
            let _ = read_frame(&mut host, DEFAULT_MAX_PAYLOAD_SIZE).await;
            drop(host);
        });

        let err = perform_handshake(
            &transport,
            &TlvConfigSerializer,
            &StreamConfiguration::default(),
            Duration::from_secs(2),
        )
        .await
        .unwrap_err();
        assert!(err.is_connection_loss(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_handshake_deadline() {
        let (transport, host) = pair().await;

        let err = perform_handshake(
            &transport,
            &TlvConfigSerializer,
            &StreamConfiguration::default(),
            Duration::from_millis(100),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, ControlError::Timeout("keepalive exchange")));
        drop(host);
    }

    #[tokio::test]
    async fn test_serializer_failure_is_config_error() {
        struct Broken;
        impl ConfigSerializer for Broken {
            fn serialize(&self, _config: &StreamConfiguration) -> Result<Bytes, String> {
                Err("unsupported resolution".to_string())
            }
        }

        let (transport, _host) = pair().await;
        let err = send_stream_config(&transport, &Broken, &StreamConfiguration::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ControlError::Config(msg) if msg == "unsupported resolution"));
    }
}
