//! TCP transport for the control stream.
//!
//! One connected socket, split into a read half used only during the
//! handshake and a write half shared by the handshake and every background
//! loop. Writes are serialized by an async mutex so frames from different
//! loops never interleave on the wire.

use bytes::{Bytes, BytesMut};
use control_wire::{
    ControlFrame, FrameDecoder, FrameHeader, PacketType, FRAME_HEADER_SIZE, HARD_MAX_PAYLOAD_SIZE,
};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, trace};

use crate::error::{read_error, ControlError};

/// Well-known TCP port of the host's control stream
pub const CONTROL_PORT: u16 = 47995;

/// Traffic counters for a transport
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Total bytes sent, including the raw configuration blob
    pub bytes_out: u64,
    /// Total bytes received
    pub bytes_in: u64,
    /// Number of frames sent
    pub frames_sent: u64,
    /// Number of frames received
    pub frames_received: u64,
}

#[derive(Debug, Default)]
struct Counters {
    bytes_out: AtomicU64,
    bytes_in: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
}

/// Framed control connection to the streaming host
#[derive(Debug)]
pub struct Transport {
    peer: SocketAddr,
    reader: Mutex<OwnedReadHalf>,
    writer: Mutex<Option<OwnedWriteHalf>>,
    closed: watch::Sender<bool>,
    /// Receive limit only
    max_payload_size: usize,
    counters: Counters,
}

impl Transport {
    /// Connect to the host's control port
    pub async fn connect(addr: SocketAddr, max_payload_size: usize) -> Result<Self, ControlError> {
        let stream = TcpStream::connect(addr).await?;
        debug!("TCP control connection established to {}", addr);
        Self::from_stream(stream, max_payload_size)
    }

    /// Wrap an already connected stream
    pub fn from_stream(stream: TcpStream, max_payload_size: usize) -> Result<Self, ControlError> {
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        let (reader, writer) = stream.into_split();
        let (closed, _) = watch::channel(false);

        Ok(Self {
            peer,
            reader: Mutex::new(reader),
            writer: Mutex::new(Some(writer)),
            closed,
            max_payload_size,
            counters: Counters::default(),
        })
    }

    /// Address of the host
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// Whether [`Transport::close`] has been called
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Resolves once the transport has been closed
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        // The sender lives as long as `self`, so this only returns on close
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Write raw bytes as one logical message, outside the frame format
    pub async fn send_raw(&self, bytes: &[u8]) -> Result<(), ControlError> {
        if self.is_closed() {
            return Err(ControlError::Closed);
        }

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(ControlError::Closed)?;

        tokio::select! {
            biased;

            _ = self.closed() => Err(ControlError::Closed),

            res = writer.write_all(bytes) => {
                res?;
                self.counters.bytes_out.fetch_add(bytes.len() as u64, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    /// Send one frame: 4-byte header immediately followed by the payload.
    ///
    /// Payload lengths are fixed per packet type, so the receive limit does
    /// not apply here.
    pub async fn send_frame(&self, typ: PacketType, payload: Bytes) -> Result<(), ControlError> {
        let frame = ControlFrame::typed(typ, payload)?;
        let encoded = frame.encode(HARD_MAX_PAYLOAD_SIZE)?;

        self.send_raw(&encoded).await?;
        self.counters.frames_sent.fetch_add(1, Ordering::Relaxed);
        trace!("Sent {} frame to {} ({} bytes)", typ, self.peer, encoded.len());
        Ok(())
    }

    /// Receive one frame: the fixed header, then exactly `length` bytes
    pub async fn receive_frame(&self) -> Result<ControlFrame, ControlError> {
        if self.is_closed() {
            return Err(ControlError::Closed);
        }

        let mut reader = self.reader.lock().await;

        let frame = tokio::select! {
            biased;

            _ = self.closed() => return Err(ControlError::Closed),

            res = read_frame(&mut *reader, self.max_payload_size) => res?,
        };

        self.counters.frames_received.fetch_add(1, Ordering::Relaxed);
        self.counters
            .bytes_in
            .fetch_add(frame.encoded_size() as u64, Ordering::Relaxed);
        trace!(
            "Received frame type {:#06x} from {} ({} payload bytes)",
            frame.typ,
            self.peer,
            frame.payload.len()
        );
        Ok(frame)
    }

    /// Send a frame and wait for the next frame from the host
    pub async fn send_and_receive(
        &self,
        typ: PacketType,
        payload: Bytes,
    ) -> Result<ControlFrame, ControlError> {
        self.send_frame(typ, payload).await?;
        self.receive_frame().await
    }

    /// Close the connection. Every pending and later send or receive fails.
    pub async fn close(&self) {
        if self.closed.send_replace(true) {
            return;
        }

        let writer = self.writer.lock().await.take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer.shutdown().await {
                debug!("Shutdown of control connection to {} failed: {}", self.peer, e);
            }
        }
        debug!("Control connection to {} closed", self.peer);
    }

    /// Snapshot of the traffic counters
    pub fn stats(&self) -> TransportStats {
        TransportStats {
            bytes_out: self.counters.bytes_out.load(Ordering::Relaxed),
            bytes_in: self.counters.bytes_in.load(Ordering::Relaxed),
            frames_sent: self.counters.frames_sent.load(Ordering::Relaxed),
            frames_received: self.counters.frames_received.load(Ordering::Relaxed),
        }
    }
}

/// Read exactly one frame from a reader.
///
/// The declared length is checked against `max_payload_size` before any
/// payload buffer is allocated.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    max_payload_size: usize,
) -> Result<ControlFrame, ControlError> {
    let mut raw = [0u8; FRAME_HEADER_SIZE];
    reader.read_exact(&mut raw).await.map_err(read_error)?;

    let header = FrameHeader::from_bytes(raw);
    FrameDecoder::with_max_payload(max_payload_size).check_header(&header)?;

    let mut payload = BytesMut::zeroed(header.payload_len as usize);
    if !payload.is_empty() {
        reader.read_exact(&mut payload).await.map_err(read_error)?;
    }

    Ok(ControlFrame::new(header.typ, payload.freeze()))
}
