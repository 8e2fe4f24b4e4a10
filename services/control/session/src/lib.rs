//! Control channel of a game-streaming client session.
//!
//! This crate owns the TCP control connection to a streaming host, runs the
//! ordered setup handshake, and keeps the session alive with three
//! background loops that share one serialized write path.
//!
//! ## Features
//!
//! - **Transport**: framed TCP connection with serialized writes and a
//!   close signal every loop observes
//! - **Handshake**: configuration blob, KEEPALIVE and HANDSHAKE2 round-trips
//!   under one deadline
//! - **Heartbeat**: zero-payload HEARTBEAT every 3 s
//! - **Jitter**: JITTER report every 100 ms from live [`LinkStats`]
//! - **Resync**: coalescing IDR frame requests
//!
//! ## Example
//!
//! ```rust,no_run
//! use control_session::{ControlSession, SessionEvent, SessionOptions, StreamConfiguration};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), control_session::ControlError> {
//! let (tx, mut rx) = mpsc::channel(64);
//! let mut session = ControlSession::new(StreamConfiguration::default(), SessionOptions::default(), tx);
//!
//! session.initialize("192.168.1.20".parse().unwrap()).await?;
//! session.start().await?;
//!
//! // From the decoder, whenever a reference frame is lost
//! session.request_idr_frame();
//!
//! while let Some(event) = rx.recv().await {
//!     if let SessionEvent::LoopExited { kind, error: Some(error) } = event {
//!         println!("{} loop failed: {}", kind, error);
//!         break;
//!     }
//! }
//!
//! session.stop().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod handshake;
pub mod heartbeat;
pub mod jitter;
pub mod resync;
pub mod session;
pub mod stream_config;
pub mod transport;

pub use error::ControlError;
pub use handshake::perform_handshake;
pub use heartbeat::{run_heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
pub use jitter::{run_jitter_reporter, LinkSnapshot, LinkStats, DEFAULT_JITTER_INTERVAL};
pub use resync::{run_resync, ResyncSignal, ResyncTrigger};
pub use session::{ControlSession, LoopKind, SessionEvent, SessionOptions, SessionState};
pub use stream_config::{ConfigSerializer, StreamConfiguration, TlvConfigSerializer};
pub use transport::{Transport, TransportStats, CONTROL_PORT};
