//! Heartbeat loop.
//!
//! Sends a zero-payload HEARTBEAT frame on a fixed interval. The host never
//! answers heartbeats, so nothing is read.

use bytes::Bytes;
use control_wire::PacketType;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::error::ControlError;
use crate::transport::Transport;

/// Default interval between heartbeats
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(3000);

/// Send heartbeats until the transport closes or a send fails.
///
/// The first heartbeat goes out immediately.
pub async fn run_heartbeat(transport: Arc<Transport>, interval: Duration) -> Result<(), ControlError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = transport.closed() => {
                debug!("Heartbeat loop to {} stopping: transport closed", transport.peer_addr());
                return Ok(());
            }

            _ = ticker.tick() => {
                match transport.send_frame(PacketType::Heartbeat, Bytes::new()).await {
                    Ok(()) => debug!("Sent HEARTBEAT to {}", transport.peer_addr()),
                    Err(ControlError::Closed) => return Ok(()),
                    Err(e) => {
                        warn!("Heartbeat loop to {} terminating: {}", transport.peer_addr(), e);
                        return Err(e);
                    }
                }
            }
        }
    }
}
