//! Reference-frame resync signaling.
//!
//! The decode pipeline raises [`ResyncSignal`] whenever it needs a fresh IDR
//! frame; the resync loop turns each raised signal into one RESYNC frame.
//! Raising is level-triggered and coalescing: any number of raises before
//! the loop wakes produce a single request.

use control_wire::{PacketType, ResyncRequest};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Notify};
use tracing::{debug, info, warn};

use crate::error::ControlError;
use crate::session::SessionEvent;
use crate::transport::Transport;

/// Binary, level-triggered resync flag
#[derive(Debug, Default)]
pub struct ResyncSignal {
    pending: AtomicBool,
    notify: Notify,
}

impl ResyncSignal {
    /// Create a cleared signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal. Never blocks.
    pub fn raise(&self) {
        if !self.pending.swap(true, Ordering::AcqRel) {
            self.notify.notify_one();
        }
    }

    /// Whether a raise is waiting to be consumed
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until the signal is raised, then clear it
    pub async fn wait(&self) {
        loop {
            if self.pending.swap(false, Ordering::AcqRel) {
                return;
            }
            self.notify.notified().await;
        }
    }
}

/// Cloneable, non-blocking handle for requesting an IDR frame
#[derive(Clone, Debug)]
pub struct ResyncTrigger {
    signal: Arc<ResyncSignal>,
}

impl ResyncTrigger {
    pub(crate) fn new(signal: Arc<ResyncSignal>) -> Self {
        Self { signal }
    }

    /// Ask the host for a full reference frame
    pub fn request_idr_frame(&self) {
        self.signal.raise();
    }
}

/// Wait for resync requests and send one RESYNC frame per wake-up, until
/// the transport closes or a send fails.
pub async fn run_resync(
    transport: Arc<Transport>,
    signal: Arc<ResyncSignal>,
    event_tx: mpsc::Sender<SessionEvent>,
) -> Result<(), ControlError> {
    let request = ResyncRequest::full();

    loop {
        tokio::select! {
            biased;

            _ = transport.closed() => {
                debug!("Resync loop to {} stopping: transport closed", transport.peer_addr());
                return Ok(());
            }

            _ = signal.wait() => {
                match transport.send_frame(PacketType::Resync, request.encode()).await {
                    Ok(()) => {
                        info!("Sent IDR resync request to {}", transport.peer_addr());
                        let _ = event_tx.try_send(SessionEvent::ResyncSent);
                    }
                    Err(ControlError::Closed) => return Ok(()),
                    Err(e) => {
                        warn!("Resync loop to {} terminating: {}", transport.peer_addr(), e);
                        return Err(e);
                    }
                }
            }
        }
    }
}
