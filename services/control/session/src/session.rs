//! Control session lifecycle.
//!
//! A [`ControlSession`] owns the control connection and the three background
//! loops that share it:
//!
//! ```text
//! Idle --initialize--> Connected --start--> Active --stop--> Stopped
//!   \______________________\___________________stop___________^
//! ```
//!
//! `start()` drives the ordered handshake on the caller's task, then spawns
//! the heartbeat, jitter and resync loops. `stop()` closes the transport,
//! which ends every loop, and joins them.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::error::ControlError;
use crate::handshake::perform_handshake;
use crate::heartbeat::{run_heartbeat, DEFAULT_HEARTBEAT_INTERVAL};
use crate::jitter::{run_jitter_reporter, LinkStats, DEFAULT_JITTER_INTERVAL};
use crate::resync::{run_resync, ResyncSignal, ResyncTrigger};
use crate::stream_config::{ConfigSerializer, StreamConfiguration, TlvConfigSerializer};
use crate::transport::{Transport, TransportStats, CONTROL_PORT};

/// Tunables for a control session
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// TCP port of the host's control stream
    pub control_port: u16,
    /// Interval between HEARTBEAT frames
    pub heartbeat_interval: Duration,
    /// Interval between JITTER reports
    pub jitter_interval: Duration,
    /// Deadline for the whole handshake
    pub handshake_timeout: Duration,
    /// Largest payload accepted from the host. Outgoing frames are only
    /// bounded by the 16-bit length field.
    pub max_payload_size: usize,
}

impl SessionOptions {
    /// Reject settings the loops cannot run with
    pub fn validate(&self) -> Result<(), ControlError> {
        if self.heartbeat_interval.is_zero() {
            return Err(ControlError::Config("heartbeat interval must be non-zero".into()));
        }
        if self.jitter_interval.is_zero() {
            return Err(ControlError::Config("jitter interval must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            control_port: CONTROL_PORT,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            jitter_interval: DEFAULT_JITTER_INTERVAL,
            handshake_timeout: Duration::from_secs(10),
            max_payload_size: control_wire::DEFAULT_MAX_PAYLOAD_SIZE,
        }
    }
}

/// Lifecycle state of a [`ControlSession`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, no connection yet
    Idle,
    /// Socket open, handshake not done
    Connected,
    /// Handshake done, loops running
    Active,
    /// Socket closed, loops joined
    Stopped,
}

/// The background loops of a session
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LoopKind {
    /// Periodic HEARTBEAT sender
    Heartbeat,
    /// Periodic JITTER reporter
    Jitter,
    /// RESYNC sender driven by the resync signal
    Resync,
}

impl std::fmt::Display for LoopKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoopKind::Heartbeat => f.write_str("heartbeat"),
            LoopKind::Jitter => f.write_str("jitter"),
            LoopKind::Resync => f.write_str("resync"),
        }
    }
}

/// Events emitted by sessions
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Handshake completed and all loops are running
    Active {
        /// Host address
        peer: SocketAddr,
    },
    /// A RESYNC frame was sent
    ResyncSent,
    /// A background loop ended
    LoopExited {
        /// Which loop
        kind: LoopKind,
        /// Failure that ended it; `None` when it ended because of `stop()`
        error: Option<String>,
    },
    /// The session was stopped
    Stopped {
        /// Final traffic counters
        stats: TransportStats,
    },
}

/// A launched loop. `join` resolves once the loop body has ended, whether it
/// returned or panicked; `body` aborts the body itself.
struct LoopHandle {
    kind: LoopKind,
    join: JoinHandle<Result<(), ControlError>>,
    body: AbortHandle,
}

/// Client side of a streaming session's control channel
pub struct ControlSession {
    options: SessionOptions,
    stream_config: StreamConfiguration,
    serializer: Arc<dyn ConfigSerializer>,
    state: SessionState,
    transport: Option<Arc<Transport>>,
    resync: Arc<ResyncSignal>,
    link_stats: Arc<LinkStats>,
    loops: Vec<LoopHandle>,
    event_tx: mpsc::Sender<SessionEvent>,
}

impl ControlSession {
    /// Create an idle session. `stream_config` is copied and never changes.
    pub fn new(
        stream_config: StreamConfiguration,
        options: SessionOptions,
        event_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self {
            options,
            stream_config,
            serializer: Arc::new(TlvConfigSerializer),
            state: SessionState::Idle,
            transport: None,
            resync: Arc::new(ResyncSignal::new()),
            link_stats: Arc::new(LinkStats::new()),
            loops: Vec::new(),
            event_tx,
        }
    }

    /// Use a different encoder for the opening configuration blob
    pub fn with_serializer(mut self, serializer: Arc<dyn ConfigSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Connect to the host's control port
    pub async fn initialize(&mut self, host: IpAddr) -> Result<(), ControlError> {
        if self.state != SessionState::Idle {
            return Err(ControlError::InvalidState(self.state));
        }
        self.options.validate()?;

        let addr = SocketAddr::new(host, self.options.control_port);
        info!("Connecting control stream to {}", addr);

        let transport = Transport::connect(addr, self.options.max_payload_size).await?;
        self.transport = Some(Arc::new(transport));
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Run the handshake and launch the background loops.
    ///
    /// On failure the session stays `Connected`, possibly with some loops
    /// running; call [`ControlSession::stop`] to clean up.
    pub async fn start(&mut self) -> Result<(), ControlError> {
        let transport = match (&self.state, &self.transport) {
            (SessionState::Connected, Some(transport)) => transport.clone(),
            _ => return Err(ControlError::InvalidState(self.state)),
        };

        if let Err(e) = perform_handshake(
            &transport,
            self.serializer.as_ref(),
            &self.stream_config,
            self.options.handshake_timeout,
        )
        .await
        {
            warn!("Handshake with {} failed: {}", transport.peer_addr(), e);
            return Err(e);
        }
        debug!("Handshake with {} complete", transport.peer_addr());

        self.spawn_loop(
            LoopKind::Heartbeat,
            run_heartbeat(transport.clone(), self.options.heartbeat_interval),
        )?;
        self.spawn_loop(
            LoopKind::Jitter,
            run_jitter_reporter(
                transport.clone(),
                self.link_stats.clone(),
                self.options.jitter_interval,
            ),
        )?;
        self.spawn_loop(
            LoopKind::Resync,
            run_resync(transport.clone(), self.resync.clone(), self.event_tx.clone()),
        )?;

        self.state = SessionState::Active;
        info!("Control session with {} active", transport.peer_addr());
        let _ = self.event_tx.try_send(SessionEvent::Active {
            peer: transport.peer_addr(),
        });
        Ok(())
    }

    fn spawn_loop<F>(&mut self, kind: LoopKind, task: F) -> Result<(), ControlError>
    where
        F: Future<Output = Result<(), ControlError>> + Send + 'static,
    {
        let runtime =
            Handle::try_current().map_err(|e| ControlError::LoopStart(kind, e.to_string()))?;
        let event_tx = self.event_tx.clone();

        let body = runtime.spawn(task);
        let abort = body.abort_handle();
        let join = runtime.spawn(async move {
            let result = match body.await {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    error!("{} loop panicked", kind);
                    Err(ControlError::LoopPanicked(kind, panic_message(e.into_panic())))
                }
                // Aborted when the session was dropped
                Err(_) => Ok(()),
            };
            let error = result.as_ref().err().map(|e| e.to_string());
            if event_tx
                .try_send(SessionEvent::LoopExited { kind, error })
                .is_err()
            {
                debug!("Dropped exit event of {} loop", kind);
            }
            result
        });

        debug!("Launched {} loop", kind);
        self.loops.push(LoopHandle {
            kind,
            join,
            body: abort,
        });
        Ok(())
    }

    /// Close the connection and wait for every loop to finish
    pub async fn stop(&mut self) -> Result<(), ControlError> {
        if self.state == SessionState::Stopped {
            return Ok(());
        }

        if let Some(transport) = &self.transport {
            transport.close().await;
        }

        for LoopHandle { kind, join, .. } in self.loops.drain(..) {
            match join.await {
                Ok(Ok(())) => debug!("{} loop finished", kind),
                Ok(Err(e)) => debug!("{} loop had already failed: {}", kind, e),
                Err(e) => error!("{} loop was cancelled: {}", kind, e),
            }
        }

        let stats = self.stats().unwrap_or_default();
        self.state = SessionState::Stopped;
        info!("Control session stopped. Stats: {:?}", stats);
        let _ = self.event_tx.try_send(SessionEvent::Stopped { stats });
        Ok(())
    }

    /// Ask the host for an IDR frame. Never blocks.
    pub fn request_idr_frame(&self) {
        self.resync.raise();
    }

    /// Handle for requesting IDR frames from other threads or tasks
    pub fn resync_trigger(&self) -> ResyncTrigger {
        ResyncTrigger::new(self.resync.clone())
    }

    /// Link statistics fed by the receive path and read by the jitter loop
    pub fn link_stats(&self) -> Arc<LinkStats> {
        self.link_stats.clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Host address once connected
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.transport.as_ref().map(|t| t.peer_addr())
    }

    /// Traffic counters once connected
    pub fn stats(&self) -> Option<TransportStats> {
        self.transport.as_ref().map(|t| t.stats())
    }

    /// Number of launched loops not yet joined
    pub fn running_loops(&self) -> usize {
        self.loops.iter().filter(|l| !l.join.is_finished()).count()
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl Drop for ControlSession {
    fn drop(&mut self) {
        if !self.loops.is_empty() {
            warn!("Control session dropped without stop(); aborting {} loops", self.loops.len());
            for handle in &self.loops {
                handle.body.abort();
                handle.join.abort();
            }
        }
    }
}
