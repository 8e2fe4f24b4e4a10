//! Link-quality accounting and the periodic jitter report loop.

use control_wire::JitterReport;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::error::ControlError;
use crate::transport::Transport;

/// Default interval between jitter reports
pub const DEFAULT_JITTER_INTERVAL: Duration = Duration::from_millis(100);

/// Point-in-time view of [`LinkStats`]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinkSnapshot {
    /// Interarrival jitter estimate in milliseconds
    pub jitter_ms: u32,
    /// Cumulative lost packets
    pub packets_lost: u32,
}

#[derive(Debug, Default)]
struct LinkState {
    last_transit_ms: Option<f64>,
    jitter_ms: f64,
    packets_lost: u32,
}

/// Link statistics shared between the receive path and the jitter loop.
///
/// Jitter follows the RFC 3550 interarrival estimator: for consecutive
/// packets with transit times `S` and `R`, `D = R - S` and
/// `J += (|D| - J) / 16`.
#[derive(Debug, Default)]
pub struct LinkStats {
    state: Mutex<LinkState>,
}

impl LinkStats {
    /// Create empty statistics
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LinkState> {
        // Counters stay meaningful even if a recorder panicked mid-update
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record the transit time (arrival minus send timestamp) of one packet
    pub fn record_transit(&self, transit: Duration) {
        let transit_ms = transit.as_secs_f64() * 1000.0;
        let mut state = self.lock();

        if let Some(last) = state.last_transit_ms {
            let d = (transit_ms - last).abs();
            state.jitter_ms += (d - state.jitter_ms) / 16.0;
        }
        state.last_transit_ms = Some(transit_ms);
    }

    /// Record packets detected as lost
    pub fn record_lost(&self, count: u32) {
        let mut state = self.lock();
        state.packets_lost = state.packets_lost.saturating_add(count);
    }

    /// Current jitter and loss figures
    pub fn snapshot(&self) -> LinkSnapshot {
        let state = self.lock();
        LinkSnapshot {
            jitter_ms: state.jitter_ms.round() as u32,
            packets_lost: state.packets_lost,
        }
    }
}

/// Send a jitter report every `interval` until the transport closes or a
/// send fails. The first report goes out immediately.
pub async fn run_jitter_reporter(
    transport: Arc<Transport>,
    stats: Arc<LinkStats>,
    interval: Duration,
) -> Result<(), ControlError> {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sequence: u32 = 0;

    loop {
        tokio::select! {
            biased;

            _ = transport.closed() => {
                debug!("Jitter loop to {} stopping: transport closed", transport.peer_addr());
                return Ok(());
            }

            _ = ticker.tick() => {
                let snapshot = stats.snapshot();
                let report = JitterReport {
                    jitter_ms: snapshot.jitter_ms,
                    packets_lost: snapshot.packets_lost,
                    sequence,
                };

                match transport.send_frame(control_wire::PacketType::Jitter, report.encode()).await {
                    Ok(()) => {
                        trace!("Sent JITTER #{} to {}: {:?}", sequence, transport.peer_addr(), snapshot);
                        sequence = sequence.wrapping_add(1);
                    }
                    Err(ControlError::Closed) => return Ok(()),
                    Err(e) => {
                        warn!("Jitter loop to {} terminating: {}", transport.peer_addr(), e);
                        return Err(e);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::read_frame;
    use control_wire::{PacketType, DEFAULT_MAX_PAYLOAD_SIZE};
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    #[test]
    fn test_jitter_estimator() {
        let stats = LinkStats::new();
        assert_eq!(stats.snapshot(), LinkSnapshot::default());

        // Constant transit: no jitter
        for _ in 0..10 {
            stats.record_transit(Duration::from_millis(40));
        }
        assert_eq!(stats.snapshot().jitter_ms, 0);

        // One 32 ms deviation moves the estimate by 32/16
        stats.record_transit(Duration::from_millis(72));
        assert_eq!(stats.snapshot().jitter_ms, 2);

        // Large alternating deviations converge towards their magnitude
        for i in 0..200 {
            let ms = if i % 2 == 0 { 40 } else { 100 };
            stats.record_transit(Duration::from_millis(ms));
        }
        assert_eq!(stats.snapshot().jitter_ms, 60);
    }

    #[test]
    fn test_loss_accumulates() {
        let stats = LinkStats::new();
        stats.record_lost(3);
        stats.record_lost(4);
        assert_eq!(stats.snapshot().packets_lost, 7);

        stats.record_lost(u32::MAX);
        assert_eq!(stats.snapshot().packets_lost, u32::MAX);
    }

    #[tokio::test]
    async fn test_reports_carry_live_stats_and_sequence() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (client, accepted) = tokio::join!(
            Transport::connect(addr, DEFAULT_MAX_PAYLOAD_SIZE),
            listener.accept()
        );
        let transport = Arc::new(client.unwrap());
        let mut host = accepted.unwrap().0;

        let stats = Arc::new(LinkStats::new());
        stats.record_lost(5);

        let task = tokio::spawn(run_jitter_reporter(
            transport.clone(),
            stats.clone(),
            Duration::from_millis(20),
        ));

        let mut reports = Vec::new();
        for _ in 0..3 {
            let frame = read_frame(&mut host, DEFAULT_MAX_PAYLOAD_SIZE).await.unwrap();
            assert_eq!(frame.packet_type(), Some(PacketType::Jitter));
            assert_eq!(frame.payload.len(), 16);
            reports.push(JitterReport::decode(&frame.payload).unwrap());
        }

        assert_eq!(
            reports.iter().map(|r| r.sequence).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert!(reports.iter().all(|r| r.packets_lost == 5));

        transport.close().await;
        let res = timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
        assert!(res.is_ok());
    }
}
