//! Control-stream client binary.
//!
//! Connects to a streaming host, runs the control handshake and keeps the
//! session alive until Ctrl-C or the requested duration elapses.

use anyhow::Context;
use clap::Parser;
use control_queue::{BoundedBlockingQueue, OfferError};
use control_session::{ControlSession, SessionEvent};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;

use config::ClientConfig;
use logging::StreamLogFormatter;

/// Control-stream client for remote streaming sessions
#[derive(Parser, Debug)]
#[command(name = "stream-control", version, about = "Control-stream client for remote streaming sessions")]
struct Args {
    /// Streaming host address, e.g. 192.168.1.20
    #[arg(long)]
    host: Option<IpAddr>,

    /// Configuration file path
    #[arg(long, default_value = "stream-control.yaml")]
    config: PathBuf,

    /// Control stream port
    #[arg(long)]
    port: Option<u16>,

    /// Stop after this long, e.g. 30s
    #[arg(long)]
    duration: Option<humantime::Duration>,

    /// Request an IDR frame this often, e.g. 5s
    #[arg(long)]
    idr_interval: Option<humantime::Duration>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("warn")
            .add_directive(format!("stream_control={}", log_level).parse()?)
            .add_directive(format!("control_session={}", log_level).parse()?)
            .add_directive(format!("control_wire={}", log_level).parse()?)
            .add_directive(format!("control_queue={}", log_level).parse()?),
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .event_format(StreamLogFormatter::new("stream-control"))
        .init();
    Ok(())
}

fn log_event(event: &SessionEvent) {
    match event {
        SessionEvent::Active { peer } => {
            component_info!("events", "Session with {} is active", peer)
        }
        SessionEvent::ResyncSent => component_debug!("events", "IDR frame requested"),
        SessionEvent::LoopExited { kind, error: None } => {
            component_debug!("events", "{} loop exited", kind)
        }
        SessionEvent::LoopExited { kind, error: Some(error) } => {
            component_warn!("events", "{} loop failed: {}", kind, error)
        }
        SessionEvent::Stopped { stats } => component_info!(
            "events",
            "Session stopped after {} frames out ({} bytes), {} frames in",
            stats.frames_sent,
            stats.bytes_out,
            stats.frames_received
        ),
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    info!("Starting stream-control v{}", env!("CARGO_PKG_VERSION"));

    let mut config = ClientConfig::load_from_file(&args.config)?;
    if let Some(host) = args.host {
        config.host = Some(host);
    }
    if let Some(port) = args.port {
        config.control_port = port;
    }
    let host = config
        .host
        .context("no streaming host given; pass --host or set STREAM_CONTROL_HOST")?;

    // Session events cross to a plain OS thread through the blocking queue
    let event_queue = Arc::new(BoundedBlockingQueue::new(config.event_queue_bound));
    let logger = {
        let queue = event_queue.clone();
        thread::Builder::new()
            .name("event-log".to_string())
            .spawn(move || {
                while let Ok(event) = queue.wait_and_take() {
                    log_event(&event);
                }
            })
            .context("failed to spawn event logging thread")?
    };

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let (failed_tx, mut failed_rx) = mpsc::channel(1);
    let forwarder = {
        let queue = event_queue.clone();
        tokio::spawn(async move {
            while let Some(event) = event_rx.recv().await {
                if let SessionEvent::LoopExited { kind, error: Some(_) } = &event {
                    let _ = failed_tx.try_send(*kind);
                }
                match queue.offer(event) {
                    Ok(()) => {}
                    Err(OfferError::Interrupted(_)) => break,
                    Err(e) => component_warn!("events", "Dropping session event: {}", e),
                }
            }
        })
    };

    let mut session = ControlSession::new(config.stream.clone(), config.session_options(), event_tx);
    session.initialize(host).await?;
    info!(
        "Requesting {}x{}@{} at {} kbps",
        config.stream.width, config.stream.height, config.stream.fps, config.stream.bitrate_kbps
    );

    if let Err(e) = session.start().await {
        session.stop().await?;
        drop(session);
        let _ = forwarder.await;
        event_queue.destroy();
        let _ = tokio::task::spawn_blocking(move || logger.join()).await;
        return Err(e).context("control session failed to start");
    }

    let idr_task = args.idr_interval.map(|every| {
        let trigger = session.resync_trigger();
        let every: std::time::Duration = every.into();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
            loop {
                ticker.tick().await;
                trigger.request_idr_frame();
            }
        })
    });

    let run_for: Option<std::time::Duration> = args.duration.map(Into::into);
    let deadline = async {
        match run_for {
            Some(duration) => tokio::time::sleep(duration).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            info!("Received Ctrl-C, stopping");
        }
        _ = deadline => info!("Run duration elapsed, stopping"),
        Some(kind) = failed_rx.recv() => warn!("{} loop failed, stopping session", kind),
    }

    if let Some(task) = idr_task {
        task.abort();
    }
    session.stop().await?;
    drop(session);
    let _ = forwarder.await;

    let remaining = event_queue.destroy();
    let undrained = remaining.len();
    if undrained > 0 {
        warn!("{} session events were not logged", undrained);
        for event in remaining {
            log_event(&event);
        }
    }
    if !matches!(tokio::task::spawn_blocking(move || logger.join()).await, Ok(Ok(()))) {
        warn!("Event logging thread panicked");
    }

    info!("stream-control shutdown complete");
    Ok(())
}
