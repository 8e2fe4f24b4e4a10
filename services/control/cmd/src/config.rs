//! Client configuration.
//!
//! Values come from a YAML file, then environment overrides, then CLI flags
//! (applied in `main`).

use anyhow::{Context, Result};
use control_session::{SessionOptions, StreamConfiguration};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Streaming host address
    pub host: Option<IpAddr>,
    /// Control stream port
    pub control_port: u16,
    /// Stream parameters sent in the opening configuration blob
    pub stream: StreamConfiguration,
    /// Loop and handshake timing
    pub timing: TimingConfig,
    /// Capacity of the event hand-off queue
    pub event_queue_bound: usize,
}

/// Loop and handshake timing, in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub heartbeat_interval_ms: u64,
    pub jitter_interval_ms: u64,
    pub handshake_timeout_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        let defaults = SessionOptions::default();
        Self {
            heartbeat_interval_ms: defaults.heartbeat_interval.as_millis() as u64,
            jitter_interval_ms: defaults.jitter_interval.as_millis() as u64,
            handshake_timeout_ms: defaults.handshake_timeout.as_millis() as u64,
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: None,
            control_port: control_session::CONTROL_PORT,
            stream: StreamConfiguration::default(),
            timing: TimingConfig::default(),
            event_queue_bound: 256,
        }
    }
}

impl ClientConfig {
    /// Load from `path`, falling back to defaults, then apply environment overrides
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<ClientConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Apply `STREAM_CONTROL_*` overrides looked up through `lookup`
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("STREAM_CONTROL_HOST") {
            self.host = Some(
                host.parse()
                    .with_context(|| format!("STREAM_CONTROL_HOST is not an IP address: {host}"))?,
            );
            info!("Host overridden by environment: {}", host);
        }

        if let Some(port) = lookup("STREAM_CONTROL_PORT") {
            self.control_port = port
                .parse()
                .with_context(|| format!("STREAM_CONTROL_PORT is not a port: {port}"))?;
            info!("Control port overridden by environment: {}", port);
        }

        if let Some(bitrate) = lookup("STREAM_CONTROL_BITRATE_KBPS") {
            self.stream.bitrate_kbps = bitrate
                .parse()
                .with_context(|| format!("STREAM_CONTROL_BITRATE_KBPS is not a number: {bitrate}"))?;
            info!("Bitrate overridden by environment: {} kbps", bitrate);
        }

        Ok(())
    }

    /// Session tunables derived from this configuration
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            control_port: self.control_port,
            heartbeat_interval: Duration::from_millis(self.timing.heartbeat_interval_ms),
            jitter_interval: Duration::from_millis(self.timing.jitter_interval_ms),
            handshake_timeout: Duration::from_millis(self.timing.handshake_timeout_ms),
            ..SessionOptions::default()
        }
    }
}
