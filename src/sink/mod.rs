pub mod console;
pub mod udp;

use std::io;

use anyhow::{Context, Result};

use crate::config::Config;

use self::console::ConsoleSink;
use self::udp::UdpSink;

/// Sink delivers encoded metric lines.
pub trait Sink: Send {
    /// Returns the sink's name for logging.
    fn name(&self) -> &str;

    /// Deliver one line as a single unit (one datagram, one log event).
    fn send(&self, line: &str) -> impl std::future::Future<Output = io::Result<()>> + Send;
}

/// The sink selected by configuration.
///
/// Uses enum dispatch rather than trait objects so `send` stays a plain
/// async call.
#[derive(Debug)]
pub enum Output {
    Udp(UdpSink),
    Console(ConsoleSink),
}

impl Output {
    /// UDP to the configured server, or the console when none is set.
    ///
    /// Resolution and bind failures are returned to the caller.
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        if cfg.has_server() {
            let sink = UdpSink::connect(&cfg.server)
                .await
                .with_context(|| format!("connecting to graphite server {}", cfg.server))?;
            tracing::info!(server = %cfg.server, remote = %sink.remote(), "graphite sink configured");
            Ok(Self::Udp(sink))
        } else {
            tracing::info!("no graphite server specified, printing output to the console");
            Ok(Self::Console(ConsoleSink))
        }
    }
}

impl Sink for Output {
    fn name(&self) -> &str {
        match self {
            Self::Udp(s) => s.name(),
            Self::Console(s) => s.name(),
        }
    }

    async fn send(&self, line: &str) -> io::Result<()> {
        match self {
            Self::Udp(s) => s.send(line).await,
            Self::Console(s) => s.send(line).await,
        }
    }
}
