use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};

use anyhow::{Context, Result};
use tokio::net::{lookup_host, UdpSocket};

use super::Sink;

/// Fire-and-forget UDP sink for the Graphite plaintext protocol.
///
/// The socket is unconnected and bound to an ephemeral local port; every line
/// goes out as its own datagram via `send_to`. Nothing is read back.
#[derive(Debug)]
pub struct UdpSink {
    socket: UdpSocket,
    remote: SocketAddr,
}

impl UdpSink {
    /// Resolve `server` (host:port) and bind a local socket of the same
    /// address family.
    pub async fn connect(server: &str) -> Result<Self> {
        let remote = lookup_host(server)
            .await
            .with_context(|| format!("resolving {server}"))?
            .next()
            .with_context(|| format!("no addresses found for {server}"))?;

        let local: SocketAddr = match remote {
            SocketAddr::V4(_) => (Ipv4Addr::UNSPECIFIED, 0).into(),
            SocketAddr::V6(_) => (Ipv6Addr::UNSPECIFIED, 0).into(),
        };

        let socket = UdpSocket::bind(local)
            .await
            .with_context(|| format!("binding UDP socket on {local}"))?;

        Ok(Self { socket, remote })
    }

    /// The resolved server address.
    pub fn remote(&self) -> SocketAddr {
        self.remote
    }
}

impl Sink for UdpSink {
    fn name(&self) -> &str {
        "udp"
    }

    async fn send(&self, line: &str) -> io::Result<()> {
        self.socket.send_to(line.as_bytes(), self.remote).await?;
        Ok(())
    }
}
