//! UDP socket helpers

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use socket2::{Domain, Protocol, Socket, Type};
use tokio::net::UdpSocket;

/// Largest datagram either server will accept
pub const MAX_DATAGRAM: usize = 65536;

/// Options applied before binding
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketOptions {
    /// SO_BROADCAST
    pub broadcast: bool,
    /// SO_REUSEADDR
    pub reuse_address: bool,
}

/// Create a UDP socket with `options` applied and bind it to `addr`
pub fn bind_udp(addr: SocketAddr, options: SocketOptions) -> Result<UdpSocket> {
    let domain = Domain::for_address(addr);
    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).context("Failed to create UDP socket")?;

    if options.broadcast {
        socket
            .set_broadcast(true)
            .context("Failed to enable broadcast on UDP socket")?;
    }
    if options.reuse_address {
        socket
            .set_reuse_address(true)
            .context("Failed to set SO_REUSEADDR on UDP socket")?;
    }

    socket
        .set_nonblocking(true)
        .context("Failed to set UDP socket to non-blocking mode")?;
    socket
        .bind(&addr.into())
        .with_context(|| format!("Failed to bind UDP socket to {}", addr))?;

    let std_socket: std::net::UdpSocket = socket.into();
    UdpSocket::from_std(std_socket).context("Failed to register UDP socket with the runtime")
}

/// Receive one datagram, waiting at most `wait`
///
/// Returns `Ok(None)` when the wait elapses without a datagram.
pub async fn recv_from_timeout(
    socket: &UdpSocket,
    buf: &mut [u8],
    wait: Duration,
) -> io::Result<Option<(usize, SocketAddr)>> {
    match tokio::time::timeout(wait, socket.recv_from(buf)).await {
        Ok(Ok(received)) => Ok(Some(received)),
        Ok(Err(e)) => Err(e),
        Err(_elapsed) => Ok(None),
    }
}
