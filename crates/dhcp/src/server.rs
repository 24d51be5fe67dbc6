//! DHCP Server Implementation
//!
//! Answers BOOTP/DHCP requests from statically configured clients:
//!
//! - A receive task reads datagrams and queues them with their source address
//! - A single processing loop parses each datagram and builds the reply from
//!   the client's [`OfferParams`]
//! - Replies go to the configured reply address (broadcast by default) on the
//!   port the request came from
//!
//! Unknown clients and unsupported message types are dropped without a reply.

use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use common::net::{self, MAX_DATAGRAM, SocketOptions};
use common::{EventQueue, Ini, QueueError, StopToken};
use tokio::net::UdpSocket;

use crate::packet::DhcpPacket;
use crate::{DEFAULT_SERVER_PORT, MessageType, OfferParams, OpCode};

/// Configuration for the DHCP server
#[derive(Debug, Clone)]
pub struct DhcpServerConfig {
    /// Address to listen on
    pub bind_address: SocketAddr,

    /// Destination address of replies; the port is taken from the request
    pub reply_address: Ipv4Addr,

    /// How long a receive waits before checking for a stop request
    pub recv_timeout: Duration,

    /// Client profiles keyed by lowercase MAC address
    pub clients: HashMap<String, OfferParams>,
}

impl Default for DhcpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DEFAULT_SERVER_PORT),
            reply_address: Ipv4Addr::BROADCAST,
            recv_timeout: Duration::from_millis(500),
            clients: HashMap::new(),
        }
    }
}

impl DhcpServerConfig {
    /// Build the server configuration; every INI section is one client
    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let bind_ip = ini.value_or(None, "v4_bind_address", Ipv4Addr::UNSPECIFIED);
        let port = ini.value_or(None, "dhcp_listen_port", DEFAULT_SERVER_PORT);
        let reply_address = ini.value_or(None, "dhcp_reply_address", Ipv4Addr::BROADCAST);

        let mut clients = HashMap::new();
        for section in ini.sections() {
            let profile = OfferParams::from_ini(ini, section)
                .with_context(|| format!("Invalid client configuration [{}]", section))?;
            tracing::debug!("Loaded DHCP client profile for {}", section);
            clients.insert(section.to_lowercase(), profile);
        }

        Ok(Self {
            bind_address: SocketAddr::new(bind_ip.into(), port),
            reply_address,
            clients,
            ..Self::default()
        })
    }
}

/// A received datagram waiting for the processing loop
#[derive(Debug)]
struct Datagram {
    source: SocketAddr,
    bytes: Vec<u8>,
}

/// Main DHCP server
pub struct DhcpServer {
    config: DhcpServerConfig,
    socket: Option<Arc<UdpSocket>>,
}

impl DhcpServer {
    /// Create a new DHCP server with the given configuration
    pub fn new(config: DhcpServerConfig) -> Self {
        Self { config, socket: None }
    }

    /// Bind the listening socket and return its local address
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let options = SocketOptions {
            broadcast: true,
            reuse_address: true,
        };
        let socket = net::bind_udp(self.config.bind_address, options)
            .with_context(|| format!("Failed to bind DHCP server to {}", self.config.bind_address))?;
        let local = socket.local_addr().context("Failed to read DHCP socket address")?;

        tracing::info!("DHCP server listening on {}", local);
        self.socket = Some(Arc::new(socket));
        Ok(local)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|socket| socket.local_addr().ok())
    }

    /// Run until `stop` fires; the receive task is joined before returning
    pub async fn run(&self, stop: StopToken) -> Result<()> {
        let socket = self
            .socket
            .clone()
            .ok_or_else(|| anyhow!("DHCP server must be bound before it runs"))?;
        let queue = Arc::new(EventQueue::new());

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&queue),
            stop.clone(),
            self.config.recv_timeout,
        ));

        loop {
            let datagram = match queue.pop(&stop, None).await {
                Ok(datagram) => datagram,
                Err(QueueError::Stopped) => break,
                Err(QueueError::TimedOut) => continue,
            };

            if let Err(e) = self.handle_datagram(&socket, datagram).await {
                tracing::warn!("Error handling DHCP packet: {:#}", e);
            }
        }

        tracing::info!("DHCP server stopping");
        receiver.await.context("DHCP receive task failed")?;
        Ok(())
    }

    async fn handle_datagram(&self, socket: &UdpSocket, datagram: Datagram) -> Result<()> {
        let request = DhcpPacket::from_bytes(&datagram.bytes)
            .with_context(|| format!("Failed to parse DHCP packet from {}", datagram.source))?;
        tracing::debug!("Received {} from {}", request, datagram.source);

        let Some(reply) = self.respond(&request)? else {
            return Ok(());
        };

        let destination = SocketAddr::new(self.config.reply_address.into(), datagram.source.port());
        let bytes = reply.to_bytes().context("Failed to encode DHCP reply")?;
        socket
            .send_to(&bytes, destination)
            .await
            .with_context(|| format!("Failed to send DHCP reply to {}", destination))?;

        tracing::info!(
            "Sent {:?} to {} offering {}",
            reply.message_type(),
            reply.mac_string(),
            reply.yiaddr
        );
        Ok(())
    }

    /// Build the reply for one request
    ///
    /// `Ok(None)` means the request is silently ignored. A Discover or Request
    /// from a client without a profile is an error.
    pub fn respond(&self, request: &DhcpPacket) -> Result<Option<DhcpPacket>> {
        if request.op != OpCode::BootRequest as u8 {
            tracing::debug!("Ignoring DHCP packet with op {}", request.op);
            return Ok(None);
        }

        let message_type = match request.message_type() {
            Some(message_type @ (MessageType::Discover | MessageType::Request)) => message_type,
            other => {
                tracing::debug!("Ignoring DHCP message type {:?}", other);
                return Ok(None);
            }
        };

        let mac = request.mac_string();
        let profile = self
            .config
            .clients
            .get(&mac)
            .ok_or_else(|| anyhow!("No configuration for client {} ({:?})", mac, message_type))?;

        tracing::info!("Processing DHCP {:?} from {}", message_type, mac);
        Ok(request.reply_to(profile)?)
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    queue: Arc<EventQueue<Datagram>>,
    stop: StopToken,
    wait: Duration,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    while !stop.is_stopped() {
        match net::recv_from_timeout(&socket, &mut buffer, wait).await {
            Ok(Some((len, source))) => {
                tracing::debug!("Received DHCP datagram ({} bytes) from {}", len, source);
                queue.push(Datagram {
                    source,
                    bytes: buffer[..len].to_vec(),
                });
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!("Error receiving DHCP packet: {}", e);
            }
        }
    }
}
