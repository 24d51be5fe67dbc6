//! TFTP Server Implementation
//!
//! This module contains the main TFTP server logic that receives requests on
//! the listening port and hands each one to its own [`Session`].
//!
//! A receive task queues datagrams; the processing loop consumes them together
//! with session completion notices from the same queue, so the session
//! registry is only touched by that loop.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use common::net::{self, MAX_DATAGRAM, SocketOptions};
use common::{EventQueue, Ini, QueueError, StopToken};
use tokio::net::UdpSocket;

use crate::protocol::{TftpErrorCode, TftpPacket};
use crate::session::{MAX_RETRIES, Session, SessionConfig, SessionHandle};

/// Default UDP port for the TFTP server
pub const DEFAULT_SERVER_PORT: u16 = 69;

/// TFTP Server configuration
#[derive(Debug, Clone)]
pub struct TftpServerConfig {
    pub bind_address: SocketAddr,
    /// How long a receive waits before checking for a stop request
    pub recv_timeout: Duration,
    pub session: SessionConfig,
}

impl Default for TftpServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), DEFAULT_SERVER_PORT),
            recv_timeout: Duration::from_millis(500),
            session: SessionConfig::default(),
        }
    }
}

impl TftpServerConfig {
    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let bind_ip: IpAddr = ini.value_or(None, "v4_bind_address", Ipv4Addr::UNSPECIFIED).into();
        let port = ini.value_or(None, "tftp_listen_port", DEFAULT_SERVER_PORT);
        let root_dir = PathBuf::from(ini.value(None, "tftp_base_dir").unwrap_or("./"));
        let timeout = ini.value_or(None, "tftp_timeout", 1u64);
        let max_retries = ini.value_or(None, "tftp_max_retries", MAX_RETRIES);

        if !root_dir.is_dir() {
            return Err(anyhow!("TFTP base directory {} does not exist", root_dir.display()));
        }

        Ok(Self {
            bind_address: SocketAddr::new(bind_ip, port),
            session: SessionConfig {
                root_dir,
                bind_ip,
                default_timeout: Duration::from_secs(timeout.max(1)),
                max_retries: max_retries.max(1),
            },
            ..Self::default()
        })
    }
}

/// Everything the processing loop reacts to
#[derive(Debug)]
pub enum ServerEvent {
    /// A datagram arrived on the listening port
    Packet { source: SocketAddr, bytes: Vec<u8> },
    /// The session with this id has finished
    SessionDone(u64),
}

/// Main TFTP server
pub struct TftpServer {
    config: TftpServerConfig,
    session_config: Arc<SessionConfig>,
    socket: Option<Arc<UdpSocket>>,
    sessions: HashMap<u64, SessionHandle>,
    next_session_id: u64,
}

impl TftpServer {
    /// Create a new TFTP server with the given configuration
    pub fn new(config: TftpServerConfig) -> Self {
        let session_config = Arc::new(config.session.clone());
        Self {
            config,
            session_config,
            socket: None,
            sessions: HashMap::new(),
            next_session_id: 0,
        }
    }

    /// Bind the listening socket and return its local address
    pub fn bind(&mut self) -> Result<SocketAddr> {
        let options = SocketOptions {
            reuse_address: true,
            ..SocketOptions::default()
        };
        let socket = net::bind_udp(self.config.bind_address, options).context("Failed to bind TFTP server socket")?;
        let local_addr = socket.local_addr().context("Failed to get local address")?;

        tracing::info!(
            "TFTP server listening on {}, serving files from {}",
            local_addr,
            self.config.session.root_dir.display()
        );
        self.socket = Some(Arc::new(socket));
        Ok(local_addr)
    }

    /// Get the local address the server is bound to (if bound)
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.socket.as_ref().and_then(|s| s.local_addr().ok())
    }

    /// Run until `stop` fires, then wait for the receive task and every session
    pub async fn run(&mut self, stop: StopToken) -> Result<()> {
        let socket = self
            .socket
            .clone()
            .ok_or_else(|| anyhow!("TFTP server must be bound before it runs"))?;
        let events = Arc::new(EventQueue::new());

        let receiver = tokio::spawn(receive_loop(
            Arc::clone(&socket),
            Arc::clone(&events),
            stop.clone(),
            self.config.recv_timeout,
        ));

        loop {
            let event = match events.pop(&stop, None).await {
                Ok(event) => event,
                Err(QueueError::Stopped) => break,
                Err(QueueError::TimedOut) => continue,
            };

            match event {
                ServerEvent::Packet { source, bytes } => {
                    if let Err(e) = self.handle_packet(&socket, &events, &stop, source, &bytes).await {
                        tracing::warn!("Error handling TFTP packet from {}: {:#}", source, e);
                    }
                }
                ServerEvent::SessionDone(id) => self.reap(id).await,
            }
        }

        tracing::info!("TFTP server stopping, waiting for {} sessions", self.sessions.len());
        receiver.await.context("TFTP receive task failed")?;
        for (_, session) in self.sessions.drain() {
            session.join().await;
        }
        Ok(())
    }

    async fn handle_packet(
        &mut self,
        socket: &UdpSocket,
        events: &Arc<EventQueue<ServerEvent>>,
        stop: &StopToken,
        source: SocketAddr,
        bytes: &[u8],
    ) -> Result<()> {
        let packet = TftpPacket::from_bytes(bytes).context("Failed to parse TFTP packet")?;

        if !matches!(packet, TftpPacket::ReadRequest(_) | TftpPacket::WriteRequest(_)) {
            tracing::debug!("Unexpected {} on listening port from {}", packet, source);
            let reply = TftpPacket::error_default(TftpErrorCode::IllegalOperation).to_bytes()?;
            socket.send_to(&reply, source).await?;
            return Ok(());
        }
        tracing::info!("{} from {}", packet, source);

        let id = self.next_session_id;
        self.next_session_id += 1;

        let session = Session::open(id, source, Arc::clone(&self.session_config), stop.clone()).await?;
        tracing::debug!("Session {} for {} on {}", id, source, session.local_addr()?);
        self.sessions.insert(id, session.spawn(packet, Arc::clone(events)));
        Ok(())
    }

    async fn reap(&mut self, id: u64) {
        match self.sessions.remove(&id) {
            Some(session) => {
                debug_assert!(session.is_done());
                session.join().await;
                tracing::debug!("Session {} finished, {} active", id, self.sessions.len());
            }
            None => tracing::warn!("Completion notice for unknown session {}", id),
        }
    }
}

async fn receive_loop(
    socket: Arc<UdpSocket>,
    events: Arc<EventQueue<ServerEvent>>,
    stop: StopToken,
    wait: Duration,
) {
    let mut buffer = vec![0u8; MAX_DATAGRAM];

    while !stop.is_stopped() {
        match net::recv_from_timeout(&socket, &mut buffer, wait).await {
            Ok(Some((len, source))) => {
                tracing::debug!("Received packet from {}", source);
                events.push(ServerEvent::Packet {
                    source,
                    bytes: buffer[..len].to_vec(),
                });
            }
            Ok(None) => {}
            Err(e) => tracing::error!("Error receiving TFTP packet: {}", e),
        }
    }
}
