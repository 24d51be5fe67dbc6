//! TFTP Transfer Session
//!
//! One session serves one request from its own ephemeral socket, so transfers
//! to different clients never share a port or a timeout.
//!
//! A read request moves through these states:
//!
//! - `Validating`: transfer mode and requested file are checked
//! - `Negotiating`: only when the client asked for options; an OACK is sent
//!   and ACK 0 awaited
//! - `Transferring`: DATA blocks are sent one at a time, each retried until
//!   acknowledged or the retry budget runs out
//! - `Done`: the owning server is notified and reclaims the session
//!
//! Write requests are refused with an AccessViolation error.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use common::net::{self, MAX_DATAGRAM};
use common::{EventQueue, StopToken};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::options::TransferOptions;
use crate::protocol::{TftpErrorCode, TftpOptions, TftpPacket, TftpRequest};
use crate::reader::FileReader;
use crate::server::ServerEvent;

/// Sends of one packet before a transfer is abandoned
pub const MAX_RETRIES: u32 = 10;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(1);

/// Settings shared by every session of one server
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Directory files are served from
    pub root_dir: PathBuf,
    /// Local address of session sockets
    pub bind_ip: IpAddr,
    /// ACK wait when the client does not negotiate `timeout`
    pub default_timeout: Duration,
    pub max_retries: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./"),
            bind_ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            default_timeout: DEFAULT_TIMEOUT,
            max_retries: MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Validating,
    Negotiating(TftpOptions),
    Transferring,
    Done,
}

/// What came back while waiting for an ACK
enum AckWait {
    Acked,
    TimedOut,
}

/// Registry entry the server keeps for a running session
#[derive(Debug)]
pub struct SessionHandle {
    pub client: SocketAddr,
    done: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl SessionHandle {
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait for the session task to end
    pub async fn join(self) {
        if let Err(e) = self.join.await {
            tracing::error!("TFTP session for {} panicked: {}", self.client, e);
        }
    }
}

pub struct Session {
    id: u64,
    client: SocketAddr,
    socket: UdpSocket,
    config: Arc<SessionConfig>,
    stop: StopToken,
    options: TransferOptions,
    path: PathBuf,
    reader: Option<FileReader>,
    buffer: Vec<u8>,
}

impl Session {
    /// Bind the session's ephemeral socket
    pub async fn open(id: u64, client: SocketAddr, config: Arc<SessionConfig>, stop: StopToken) -> Result<Self> {
        let socket = UdpSocket::bind(SocketAddr::new(config.bind_ip, 0))
            .await
            .context("failed to bind ephemeral socket")?;
        tracing::debug!("Session {} socket bound to {}", id, socket.local_addr()?);

        Ok(Self {
            id,
            client,
            socket,
            options: TransferOptions::new(config.default_timeout, 0),
            config,
            stop,
            path: PathBuf::new(),
            reader: None,
            buffer: vec![0u8; MAX_DATAGRAM],
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    /// Run the session for `request` in its own task
    ///
    /// When the task ends, the completion flag is set and
    /// [`ServerEvent::SessionDone`] is pushed to `events`.
    pub fn spawn(self, request: TftpPacket, events: Arc<EventQueue<ServerEvent>>) -> SessionHandle {
        let client = self.client;
        let done = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&done);

        let join = tokio::spawn(async move {
            let id = self.id;
            let result = match request {
                TftpPacket::ReadRequest(request) => self.run_read(request).await,
                TftpPacket::WriteRequest(request) => self.reject_write(request).await,
                other => Err(anyhow::anyhow!("Not a request: {}", other)),
            };
            if let Err(e) = result {
                tracing::error!("TFTP session {} with {} failed: {:#}", id, client, e);
            }

            flag.store(true, Ordering::Release);
            events.push(ServerEvent::SessionDone(id));
        });

        SessionHandle { client, done, join }
    }

    /// Serve a read request to completion
    pub async fn run_read(mut self, request: TftpRequest) -> Result<()> {
        let mut state = State::Validating;

        loop {
            tracing::debug!("Session {} state {:?}", self.id, state);
            state = match state {
                State::Validating => self.validate(&request).await?,
                State::Negotiating(accepted) => self.negotiate(accepted).await?,
                State::Transferring => self.transfer().await?,
                State::Done => break,
            };
        }

        tracing::info!("Finished sending {} to {}", request.filename, self.client);
        Ok(())
    }

    /// Refuse an upload
    pub async fn reject_write(self, request: TftpRequest) -> Result<()> {
        self.send_error(TftpErrorCode::AccessViolation, "Not upload implemented.")
            .await?;
        bail!("TFTP upload of {} not implemented", request.filename)
    }

    async fn validate(&mut self, request: &TftpRequest) -> Result<State> {
        if request.transfer_mode().is_none() {
            self.send_error_default(TftpErrorCode::IllegalOperation).await?;
            bail!("Unsupported transfer mode: {}", request.mode);
        }

        self.path = match resolve_path(&self.config.root_dir, &request.filename) {
            Ok(path) => path,
            Err(PathError::Missing) => {
                self.send_error_default(TftpErrorCode::FileNotFound).await?;
                bail!("File not found: {}", request.filename);
            }
            Err(PathError::Escapes) => {
                self.send_error_default(TftpErrorCode::AccessViolation).await?;
                bail!("Path escapes the TFTP root: {}", request.filename);
            }
        };

        let size = std::fs::metadata(&self.path)
            .with_context(|| format!("Failed to read metadata of {}", self.path.display()))?
            .len();
        self.options = TransferOptions::new(self.config.default_timeout, size);

        if request.options.is_empty() {
            return self.start_transfer();
        }

        let accepted = self.options.negotiate(&request.options);
        if accepted.is_empty() {
            tracing::debug!("No requested option accepted, skipping OACK");
            return self.start_transfer();
        }
        Ok(State::Negotiating(accepted))
    }

    async fn negotiate(&mut self, accepted: TftpOptions) -> Result<State> {
        let oack = TftpPacket::option_ack(accepted);
        tracing::debug!("Sending {} to {}", oack, self.client);

        for _ in 0..self.config.max_retries {
            if self.stop.is_stopped() {
                bail!("Stop requested during option negotiation");
            }
            self.send(&oack, self.client).await?;
            match self.await_ack(0, None, self.config.default_timeout).await? {
                AckWait::Acked => return self.start_transfer(),
                AckWait::TimedOut => tracing::debug!("Timed out waiting for ACK 0 from {}", self.client),
            }
        }

        tracing::error!("OACK to {} has timed out", self.client);
        self.send_error(TftpErrorCode::Undefined, "TFTP operation timed out.")
            .await?;
        bail!("Failed to send OACK packet, too many retries")
    }

    fn start_transfer(&mut self) -> Result<State> {
        let reader = FileReader::open(&self.path, self.options.transfer_size, self.options.block_size)?;
        tracing::info!(
            "Starting transfer of {} to {} (file_size = {} bytes, blksize = {} bytes, timeout = {:?})",
            self.path.display(),
            self.client,
            self.options.transfer_size,
            self.options.block_size,
            self.options.timeout
        );
        self.reader = Some(reader);
        Ok(State::Transferring)
    }

    async fn transfer(&mut self) -> Result<State> {
        let Some(mut reader) = self.reader.take() else {
            bail!("Transfer started without a file reader");
        };

        let mut retries = self.config.max_retries;
        while retries > 0 {
            if self.stop.is_stopped() {
                bail!("Stop requested during transfer");
            }

            let block = reader.block_id();
            self.send(&reader.packet(), self.client).await?;

            match self.await_ack(block, Some(block.wrapping_sub(1)), self.options.timeout).await? {
                AckWait::Acked => {
                    if reader.is_last() {
                        return Ok(State::Done);
                    }
                    reader.next()?;
                    retries = self.config.max_retries;
                }
                AckWait::TimedOut => {
                    tracing::debug!("Timed out waiting for ACK {} from {}", block, self.client);
                    retries -= 1;
                }
            }
        }

        self.send_error(TftpErrorCode::Undefined, "TFTP operation timed out.")
            .await?;
        bail!(
            "Failed to send DATA packet {}, too many retries",
            reader.number()
        )
    }

    /// Wait up to `wait` for an ACK of `expected` from the client
    ///
    /// Packets from other addresses are answered with UnknownTransferId and do
    /// not end the wait. An ACK of `duplicate` is ignored.
    async fn await_ack(&mut self, expected: u16, duplicate: Option<u16>, wait: Duration) -> Result<AckWait> {
        let deadline = Instant::now() + wait;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(AckWait::TimedOut);
            }

            let received = tokio::select! {
                received = net::recv_from_timeout(&self.socket, &mut self.buffer, remaining) => {
                    received.context("Failed to receive from TFTP client")?
                }
                _ = self.stop.stopped() => bail!("Stop requested while waiting for ACK"),
            };
            let Some((len, source)) = received else {
                return Ok(AckWait::TimedOut);
            };

            if source != self.client {
                tracing::warn!(
                    "Expected packet from {}, instead packet arrived from {}, ignoring",
                    self.client,
                    source
                );
                self.send(
                    &TftpPacket::error(TftpErrorCode::UnknownTransferId, "Invalid source address."),
                    source,
                )
                .await?;
                continue;
            }

            let packet = match TftpPacket::from_bytes(&self.buffer[..len]) {
                Ok(packet) => packet,
                Err(e) => {
                    self.send_error_default(TftpErrorCode::IllegalOperation).await?;
                    bail!("Expected ACK packet, received malformed datagram: {}", e);
                }
            };

            match packet {
                TftpPacket::Ack { block } if block == expected => return Ok(AckWait::Acked),
                TftpPacket::Ack { block } if Some(block) == duplicate => {
                    tracing::debug!("Ignoring duplicate ACK {} from {}", block, self.client);
                }
                TftpPacket::Ack { block } => {
                    self.send_error_default(TftpErrorCode::IllegalOperation).await?;
                    bail!("Expected ACK to block: {}, received : {}", expected, block);
                }
                error @ TftpPacket::Error { .. } => bail!("Connection terminated : {}", error),
                other => {
                    self.send_error_default(TftpErrorCode::IllegalOperation).await?;
                    bail!("Expected ACK packet, received : {}", other);
                }
            }
        }
    }

    async fn send(&self, packet: &TftpPacket, to: SocketAddr) -> Result<()> {
        let bytes = packet.to_bytes()?;
        self.socket
            .send_to(&bytes, to)
            .await
            .with_context(|| format!("Failed to send {} to {}", packet, to))?;
        Ok(())
    }

    async fn send_error(&self, code: TftpErrorCode, message: &str) -> Result<()> {
        self.send(&TftpPacket::error(code, message), self.client).await
    }

    async fn send_error_default(&self, code: TftpErrorCode) -> Result<()> {
        self.send(&TftpPacket::error_default(code), self.client).await
    }
}

#[derive(Debug, PartialEq, Eq)]
enum PathError {
    /// No such file, or not a regular file
    Missing,
    /// Resolves outside the served directory
    Escapes,
}

/// Resolve a requested filename under `root`
fn resolve_path(root: &Path, filename: &str) -> Result<PathBuf, PathError> {
    let relative = filename.trim_start_matches('/');
    let root = root.canonicalize().map_err(|_| PathError::Missing)?;
    let path = root.join(relative).canonicalize().map_err(|_| PathError::Missing)?;

    if !path.starts_with(&root) {
        return Err(PathError::Escapes);
    }
    if !path.is_file() {
        return Err(PathError::Missing);
    }
    Ok(path)
}
