//! TFTP (Trivial File Transfer Protocol) Implementation
//!
//! A read-only TFTP server for network boot:
//! - Read requests (RRQ) in octet and netascii mode, served byte for byte
//! - Option negotiation for `blksize`, `timeout` and `tsize` (RFC 2347-2349)
//! - One session per request, each on its own ephemeral port
//! - Retransmission with a bounded retry budget
//! - Path traversal protection
//!
//! Write requests are refused.
//!
//! # Working with Protocol Types
//!
//! ```rust
//! use tftp::{TftpOpcode, TftpPacket, TftpRequest, TransferMode};
//!
//! let request = TftpRequest::new("boot.img", "octet").with_option("blksize", "1400");
//! assert_eq!(request.transfer_mode(), Some(TransferMode::Octet));
//!
//! let packet = TftpPacket::ReadRequest(request);
//! assert_eq!(packet.opcode(), TftpOpcode::ReadRequest);
//!
//! let bytes = packet.to_bytes().unwrap();
//! assert_eq!(TftpPacket::from_bytes(&bytes).unwrap(), packet);
//! ```

pub mod options;
pub mod protocol;
pub mod reader;
pub mod server;
pub mod session;

pub use options::TransferOptions;
pub use protocol::{
    ProtocolError, TftpErrorCode, TftpOpcode, TftpOptions, TftpPacket, TftpRequest, TransferMode,
    error_code_to_string,
};
pub use reader::FileReader;
pub use server::{ServerEvent, TftpServer, TftpServerConfig};
pub use session::{MAX_RETRIES, Session, SessionConfig, SessionHandle};
