//! TFTP Protocol Implementation
//!
//! This module contains the TFTP packet codec and protocol constants.
//!
//! # TFTP Protocol Overview
//!
//! TFTP (Trivial File Transfer Protocol) is defined in RFC 1350 with option
//! extensions in RFC 2347, RFC 2348 and RFC 2349. Every packet starts with a
//! 2-byte opcode:
//!
//! - Read Request (RRQ) - Request to read a file from the server
//! - Write Request (WRQ) - Request to write a file to the server
//! - Data packets - Transfer file content in blocks
//! - Acknowledgment (ACK) - Confirm receipt of data blocks
//! - Error packets - Report errors during transfer
//! - Option acknowledgment (OACK) - Negotiate transfer options
//!
//! [`TftpPacket`] is a closed sum over those six kinds. Every datagram either
//! decodes to exactly one variant or fails with a [`ProtocolError`].

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use thiserror::Error;
use wire::{Asciiz, Decode, Encode, Reader, WireError, Writer};

/// TFTP Protocol Opcodes
///
/// These opcodes identify the type of TFTP packet being sent or received.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TftpOpcode {
    /// Read Request (RRQ) - Opcode 1
    ///
    /// Packet format: | Opcode | Filename | 0 | Mode | 0 | \[Option | 0 | Value | 0\]* |
    ReadRequest = 1,

    /// Write Request (WRQ) - Opcode 2
    ///
    /// Same layout as RRQ. This server rejects every write request.
    WriteRequest = 2,

    /// Data Packet (DATA) - Opcode 3
    ///
    /// A 2-byte block number followed by up to the negotiated block size of
    /// file content. A payload shorter than the block size ends the transfer.
    ///
    /// Packet format: | Opcode | Block# | Data |
    Data = 3,

    /// Acknowledgment (ACK) - Opcode 4
    ///
    /// ACK with block number 0 acknowledges an OACK packet.
    ///
    /// Packet format: | Opcode | Block# |
    Acknowledgment = 4,

    /// Error Packet (ERROR) - Opcode 5
    ///
    /// Packet format: | Opcode | ErrorCode | ErrMsg | 0 |
    Error = 5,

    /// Option Acknowledgment (OACK) - Opcode 6
    ///
    /// Packet format: | Opcode | Opt1 | 0 | Value1 | 0 | ... |
    OptionAck = 6,
}

impl TftpOpcode {
    /// Convert a u16 value to a TftpOpcode
    ///
    /// # Examples
    /// ```
    /// use tftp::TftpOpcode;
    ///
    /// assert_eq!(TftpOpcode::from_u16(1), Some(TftpOpcode::ReadRequest));
    /// assert_eq!(TftpOpcode::from_u16(99), None);
    /// ```
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            1 => Some(Self::ReadRequest),
            2 => Some(Self::WriteRequest),
            3 => Some(Self::Data),
            4 => Some(Self::Acknowledgment),
            5 => Some(Self::Error),
            6 => Some(Self::OptionAck),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the human-readable name of the opcode
    ///
    /// # Examples
    /// ```
    /// use tftp::TftpOpcode;
    ///
    /// assert_eq!(TftpOpcode::ReadRequest.name(), "RRQ");
    /// assert_eq!(TftpOpcode::Data.name(), "DATA");
    /// ```
    pub fn name(self) -> &'static str {
        match self {
            Self::ReadRequest => "RRQ",
            Self::WriteRequest => "WRQ",
            Self::Data => "DATA",
            Self::Acknowledgment => "ACK",
            Self::Error => "ERROR",
            Self::OptionAck => "OACK",
        }
    }
}

impl From<TftpOpcode> for u16 {
    fn from(opcode: TftpOpcode) -> Self {
        opcode.as_u16()
    }
}

impl fmt::Display for TftpOpcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// TFTP Error Codes as defined in RFC 1350
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TftpErrorCode {
    /// Error code 0: Not defined, see the error message
    Undefined = 0,

    /// Error code 1: File not found
    FileNotFound = 1,

    /// Error code 2: Access violation
    ///
    /// Also used for uploads and for paths outside the served directory.
    AccessViolation = 2,

    /// Error code 3: Disk full or allocation exceeded
    DiskFull = 3,

    /// Error code 4: Illegal TFTP operation
    IllegalOperation = 4,

    /// Error code 5: Unknown transfer ID
    ///
    /// Packet received from an unexpected address or port.
    UnknownTransferId = 5,

    /// Error code 6: File already exists
    FileAlreadyExists = 6,

    /// Error code 7: No such user
    NoSuchUser = 7,
}

impl TftpErrorCode {
    /// Convert a u16 value to a TftpErrorCode
    ///
    /// # Examples
    /// ```
    /// use tftp::TftpErrorCode;
    ///
    /// assert_eq!(TftpErrorCode::from_u16(1), Some(TftpErrorCode::FileNotFound));
    /// assert_eq!(TftpErrorCode::from_u16(8), None);
    /// ```
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Self::Undefined),
            1 => Some(Self::FileNotFound),
            2 => Some(Self::AccessViolation),
            3 => Some(Self::DiskFull),
            4 => Some(Self::IllegalOperation),
            5 => Some(Self::UnknownTransferId),
            6 => Some(Self::FileAlreadyExists),
            7 => Some(Self::NoSuchUser),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }

    /// Get the standard text for this error code
    pub fn default_message(self) -> &'static str {
        match self {
            Self::Undefined => "Not defined",
            Self::FileNotFound => "File not found",
            Self::AccessViolation => "Access violation",
            Self::DiskFull => "Disk full or allocation exceeded.",
            Self::IllegalOperation => "Illegal TFTP operation.",
            Self::UnknownTransferId => "Unknown transfer ID.",
            Self::FileAlreadyExists => "File already exists.",
            Self::NoSuchUser => "No such user.",
        }
    }
}

impl From<TftpErrorCode> for u16 {
    fn from(error_code: TftpErrorCode) -> Self {
        error_code.as_u16()
    }
}

impl fmt::Display for TftpErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.default_message(), self.as_u16())
    }
}

/// Human-readable text for a raw error code, including codes outside RFC 1350
///
/// # Examples
/// ```
/// use tftp::error_code_to_string;
///
/// assert_eq!(error_code_to_string(1), "File not found");
/// assert_eq!(error_code_to_string(42), "Unknown error code (42)");
/// ```
pub fn error_code_to_string(code: u16) -> String {
    match TftpErrorCode::from_u16(code) {
        Some(known) => known.default_message().to_string(),
        None => format!("Unknown error code ({})", code),
    }
}

/// TFTP Transfer Modes
///
/// Files are always served byte for byte; netascii is accepted for
/// compatibility with older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferMode {
    /// Binary mode, mode string "octet"
    Octet,

    /// Text mode, mode string "netascii"
    NetAscii,
}

impl TransferMode {
    /// Parse a transfer mode from a string
    ///
    /// Only the exact lowercase mode names are accepted.
    ///
    /// # Examples
    /// ```
    /// use tftp::TransferMode;
    ///
    /// assert_eq!("octet".parse::<TransferMode>(), Ok(TransferMode::Octet));
    /// assert_eq!("netascii".parse::<TransferMode>(), Ok(TransferMode::NetAscii));
    /// assert!("NETASCII".parse::<TransferMode>().is_err());
    /// assert!("mail".parse::<TransferMode>().is_err());
    /// ```
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "octet" => Some(Self::Octet),
            "netascii" => Some(Self::NetAscii),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Octet => "octet",
            Self::NetAscii => "netascii",
        }
    }
}

impl FromStr for TransferMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_str_opt(s).ok_or_else(|| format!("Unsupported transfer mode: {}", s))
    }
}

impl fmt::Display for TransferMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Option name to value, as carried by RRQ, WRQ and OACK
pub type TftpOptions = BTreeMap<String, String>;

/// TFTP Request (RRQ/WRQ) body
///
/// The mode is kept as sent so that an unsupported mode can still be decoded
/// and answered with an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TftpRequest {
    pub filename: String,
    pub mode: String,
    pub options: TftpOptions,
}

impl TftpRequest {
    pub fn new(filename: impl Into<String>, mode: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            mode: mode.into(),
            options: TftpOptions::new(),
        }
    }

    /// Add an option to the request
    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    /// The transfer mode, if it is one this server understands
    pub fn transfer_mode(&self) -> Option<TransferMode> {
        TransferMode::from_str_opt(&self.mode)
    }

    fn decode(reader: &mut Reader<'_>) -> wire::Result<Self> {
        let filename = reader.read_asciiz()?;
        let mode = reader.read_asciiz()?;
        let options = decode_options(reader)?;
        Ok(Self { filename, mode, options })
    }

    fn encode(&self, writer: &mut Writer<'_>) -> wire::Result<()> {
        writer.write_asciiz(&self.filename)?;
        writer.write_asciiz(&self.mode)?;
        encode_options(&self.options, writer)
    }

    fn encoded_len(&self) -> usize {
        self.filename.len() + 1 + self.mode.len() + 1 + options_len(&self.options)
    }
}

/// Errors raised while parsing or building TFTP packets
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("unknown TFTP opcode {0}")]
    UnknownOpcode(u16),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// One TFTP packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TftpPacket {
    ReadRequest(TftpRequest),
    WriteRequest(TftpRequest),
    Data { block: u16, payload: Vec<u8> },
    Ack { block: u16 },
    Error { code: u16, message: String },
    OptionAck { options: TftpOptions },
}

impl TftpPacket {
    pub fn data(block: u16, payload: impl Into<Vec<u8>>) -> Self {
        Self::Data {
            block,
            payload: payload.into(),
        }
    }

    pub fn ack(block: u16) -> Self {
        Self::Ack { block }
    }

    /// ERROR packet with an explicit message
    pub fn error(code: TftpErrorCode, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.as_u16(),
            message: message.into(),
        }
    }

    /// ERROR packet carrying the standard text of `code`
    pub fn error_default(code: TftpErrorCode) -> Self {
        Self::error(code, code.default_message())
    }

    pub fn option_ack(options: TftpOptions) -> Self {
        Self::OptionAck { options }
    }

    pub fn opcode(&self) -> TftpOpcode {
        match self {
            Self::ReadRequest(_) => TftpOpcode::ReadRequest,
            Self::WriteRequest(_) => TftpOpcode::WriteRequest,
            Self::Data { .. } => TftpOpcode::Data,
            Self::Ack { .. } => TftpOpcode::Acknowledgment,
            Self::Error { .. } => TftpOpcode::Error,
            Self::OptionAck { .. } => TftpOpcode::OptionAck,
        }
    }

    /// Parse a datagram
    ///
    /// # Examples
    /// ```
    /// use tftp::{ProtocolError, TftpPacket};
    ///
    /// let packet = TftpPacket::from_bytes(&[0, 4, 0, 7]).unwrap();
    /// assert_eq!(packet, TftpPacket::ack(7));
    ///
    /// assert_eq!(TftpPacket::from_bytes(&[0, 9]), Err(ProtocolError::UnknownOpcode(9)));
    /// ```
    pub fn from_bytes(data: &[u8]) -> Result<Self, ProtocolError> {
        let mut reader = Reader::new(data);
        let raw: u16 = reader.read()?;
        let opcode = TftpOpcode::from_u16(raw).ok_or(ProtocolError::UnknownOpcode(raw))?;
        Ok(Self::decode_body(opcode, &mut reader)?)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, ProtocolError> {
        Ok(wire::to_vec(self)?)
    }

    fn decode_body(opcode: TftpOpcode, reader: &mut Reader<'_>) -> wire::Result<Self> {
        let packet = match opcode {
            TftpOpcode::ReadRequest => Self::ReadRequest(TftpRequest::decode(reader)?),
            TftpOpcode::WriteRequest => Self::WriteRequest(TftpRequest::decode(reader)?),
            TftpOpcode::Data => Self::Data {
                block: reader.read()?,
                payload: reader.read_rest().to_vec(),
            },
            TftpOpcode::Acknowledgment => Self::Ack { block: reader.read()? },
            TftpOpcode::Error => Self::Error {
                code: reader.read()?,
                message: reader.read_asciiz()?,
            },
            TftpOpcode::OptionAck => Self::OptionAck {
                options: decode_options(reader)?,
            },
        };
        Ok(packet)
    }
}

impl Encode for TftpPacket {
    fn encode(&self, writer: &mut Writer<'_>) -> wire::Result<()> {
        writer.write(&self.opcode().as_u16())?;
        match self {
            Self::ReadRequest(request) | Self::WriteRequest(request) => request.encode(writer),
            Self::Data { block, payload } => {
                writer.write(block)?;
                writer.write_bytes(payload)
            }
            Self::Ack { block } => writer.write(block),
            Self::Error { code, message } => {
                writer.write(code)?;
                writer.write(&Asciiz(message))
            }
            Self::OptionAck { options } => encode_options(options, writer),
        }
    }

    fn encoded_len(&self) -> usize {
        2 + match self {
            Self::ReadRequest(request) | Self::WriteRequest(request) => request.encoded_len(),
            Self::Data { payload, .. } => 2 + payload.len(),
            Self::Ack { .. } => 2,
            Self::Error { message, .. } => 2 + message.len() + 1,
            Self::OptionAck { options } => options_len(options),
        }
    }
}

impl Decode for TftpPacket {
    fn decode(reader: &mut Reader<'_>) -> wire::Result<Self> {
        let raw: u16 = reader.read()?;
        let opcode = TftpOpcode::from_u16(raw).ok_or(WireError::Malformed("unknown TFTP opcode"))?;
        Self::decode_body(opcode, reader)
    }
}

impl fmt::Display for TftpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadRequest(request) | Self::WriteRequest(request) => {
                write!(
                    f,
                    "{}(file=\"{}\", mode=\"{}\"",
                    self.opcode(),
                    request.filename,
                    request.mode
                )?;
                for (name, value) in &request.options {
                    write!(f, ", {}={}", name, value)?;
                }
                write!(f, ")")
            }
            Self::Data { block, payload } => write!(f, "DATA(block={}, {} bytes)", block, payload.len()),
            Self::Ack { block } => write!(f, "ACK(block={})", block),
            Self::Error { code, message } => write!(f, "ERROR(code={}, \"{}\")", code, message),
            Self::OptionAck { options } => {
                let pairs: Vec<String> = options.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
                write!(f, "OACK({})", pairs.join(", "))
            }
        }
    }
}

/// Read `name, value` string pairs until the input is exhausted
fn decode_options(reader: &mut Reader<'_>) -> wire::Result<TftpOptions> {
    let mut options = TftpOptions::new();
    while !reader.is_empty() {
        let name = reader.read_asciiz()?;
        let value = reader.read_asciiz()?;
        options.insert(name, value);
    }
    Ok(options)
}

fn encode_options(options: &TftpOptions, writer: &mut Writer<'_>) -> wire::Result<()> {
    for (name, value) in options {
        writer.write_asciiz(name)?;
        writer.write_asciiz(value)?;
    }
    Ok(())
}

fn options_len(options: &TftpOptions) -> usize {
    options.iter().map(|(name, value)| name.len() + value.len() + 2).sum()
}
