//! DHCP Packet handling
//!
//! This module provides parsing and construction of BOOTP/DHCP packets
//! according to RFC 951, RFC 2131 and RFC 2132.
//!
//! The fixed header is 236 bytes, followed by the option table (magic cookie,
//! options, End). Encoded packets are zero padded to the 300 byte BOOTP minimum.

use std::fmt;
use std::net::Ipv4Addr;

use thiserror::Error;
use wire::{Decode, Encode, Reader, WireError, Writer};

use crate::profile::OfferParams;
use crate::{CORE_REPLY_OPTIONS, FLAGS_BROADCAST, HardwareType, MessageType, OpCode, OptionTable};

/// Size of the fixed BOOTP header, up to and excluding the magic cookie
pub const HEADER_LEN: usize = 236;

/// Minimum size of an encoded BOOTP packet
pub const MIN_PACKET_LEN: usize = 300;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PacketError {
    #[error("{field} of {len} bytes does not fit in {capacity} bytes")]
    Overflow {
        field: &'static str,
        len: usize,
        capacity: usize,
    },

    #[error("hardware address length {0} exceeds 16")]
    BadHardwareLength(u8),

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// A byte field of fixed wire size holding `len` meaningful bytes
///
/// The unused tail is always zero, so the field encodes as the NUL padded
/// buffer BOOTP expects.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct FixedBuffer<const N: usize> {
    bytes: [u8; N],
    len: usize,
}

impl<const N: usize> FixedBuffer<N> {
    pub const CAPACITY: usize = N;

    pub fn new() -> Self {
        Self { bytes: [0; N], len: 0 }
    }

    /// Replace the contents; fails rather than truncate when `data` is too long
    pub fn set(&mut self, field: &'static str, data: &[u8]) -> Result<(), PacketError> {
        if data.len() > N {
            return Err(PacketError::Overflow {
                field,
                len: data.len(),
                capacity: N,
            });
        }
        self.bytes = [0; N];
        self.bytes[..data.len()].copy_from_slice(data);
        self.len = data.len();
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Contents up to the first NUL, as text
    pub fn to_text(&self) -> String {
        let end = self.bytes.iter().position(|&b| b == 0).unwrap_or(N);
        String::from_utf8_lossy(&self.bytes[..end]).into_owned()
    }

    fn from_raw(raw: [u8; N], len: usize) -> Self {
        Self { bytes: raw, len }
    }
}

impl<const N: usize> Default for FixedBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> fmt::Debug for FixedBuffer<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.as_bytes()).finish()
    }
}

/// NUL padded text field: the meaningful length is up to the first NUL
fn text_field<const N: usize>(raw: [u8; N]) -> FixedBuffer<N> {
    let len = raw.iter().position(|&b| b == 0).unwrap_or(N);
    FixedBuffer::from_raw(raw, len)
}

/// DHCP packet structure as defined in RFC 2131
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DhcpPacket {
    pub op: u8,
    pub htype: u8,
    pub hops: u8,
    pub xid: u32,
    pub secs: u16,
    pub flags: u16,
    pub ciaddr: Ipv4Addr, // client IP address from client
    pub yiaddr: Ipv4Addr, // client IP address from server
    pub siaddr: Ipv4Addr, // server IP address
    pub giaddr: Ipv4Addr, // gateway IP address
    chaddr: FixedBuffer<16>,
    sname: FixedBuffer<64>,
    file: FixedBuffer<128>,
    pub options: OptionTable,
}

impl DhcpPacket {
    /// Create an empty BOOTREQUEST for Ethernet
    pub fn new() -> Self {
        Self {
            op: OpCode::BootRequest as u8,
            htype: HardwareType::Ethernet as u8,
            hops: 0,
            xid: 0,
            secs: 0,
            flags: 0,
            ciaddr: Ipv4Addr::UNSPECIFIED,
            yiaddr: Ipv4Addr::UNSPECIFIED,
            siaddr: Ipv4Addr::UNSPECIFIED,
            giaddr: Ipv4Addr::UNSPECIFIED,
            chaddr: FixedBuffer::new(),
            sname: FixedBuffer::new(),
            file: FixedBuffer::new(),
            options: OptionTable::new(),
        }
    }

    /// Parse a DHCP packet from raw bytes
    pub fn from_bytes(data: &[u8]) -> Result<Self, PacketError> {
        let mut reader = Reader::new(data);
        Self::read_from(&mut reader)
    }

    /// Convert the packet to bytes, padded to the BOOTP minimum
    pub fn to_bytes(&self) -> Result<Vec<u8>, PacketError> {
        Ok(wire::to_vec(self)?)
    }

    fn read_from(reader: &mut Reader<'_>) -> Result<Self, PacketError> {
        let op = reader.read()?;
        let htype = reader.read()?;
        let hlen: u8 = reader.read()?;
        let hops = reader.read()?;
        let xid = reader.read()?;
        let secs = reader.read()?;
        let flags = reader.read()?;
        let ciaddr = reader.read()?;
        let yiaddr = reader.read()?;
        let siaddr = reader.read()?;
        let giaddr = reader.read()?;

        if usize::from(hlen) > FixedBuffer::<16>::CAPACITY {
            return Err(PacketError::BadHardwareLength(hlen));
        }
        let chaddr = FixedBuffer::from_raw(reader.read()?, usize::from(hlen));
        let sname = text_field(reader.read()?);
        let file = text_field(reader.read()?);
        let options = reader.read()?;

        Ok(Self {
            op,
            htype,
            hops,
            xid,
            secs,
            flags,
            ciaddr,
            yiaddr,
            siaddr,
            giaddr,
            chaddr,
            sname,
            file,
            options,
        })
    }

    /// Client hardware address, `hlen` bytes long
    pub fn hardware_address(&self) -> &[u8] {
        self.chaddr.as_bytes()
    }

    /// Client hardware address as `aa:bb:cc:dd:ee:ff`
    pub fn mac_string(&self) -> String {
        crate::mac_address_to_string(self.hardware_address())
    }

    pub fn server_host_name(&self) -> String {
        self.sname.to_text()
    }

    pub fn boot_file_name(&self) -> String {
        self.file.to_text()
    }

    /// Get the DHCP message type
    pub fn message_type(&self) -> Option<MessageType> {
        self.options
            .message_type()
            .and_then(|value| MessageType::try_from(value).ok())
    }

    pub fn requested_parameters(&self) -> &[u8] {
        self.options.requested_parameters()
    }

    pub fn with_op(mut self, op: OpCode) -> Self {
        self.op = op as u8;
        self
    }

    pub fn with_htype(mut self, htype: HardwareType) -> Self {
        self.htype = htype as u8;
        self
    }

    pub fn with_hops(mut self, hops: u8) -> Self {
        self.hops = hops;
        self
    }

    pub fn with_xid(mut self, xid: u32) -> Self {
        self.xid = xid;
        self
    }

    pub fn with_secs(mut self, secs: u16) -> Self {
        self.secs = secs;
        self
    }

    pub fn with_flags(mut self, flags: u16) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_client_address(mut self, address: Ipv4Addr) -> Self {
        self.ciaddr = address;
        self
    }

    pub fn with_your_address(mut self, address: Ipv4Addr) -> Self {
        self.yiaddr = address;
        self
    }

    pub fn with_server_address(mut self, address: Ipv4Addr) -> Self {
        self.siaddr = address;
        self
    }

    pub fn with_gateway_address(mut self, address: Ipv4Addr) -> Self {
        self.giaddr = address;
        self
    }

    pub fn with_hardware_address(mut self, address: &[u8]) -> Result<Self, PacketError> {
        self.chaddr.set("hardware address", address)?;
        Ok(self)
    }

    pub fn with_server_host_name(mut self, name: &str) -> Result<Self, PacketError> {
        // The field must keep room for its NUL terminator
        check_text("server host name", name, FixedBuffer::<64>::CAPACITY)?;
        self.sname.set("server host name", name.as_bytes())?;
        Ok(self)
    }

    pub fn with_boot_file_name(mut self, name: &str) -> Result<Self, PacketError> {
        check_text("boot file name", name, FixedBuffer::<128>::CAPACITY)?;
        self.file.set("boot file name", name.as_bytes())?;
        Ok(self)
    }

    pub fn with_message_type(mut self, message_type: MessageType) -> Self {
        self.options.set_message_type(message_type as u8);
        self
    }

    /// Copy each listed option that `from` carries into this packet
    pub fn assign_options(&mut self, from: &OptionTable, codes: &[u8]) {
        for &code in codes {
            self.options.assign(code, from);
        }
    }

    /// Build the Offer or Ack for this request from a client profile
    ///
    /// Returns `None` unless the request is a Discover or a Request.
    pub fn reply_to(&self, profile: &OfferParams) -> Result<Option<DhcpPacket>, PacketError> {
        let reply_type = match self.message_type() {
            Some(MessageType::Discover) => MessageType::Offer,
            Some(MessageType::Request) => MessageType::Ack,
            _ => return Ok(None),
        };

        let mut reply = DhcpPacket::new()
            .with_op(OpCode::BootReply)
            .with_htype(HardwareType::Ethernet)
            .with_hardware_address(self.hardware_address())?
            .with_hops(0)
            .with_flags(FLAGS_BROADCAST)
            .with_secs(self.secs)
            .with_xid(self.xid)
            .with_client_address(profile.client_address)
            .with_your_address(profile.your_address)
            .with_server_address(profile.server_address)
            .with_gateway_address(profile.gateway_address)
            .with_server_host_name(&profile.server_host_name)?
            .with_boot_file_name(&profile.boot_file_name)?;

        reply.assign_options(&profile.options, self.requested_parameters());
        reply.assign_options(&profile.options, &CORE_REPLY_OPTIONS);

        Ok(Some(reply.with_message_type(reply_type)))
    }
}

fn check_text(field: &'static str, text: &str, capacity: usize) -> Result<(), PacketError> {
    if text.len() >= capacity {
        return Err(PacketError::Overflow {
            field,
            len: text.len(),
            capacity: capacity - 1,
        });
    }
    Ok(())
}

impl Default for DhcpPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl Encode for DhcpPacket {
    fn encode(&self, writer: &mut Writer<'_>) -> wire::Result<()> {
        let start = writer.consumed();
        writer.write(&(
            self.op,
            self.htype,
            self.chaddr.len() as u8,
            self.hops,
        ))?;
        writer.write(&(self.xid, self.secs, self.flags))?;
        writer.write(&(self.ciaddr, self.yiaddr, self.siaddr, self.giaddr))?;
        writer.write(&self.chaddr.bytes)?;
        writer.write(&self.sname.bytes)?;
        writer.write(&self.file.bytes)?;
        writer.write(&self.options)?;

        let written = writer.consumed() - start;
        if written < MIN_PACKET_LEN {
            writer.write_zeros(MIN_PACKET_LEN - written)?;
        }
        Ok(())
    }

    fn encoded_len(&self) -> usize {
        (HEADER_LEN + self.options.encoded_len()).max(MIN_PACKET_LEN)
    }
}

impl Decode for DhcpPacket {
    fn decode(reader: &mut Reader<'_>) -> wire::Result<Self> {
        Self::read_from(reader).map_err(|e| match e {
            PacketError::Wire(e) => e,
            _ => WireError::Malformed("hardware address length exceeds 16"),
        })
    }
}

impl fmt::Display for DhcpPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self.op {
            1 => "BOOTREQUEST",
            2 => "BOOTREPLY",
            _ => "UNKNOWN",
        };
        write!(f, "{} xid={:#010x} chaddr={}", op, self.xid, self.mac_string())?;
        match self.message_type() {
            Some(message_type) => write!(f, " type={:?}", message_type),
            None => Ok(()),
        }
    }
}
