//! DHCP Server Module
//!
//! Implements a BOOTP/DHCPv4 responder for PXE boot environments. Every client
//! is configured statically by MAC address; a Discover is answered with an
//! Offer and a Request with an Ack, both built from the client's profile.
//! Unknown clients are ignored.

pub mod options;
pub mod packet;
pub mod profile;
pub mod server;

#[cfg(test)]
mod tests;

pub use options::{OptionError, OptionTable};
pub use packet::{DhcpPacket, FixedBuffer, PacketError};
pub use profile::OfferParams;
pub use server::{DhcpServer, DhcpServerConfig};

/// Magic cookie that precedes the option list (RFC 2131)
pub const MAGIC_COOKIE: u32 = 0x6382_5363;

/// Broadcast bit of the BOOTP flags field
pub const FLAGS_BROADCAST: u16 = 0x8000;

/// Default UDP port for the DHCP server
pub const DEFAULT_SERVER_PORT: u16 = 67;

/// DHCP message types as defined in RFC 2132 (option 53)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    Discover = 1,
    Offer = 2,
    Request = 3,
    Decline = 4,
    Ack = 5,
    Nak = 6,
    Release = 7,
    Inform = 8,
}

impl TryFrom<u8> for MessageType {
    type Error = anyhow::Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MessageType::Discover),
            2 => Ok(MessageType::Offer),
            3 => Ok(MessageType::Request),
            4 => Ok(MessageType::Decline),
            5 => Ok(MessageType::Ack),
            6 => Ok(MessageType::Nak),
            7 => Ok(MessageType::Release),
            8 => Ok(MessageType::Inform),
            _ => Err(anyhow::anyhow!("Unknown DHCP message type: {}", value)),
        }
    }
}

/// DHCP option codes as defined in RFC 2132
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DhcpOption {
    Pad = 0,
    SubnetMask = 1,
    Router = 3,
    LogServer = 7,
    HostName = 12,
    DomainName = 15,
    IpAddressLeaseTime = 51,
    MessageType = 53,
    ServerIdentifier = 54,
    ParameterRequestList = 55,
    RenewalTime = 58,
    RebindingTime = 59,

    // PXE-specific options
    TftpServerName = 66,
    BootfileName = 67,

    End = 255,
}

impl DhcpOption {
    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Options copied into every reply when the client profile carries them,
/// whether or not the client asked for them
pub const CORE_REPLY_OPTIONS: [u8; 6] = [
    DhcpOption::ServerIdentifier as u8,
    DhcpOption::IpAddressLeaseTime as u8,
    DhcpOption::RenewalTime as u8,
    DhcpOption::RebindingTime as u8,
    DhcpOption::LogServer as u8,
    DhcpOption::DomainName as u8,
];

/// Hardware address types
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HardwareType {
    Ethernet = 1,
}

/// DHCP packet operation codes
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    BootRequest = 1,
    BootReply = 2,
}

/// Format a hardware address as lowercase colon-separated hex
pub fn mac_address_to_string(mac: &[u8]) -> String {
    mac.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join(":")
}
