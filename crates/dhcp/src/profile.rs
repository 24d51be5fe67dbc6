//! Per-client offer profiles
//!
//! Each configured client is an INI section named after its MAC address. The
//! profile is built once at startup and is read-only afterwards.

use std::net::Ipv4Addr;

use anyhow::{Context, Result};
use common::Ini;
use wire::Encode;

use crate::{DhcpOption, OptionTable};

const DEFAULT_DOMAIN_NAME: &str = "localhost";
const DEFAULT_LEASE_TIME: u32 = 172_800;
const DEFAULT_RENEWAL_TIME: u32 = 86_400;
const DEFAULT_REBINDING_TIME: u32 = 7_200;

/// Everything the server puts into an Offer or Ack for one client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OfferParams {
    pub client_address: Ipv4Addr,
    pub your_address: Ipv4Addr,
    pub server_address: Ipv4Addr,
    pub gateway_address: Ipv4Addr,
    pub server_host_name: String,
    pub boot_file_name: String,
    pub options: OptionTable,
}

impl Default for OfferParams {
    fn default() -> Self {
        Self {
            client_address: Ipv4Addr::UNSPECIFIED,
            your_address: Ipv4Addr::UNSPECIFIED,
            server_address: Ipv4Addr::UNSPECIFIED,
            gateway_address: Ipv4Addr::UNSPECIFIED,
            server_host_name: String::new(),
            boot_file_name: String::new(),
            options: OptionTable::new(),
        }
    }
}

impl OfferParams {
    /// Read the profile for the client section `mac`
    pub fn from_ini(ini: &Ini, mac: &str) -> Result<Self> {
        let section = Some(mac);
        let address = |key: &str, default: Ipv4Addr| ini.value_or(section, key, default);

        let server_address = address("v4_server_address", Ipv4Addr::UNSPECIFIED);
        let server_host_name = ini.value(section, "server_host_name").unwrap_or_default().to_string();
        let boot_file_name = ini.value(section, "boot_file_name").unwrap_or_default().to_string();

        let mut options = OptionTable::new();
        let mut set = |option: DhcpOption, value: &dyn Encode| -> Result<()> {
            options
                .set_value(option.code(), value)
                .with_context(|| format!("Invalid value for option {:?} of client {}", option, mac))
        };

        if let Some(mask) = ini.value_as::<Ipv4Addr>(section, "v4_subnet_mask") {
            set(DhcpOption::SubnetMask, &mask)?;
        }
        set(DhcpOption::Router, &address("v4_router_address", server_address))?;
        set(DhcpOption::LogServer, &address("v4_log_server_address", server_address))?;
        if !server_host_name.is_empty() {
            set(DhcpOption::HostName, &server_host_name.as_bytes())?;
        }
        let domain_name = ini.value(section, "domain_name").unwrap_or(DEFAULT_DOMAIN_NAME);
        set(DhcpOption::DomainName, &domain_name.as_bytes())?;
        set(
            DhcpOption::IpAddressLeaseTime,
            &ini.value_or(section, "address_lease_time", DEFAULT_LEASE_TIME),
        )?;
        set(
            DhcpOption::ServerIdentifier,
            &address("v4_dhcp_server_address", server_address),
        )?;
        set(
            DhcpOption::RenewalTime,
            &ini.value_or(section, "address_renewal_time", DEFAULT_RENEWAL_TIME),
        )?;
        set(
            DhcpOption::RebindingTime,
            &ini.value_or(section, "address_rebinding_time", DEFAULT_REBINDING_TIME),
        )?;
        set(DhcpOption::TftpServerName, &server_address.to_string().as_bytes())?;
        if !boot_file_name.is_empty() {
            set(DhcpOption::BootfileName, &boot_file_name.as_bytes())?;
        }

        Ok(Self {
            client_address: address("v4_client_address", Ipv4Addr::UNSPECIFIED),
            your_address: address("v4_your_address", Ipv4Addr::UNSPECIFIED),
            server_address,
            gateway_address: address("v4_gateway_address", Ipv4Addr::UNSPECIFIED),
            server_host_name,
            boot_file_name,
            options,
        })
    }
}
