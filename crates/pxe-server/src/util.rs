use std::io::{Error, ErrorKind, Result};
use std::net::Ipv4Addr;

use nix::ifaddrs::getifaddrs;

/// First IPv4 address assigned to the interface `name`
pub fn get_interface_ip(name: &str) -> Result<Ipv4Addr> {
    getifaddrs()?
        .filter(|ifa| ifa.interface_name == name)
        .find_map(|ifa| ifa.address.and_then(|addr| addr.as_sockaddr_in().map(|sin| sin.ip())))
        .ok_or_else(|| Error::new(ErrorKind::NotFound, format!("No IPv4 address on interface '{}'", name)))
}
