use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

use common::{Ini, StopSource};
use tokio::net::UdpSocket;
use tokio::time::timeout;

use crate::packet::DhcpPacket;
use crate::server::{DhcpServer, DhcpServerConfig};
use crate::{DhcpOption, FLAGS_BROADCAST, MessageType, OfferParams, OpCode};

const KNOWN_MAC: [u8; 6] = [0x00, 0x11, 0x22, 0x33, 0x44, 0x55];
const UNKNOWN_MAC: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

const CONFIG: &str = r#"
v4_bind_address = 127.0.0.1
dhcp_listen_port = 0
dhcp_reply_address = 127.0.0.1

[00:11:22:33:44:55]
v4_your_address = 10.0.0.50
v4_server_address = 10.0.0.1
v4_gateway_address = 10.0.0.254
v4_subnet_mask = 255.255.255.0
server_host_name = bootsrv
boot_file_name = pxelinux.0
domain_name = lab.local
"#;

fn test_config() -> DhcpServerConfig {
    DhcpServerConfig {
        recv_timeout: Duration::from_millis(50),
        ..DhcpServerConfig::from_ini(&Ini::parse(CONFIG)).unwrap()
    }
}

fn request(mac: &[u8], message_type: MessageType, requested: &[u8]) -> DhcpPacket {
    let mut packet = DhcpPacket::new()
        .with_xid(0xDEADBEEF)
        .with_secs(7)
        .with_hardware_address(mac)
        .unwrap()
        .with_message_type(message_type);
    if !requested.is_empty() {
        packet
            .options
            .set(DhcpOption::ParameterRequestList.code(), requested)
            .unwrap();
    }
    packet
}

#[test]
fn test_config_from_ini() {
    let config = DhcpServerConfig::from_ini(&Ini::parse(CONFIG)).unwrap();

    assert_eq!(config.bind_address, "127.0.0.1:0".parse::<SocketAddr>().unwrap());
    assert_eq!(config.reply_address, Ipv4Addr::LOCALHOST);
    assert_eq!(config.clients.len(), 1);
    assert!(config.clients.contains_key("00:11:22:33:44:55"));
}

#[test]
fn test_config_defaults() {
    let config = DhcpServerConfig::from_ini(&Ini::parse("[AA:BB:CC:DD:EE:FF]\n")).unwrap();

    assert_eq!(config.bind_address, "0.0.0.0:67".parse::<SocketAddr>().unwrap());
    assert_eq!(config.reply_address, Ipv4Addr::BROADCAST);
    // Section names are matched case-insensitively
    assert!(config.clients.contains_key("aa:bb:cc:dd:ee:ff"));
}

#[test]
fn test_dhcp_offer_response() {
    let server = DhcpServer::new(test_config());
    let discover = request(&KNOWN_MAC, MessageType::Discover, &[1, 3, 67]);

    let offer = server.respond(&discover).unwrap().unwrap();

    assert_eq!(offer.op, OpCode::BootReply as u8);
    assert_eq!(offer.htype, 1);
    assert_eq!(offer.hops, 0);
    assert_eq!(offer.flags, FLAGS_BROADCAST);
    assert_eq!(offer.xid, 0xDEADBEEF);
    assert_eq!(offer.secs, 7);
    assert_eq!(offer.hardware_address(), &KNOWN_MAC);
    assert_eq!(offer.ciaddr, Ipv4Addr::UNSPECIFIED);
    assert_eq!(offer.yiaddr, Ipv4Addr::new(10, 0, 0, 50));
    assert_eq!(offer.siaddr, Ipv4Addr::new(10, 0, 0, 1));
    assert_eq!(offer.giaddr, Ipv4Addr::new(10, 0, 0, 254));
    assert_eq!(offer.server_host_name(), "bootsrv");
    assert_eq!(offer.boot_file_name(), "pxelinux.0");
    assert_eq!(offer.message_type(), Some(MessageType::Offer));
}

#[test]
fn test_offer_options_projection() {
    let server = DhcpServer::new(test_config());
    let discover = request(&KNOWN_MAC, MessageType::Discover, &[1, 3, 67, 120]);

    let offer = server.respond(&discover).unwrap().unwrap();

    // Requested ones that the profile has, plus the core set, plus message type
    assert_eq!(
        offer.options.codes().collect::<Vec<_>>(),
        vec![1, 3, 7, 15, 51, 53, 54, 58, 59, 67]
    );
    assert_eq!(offer.options.get(15), b"lab.local");
    assert_eq!(offer.options.get(67), b"pxelinux.0");
    // Not requested and not core
    assert!(!offer.options.contains(12));
    assert!(!offer.options.contains(66));
}

#[test]
fn test_offer_without_parameter_request_list() {
    let server = DhcpServer::new(test_config());
    let offer = server
        .respond(&request(&KNOWN_MAC, MessageType::Discover, &[]))
        .unwrap()
        .unwrap();

    assert_eq!(
        offer.options.codes().collect::<Vec<_>>(),
        vec![7, 15, 51, 53, 54, 58, 59]
    );
}

#[test]
fn test_dhcp_ack_response() {
    let server = DhcpServer::new(test_config());
    let ack = server
        .respond(&request(&KNOWN_MAC, MessageType::Request, &[1]))
        .unwrap()
        .unwrap();

    assert_eq!(ack.message_type(), Some(MessageType::Ack));
    assert_eq!(ack.yiaddr, Ipv4Addr::new(10, 0, 0, 50));
}

#[test]
fn test_unknown_client_is_rejected() {
    let server = DhcpServer::new(test_config());
    let result = server.respond(&request(&UNKNOWN_MAC, MessageType::Discover, &[]));

    let message = format!("{}", result.unwrap_err());
    assert!(message.contains("aa:bb:cc:dd:ee:ff"));
}

#[test]
fn test_ignored_requests() {
    let server = DhcpServer::new(test_config());

    let release = request(&KNOWN_MAC, MessageType::Release, &[]);
    assert!(server.respond(&release).unwrap().is_none());

    let reply = request(&KNOWN_MAC, MessageType::Discover, &[]).with_op(OpCode::BootReply);
    assert!(server.respond(&reply).unwrap().is_none());

    let mut bootp = request(&KNOWN_MAC, MessageType::Discover, &[]);
    bootp.options.remove(DhcpOption::MessageType.code());
    assert!(server.respond(&bootp).unwrap().is_none());
}

#[test]
fn test_profile_is_not_mutated_by_replies() {
    let mut clients = HashMap::new();
    let mut profile = OfferParams::default();
    profile.options.set(1, &[255, 0, 0, 0]).unwrap();
    clients.insert("00:11:22:33:44:55".to_string(), profile.clone());
    let server = DhcpServer::new(DhcpServerConfig {
        clients,
        ..DhcpServerConfig::default()
    });

    let mut offer = server
        .respond(&request(&KNOWN_MAC, MessageType::Discover, &[1]))
        .unwrap()
        .unwrap();
    offer.options.set(1, &[0, 0, 0, 0]).unwrap();

    let again = server
        .respond(&request(&KNOWN_MAC, MessageType::Discover, &[1]))
        .unwrap()
        .unwrap();
    assert_eq!(again.options.get(1), profile.options.get(1));
}

#[tokio::test]
async fn test_run_requires_bind() {
    let server = DhcpServer::new(test_config());
    let source = StopSource::new();
    assert!(server.run(source.token()).await.is_err());
}

#[tokio::test]
async fn test_dhcp_server_round_trip() {
    let mut server = DhcpServer::new(test_config());
    let server_addr = server.bind().unwrap();
    let source = StopSource::new();
    let handle = {
        let stop = source.token();
        tokio::spawn(async move { server.run(stop).await })
    };

    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let mut buffer = [0u8; 1500];

    // Unknown clients get nothing back
    let discover = request(&UNKNOWN_MAC, MessageType::Discover, &[]);
    client.send_to(&discover.to_bytes().unwrap(), server_addr).await.unwrap();
    assert!(
        timeout(Duration::from_millis(200), client.recv_from(&mut buffer))
            .await
            .is_err()
    );

    let discover = request(&KNOWN_MAC, MessageType::Discover, &[1]);
    client.send_to(&discover.to_bytes().unwrap(), server_addr).await.unwrap();
    let (len, _) = timeout(Duration::from_secs(2), client.recv_from(&mut buffer))
        .await
        .unwrap()
        .unwrap();

    assert_eq!(len, 300);
    let offer = DhcpPacket::from_bytes(&buffer[..len]).unwrap();
    assert_eq!(offer.message_type(), Some(MessageType::Offer));
    assert_eq!(offer.xid, 0xDEADBEEF);
    assert_eq!(offer.yiaddr, Ipv4Addr::new(10, 0, 0, 50));

    source.request_stop();
    timeout(Duration::from_secs(2), handle)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
