//! PXE Server Library
//!
//! A lightweight PXE (Preboot Execution Environment) server providing DHCP and TFTP services.
//!
//! Both services are configured from one INI file: global keys describe the
//! listening sockets and the TFTP root, and every `[aa:bb:cc:dd:ee:ff]` section
//! is the boot profile of one client.
//!
//! # Features
//!
//! - **DHCP Server**: static per-MAC offers
//!   - Discover answered with Offer, Request with Ack
//!   - Options projected from the client's parameter request list
//!   - Unknown clients ignored
//!
//! - **TFTP Server**: read-only, RFC 1350 with extensions
//!   - Block size, timeout and transfer size negotiation (RFC 2347-2349)
//!   - One session per transfer with retransmission
//!   - Path traversal protection
//!

pub mod util;

use std::net::SocketAddr;
use std::path::Path;

use anyhow::{Context, Result, anyhow, bail};
use common::{Ini, StopSource, StopToken};
use dhcp::{DhcpServer, DhcpServerConfig};
use tftp::{TftpServer, TftpServerConfig};
use tokio::task::{JoinHandle, JoinSet};

// Re-export the crates for easier access
pub use {common, dhcp, tftp};

/// Load the configuration file and apply command-line overrides
///
/// Every override is a global `key=value` line. When `interface` is given its
/// IPv4 address replaces `v4_bind_address`.
pub fn load_config(path: impl AsRef<Path>, overrides: &[String], interface: Option<&str>) -> Result<Ini> {
    let path = path.as_ref();
    let mut ini = Ini::load(path).with_context(|| format!("Failed to load configuration {}", path.display()))?;

    for line in overrides {
        if !ini.insert_line(line, "") {
            bail!("Invalid override '{}', expected key=value", line);
        }
    }

    if let Some(name) = interface {
        let ip = util::get_interface_ip(name).with_context(|| {
            format!(
                "Network interface '{}' not found. Please specify a valid network interface with --interface.",
                name
            )
        })?;
        tracing::info!("Binding to {} from interface {}", ip, name);
        ini.insert_line(&format!("v4_bind_address = {}", ip), "");
    }

    Ok(ini)
}

/// Complete service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub dhcp: DhcpServerConfig,
    pub tftp: TftpServerConfig,
}

impl ServiceConfig {
    pub fn from_ini(ini: &Ini) -> Result<Self> {
        let dhcp = DhcpServerConfig::from_ini(ini).context("Invalid DHCP configuration")?;
        let tftp = TftpServerConfig::from_ini(ini).context("Invalid TFTP configuration")?;

        if dhcp.clients.is_empty() {
            tracing::warn!("No client sections configured, every DHCP request will be ignored");
        }

        Ok(Self { dhcp, tftp })
    }
}

/// Trait for services that can be run
trait Service: Send {
    fn name(&self) -> &'static str;
    fn bind(&mut self) -> Result<SocketAddr>;
    fn spawn(self: Box<Self>, stop: StopToken) -> JoinHandle<Result<()>>;
}

impl Service for DhcpServer {
    fn name(&self) -> &'static str {
        "DHCP"
    }

    fn bind(&mut self) -> Result<SocketAddr> {
        DhcpServer::bind(self)
    }

    fn spawn(self: Box<Self>, stop: StopToken) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { DhcpServer::run(&self, stop).await })
    }
}

impl Service for TftpServer {
    fn name(&self) -> &'static str {
        "TFTP"
    }

    fn bind(&mut self) -> Result<SocketAddr> {
        TftpServer::bind(self)
    }

    fn spawn(mut self: Box<Self>, stop: StopToken) -> JoinHandle<Result<()>> {
        tokio::spawn(async move { TftpServer::run(&mut self, stop).await })
    }
}

/// Service manager for handling both PXE services
pub struct ServiceManager {
    services: Vec<Box<dyn Service>>,
    bound: Vec<(&'static str, SocketAddr)>,
}

impl ServiceManager {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            services: vec![
                Box::new(DhcpServer::new(config.dhcp)),
                Box::new(TftpServer::new(config.tftp)),
            ],
            bound: Vec::new(),
        }
    }

    /// Bind every service socket; any failure aborts startup
    pub fn bind(&mut self) -> Result<()> {
        self.bound.clear();
        for service in &mut self.services {
            let addr = service
                .bind()
                .with_context(|| format!("Failed to start {} service", service.name()))?;
            self.bound.push((service.name(), addr));
        }
        Ok(())
    }

    /// Local address of each bound service
    pub fn bound_addresses(&self) -> &[(&'static str, SocketAddr)] {
        &self.bound
    }

    /// Address the named service is bound to
    pub fn local_addr(&self, name: &str) -> Option<SocketAddr> {
        self.bound
            .iter()
            .find(|(service, _)| *service == name)
            .map(|(_, addr)| *addr)
    }

    /// Run all services until `stop` fires or one of them exits
    ///
    /// When one service finishes on its own, the others are asked to stop.
    /// Every service is joined before this returns.
    pub async fn run(self, stop: &StopSource) -> Result<()> {
        if self.bound.len() != self.services.len() {
            return Err(anyhow!("Services must be bound before they run"));
        }

        let descriptions: Vec<String> = self
            .bound
            .iter()
            .map(|(name, addr)| format!("{} on {}", name, addr))
            .collect();
        tracing::info!("PXE server started - {}", descriptions.join(", "));

        let mut running = JoinSet::new();
        for service in self.services {
            let name = service.name();
            let handle = service.spawn(stop.token());
            running.spawn(async move { (name, handle.await) });
        }

        let mut outcome = Ok(());
        while let Some(joined) = running.join_next().await {
            let (name, result) = joined.context("Service supervisor task failed")?;
            if !stop.is_stopped() {
                tracing::warn!("{} service exited, stopping remaining services", name);
                stop.request_stop();
            }
            if let Err(e) = handle_service_result(name, result) {
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }

        outcome
    }
}

fn handle_service_result(name: &str, result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    match result {
        Ok(Ok(())) => {
            tracing::info!("{} service completed successfully", name);
            Ok(())
        }
        Ok(Err(e)) => {
            tracing::error!("{} service failed: {:#}", name, e);
            Err(e)
        }
        Err(e) => {
            tracing::error!("{} task panicked: {}", name, e);
            Err(anyhow!("{} task panicked: {}", name, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::net::{IpAddr, Ipv4Addr};
    use std::time::Duration;

    use tempfile::{TempDir, tempdir};

    use super::*;

    fn write_config(dir: &TempDir, extra: &str) -> std::path::PathBuf {
        let path = dir.path().join("config.ini");
        let text = format!(
            "v4_bind_address = 127.0.0.1\n\
             dhcp_listen_port = 0\n\
             tftp_listen_port = 0\n\
             tftp_base_dir = {}\n\
             {}\n\
             [00:11:22:33:44:55]\n\
             v4_your_address = 127.0.0.10\n\
             v4_server_address = 127.0.0.1\n\
             boot_file_name = pxelinux.0\n",
            dir.path().display(),
            extra
        );
        std::fs::write(&path, text).unwrap();
        path
    }

    #[test]
    fn test_load_config_applies_overrides() {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, "tftp_timeout = 3");

        let ini = load_config(&path, &["tftp_timeout=7".to_string(), "tftp_max_retries = 4".to_string()], None)
            .unwrap();
        assert_eq!(ini.value(None, "tftp_timeout"), Some("7"));
        assert_eq!(ini.value(None, "tftp_max_retries"), Some("4"));
        assert_eq!(ini.value(Some("00:11:22:33:44:55"), "boot_file_name"), Some("pxelinux.0"));
    }

    #[test]
    fn test_load_config_rejects_bad_override() {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, "");

        let err = load_config(&path, &["no-equals-sign".to_string()], None).unwrap_err();
        assert!(err.to_string().contains("no-equals-sign"));
    }

    #[test]
    fn test_load_config_missing_or_empty_file() {
        let dir = tempdir().unwrap();
        assert!(load_config(dir.path().join("missing.ini"), &[], None).is_err());

        let empty = dir.path().join("empty.ini");
        std::fs::write(&empty, "").unwrap();
        assert!(load_config(&empty, &[], None).is_err());

        assert!(load_config(dir.path(), &[], None).is_err());
    }

    #[test]
    fn test_load_config_interface_sets_bind_address() {
        #[cfg(target_os = "macos")]
        let name = "lo0";
        #[cfg(not(target_os = "macos"))]
        let name = "lo";

        let dir = tempdir().unwrap();
        let path = write_config(&dir, "");
        let ini = load_config(&path, &["v4_bind_address=10.0.0.1".to_string()], Some(name)).unwrap();
        assert_eq!(ini.value(None, "v4_bind_address"), Some("127.0.0.1"));

        assert!(load_config(&path, &[], Some("no-such-if0")).is_err());
    }

    #[test]
    fn test_service_config_from_ini() {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, "dhcp_reply_address = 127.0.0.1");
        let config = ServiceConfig::from_ini(&load_config(&path, &[], None).unwrap()).unwrap();

        let loopback = IpAddr::V4(Ipv4Addr::LOCALHOST);
        assert_eq!(config.dhcp.bind_address, SocketAddr::new(loopback, 0));
        assert_eq!(config.dhcp.reply_address, Ipv4Addr::LOCALHOST);
        assert!(config.dhcp.clients.contains_key("00:11:22:33:44:55"));
        assert_eq!(config.tftp.bind_address, SocketAddr::new(loopback, 0));
        assert_eq!(config.tftp.session.root_dir, dir.path());
    }

    #[test]
    fn test_service_config_bad_root() {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, "");
        let ini = load_config(&path, &["tftp_base_dir=/definitely/not/here".to_string()], None).unwrap();
        assert!(ServiceConfig::from_ini(&ini).is_err());
    }

    #[tokio::test]
    async fn test_run_requires_bind() {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, "");
        let config = ServiceConfig::from_ini(&load_config(&path, &[], None).unwrap()).unwrap();

        let manager = ServiceManager::new(config);
        let stop = StopSource::new();
        assert!(manager.run(&stop).await.is_err());
    }

    #[tokio::test]
    async fn test_run_until_stopped() {
        let dir = tempdir().unwrap();
        let path = write_config(&dir, "");
        let config = ServiceConfig::from_ini(&load_config(&path, &[], None).unwrap()).unwrap();

        let mut manager = ServiceManager::new(config);
        manager.bind().unwrap();
        assert_eq!(manager.bound_addresses().len(), 2);
        assert!(manager.local_addr("DHCP").is_some());
        assert_ne!(manager.local_addr("TFTP").unwrap().port(), 0);

        let stop = StopSource::new();
        let (result, ()) = tokio::join!(manager.run(&stop), async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            stop.request_stop();
        });
        result.unwrap();
    }
}
