//! PXE Server - Main executable
//!
//! A lightweight PXE (Preboot Execution Environment) server providing DHCP and TFTP services.

use std::path::PathBuf;

use anyhow::{Context, Result};
use argh::FromArgs;
use common::StopSource;
use pxe_server::{ServiceConfig, ServiceManager, load_config};

const DEFAULT_CONFIG: &str = "config.ini";

#[derive(FromArgs, Debug)]
#[argh(
    description = "PXE Server - DHCP and TFTP server for network booting",
    example = "Start with the default configuration file:\n  {command_name}",
    example = "Bind to the address of eth0:\n  {command_name} --config /etc/pxe/config.ini --interface eth0",
    example = "Non-root testing on high ports:\n  {command_name} -O dhcp_listen_port=6767 -O tftp_listen_port=6969"
)]
struct CliConfig {
    #[argh(
        option,
        short = 'c',
        description = "configuration file",
        default = "PathBuf::from(DEFAULT_CONFIG)"
    )]
    config: PathBuf,

    #[argh(
        option,
        short = 'O',
        long = "override",
        description = "override a global setting as key=value, may be repeated"
    )]
    overrides: Vec<String>,

    #[argh(option, short = 'i', description = "network interface whose IPv4 address to bind to")]
    interface: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli: CliConfig = argh::from_env();
    let ini = load_config(&cli.config, &cli.overrides, cli.interface.as_deref())?;
    let config = ServiceConfig::from_ini(&ini)?;

    let mut manager = ServiceManager::new(config);
    manager.bind()?;

    let stop = StopSource::new();
    let run = manager.run(&stop);
    tokio::pin!(run);

    tokio::select! {
        result = &mut run => return result,
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            tracing::info!("Ctrl-C received, shutting down");
            stop.request_stop();
        }
    }

    run.await
}
