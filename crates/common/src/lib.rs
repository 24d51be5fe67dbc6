//! Shared Server Plumbing
//!
//! Building blocks used by both the DHCP and the TFTP server:
//!
//! - [`EventQueue`] - hands received datagrams and session notifications from
//!   producer tasks to a single processing loop
//! - [`StopSource`] / [`StopToken`] - cooperative shutdown signal
//! - [`Ini`] - INI-style configuration with one section per client
//! - [`net`] - UDP socket construction and timed receive

pub mod ini;
pub mod net;
mod queue;
mod stop;

pub use ini::Ini;
pub use queue::{EventQueue, QueueError};
pub use stop::{StopSource, StopToken};
