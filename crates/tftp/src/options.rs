//! Transfer option negotiation (RFC 2347, RFC 2348, RFC 2349)
//!
//! Supported options:
//! - `blksize`: payload bytes per DATA packet, 8 to 65464
//! - `timeout`: seconds to wait for each ACK, 1 to 255
//! - `tsize`: answered with the real file size, the client's value is ignored
//!
//! Anything else, or a value out of range, is left out of the OACK.

use std::ops::RangeInclusive;
use std::time::Duration;

use crate::protocol::TftpOptions;

pub const DEFAULT_BLOCK_SIZE: usize = 512;
pub const BLOCK_SIZE_RANGE: RangeInclusive<usize> = 8..=65464;
pub const TIMEOUT_RANGE: RangeInclusive<u64> = 1..=255;

pub const OPTION_BLKSIZE: &str = "blksize";
pub const OPTION_TIMEOUT: &str = "timeout";
pub const OPTION_TSIZE: &str = "tsize";

/// Parameters one transfer runs with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOptions {
    pub block_size: usize,
    pub timeout: Duration,
    pub transfer_size: u64,
}

impl TransferOptions {
    pub fn new(timeout: Duration, transfer_size: u64) -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            timeout,
            transfer_size,
        }
    }

    /// Apply the options a client asked for and return the accepted ones
    ///
    /// Option names are matched without regard to case.
    pub fn negotiate(&mut self, requested: &TftpOptions) -> TftpOptions {
        let mut accepted = TftpOptions::new();

        for (name, value) in requested {
            match name.to_ascii_lowercase().as_str() {
                OPTION_BLKSIZE => match value.parse::<usize>() {
                    Ok(size) if BLOCK_SIZE_RANGE.contains(&size) => {
                        self.block_size = size;
                        accepted.insert(OPTION_BLKSIZE.to_string(), size.to_string());
                    }
                    _ => tracing::debug!("Ignoring blksize '{}'", value),
                },
                OPTION_TIMEOUT => match value.parse::<u64>() {
                    Ok(seconds) if TIMEOUT_RANGE.contains(&seconds) => {
                        self.timeout = Duration::from_secs(seconds);
                        accepted.insert(OPTION_TIMEOUT.to_string(), seconds.to_string());
                    }
                    _ => tracing::debug!("Ignoring timeout '{}'", value),
                },
                OPTION_TSIZE => {
                    accepted.insert(OPTION_TSIZE.to_string(), self.transfer_size.to_string());
                }
                _ => tracing::debug!("Ignoring unsupported option {}={}", name, value),
            }
        }

        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requested(pairs: &[(&str, &str)]) -> TftpOptions {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_defaults_without_options() {
        let mut options = TransferOptions::new(Duration::from_secs(1), 4096);
        let accepted = options.negotiate(&TftpOptions::new());

        assert!(accepted.is_empty());
        assert_eq!(options.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(options.timeout, Duration::from_secs(1));
    }

    #[test]
    fn test_all_supported_options() {
        let mut options = TransferOptions::new(Duration::from_secs(1), 4096);
        let accepted = options.negotiate(&requested(&[("blksize", "1024"), ("timeout", "5"), ("tsize", "0")]));

        assert_eq!(options.block_size, 1024);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(accepted, requested(&[("blksize", "1024"), ("timeout", "5"), ("tsize", "4096")]));
    }

    #[test]
    fn test_unknown_and_invalid_options_dropped() {
        let mut options = TransferOptions::new(Duration::from_secs(2), 10);
        let accepted = options.negotiate(&requested(&[
            ("windowsize", "4"),
            ("blksize", "4"),
            ("timeout", "0"),
            ("multicast", ""),
        ]));

        assert!(accepted.is_empty());
        assert_eq!(options.block_size, DEFAULT_BLOCK_SIZE);
        assert_eq!(options.timeout, Duration::from_secs(2));
    }

    #[test]
    fn test_bounds_and_case() {
        let mut options = TransferOptions::new(Duration::from_secs(1), 0);
        let accepted = options.negotiate(&requested(&[("BLKSIZE", "65464"), ("Timeout", "255")]));

        assert_eq!(accepted, requested(&[("blksize", "65464"), ("timeout", "255")]));

        let mut options = TransferOptions::new(Duration::from_secs(1), 0);
        let accepted = options.negotiate(&requested(&[("blksize", "65465"), ("timeout", "256")]));
        assert!(accepted.is_empty());
    }
}
