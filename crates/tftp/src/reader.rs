//! Sequential block reader over a served file

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use anyhow::{Context, Result};

use crate::protocol::TftpPacket;

/// Reads a file one block at a time for DATA packets
///
/// Block numbers start at 1 and are sent modulo 65536. The block that is
/// shorter than the block size (possibly empty) is the last one.
#[derive(Debug)]
pub struct FileReader {
    file: File,
    length: u64,
    block_size: usize,
    buffer: Vec<u8>,
    number: u64,
}

impl FileReader {
    /// Open `path` and load the first block
    ///
    /// A `length` of 0 means the file's actual size.
    pub fn open(path: impl AsRef<Path>, length: u64, block_size: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        let length = match length {
            0 => file
                .metadata()
                .with_context(|| format!("Failed to read metadata of {}", path.display()))?
                .len(),
            length => length,
        };

        let mut reader = Self {
            file,
            length,
            block_size,
            buffer: Vec::with_capacity(block_size),
            number: 0,
        };
        reader.next()?;
        Ok(reader)
    }

    /// Load the following block
    pub fn next(&mut self) -> Result<()> {
        let offset = self.number * self.block_size as u64;
        let len = self.length.saturating_sub(offset).min(self.block_size as u64);

        self.buffer.clear();
        if len > 0 {
            self.file
                .seek(SeekFrom::Start(offset))
                .with_context(|| format!("Failed to seek to block {}", self.number + 1))?;
            (&mut self.file)
                .take(len)
                .read_to_end(&mut self.buffer)
                .with_context(|| format!("Failed to read block {}", self.number + 1))?;
        }

        self.number += 1;
        Ok(())
    }

    /// Bytes of the current block
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn is_last(&self) -> bool {
        self.buffer.len() < self.block_size
    }

    /// Number of the current block, counting from 1 without wrapping
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Block id as it appears on the wire
    pub fn block_id(&self) -> u16 {
        (self.number & 0xffff) as u16
    }

    /// DATA packet for the current block
    pub fn packet(&self) -> TftpPacket {
        TftpPacket::data(self.block_id(), self.buffer.clone())
    }

    pub fn total_size(&self) -> u64 {
        self.length
    }
}
