use crate::{Encode, Result, WireError};

/// Write cursor over a borrowed, fixed-capacity byte slice
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Encode a value, delegating to its [`Encode`] implementation
    pub fn write<T: Encode + ?Sized>(&mut self, value: &T) -> Result<()> {
        value.encode(self)
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure(bytes.len())?;
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Write `text` followed by a NUL terminator
    pub fn write_asciiz(&mut self, text: &str) -> Result<()> {
        if text.as_bytes().contains(&0) {
            return Err(WireError::Malformed("string contains an embedded NUL"));
        }
        self.ensure(text.len() + 1)?;
        self.write_bytes(text.as_bytes())?;
        self.write_bytes(&[0])
    }

    /// Write `len` zero bytes
    pub fn write_zeros(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.buf[self.pos..self.pos + len].fill(0);
        self.pos += len;
        Ok(())
    }

    /// Advance without touching the skipped bytes
    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.buf.len() {
            return Err(WireError::SeekOutOfRange {
                offset,
                len: self.buf.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    /// Capacity left after the current position
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    /// True once no capacity is left
    pub fn is_full(&self) -> bool {
        self.remaining() == 0
    }

    /// The bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(WireError::InsufficientCapacity { needed, remaining });
        }
        Ok(())
    }
}
