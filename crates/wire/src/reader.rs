use crate::{Decode, Result, WireError};

/// Read cursor over a borrowed byte slice
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Decode the next value, delegating to its [`Decode`] implementation
    pub fn read<T: Decode>(&mut self) -> Result<T> {
        T::decode(self)
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        self.ensure(len)?;
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Fill `out` completely from the input
    pub fn read_into(&mut self, out: &mut [u8]) -> Result<()> {
        let bytes = self.read_bytes(out.len())?;
        out.copy_from_slice(bytes);
        Ok(())
    }

    /// Borrow everything left and move to the end
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.data[self.pos..];
        self.pos = self.data.len();
        rest
    }

    /// Read a NUL-terminated string, consuming the terminator
    pub fn read_asciiz(&mut self) -> Result<String> {
        let rest = &self.data[self.pos..];
        let end = rest.iter().position(|&b| b == 0).ok_or(WireError::ShortBuffer {
            needed: rest.len() + 1,
            remaining: rest.len(),
        })?;
        let text = std::str::from_utf8(&rest[..end]).map_err(|_| WireError::Malformed("string is not valid UTF-8"))?;
        self.pos += end + 1;
        Ok(text.to_string())
    }

    pub fn skip(&mut self, len: usize) -> Result<()> {
        self.ensure(len)?;
        self.pos += len;
        Ok(())
    }

    /// Move to an absolute offset from the start of the input
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.data.len() {
            return Err(WireError::SeekOutOfRange {
                offset,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    pub fn rewind(&mut self) {
        self.pos = 0;
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn consumed(&self) -> usize {
        self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        let remaining = self.remaining();
        if needed > remaining {
            return Err(WireError::ShortBuffer { needed, remaining });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_integers_big_endian() {
        let data = [0x12, 0x34, 0xde, 0xad, 0xbe, 0xef, 0x7f];
        let mut reader = Reader::new(&data);

        assert_eq!(reader.read::<u16>().unwrap(), 0x1234);
        assert_eq!(reader.read::<u32>().unwrap(), 0xdead_beef);
        assert_eq!(reader.read::<u8>().unwrap(), 0x7f);
        assert!(reader.is_empty());
        assert_eq!(reader.consumed(), 7);
    }

    #[test]
    fn test_read_past_end_fails_without_advancing() {
        let data = [0x01, 0x02, 0x03];
        let mut reader = Reader::new(&data);
        reader.skip(2).unwrap();

        let err = reader.read::<u16>().unwrap_err();
        assert_eq!(err, WireError::ShortBuffer { needed: 2, remaining: 1 });
        assert_eq!(reader.remaining(), 1);
    }

    #[test]
    fn test_read_asciiz() {
        let data = b"boot.img\0octet\0tail";
        let mut reader = Reader::new(data);

        assert_eq!(reader.read_asciiz().unwrap(), "boot.img");
        assert_eq!(reader.read_asciiz().unwrap(), "octet");
        assert_eq!(reader.remaining(), 4);

        // No terminator left
        assert!(matches!(reader.read_asciiz(), Err(WireError::ShortBuffer { .. })));
        assert_eq!(reader.read_rest(), b"tail");
    }

    #[test]
    fn test_read_asciiz_rejects_invalid_utf8() {
        let data = [0xff, 0xfe, 0x00];
        let mut reader = Reader::new(&data);
        assert!(matches!(reader.read_asciiz(), Err(WireError::Malformed(_))));
    }

    #[test]
    fn test_seek_and_rewind() {
        let data = [1, 2, 3, 4];
        let mut reader = Reader::new(&data);

        reader.seek(3).unwrap();
        assert_eq!(reader.read::<u8>().unwrap(), 4);
        assert!(reader.seek(5).is_err());
        reader.seek(4).unwrap();
        assert!(reader.is_empty());

        reader.rewind();
        assert_eq!(reader.read_bytes(2).unwrap(), &[1, 2]);
        assert!(reader.skip(3).is_err());
    }
}
