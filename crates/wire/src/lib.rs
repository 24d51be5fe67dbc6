//! Binary Wire Codec
//!
//! A symmetric reader/writer pair over byte buffers, used to marshal every
//! DHCP and TFTP structure to and from the network.
//!
//! - [`Reader`] walks a borrowed byte slice.
//! - [`Writer`] fills a borrowed mutable byte slice.
//! - [`Encode`] / [`Decode`] are implemented by every wire type, from fixed-width
//!   integers up to whole packets, so composite structures encode by delegating
//!   to their fields.
//!
//! All multi-byte integers are in network (big-endian) byte order. A read past
//! the end of the input, or a write past the capacity of the output, fails with a
//! [`WireError`]; nothing is ever silently truncated.
//!
//! # Example
//!
//! ```rust
//! use std::net::Ipv4Addr;
//! use wire::{Asciiz, Reader};
//!
//! let bytes = wire::to_vec(&(0x0102u16, Ipv4Addr::new(10, 0, 0, 1), Asciiz("boot"))).unwrap();
//! assert_eq!(bytes, b"\x01\x02\x0a\x00\x00\x01boot\0");
//!
//! let mut reader = Reader::new(&bytes);
//! assert_eq!(reader.read::<u16>().unwrap(), 0x0102);
//! assert_eq!(reader.read::<Ipv4Addr>().unwrap(), Ipv4Addr::new(10, 0, 0, 1));
//! assert_eq!(reader.read_asciiz().unwrap(), "boot");
//! assert!(reader.is_empty());
//! ```

mod error;
mod reader;
mod value;
mod writer;

pub use error::{Result, WireError};
pub use reader::Reader;
pub use value::Asciiz;
pub use writer::Writer;

/// A value that can be written to the wire.
pub trait Encode {
    /// Write the value at the writer's current position.
    fn encode(&self, writer: &mut Writer<'_>) -> Result<()>;

    /// Exact number of bytes [`Encode::encode`] will produce.
    fn encoded_len(&self) -> usize;
}

/// A value that can be read from the wire.
pub trait Decode: Sized {
    /// Read the value from the reader's current position.
    fn decode(reader: &mut Reader<'_>) -> Result<Self>;
}

/// Encode a value into a freshly allocated buffer sized from its size hint.
pub fn to_vec<T: Encode + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut buffer = vec![0u8; value.encoded_len()];
    let mut writer = Writer::new(&mut buffer);
    value.encode(&mut writer)?;
    let written = writer.consumed();
    buffer.truncate(written);
    Ok(buffer)
}

/// Decode a value from the start of `bytes`. Trailing bytes are ignored.
pub fn from_bytes<T: Decode>(bytes: &[u8]) -> Result<T> {
    Reader::new(bytes).read()
}
