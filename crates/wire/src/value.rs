//! [`Encode`]/[`Decode`] implementations for the primitive wire types

use std::net::Ipv4Addr;

use crate::{Decode, Encode, Reader, Result, Writer};

macro_rules! impl_integer {
    ($($ty:ty),*) => {$(
        impl Encode for $ty {
            fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
                writer.write_bytes(&self.to_be_bytes())
            }

            fn encoded_len(&self) -> usize {
                std::mem::size_of::<$ty>()
            }
        }

        impl Decode for $ty {
            fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                let mut bytes = [0u8; std::mem::size_of::<$ty>()];
                reader.read_into(&mut bytes)?;
                Ok(<$ty>::from_be_bytes(bytes))
            }
        }
    )*};
}

impl_integer!(u8, u16, u32, u64, i8, i16, i32, i64);

impl Encode for Ipv4Addr {
    fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_bytes(&self.octets())
    }

    fn encoded_len(&self) -> usize {
        4
    }
}

impl Decode for Ipv4Addr {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        Ok(Ipv4Addr::from(reader.read::<[u8; 4]>()?))
    }
}

impl<const N: usize> Encode for [u8; N] {
    fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_bytes(self)
    }

    fn encoded_len(&self) -> usize {
        N
    }
}

impl<const N: usize> Decode for [u8; N] {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        let mut bytes = [0u8; N];
        reader.read_into(&mut bytes)?;
        Ok(bytes)
    }
}

impl Encode for [u8] {
    fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_bytes(self)
    }

    fn encoded_len(&self) -> usize {
        self.len()
    }
}

impl<T: Encode + ?Sized> Encode for &T {
    fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
        (**self).encode(writer)
    }

    fn encoded_len(&self) -> usize {
        (**self).encoded_len()
    }
}

/// A NUL-terminated string on the wire
///
/// Wrap a `&str` or `String` to write it with its terminator; decode into
/// `Asciiz<String>` to read one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asciiz<S>(pub S);

impl<S: AsRef<str>> Encode for Asciiz<S> {
    fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
        writer.write_asciiz(self.0.as_ref())
    }

    fn encoded_len(&self) -> usize {
        self.0.as_ref().len() + 1
    }
}

impl Decode for Asciiz<String> {
    fn decode(reader: &mut Reader<'_>) -> Result<Self> {
        reader.read_asciiz().map(Asciiz)
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Encode),+> Encode for ($($name,)+) {
            #[allow(non_snake_case)]
            fn encode(&self, writer: &mut Writer<'_>) -> Result<()> {
                let ($($name,)+) = self;
                $($name.encode(writer)?;)+
                Ok(())
            }

            #[allow(non_snake_case)]
            fn encoded_len(&self) -> usize {
                let ($($name,)+) = self;
                0 $(+ $name.encoded_len())+
            }
        }

        impl<$($name: Decode),+> Decode for ($($name,)+) {
            fn decode(reader: &mut Reader<'_>) -> Result<Self> {
                Ok(($(reader.read::<$name>()?,)+))
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);
