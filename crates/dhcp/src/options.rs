//! DHCP Option Table
//!
//! A fixed table of 254 option slots (codes 1 through 254), each holding up to
//! 255 bytes. On the wire the table is the magic cookie followed by `code,
//! length, payload` triples in ascending code order and an `End` (255) byte.

use thiserror::Error;
use wire::{Decode, Encode, Reader, WireError, Writer};

use crate::{DhcpOption, MAGIC_COOKIE};

const SLOT_COUNT: usize = 254;
const MAX_PAYLOAD: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("invalid option code {0}, must be between 1 and 254")]
    InvalidCode(u8),

    #[error("option {code} payload of {len} bytes exceeds 255")]
    PayloadTooLong { code: u8, len: usize },

    #[error(transparent)]
    Wire(#[from] WireError),
}

/// Option slots of one DHCP packet
///
/// Cloning copies every populated payload, so two tables never share storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionTable {
    slots: [Option<Vec<u8>>; SLOT_COUNT],
}

impl OptionTable {
    pub fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| None),
        }
    }

    /// Payload stored under `code`
    ///
    /// Empty for unset slots and for codes outside 1..=254.
    pub fn get(&self, code: u8) -> &[u8] {
        match slot_index(code) {
            Some(index) => self.slots[index].as_deref().unwrap_or_default(),
            None => &[],
        }
    }

    pub fn contains(&self, code: u8) -> bool {
        slot_index(code).is_some_and(|index| self.slots[index].is_some())
    }

    /// Store a copy of `payload` under `code`, replacing any previous value
    pub fn set(&mut self, code: u8, payload: &[u8]) -> Result<(), OptionError> {
        let index = slot_index(code).ok_or(OptionError::InvalidCode(code))?;
        if payload.len() > MAX_PAYLOAD {
            return Err(OptionError::PayloadTooLong {
                code,
                len: payload.len(),
            });
        }
        self.slots[index] = Some(payload.to_vec());
        Ok(())
    }

    /// Encode `value` and store it under `code`
    ///
    /// Tuples store several values in one slot, e.g. `(router_a, router_b)`.
    pub fn set_value<T: Encode + ?Sized>(&mut self, code: u8, value: &T) -> Result<(), OptionError> {
        let payload = wire::to_vec(value)?;
        self.set(code, &payload)
    }

    /// Decode the payload under `code` as `T`
    ///
    /// `None` when the slot is unset or too short for `T`.
    pub fn value<T: Decode>(&self, code: u8) -> Option<T> {
        if !self.contains(code) {
            return None;
        }
        wire::from_bytes(self.get(code)).ok()
    }

    pub fn remove(&mut self, code: u8) -> Option<Vec<u8>> {
        slot_index(code).and_then(|index| self.slots[index].take())
    }

    /// Copy the slot `code` from `from`. Returns false if `from` has no such option.
    pub fn assign(&mut self, code: u8, from: &OptionTable) -> bool {
        let Some(index) = slot_index(code) else {
            return false;
        };
        match &from.slots[index] {
            Some(payload) => {
                self.slots[index] = Some(payload.clone());
                true
            }
            None => false,
        }
    }

    /// Populated option codes in ascending order
    pub fn codes(&self) -> impl Iterator<Item = u8> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.is_some())
            .map(|(index, _)| (index + 1) as u8)
    }

    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Option 53
    pub fn message_type(&self) -> Option<u8> {
        self.value(DhcpOption::MessageType.code())
    }

    pub fn set_message_type(&mut self, message_type: u8) {
        self.slots[usize::from(DhcpOption::MessageType.code()) - 1] = Some(vec![message_type]);
    }

    /// Option 55, the codes the client asked for
    pub fn requested_parameters(&self) -> &[u8] {
        self.get(DhcpOption::ParameterRequestList.code())
    }
}

impl Default for OptionTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Encode for OptionTable {
    fn encode(&self, writer: &mut Writer<'_>) -> wire::Result<()> {
        writer.write(&MAGIC_COOKIE)?;
        for (index, slot) in self.slots.iter().enumerate() {
            if let Some(payload) = slot {
                writer.write(&((index + 1) as u8))?;
                writer.write(&(payload.len() as u8))?;
                writer.write_bytes(payload)?;
            }
        }
        writer.write(&DhcpOption::End.code())
    }

    fn encoded_len(&self) -> usize {
        let options: usize = self.slots.iter().flatten().map(|payload| payload.len() + 2).sum();
        4 + options + 1
    }
}

impl Decode for OptionTable {
    /// A missing or foreign magic cookie yields an empty table rather than an error
    fn decode(reader: &mut Reader<'_>) -> wire::Result<Self> {
        let mut table = OptionTable::new();

        if reader.remaining() < 4 || reader.read::<u32>()? != MAGIC_COOKIE {
            return Ok(table);
        }

        while !reader.is_empty() {
            let code = reader.read::<u8>()?;
            if code == DhcpOption::Pad.code() {
                continue;
            }
            if code == DhcpOption::End.code() {
                break;
            }

            let len = reader.read::<u8>()?;
            let payload = reader.read_bytes(usize::from(len))?;
            table.slots[usize::from(code) - 1] = Some(payload.to_vec());
        }

        Ok(table)
    }
}

fn slot_index(code: u8) -> Option<usize> {
    match code {
        1..=254 => Some(usize::from(code) - 1),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv4Addr;

    use wire::Asciiz;

    use super::*;

    #[test]
    fn test_set_get_every_code() {
        let mut table = OptionTable::new();
        for code in 1..=254u8 {
            let payload = vec![code; usize::from(code)];
            table.set(code, &payload).unwrap();
        }
        for code in 1..=254u8 {
            assert_eq!(table.get(code), vec![code; usize::from(code)].as_slice());
        }
        assert_eq!(table.codes().count(), 254);
    }

    #[test]
    fn test_invalid_codes() {
        let mut table = OptionTable::new();

        assert_eq!(table.set(0, &[1]), Err(OptionError::InvalidCode(0)));
        assert_eq!(table.set(255, &[1]), Err(OptionError::InvalidCode(255)));
        assert!(table.get(0).is_empty());
        assert!(table.get(255).is_empty());
        assert!(!table.assign(0, &OptionTable::new()));
        assert!(table.is_empty());
    }

    #[test]
    fn test_payload_limits() {
        let mut table = OptionTable::new();

        table.set(43, &[0xab; 255]).unwrap();
        assert_eq!(table.get(43).len(), 255);
        assert_eq!(
            table.set(43, &[0; 256]),
            Err(OptionError::PayloadTooLong { code: 43, len: 256 })
        );
        // Previous value is untouched
        assert_eq!(table.get(43).len(), 255);

        table.set(44, &[]).unwrap();
        assert!(table.contains(44));
        assert!(table.get(44).is_empty());
    }

    #[test]
    fn test_typed_values() {
        let mut table = OptionTable::new();
        table.set_value(1, &Ipv4Addr::new(255, 255, 255, 0)).unwrap();
        table.set_value(51, &172_800u32).unwrap();
        table.set_value(15, &"lab.local".as_bytes()).unwrap();
        table
            .set_value(3, &(Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)))
            .unwrap();

        assert_eq!(table.get(1), &[255, 255, 255, 0]);
        assert_eq!(table.value::<Ipv4Addr>(1), Some(Ipv4Addr::new(255, 255, 255, 0)));
        assert_eq!(table.value::<u32>(51), Some(172_800));
        assert_eq!(table.get(15), b"lab.local");
        assert_eq!(
            table.value::<(Ipv4Addr, Ipv4Addr)>(3),
            Some((Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)))
        );
        // Too short for the requested type
        assert_eq!(table.value::<u64>(51), None);
        assert_eq!(table.value::<u32>(52), None);
    }

    #[test]
    fn test_oversized_typed_value_rejected() {
        let mut table = OptionTable::new();
        let long = "x".repeat(300);
        assert!(matches!(
            table.set_value(12, &Asciiz(long.as_str())),
            Err(OptionError::PayloadTooLong { code: 12, .. })
        ));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut original = OptionTable::new();
        original.set(12, b"host").unwrap();

        let mut copy = original.clone();
        copy.set(12, b"other").unwrap();
        copy.remove(12);

        assert_eq!(original.get(12), b"host");
        assert!(!copy.contains(12));
    }

    #[test]
    fn test_assign_projects_single_slot() {
        let mut profile = OptionTable::new();
        profile.set(1, &[255, 255, 255, 0]).unwrap();
        profile.set(3, &[10, 0, 0, 1]).unwrap();

        let mut reply = OptionTable::new();
        assert!(reply.assign(1, &profile));
        assert!(!reply.assign(6, &profile));

        assert_eq!(reply.codes().collect::<Vec<_>>(), vec![1]);
        assert_eq!(reply.get(1), profile.get(1));
    }

    #[test]
    fn test_encode_layout() {
        let mut table = OptionTable::new();
        table.set(55, &[1, 3]).unwrap();
        table.set_message_type(1);

        let bytes = wire::to_vec(&table).unwrap();
        assert_eq!(
            bytes,
            [0x63, 0x82, 0x53, 0x63, 53, 1, 1, 55, 2, 1, 3, 0xff]
        );
        assert_eq!(bytes.len(), table.encoded_len());
    }

    #[test]
    fn test_decode_skips_padding() {
        let bytes = [0x63, 0x82, 0x53, 0x63, 0, 0, 53, 1, 3, 0, 55, 3, 1, 3, 67, 0xff, 12, 1];
        let table: OptionTable = wire::from_bytes(&bytes).unwrap();

        assert_eq!(table.message_type(), Some(3));
        assert_eq!(table.requested_parameters(), &[1, 3, 67]);
        // Nothing after End is read
        assert!(!table.contains(12));
    }

    #[test]
    fn test_decode_bad_cookie_is_empty() {
        let bytes = [0xde, 0xad, 0xbe, 0xef, 53, 1, 1, 0xff];
        let table: OptionTable = wire::from_bytes(&bytes).unwrap();
        assert!(table.is_empty());

        let table: OptionTable = wire::from_bytes(&[0x63, 0x82]).unwrap();
        assert!(table.is_empty());
    }

    #[test]
    fn test_decode_truncated_option_fails() {
        let bytes = [0x63, 0x82, 0x53, 0x63, 12, 10, b'a', b'b'];
        assert!(matches!(
            wire::from_bytes::<OptionTable>(&bytes),
            Err(WireError::ShortBuffer { needed: 10, remaining: 2 })
        ));
    }

    #[test]
    fn test_round_trip() {
        let mut table = OptionTable::new();
        table.set(1, &[255, 255, 0, 0]).unwrap();
        table.set(67, b"pxelinux.0").unwrap();
        table.set(254, &[0xff; 255]).unwrap();
        table.set(200, &[]).unwrap();

        let bytes = wire::to_vec(&table).unwrap();
        let decoded: OptionTable = wire::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, table);
    }
}
