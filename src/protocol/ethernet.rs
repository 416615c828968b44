//! Zero-copy Ethernet frame view.
//!
//! Layout: destination MAC (6), source MAC (6), EtherType (2). VLAN tags are
//! handled by the caller.

use super::DecodeError;

/// Ethernet header length (no VLAN tags).
pub const ETH_HEADER_LEN: usize = 14;

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;
pub const ETHERTYPE_VLAN: u16 = 0x8100;

/// Zero-copy Ethernet header that borrows from the packet buffer.
#[derive(Debug)]
pub struct EthernetHeader<'a> {
    data: &'a [u8],
}

impl<'a> EthernetHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < ETH_HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: ETH_HEADER_LEN,
                actual: data.len(),
            });
        }
        Ok(EthernetHeader { data })
    }

    /// EtherType field as a raw u16.
    #[inline]
    pub fn ether_type_raw(&self) -> u16 {
        u16::from_be_bytes([self.data[12], self.data[13]])
    }

    /// The payload after the Ethernet header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[ETH_HEADER_LEN..]
    }
}
