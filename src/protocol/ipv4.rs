//! Zero-copy IPv4 header view.

use super::DecodeError;
use std::net::Ipv4Addr;

/// Minimum IPv4 header length (no options).
pub const IPV4_MIN_HEADER_LEN: usize = 20;

/// Zero-copy IPv4 header.
#[derive(Debug)]
pub struct Ipv4Header<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> Ipv4Header<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: IPV4_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let version = (data[0] >> 4) & 0x0F;
        if version != 4 {
            return Err(DecodeError::Malformed(format!(
                "expected IPv4, got version {}",
                version
            )));
        }

        let ihl = (data[0] & 0x0F) as usize;
        let header_len = ihl * 4;

        if header_len < IPV4_MIN_HEADER_LEN {
            return Err(DecodeError::Malformed(format!("IHL too small: {}", ihl)));
        }

        if data.len() < header_len {
            return Err(DecodeError::Truncated {
                expected: header_len,
                actual: data.len(),
            });
        }

        Ok(Ipv4Header { data, header_len })
    }

    /// Total length of the IP packet (header + payload) in bytes.
    #[inline]
    pub fn total_length(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    /// Fragment offset in 8-byte units. Non-zero means this packet is not
    /// the first fragment.
    #[inline]
    pub fn fragment_offset(&self) -> u16 {
        u16::from_be_bytes([self.data[6] & 0x1F, self.data[7]])
    }

    /// Protocol number of the encapsulated payload.
    #[inline]
    pub fn protocol(&self) -> u8 {
        self.data[9]
    }

    #[inline]
    pub fn src_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[12], self.data[13], self.data[14], self.data[15])
    }

    #[inline]
    pub fn dst_addr(&self) -> Ipv4Addr {
        Ipv4Addr::new(self.data[16], self.data[17], self.data[18], self.data[19])
    }

    /// Payload after the IPv4 header, clamped to `total_length` so Ethernet
    /// trailer padding is never delivered to the transport layer.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        let total = self.total_length() as usize;
        let payload_len = total.saturating_sub(self.header_len);
        let available = self.data.len() - self.header_len;
        let end = self.header_len + payload_len.min(available);
        &self.data[self.header_len..end]
    }
}
