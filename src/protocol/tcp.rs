//! Zero-copy TCP header view.
//!
//! Exposes the fields stream reassembly needs: ports, sequence number,
//! SYN/FIN/RST/ACK flags, and the payload slice.

use super::DecodeError;

/// Minimum TCP header length (no options).
pub const TCP_MIN_HEADER_LEN: usize = 20;

/// TCP flags bitmask constants.
pub mod flags {
    pub const FIN: u8 = 0x01;
    pub const SYN: u8 = 0x02;
    pub const RST: u8 = 0x04;
    pub const ACK: u8 = 0x10;
}

/// Zero-copy TCP header.
#[derive(Debug)]
pub struct TcpHeader<'a> {
    data: &'a [u8],
    header_len: usize,
}

impl<'a> TcpHeader<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, DecodeError> {
        if data.len() < TCP_MIN_HEADER_LEN {
            return Err(DecodeError::Truncated {
                expected: TCP_MIN_HEADER_LEN,
                actual: data.len(),
            });
        }

        let data_offset = ((data[12] >> 4) & 0x0F) as usize;
        let header_len = data_offset * 4;

        if header_len < TCP_MIN_HEADER_LEN {
            return Err(DecodeError::Malformed(format!(
                "TCP data offset too small: {}",
                data_offset
            )));
        }

        if data.len() < header_len {
            return Err(DecodeError::Truncated {
                expected: header_len,
                actual: data.len(),
            });
        }

        Ok(TcpHeader { data, header_len })
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        u16::from_be_bytes([self.data[0], self.data[1]])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        u16::from_be_bytes([self.data[2], self.data[3]])
    }

    #[inline]
    pub fn sequence_number(&self) -> u32 {
        u32::from_be_bytes([self.data[4], self.data[5], self.data[6], self.data[7]])
    }

    #[inline]
    pub fn syn(&self) -> bool {
        self.data[13] & flags::SYN != 0
    }

    #[inline]
    pub fn fin(&self) -> bool {
        self.data[13] & flags::FIN != 0
    }

    #[inline]
    pub fn rst(&self) -> bool {
        self.data[13] & flags::RST != 0
    }

    #[inline]
    pub fn ack(&self) -> bool {
        self.data[13] & flags::ACK != 0
    }

    /// Payload after the TCP header.
    #[inline]
    pub fn payload(&self) -> &'a [u8] {
        &self.data[self.header_len..]
    }
}
