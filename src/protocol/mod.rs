//! Zero-copy link/network/transport decoders.
//!
//! The pipeline only follows TCP over IPv4/IPv6, so the decoders expose just
//! the fields the reassembler and flow handlers consume: addresses, ports,
//! sequence numbers, flags, and payload slices.

pub mod ethernet;
pub mod ipv4;
pub mod ipv6;
pub mod tcp;

use std::fmt;
use std::net::IpAddr;

/// IP protocol number for TCP.
pub const IP_PROTO_TCP: u8 = 6;

/// Errors from packet decoding.
#[derive(Debug)]
pub enum DecodeError {
    /// Not enough bytes to decode the header.
    Truncated { expected: usize, actual: usize },
    /// Header fields are inconsistent.
    Malformed(String),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Truncated { expected, actual } => {
                write!(f, "truncated header: need {} bytes, got {}", expected, actual)
            }
            DecodeError::Malformed(msg) => write!(f, "malformed header: {}", msg),
        }
    }
}

impl std::error::Error for DecodeError {}

/// Network layer header of a decoded packet.
#[derive(Debug)]
pub enum NetHeader<'a> {
    V4(ipv4::Ipv4Header<'a>),
    V6(ipv6::Ipv6Header<'a>),
}

impl<'a> NetHeader<'a> {
    pub fn src_ip(&self) -> IpAddr {
        match self {
            NetHeader::V4(h) => IpAddr::V4(h.src_addr()),
            NetHeader::V6(h) => IpAddr::V6(h.src_addr()),
        }
    }

    pub fn dst_ip(&self) -> IpAddr {
        match self {
            NetHeader::V4(h) => IpAddr::V4(h.dst_addr()),
            NetHeader::V6(h) => IpAddr::V6(h.dst_addr()),
        }
    }

    /// True for a non-first IPv4 fragment; its payload does not start at a
    /// transport header, so the caller must skip it.
    pub fn is_late_fragment(&self) -> bool {
        match self {
            NetHeader::V4(h) => h.fragment_offset() != 0,
            NetHeader::V6(_) => false,
        }
    }
}

/// A decoded packet. `net` and `tcp` are `None` for traffic the pipeline
/// does not follow (ARP, UDP, ICMP, ...).
#[derive(Debug)]
pub struct Decoded<'a> {
    pub net: Option<NetHeader<'a>>,
    pub tcp: Option<tcp::TcpHeader<'a>>,
}

/// Decode a raw Ethernet frame down to its TCP header, if any.
pub fn decode_packet(data: &[u8]) -> Result<Decoded<'_>, DecodeError> {
    let eth = ethernet::EthernetHeader::parse(data)?;
    let mut remaining = eth.payload();
    let mut ether_type = eth.ether_type_raw();

    // Skip one 802.1Q tag if present.
    if ether_type == ethernet::ETHERTYPE_VLAN {
        if remaining.len() < 4 {
            return Err(DecodeError::Truncated {
                expected: 4,
                actual: remaining.len(),
            });
        }
        ether_type = u16::from_be_bytes([remaining[2], remaining[3]]);
        remaining = &remaining[4..];
    }

    let (net, l4_data, ip_proto) = match ether_type {
        ethernet::ETHERTYPE_IPV4 => {
            let hdr = ipv4::Ipv4Header::parse(remaining)?;
            let proto = hdr.protocol();
            let payload = hdr.payload();
            (Some(NetHeader::V4(hdr)), payload, Some(proto))
        }
        ethernet::ETHERTYPE_IPV6 => {
            let hdr = ipv6::Ipv6Header::parse(remaining)?;
            let proto = hdr.next_header();
            let payload = hdr.payload();
            (Some(NetHeader::V6(hdr)), payload, Some(proto))
        }
        _ => (None, remaining, None),
    };

    let tcp = match ip_proto {
        Some(IP_PROTO_TCP) => tcp::TcpHeader::parse(l4_data).ok(),
        _ => None,
    };

    Ok(Decoded { net, tcp })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    /// Ethernet + IPv4 + TCP frame with the given payload.
    fn make_tcp_frame(
        src: [u8; 4],
        dst: [u8; 4],
        src_port: u16,
        dst_port: u16,
        seq: u32,
        flags: u8,
        payload: &[u8],
    ) -> Vec<u8> {
        let mut frame = Vec::new();
        // Ethernet
        frame.extend_from_slice(&[0u8; 12]);
        frame.extend_from_slice(&[0x08, 0x00]);
        // IPv4, IHL=5
        let total_len = (20 + 20 + payload.len()) as u16;
        frame.push(0x45);
        frame.push(0);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0x40, 0]); // id, DF
        frame.push(64); // TTL
        frame.push(IP_PROTO_TCP);
        frame.extend_from_slice(&[0, 0]); // checksum
        frame.extend_from_slice(&src);
        frame.extend_from_slice(&dst);
        // TCP, data offset=5
        frame.extend_from_slice(&src_port.to_be_bytes());
        frame.extend_from_slice(&dst_port.to_be_bytes());
        frame.extend_from_slice(&seq.to_be_bytes());
        frame.extend_from_slice(&[0, 0, 0, 0]); // ack
        frame.push(0x50);
        frame.push(flags);
        frame.extend_from_slice(&[0xFF, 0xFF, 0, 0, 0, 0]); // window, cksum, urg
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn decode_tcp_over_ipv4() {
        let frame = make_tcp_frame(
            [10, 0, 0, 1],
            [10, 0, 0, 2],
            40000,
            8583,
            1000,
            tcp::flags::ACK,
            b"hello",
        );
        let decoded = decode_packet(&frame).unwrap();
        let net = decoded.net.unwrap();
        assert_eq!(net.src_ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(net.dst_ip(), IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2)));
        assert!(!net.is_late_fragment());
        let tcp = decoded.tcp.unwrap();
        assert_eq!(tcp.src_port(), 40000);
        assert_eq!(tcp.dst_port(), 8583);
        assert_eq!(tcp.payload(), b"hello");
    }

    #[test]
    fn non_ip_frame_has_no_net_layer() {
        let mut frame = vec![0u8; 14];
        frame[12] = 0x08;
        frame[13] = 0x06; // ARP
        let decoded = decode_packet(&frame).unwrap();
        assert!(decoded.net.is_none());
        assert!(decoded.tcp.is_none());
    }

    #[test]
    fn vlan_tag_is_skipped() {
        let inner = make_tcp_frame(
            [192, 168, 0, 1],
            [192, 168, 0, 2],
            1234,
            5678,
            0,
            tcp::flags::SYN,
            b"",
        );
        // Rebuild with an 802.1Q tag between the Ethernet header and IPv4.
        let mut frame = Vec::new();
        frame.extend_from_slice(&[0u8; 12]);
        frame.extend_from_slice(&[0x81, 0x00]);
        frame.extend_from_slice(&[0x00, 0x64]); // VLAN 100
        frame.extend_from_slice(&[0x08, 0x00]);
        frame.extend_from_slice(&inner[14..]);

        let decoded = decode_packet(&frame).unwrap();
        assert!(decoded.net.is_some());
        let tcp = decoded.tcp.unwrap();
        assert!(tcp.syn());
    }
}
