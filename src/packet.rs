//! IPv4/UDP datagram view
//!
//! Zero-copy accessors over a raw network-layer packet as delivered by the
//! interception host. Anything that is not a well-formed IPv4/UDP datagram
//! yields `None`; callers treat that as "not ours" and accept the packet.

use std::net::Ipv4Addr;

/// Minimal IPv4 header length (IHL = 5)
pub const IPV4_HEADER_LEN: usize = 20;

/// UDP header length
pub const UDP_HEADER_LEN: usize = 8;

/// IANA protocol number for UDP
pub const IPPROTO_UDP: u8 = 17;

/// Opaque connection-tracking context attached by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnTrackTag(pub u64);

/// A packet delivered by the interception host
#[derive(Debug, Clone)]
pub struct InboundPacket {
    /// Raw bytes starting at the IPv4 header
    pub bytes: Vec<u8>,
    /// Connection-tracking context, if the host maintains one
    pub conntrack: Option<ConnTrackTag>,
}

impl InboundPacket {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            conntrack: None,
        }
    }

    pub fn with_conntrack(mut self, tag: ConnTrackTag) -> Self {
        self.conntrack = Some(tag);
        self
    }
}

/// Borrowed view of an IPv4 datagram carrying UDP
#[derive(Debug, Clone, Copy)]
pub struct Ipv4UdpView<'a> {
    pub source: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub source_port: u16,
    pub destination_port: u16,
    pub payload: &'a [u8],
}

impl<'a> Ipv4UdpView<'a> {
    /// Parse an IPv4 datagram, returning `None` unless it is IPv4 carrying UDP
    /// with both headers fully present.
    pub fn parse(packet: &'a [u8]) -> Option<Self> {
        let first = *packet.first()?;
        if first >> 4 != 4 {
            return None;
        }

        let ihl = usize::from(first & 0x0f) * 4;
        if ihl < IPV4_HEADER_LEN || packet.len() < ihl + UDP_HEADER_LEN {
            return None;
        }

        if packet[9] != IPPROTO_UDP {
            return None;
        }

        let source = Ipv4Addr::new(packet[12], packet[13], packet[14], packet[15]);
        let destination = Ipv4Addr::new(packet[16], packet[17], packet[18], packet[19]);

        let udp = &packet[ihl..];
        let source_port = u16::from_be_bytes([udp[0], udp[1]]);
        let destination_port = u16::from_be_bytes([udp[2], udp[3]]);

        // Trust the UDP length field only as far as the bytes we actually have
        let udp_len = usize::from(u16::from_be_bytes([udp[4], udp[5]]));
        let end = udp_len.clamp(UDP_HEADER_LEN, udp.len());
        let payload = &udp[UDP_HEADER_LEN..end];

        Some(Self {
            source,
            destination,
            source_port,
            destination_port,
            payload,
        })
    }
}

/// RFC 1071 ones' complement checksum over an IPv4 header.
///
/// The checksum field (bytes 10..12) must be zero when computing, or the
/// result is zero when verifying a correct header.
pub fn ipv4_header_checksum(header: &[u8]) -> u16 {
    let mut sum: u32 = 0;

    for chunk in header.chunks(2) {
        let word = match chunk {
            [hi, lo] => u16::from_be_bytes([*hi, *lo]),
            [hi] => u16::from_be_bytes([*hi, 0]),
            _ => 0,
        };
        sum += u32::from(word);
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}

/// Build an IPv4/UDP datagram (IHL 5, IP checksum filled in, UDP checksum 0).
///
/// Used to inject traffic into an in-process host.
pub fn build_ipv4_udp(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    src_port: u16,
    dst_port: u16,
    payload: &[u8],
) -> Vec<u8> {
    let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;
    let total_len = (IPV4_HEADER_LEN as u16) + udp_len;

    let mut pkt = Vec::with_capacity(usize::from(total_len));
    pkt.push(0x45);
    pkt.push(0x00);
    pkt.extend_from_slice(&total_len.to_be_bytes());
    pkt.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);
    pkt.push(64);
    pkt.push(IPPROTO_UDP);
    pkt.extend_from_slice(&[0x00, 0x00]);
    pkt.extend_from_slice(&src.octets());
    pkt.extend_from_slice(&dst.octets());
    let csum = ipv4_header_checksum(&pkt[..IPV4_HEADER_LEN]);
    pkt[10..12].copy_from_slice(&csum.to_be_bytes());

    pkt.extend_from_slice(&src_port.to_be_bytes());
    pkt.extend_from_slice(&dst_port.to_be_bytes());
    pkt.extend_from_slice(&udp_len.to_be_bytes());
    pkt.extend_from_slice(&[0x00, 0x00]);
    pkt.extend_from_slice(payload);
    pkt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_udp_datagram() {
        let src = Ipv4Addr::new(10, 0, 0, 5);
        let dst = Ipv4Addr::new(192, 168, 1, 1);
        let pkt = build_ipv4_udp(src, dst, 40000, 53, &[1, 2, 3]);

        let view = Ipv4UdpView::parse(&pkt).unwrap();
        assert_eq!(view.source, src);
        assert_eq!(view.destination, dst);
        assert_eq!(view.source_port, 40000);
        assert_eq!(view.destination_port, 53);
        assert_eq!(view.payload, &[1, 2, 3]);
    }

    #[test]
    fn test_parse_honors_ip_options() {
        let mut pkt = build_ipv4_udp(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            1234,
            53,
            b"abcd",
        );
        // IHL 6: splice four bytes of NOP options after the base header
        pkt[0] = 0x46;
        pkt.splice(IPV4_HEADER_LEN..IPV4_HEADER_LEN, [1u8, 1, 1, 1]);

        let view = Ipv4UdpView::parse(&pkt).unwrap();
        assert_eq!(view.source_port, 1234);
        assert_eq!(view.payload, b"abcd");
    }

    #[test]
    fn test_parse_rejects_tcp() {
        let mut pkt = build_ipv4_udp(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            1234,
            53,
            &[],
        );
        pkt[9] = 6;
        assert!(Ipv4UdpView::parse(&pkt).is_none());
    }

    #[test]
    fn test_parse_rejects_ipv6_and_garbage() {
        assert!(Ipv4UdpView::parse(&[]).is_none());
        assert!(Ipv4UdpView::parse(&[0x60; 48]).is_none());
        // IHL below minimum
        assert!(Ipv4UdpView::parse(&[0x44; 40]).is_none());
        // Truncated before the UDP header ends
        assert!(Ipv4UdpView::parse(&[0x45; 24]).is_none());
    }

    #[test]
    fn test_parse_clamps_lying_udp_length() {
        let mut pkt = build_ipv4_udp(
            Ipv4Addr::new(10, 0, 0, 1),
            Ipv4Addr::new(10, 0, 0, 2),
            1234,
            53,
            &[9; 4],
        );
        // Claims 1000 bytes, only 12 present
        pkt[24..26].copy_from_slice(&1000u16.to_be_bytes());
        assert_eq!(Ipv4UdpView::parse(&pkt).unwrap().payload.len(), 4);

        // Claims less than a UDP header
        pkt[24..26].copy_from_slice(&2u16.to_be_bytes());
        assert!(Ipv4UdpView::parse(&pkt).unwrap().payload.is_empty());
    }

    #[test]
    fn test_checksum_verifies_to_zero() {
        let pkt = build_ipv4_udp(
            Ipv4Addr::new(172, 16, 0, 1),
            Ipv4Addr::new(8, 8, 8, 8),
            5353,
            53,
            &[0; 12],
        );
        assert_eq!(ipv4_header_checksum(&pkt[..IPV4_HEADER_LEN]), 0);
    }

    #[test]
    fn test_checksum_known_vector() {
        // Classic example header from RFC 1071 walkthroughs
        let header = [
            0x45, 0x00, 0x00, 0x73, 0x00, 0x00, 0x40, 0x00, 0x40, 0x11, 0x00, 0x00, 0xc0, 0xa8,
            0x00, 0x01, 0xc0, 0xa8, 0x00, 0xc7,
        ];
        assert_eq!(ipv4_header_checksum(&header), 0xb861);
    }
}
