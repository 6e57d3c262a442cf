//! Link-layer frame decoder: Ethernet II, IPv4/IPv6, TCP/UDP.
//!
//! [`decode`] never fails. It decodes as far as the captured bytes and header values allow;
//! the first violated precondition is recorded in [`DecodedFrame::error`] and every layer
//! after it is left out. Lengths are checked before any header is sliced, so truncated
//! captures cannot cause out-of-bounds reads.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};

use etherparse::{Ethernet2HeaderSlice, Ipv6HeaderSlice, TcpHeaderSlice, UdpHeaderSlice};
use log::trace;
use thiserror::Error;

pub const ETHERNET_HEADER_LEN: usize = 14;
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
pub const TCP_MIN_HEADER_LEN: usize = 20;
pub const UDP_HEADER_LEN: usize = 8;

pub mod ether_type {
    pub const IPV4: u16 = 0x0800;
    pub const IPV6: u16 = 0x86DD;
}

pub mod ip_protocol {
    pub const TCP: u8 = 6;
    pub const UDP: u8 = 17;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkLayer<'a> {
    Ethernet {
        destination: [u8; 6],
        source: [u8; 6],
        ether_type: u16,
    },
    /// Too short to be an Ethernet frame; holds the raw bytes.
    Unknown(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkLayer {
    Ipv4 {
        source: Ipv4Addr,
        destination: Ipv4Addr,
        ttl: u8,
        protocol: u8,
        /// Offset of the IPv4 payload from the start of the IPv4 header (IHL * 4).
        payload_offset: usize,
    },
    Ipv6 {
        source: Ipv6Addr,
        destination: Ipv6Addr,
        hop_limit: u8,
        next_header: u8,
        payload_length: u16,
    },
    /// Valid Ethernet frame carrying something other than IP.
    Unknown { ether_type: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportLayer {
    Tcp {
        source_port: u16,
        destination_port: u16,
        flags: TcpFlags,
        sequence: u32,
        acknowledgment: u32,
    },
    Udp {
        source_port: u16,
        destination_port: u16,
        length: u16,
    },
    /// IP payload of a protocol other than TCP or UDP.
    Unknown { protocol: u8 },
}

/// TCP control bits, NS in bit 8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct TcpFlags(u16);

impl TcpFlags {
    pub const FIN: TcpFlags = TcpFlags(0x001);
    pub const SYN: TcpFlags = TcpFlags(0x002);
    pub const RST: TcpFlags = TcpFlags(0x004);
    pub const PSH: TcpFlags = TcpFlags(0x008);
    pub const ACK: TcpFlags = TcpFlags(0x010);
    pub const URG: TcpFlags = TcpFlags(0x020);
    pub const ECE: TcpFlags = TcpFlags(0x040);
    pub const CWR: TcpFlags = TcpFlags(0x080);
    pub const NS: TcpFlags = TcpFlags(0x100);

    const NAMES: [(TcpFlags, &'static str); 9] = [
        (TcpFlags::NS, "NS"),
        (TcpFlags::CWR, "CWR"),
        (TcpFlags::ECE, "ECE"),
        (TcpFlags::URG, "URG"),
        (TcpFlags::ACK, "ACK"),
        (TcpFlags::PSH, "PSH"),
        (TcpFlags::RST, "RST"),
        (TcpFlags::SYN, "SYN"),
        (TcpFlags::FIN, "FIN"),
    ];

    pub const fn empty() -> Self {
        TcpFlags(0)
    }

    pub const fn bits(self) -> u16 {
        self.0
    }

    pub const fn from_bits_truncate(bits: u16) -> Self {
        TcpFlags(bits & 0x1ff)
    }

    pub const fn contains(self, other: TcpFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn from_header(tcp: &TcpHeaderSlice<'_>) -> Self {
        let bits = [
            (tcp.fin(), TcpFlags::FIN),
            (tcp.syn(), TcpFlags::SYN),
            (tcp.rst(), TcpFlags::RST),
            (tcp.psh(), TcpFlags::PSH),
            (tcp.ack(), TcpFlags::ACK),
            (tcp.urg(), TcpFlags::URG),
            (tcp.ece(), TcpFlags::ECE),
            (tcp.cwr(), TcpFlags::CWR),
            (tcp.ns(), TcpFlags::NS),
        ];
        bits.iter()
            .filter(|(set, _)| *set)
            .fold(TcpFlags::empty(), |acc, (_, flag)| acc | *flag)
    }
}

impl std::ops::BitOr for TcpFlags {
    type Output = TcpFlags;

    fn bitor(self, rhs: TcpFlags) -> TcpFlags {
        TcpFlags(self.0 | rhs.0)
    }
}

impl fmt::Display for TcpFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (flag, name) in TcpFlags::NAMES.iter().rev() {
            if self.contains(*flag) {
                if !first {
                    f.write_str(",")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Where and why decoding stopped early.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("ethernet header truncated ({have} of 14 bytes)")]
    TruncatedEthernet { have: usize },

    #[error("ipv4 header truncated ({have} of 20 bytes)")]
    TruncatedIpv4 { have: usize },

    #[error("ipv4 version field is {version}")]
    InvalidIpv4Version { version: u8 },

    #[error("ipv4 header length {ihl} words does not fit {have} bytes")]
    InvalidIpv4HeaderLength { ihl: u8, have: usize },

    #[error("ipv6 header truncated ({have} of 40 bytes)")]
    TruncatedIpv6 { have: usize },

    #[error("ipv6 version field is {version}")]
    InvalidIpv6Version { version: u8 },

    #[error("tcp header truncated ({have} of 20 bytes)")]
    TruncatedTcp { have: usize },

    #[error("tcp data offset {data_offset} words does not fit {have} bytes")]
    InvalidTcpHeader { data_offset: u8, have: usize },

    #[error("udp header truncated ({have} of 8 bytes)")]
    TruncatedUdp { have: usize },

    #[error("malformed {layer} header")]
    MalformedHeader { layer: &'static str },
}

/// A frame decoded as deep as its bytes allow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedFrame<'a> {
    pub link_layer: LinkLayer<'a>,
    pub network_layer: Option<NetworkLayer>,
    /// Also `None` for non-first IPv4 fragments, which carry no transport header.
    pub transport_layer: Option<TransportLayer>,
    /// Bytes following the deepest decoded header.
    pub payload: &'a [u8],
    pub error: Option<DecodeError>,
}

impl<'a> DecodedFrame<'a> {
    fn undecoded(raw: &'a [u8]) -> Self {
        DecodedFrame {
            link_layer: LinkLayer::Unknown(raw),
            network_layer: None,
            transport_layer: None,
            payload: raw,
            error: None,
        }
    }

    /// No layer was cut short by a truncated or invalid header.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

/// Decodes one Ethernet II frame.
pub fn decode(raw: &[u8]) -> DecodedFrame<'_> {
    let mut frame = DecodedFrame::undecoded(raw);

    if raw.len() < ETHERNET_HEADER_LEN {
        frame.error = Some(DecodeError::TruncatedEthernet { have: raw.len() });
        return frame;
    }
    let ethernet = match Ethernet2HeaderSlice::from_slice(raw) {
        Ok(ethernet) => ethernet,
        Err(err) => {
            trace!("ethernet slice rejected: {:?}", err);
            frame.error = Some(DecodeError::MalformedHeader { layer: "ethernet" });
            return frame;
        }
    };
    let ether_type = ethernet.ether_type();
    frame.link_layer = LinkLayer::Ethernet {
        destination: ethernet.destination(),
        source: ethernet.source(),
        ether_type,
    };
    frame.payload = &raw[ETHERNET_HEADER_LEN..];

    match ether_type {
        ether_type::IPV4 => decode_ipv4(&raw[ETHERNET_HEADER_LEN..], &mut frame),
        ether_type::IPV6 => decode_ipv6(&raw[ETHERNET_HEADER_LEN..], &mut frame),
        other => frame.network_layer = Some(NetworkLayer::Unknown { ether_type: other }),
    }
    frame
}

fn decode_ipv4<'a>(data: &'a [u8], frame: &mut DecodedFrame<'a>) {
    if data.len() < IPV4_MIN_HEADER_LEN {
        frame.error = Some(DecodeError::TruncatedIpv4 { have: data.len() });
        return;
    }
    let version = data[0] >> 4;
    if version != 4 {
        frame.error = Some(DecodeError::InvalidIpv4Version { version });
        return;
    }
    let ihl = data[0] & 0x0f;
    let header_len = usize::from(ihl) * 4;
    if ihl < 5 || header_len > data.len() {
        frame.error = Some(DecodeError::InvalidIpv4HeaderLength {
            ihl,
            have: data.len(),
        });
        return;
    }
    // read in place: etherparse rejects total_len < IHL*4, as seen on TSO/GSO captures
    let protocol = data[9];
    frame.network_layer = Some(NetworkLayer::Ipv4 {
        source: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
        destination: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        ttl: data[8],
        protocol,
        payload_offset: header_len,
    });

    // total length excludes Ethernet trailer padding; a zero length means "not filled in"
    let total_len = usize::from(u16::from_be_bytes([data[2], data[3]]));
    let end = if total_len < header_len {
        data.len()
    } else {
        total_len.min(data.len())
    };
    let payload = &data[header_len..end];
    frame.payload = payload;

    let fragment_offset = u16::from_be_bytes([data[6], data[7]]) & 0x1fff;
    if fragment_offset != 0 {
        trace!("ipv4 fragment at offset {}, transport not decoded", fragment_offset * 8);
        return;
    }
    decode_transport(protocol, payload, frame);
}

fn decode_ipv6<'a>(data: &'a [u8], frame: &mut DecodedFrame<'a>) {
    if data.len() < IPV6_HEADER_LEN {
        frame.error = Some(DecodeError::TruncatedIpv6 { have: data.len() });
        return;
    }
    let version = data[0] >> 4;
    if version != 6 {
        frame.error = Some(DecodeError::InvalidIpv6Version { version });
        return;
    }
    let ipv6 = match Ipv6HeaderSlice::from_slice(data) {
        Ok(ipv6) => ipv6,
        Err(err) => {
            trace!("ipv6 slice rejected: {:?}", err);
            frame.error = Some(DecodeError::MalformedHeader { layer: "ipv6" });
            return;
        }
    };
    let next_header = ipv6.next_header();
    let payload_length = ipv6.payload_length();
    frame.network_layer = Some(NetworkLayer::Ipv6 {
        source: ipv6.source_addr(),
        destination: ipv6.destination_addr(),
        hop_limit: ipv6.hop_limit(),
        next_header,
        payload_length,
    });

    let end = (IPV6_HEADER_LEN + usize::from(payload_length)).min(data.len());
    let payload = &data[IPV6_HEADER_LEN..end];
    frame.payload = payload;
    decode_transport(next_header, payload, frame);
}

fn decode_transport<'a>(protocol: u8, data: &'a [u8], frame: &mut DecodedFrame<'a>) {
    match protocol {
        ip_protocol::TCP => decode_tcp(data, frame),
        ip_protocol::UDP => decode_udp(data, frame),
        other => frame.transport_layer = Some(TransportLayer::Unknown { protocol: other }),
    }
}

fn decode_tcp<'a>(data: &'a [u8], frame: &mut DecodedFrame<'a>) {
    if data.len() < TCP_MIN_HEADER_LEN {
        frame.error = Some(DecodeError::TruncatedTcp { have: data.len() });
        return;
    }
    let data_offset = data[12] >> 4;
    let header_len = usize::from(data_offset) * 4;
    if data_offset < 5 || header_len > data.len() {
        frame.error = Some(DecodeError::InvalidTcpHeader {
            data_offset,
            have: data.len(),
        });
        return;
    }
    let tcp = match TcpHeaderSlice::from_slice(data) {
        Ok(tcp) => tcp,
        Err(err) => {
            trace!("tcp slice rejected: {:?}", err);
            frame.error = Some(DecodeError::MalformedHeader { layer: "tcp" });
            return;
        }
    };
    frame.transport_layer = Some(TransportLayer::Tcp {
        source_port: tcp.source_port(),
        destination_port: tcp.destination_port(),
        flags: TcpFlags::from_header(&tcp),
        sequence: tcp.sequence_number(),
        acknowledgment: tcp.acknowledgment_number(),
    });
    frame.payload = &data[header_len..];
}

fn decode_udp<'a>(data: &'a [u8], frame: &mut DecodedFrame<'a>) {
    if data.len() < UDP_HEADER_LEN {
        frame.error = Some(DecodeError::TruncatedUdp { have: data.len() });
        return;
    }
    let udp = match UdpHeaderSlice::from_slice(data) {
        Ok(udp) => udp,
        Err(err) => {
            trace!("udp slice rejected: {:?}", err);
            frame.error = Some(DecodeError::MalformedHeader { layer: "udp" });
            return;
        }
    };
    let length = udp.length();
    frame.transport_layer = Some(TransportLayer::Udp {
        source_port: udp.source_port(),
        destination_port: udp.destination_port(),
        length,
    });
    let end = usize::from(length).clamp(UDP_HEADER_LEN, data.len());
    frame.payload = &data[UDP_HEADER_LEN..end];
}

struct Mac<'a>(&'a [u8; 6]);

impl fmt::Display for Mac<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            m[0], m[1], m[2], m[3], m[4], m[5]
        )
    }
}

impl fmt::Display for DecodedFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link_layer {
            LinkLayer::Ethernet {
                destination,
                source,
                ether_type,
            } => write!(
                f,
                "ethernet {} > {} type {:#06x}",
                Mac(source),
                Mac(destination),
                ether_type
            )?,
            LinkLayer::Unknown(raw) => write!(f, "unknown link layer ({} bytes)", raw.len())?,
        }
        match &self.network_layer {
            Some(NetworkLayer::Ipv4 {
                source,
                destination,
                ttl,
                ..
            }) => write!(f, " | ipv4 {} > {} ttl {}", source, destination, ttl)?,
            Some(NetworkLayer::Ipv6 {
                source,
                destination,
                hop_limit,
                ..
            }) => write!(f, " | ipv6 {} > {} hlim {}", source, destination, hop_limit)?,
            Some(NetworkLayer::Unknown { .. }) | None => {}
        }
        match &self.transport_layer {
            Some(TransportLayer::Tcp {
                source_port,
                destination_port,
                flags,
                sequence,
                acknowledgment,
            }) => write!(
                f,
                " | tcp {} > {} [{}] seq {} ack {}",
                source_port, destination_port, flags, sequence, acknowledgment
            )?,
            Some(TransportLayer::Udp {
                source_port,
                destination_port,
                length,
            }) => write!(
                f,
                " | udp {} > {} len {}",
                source_port, destination_port, length
            )?,
            Some(TransportLayer::Unknown { protocol }) => write!(f, " | proto {}", protocol)?,
            None => {}
        }
        write!(f, " | {} payload bytes", self.payload.len())?;
        if let Some(error) = &self.error {
            write!(f, " ({})", error)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Ethernet + IPv4 (IHL 5, proto 6) + TCP SYN, 54 bytes, no payload.
    const TCP_SYN: [u8; 54] = [
        0x00, 0x11, 0x22, 0x33, 0x44, 0x55, // dst mac
        0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb, // src mac
        0x08, 0x00, // ethertype ipv4
        0x45, 0x00, 0x00, 0x28, // version/ihl, tos, total length 40
        0x1c, 0x46, 0x40, 0x00, // id, flags (DF)
        0x40, 0x06, 0x00, 0x00, // ttl 64, proto tcp, checksum
        0xc0, 0xa8, 0x00, 0x68, // 192.168.0.104
        0x0a, 0x00, 0x00, 0x01, // 10.0.0.1
        0xc3, 0x50, 0x00, 0x50, // 50000 -> 80
        0x00, 0x00, 0x00, 0x01, // seq 1
        0x00, 0x00, 0x00, 0x00, // ack 0
        0x50, 0x02, 0xfa, 0xf0, // data offset 5, SYN, window
        0x00, 0x00, 0x00, 0x00, // checksum, urgent
    ];

    fn udp_frame(payload: &[u8]) -> Vec<u8> {
        let udp_len = (UDP_HEADER_LEN + payload.len()) as u16;
        let total_len = 20 + udp_len;
        let mut frame = vec![
            0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01, 0x08, 0x00,
        ];
        frame.extend_from_slice(&[0x45, 0x00]);
        frame.extend_from_slice(&total_len.to_be_bytes());
        frame.extend_from_slice(&[
            0x12, 0x34, 0x00, 0x00, 0x80, 0x11, 0x00, 0x00, 10, 0, 0, 1, 10, 0, 0, 2,
        ]);
        frame.extend_from_slice(&[0x00, 0x35, 0xd4, 0x31]);
        frame.extend_from_slice(&udp_len.to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(payload);
        frame
    }

    #[test]
    fn short_input_is_unknown_link_layer() {
        for len in 0..ETHERNET_HEADER_LEN {
            let raw = &TCP_SYN[..len];
            let frame = decode(raw);
            assert_eq!(frame.link_layer, LinkLayer::Unknown(raw));
            assert!(frame.network_layer.is_none());
            assert!(frame.transport_layer.is_none());
            assert_eq!(frame.error, Some(DecodeError::TruncatedEthernet { have: len }));
        }
    }

    #[test]
    fn decodes_ipv4_tcp_fixture_field_for_field() {
        let frame = decode(&TCP_SYN);
        assert!(frame.is_complete());
        assert_eq!(
            frame.link_layer,
            LinkLayer::Ethernet {
                destination: [0x00, 0x11, 0x22, 0x33, 0x44, 0x55],
                source: [0x66, 0x77, 0x88, 0x99, 0xaa, 0xbb],
                ether_type: ether_type::IPV4,
            }
        );
        assert_eq!(
            frame.network_layer,
            Some(NetworkLayer::Ipv4 {
                source: Ipv4Addr::new(192, 168, 0, 104),
                destination: Ipv4Addr::new(10, 0, 0, 1),
                ttl: 64,
                protocol: ip_protocol::TCP,
                payload_offset: 20,
            })
        );
        assert_eq!(
            frame.transport_layer,
            Some(TransportLayer::Tcp {
                source_port: 50000,
                destination_port: 80,
                flags: TcpFlags::SYN,
                sequence: 1,
                acknowledgment: 0,
            })
        );
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn decodes_udp_and_trims_ethernet_padding() {
        let mut raw = udp_frame(b"abcd");
        // pad to the 60 byte ethernet minimum
        raw.resize(60, 0);
        let frame = decode(&raw);
        assert!(frame.is_complete());
        assert_eq!(
            frame.transport_layer,
            Some(TransportLayer::Udp {
                source_port: 53,
                destination_port: 54321,
                length: 12,
            })
        );
        assert_eq!(frame.payload, b"abcd");
    }

    #[test]
    fn non_ip_ethertype_keeps_payload_without_error() {
        let mut raw = TCP_SYN.to_vec();
        raw[12] = 0x08;
        raw[13] = 0x06; // ARP
        let frame = decode(&raw);
        assert!(frame.is_complete());
        assert_eq!(
            frame.network_layer,
            Some(NetworkLayer::Unknown { ether_type: 0x0806 })
        );
        assert!(frame.transport_layer.is_none());
        assert_eq!(frame.payload, &TCP_SYN[ETHERNET_HEADER_LEN..]);
    }

    #[test]
    fn bad_ihl_stops_at_network_layer() {
        let mut raw = TCP_SYN.to_vec();
        raw[14] = 0x44;
        let frame = decode(&raw);
        assert!(matches!(frame.link_layer, LinkLayer::Ethernet { .. }));
        assert!(frame.network_layer.is_none());
        assert_eq!(
            frame.error,
            Some(DecodeError::InvalidIpv4HeaderLength { ihl: 4, have: 40 })
        );

        // IHL of 15 words does not fit 40 bytes
        raw[14] = 0x4f;
        let frame = decode(&raw);
        assert!(frame.network_layer.is_none());
        assert_eq!(
            frame.error,
            Some(DecodeError::InvalidIpv4HeaderLength { ihl: 15, have: 40 })
        );
    }

    #[test]
    fn wrong_version_nibble_is_rejected() {
        let mut raw = TCP_SYN.to_vec();
        raw[14] = 0x65;
        let frame = decode(&raw);
        assert!(frame.network_layer.is_none());
        assert_eq!(
            frame.error,
            Some(DecodeError::InvalidIpv4Version { version: 6 })
        );
    }

    #[test]
    fn truncated_tcp_keeps_ip_layer() {
        // snapshot length cut the capture 10 bytes into the tcp header
        let raw = &TCP_SYN[..44];
        let frame = decode(raw);
        assert!(matches!(frame.network_layer, Some(NetworkLayer::Ipv4 { .. })));
        assert!(frame.transport_layer.is_none());
        assert_eq!(frame.error, Some(DecodeError::TruncatedTcp { have: 10 }));
        assert_eq!(frame.payload.len(), 10);
    }

    #[test]
    fn bad_tcp_data_offset() {
        let mut raw = TCP_SYN.to_vec();
        raw[46] = 0x40;
        let frame = decode(&raw);
        assert!(matches!(frame.network_layer, Some(NetworkLayer::Ipv4 { .. })));
        assert!(frame.transport_layer.is_none());
        assert_eq!(
            frame.error,
            Some(DecodeError::InvalidTcpHeader {
                data_offset: 4,
                have: 20,
            })
        );

        // 60 byte header claimed, 20 captured
        raw[46] = 0xf0;
        let frame = decode(&raw);
        assert!(frame.transport_layer.is_none());
        assert_eq!(
            frame.error,
            Some(DecodeError::InvalidTcpHeader {
                data_offset: 15,
                have: 20,
            })
        );
    }

    #[test]
    fn wrong_ipv6_version_nibble() {
        let mut raw = TCP_SYN[..12].to_vec();
        raw.extend_from_slice(&[0x86, 0xdd]);
        raw.extend_from_slice(&[0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x3b, 0x40]);
        raw.extend_from_slice(&[0u8; 32]);
        let frame = decode(&raw);
        assert!(frame.network_layer.is_none());
        assert_eq!(
            frame.error,
            Some(DecodeError::InvalidIpv6Version { version: 4 })
        );
    }

    #[test]
    fn udp_length_past_capture_is_clamped() {
        let mut raw = udp_frame(b"abcd");
        raw[38..40].copy_from_slice(&100u16.to_be_bytes());
        let frame = decode(&raw);
        assert!(frame.is_complete());
        assert_eq!(
            frame.transport_layer,
            Some(TransportLayer::Udp {
                source_port: 53,
                destination_port: 54321,
                length: 100,
            })
        );
        assert_eq!(frame.payload, b"abcd");
    }

    #[test]
    fn truncated_udp_header() {
        let raw = udp_frame(b"");
        let frame = decode(&raw[..ETHERNET_HEADER_LEN + 20 + 4]);
        assert!(frame.transport_layer.is_none());
        assert_eq!(frame.error, Some(DecodeError::TruncatedUdp { have: 4 }));
    }

    #[test]
    fn ipv4_options_shift_payload_offset() {
        let mut raw = TCP_SYN[..ETHERNET_HEADER_LEN].to_vec();
        raw.extend_from_slice(&[0x46, 0x00, 0x00, 0x2c]);
        raw.extend_from_slice(&TCP_SYN[18..34]);
        raw.extend_from_slice(&[0x01, 0x01, 0x01, 0x00]); // NOP NOP NOP EOL
        raw.extend_from_slice(&TCP_SYN[34..]);
        let frame = decode(&raw);
        assert!(frame.is_complete(), "{:?}", frame.error);
        assert!(matches!(
            frame.network_layer,
            Some(NetworkLayer::Ipv4 {
                payload_offset: 24,
                ..
            })
        ));
        assert!(matches!(
            frame.transport_layer,
            Some(TransportLayer::Tcp {
                destination_port: 80,
                ..
            })
        ));
    }

    #[test]
    fn later_fragment_has_no_transport_layer() {
        let mut raw = TCP_SYN[..34].to_vec();
        raw[16..18].copy_from_slice(&44u16.to_be_bytes());
        // MF clear, offset 185 * 8 = 1480
        raw[20..22].copy_from_slice(&[0x00, 0xb9]);
        raw.extend_from_slice(b"ABCDEFGHIJKLMNOPQRSTUVWX");
        let frame = decode(&raw);
        assert!(frame.is_complete());
        assert!(matches!(
            frame.network_layer,
            Some(NetworkLayer::Ipv4 {
                protocol: ip_protocol::TCP,
                ..
            })
        ));
        assert!(frame.transport_layer.is_none());
        assert_eq!(frame.payload, b"ABCDEFGHIJKLMNOPQRSTUVWX");

        // the first fragment still carries the tcp header
        let mut first = TCP_SYN.to_vec();
        first[20] = 0x20; // MF
        assert!(matches!(
            decode(&first).transport_layer,
            Some(TransportLayer::Tcp { .. })
        ));
    }

    #[test]
    fn zero_total_length_uses_captured_bytes() {
        let mut raw = TCP_SYN.to_vec();
        raw.extend_from_slice(b"seg");
        raw[16..18].copy_from_slice(&[0x00, 0x00]);
        let frame = decode(&raw);
        assert!(frame.is_complete(), "{:?}", frame.error);
        assert_eq!(
            frame.network_layer,
            Some(NetworkLayer::Ipv4 {
                source: Ipv4Addr::new(192, 168, 0, 104),
                destination: Ipv4Addr::new(10, 0, 0, 1),
                ttl: 64,
                protocol: ip_protocol::TCP,
                payload_offset: 20,
            })
        );
        assert!(matches!(
            frame.transport_layer,
            Some(TransportLayer::Tcp {
                destination_port: 80,
                ..
            })
        ));
        assert_eq!(frame.payload, b"seg");
    }

    #[test]
    fn decodes_ipv6_tcp() {
        let mut raw = vec![
            0x33, 0x33, 0x00, 0x00, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x00, 0x01, 0x86, 0xdd,
        ];
        raw.extend_from_slice(&[0x60, 0x00, 0x00, 0x00, 0x00, 0x18, 0x06, 0x40]);
        raw.extend_from_slice(&Ipv6Addr::LOCALHOST.octets());
        raw.extend_from_slice(&"fe80::1".parse::<Ipv6Addr>().unwrap().octets());
        // tcp: 443 -> 40000, SYN|ACK, 4 bytes payload
        raw.extend_from_slice(&[0x01, 0xbb, 0x9c, 0x40]);
        raw.extend_from_slice(&7u32.to_be_bytes());
        raw.extend_from_slice(&9u32.to_be_bytes());
        raw.extend_from_slice(&[0x50, 0x12, 0xff, 0xff, 0x00, 0x00, 0x00, 0x00]);
        raw.extend_from_slice(b"data");

        let frame = decode(&raw);
        assert!(frame.is_complete(), "{:?}", frame.error);
        assert_eq!(
            frame.network_layer,
            Some(NetworkLayer::Ipv6 {
                source: Ipv6Addr::LOCALHOST,
                destination: "fe80::1".parse().unwrap(),
                hop_limit: 64,
                next_header: ip_protocol::TCP,
                payload_length: 24,
            })
        );
        assert_eq!(
            frame.transport_layer,
            Some(TransportLayer::Tcp {
                source_port: 443,
                destination_port: 40000,
                flags: TcpFlags::SYN | TcpFlags::ACK,
                sequence: 7,
                acknowledgment: 9,
            })
        );
        assert_eq!(frame.payload, b"data");
    }

    #[test]
    fn truncated_ipv6_header() {
        let mut raw = TCP_SYN[..12].to_vec();
        raw.extend_from_slice(&[0x86, 0xdd, 0x60, 0x00, 0x00]);
        let frame = decode(&raw);
        assert!(frame.network_layer.is_none());
        assert_eq!(frame.error, Some(DecodeError::TruncatedIpv6 { have: 3 }));
    }

    #[test]
    fn other_ip_protocol_is_unknown_transport() {
        let mut raw = TCP_SYN.to_vec();
        raw[23] = 1; // ICMP
        let frame = decode(&raw);
        assert!(frame.is_complete());
        assert_eq!(
            frame.transport_layer,
            Some(TransportLayer::Unknown { protocol: 1 })
        );
        assert_eq!(frame.payload.len(), 20);
    }

    #[test]
    fn summary_line() {
        let line = decode(&TCP_SYN).to_string();
        assert_eq!(
            line,
            "ethernet 66:77:88:99:aa:bb > 00:11:22:33:44:55 type 0x0800 \
             | ipv4 192.168.0.104 > 10.0.0.1 ttl 64 \
             | tcp 50000 > 80 [SYN] seq 1 ack 0 | 0 payload bytes"
        );
        let short = decode(&TCP_SYN[..5]).to_string();
        assert!(short.starts_with("unknown link layer (5 bytes)"));
        assert!(short.ends_with("(ethernet header truncated (5 of 14 bytes))"));
    }

    #[test]
    fn flag_display_order() {
        let flags = TcpFlags::FIN | TcpFlags::ACK | TcpFlags::PSH;
        assert_eq!(flags.to_string(), "FIN,PSH,ACK");
        assert!(TcpFlags::empty().is_empty());
        assert_eq!(TcpFlags::from_bits_truncate(0xffff).bits(), 0x1ff);
    }
}
