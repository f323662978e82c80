//! Protocol header decoders and layer dispatch.
//!
//! Each decoder is a pure function from a byte slice to a structured
//! header plus the remaining payload. Dispatch between layers goes
//! through closed protocol-identifier enums: adding a protocol means
//! adding a variant and a match arm.
//!
//! All multi-byte protocol integers are network byte order. The capture
//! file's own byte order applies only to the capture container, never
//! here.

mod ethernet;
mod icmp;
mod ipv4;
mod tcp;
mod udp;

pub use ethernet::{ethertype, format_mac, EthernetHeader, LINKTYPE_ETHERNET};
pub use icmp::{icmp_type, IcmpHeader, IcmpMessage};
pub use ipv4::Ipv4Header;
pub use tcp::{TcpFlags, TcpHeader};
pub use udp::UdpHeader;

use crate::error::DecodeError;

/// Supported link-layer types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    Ethernet,
}

impl LinkType {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            LINKTYPE_ETHERNET => Some(Self::Ethernet),
            _ => None,
        }
    }
}

/// Recognized EtherTypes. ARP and IPv6 are extension stubs: recognized,
/// but with no decoder behind them yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EtherType {
    Ipv4,
    Arp,
    Ipv6,
}

impl EtherType {
    pub fn from_raw(raw: u16) -> Option<Self> {
        match raw {
            ethertype::IPV4 => Some(Self::Ipv4),
            ethertype::ARP => Some(Self::Arp),
            ethertype::IPV6 => Some(Self::Ipv6),
            _ => None,
        }
    }
}

/// Supported IP protocol numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IpProtocol {
    Icmp,
    Tcp,
    Udp,
}

impl IpProtocol {
    pub fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Icmp),
            6 => Some(Self::Tcp),
            17 => Some(Self::Udp),
            _ => None,
        }
    }

    pub fn raw(self) -> u8 {
        match self {
            Self::Icmp => 1,
            Self::Tcp => 6,
            Self::Udp => 17,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Icmp => "ICMP",
            Self::Tcp => "TCP",
            Self::Udp => "UDP",
        }
    }
}

/// Decoded link-layer header. One variant per supported link type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkHeader {
    Ethernet(EthernetHeader),
}

/// Decoded transport-layer header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHeader {
    Tcp(TcpHeader),
    Udp(UdpHeader),
    Icmp(IcmpHeader),
}

impl TransportHeader {
    pub fn as_tcp(&self) -> Option<&TcpHeader> {
        match self {
            Self::Tcp(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_udp(&self) -> Option<&UdpHeader> {
        match self {
            Self::Udp(h) => Some(h),
            _ => None,
        }
    }

    pub fn as_icmp(&self) -> Option<&IcmpHeader> {
        match self {
            Self::Icmp(h) => Some(h),
            _ => None,
        }
    }
}

/// All decoded layers of one captured frame, plus the trailing
/// application payload. Layers the engine cannot decode stay `None`;
/// downstream code treats that as "not applicable", not as a fault.
#[derive(Debug, Clone, Default)]
pub struct DecodedLayers {
    pub link: Option<LinkHeader>,
    pub network: Option<Ipv4Header>,
    pub transport: Option<TransportHeader>,
    pub payload: Vec<u8>,
}

/// Drive link -> network -> transport decoding over one frame's bytes.
///
/// Unsupported link types, EtherTypes, and IP protocols stop decoding at
/// that layer. Headers that are reached but physically truncated are a
/// hard [`DecodeError`].
pub fn decode_layers(link_type: u32, data: &[u8]) -> Result<DecodedLayers, DecodeError> {
    let mut layers = DecodedLayers::default();

    let Some(link) = LinkType::from_raw(link_type) else {
        return Ok(layers);
    };

    match link {
        LinkType::Ethernet => {
            let (eth, rest) = EthernetHeader::decode(data)?;
            let ether_type = EtherType::from_raw(eth.ethertype);
            layers.link = Some(LinkHeader::Ethernet(eth));

            match ether_type {
                Some(EtherType::Ipv4) => {
                    let (ip, rest) = Ipv4Header::decode(rest)?;
                    // Clip to the datagram's declared length so Ethernet
                    // trailer padding never counts as payload.
                    let datagram = &rest[..ip.payload_len().min(rest.len())];
                    // A non-first fragment carries mid-datagram bytes
                    // where a transport header would otherwise sit.
                    let (transport, payload) = if ip.fragment_offset == 0 {
                        decode_transport(ip.protocol, datagram)?
                    } else {
                        (None, datagram)
                    };
                    layers.network = Some(ip);
                    layers.transport = transport;
                    layers.payload = payload.to_vec();
                }
                // Recognized but not decoded yet
                Some(EtherType::Arp) | Some(EtherType::Ipv6) | None => {}
            }
        }
    }

    Ok(layers)
}

fn decode_transport(
    protocol: u8,
    data: &[u8],
) -> Result<(Option<TransportHeader>, &[u8]), DecodeError> {
    match IpProtocol::from_raw(protocol) {
        Some(IpProtocol::Tcp) => {
            let (tcp, payload) = TcpHeader::decode(data)?;
            Ok((Some(TransportHeader::Tcp(tcp)), payload))
        }
        Some(IpProtocol::Udp) => {
            let (udp, payload) = UdpHeader::decode(data)?;
            Ok((Some(TransportHeader::Udp(udp)), payload))
        }
        Some(IpProtocol::Icmp) => {
            let (icmp, payload) = IcmpHeader::decode(data)?;
            Ok((Some(TransportHeader::Icmp(icmp)), payload))
        }
        None => Ok((None, &[])),
    }
}

/// Decode the original datagram embedded in an ICMP error payload:
/// network and transport headers starting at the ICMP payload offset.
///
/// Returns `None` when the embedded bytes cannot be decoded; the caller
/// treats such an answer as unmatchable rather than failing.
pub fn decode_embedded_datagram(data: &[u8]) -> Option<(Ipv4Header, TransportHeader)> {
    let (ip, rest) = Ipv4Header::decode(data).ok()?;
    let (transport, _) = decode_transport(ip.protocol, rest).ok()?;
    Some((ip, transport?))
}
