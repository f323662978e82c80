//! Decoded capture frame.

use crate::protocol::{Ipv4Header, LinkHeader, TcpHeader, TransportHeader, UdpHeader};

/// One record from a capture, decoded through as many layers as the
/// engine supports. Created by the reader, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Record number (1-indexed).
    pub number: u64,

    /// Raw timestamp seconds from the record header.
    pub ts_sec: u32,

    /// Raw timestamp fraction (micro- or nanoseconds per the capture).
    pub ts_frac: u32,

    /// Seconds since the capture's first record. Always 0 for the first
    /// frame.
    pub time_s: f64,

    /// Captured length (may be less than original).
    pub captured_len: u32,

    /// Original length on the wire.
    pub original_len: u32,

    /// Decoded link-layer header, if the link type is supported.
    pub link: Option<LinkHeader>,

    /// Decoded network header, if reached.
    pub network: Option<Ipv4Header>,

    /// Decoded transport header, if reached.
    pub transport: Option<TransportHeader>,

    /// Trailing application payload. May be empty.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Check if the record was truncated during capture.
    pub fn is_truncated(&self) -> bool {
        self.captured_len < self.original_len
    }

    /// Network and TCP headers together, when this is a TCP frame.
    pub fn tcp(&self) -> Option<(&Ipv4Header, &TcpHeader)> {
        let ip = self.network.as_ref()?;
        let tcp = self.transport.as_ref()?.as_tcp()?;
        Some((ip, tcp))
    }

    /// Network and UDP headers together, when this is a UDP frame.
    pub fn udp(&self) -> Option<(&Ipv4Header, &UdpHeader)> {
        let ip = self.network.as_ref()?;
        let udp = self.transport.as_ref()?.as_udp()?;
        Some((ip, udp))
    }
}
