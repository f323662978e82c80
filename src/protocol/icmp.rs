//! ICMP header decoder.
//!
//! Decoding branches on the message type: echo request/reply carry an
//! identifier and sequence number; destination-unreachable and
//! time-exceeded carry the offending original datagram in their payload,
//! which callers decode recursively when correlating answers.

use crate::error::DecodeError;

/// ICMP message types the engine cares about.
pub mod icmp_type {
    pub const ECHO_REPLY: u8 = 0;
    pub const DEST_UNREACHABLE: u8 = 3;
    pub const ECHO_REQUEST: u8 = 8;
    pub const TIME_EXCEEDED: u8 = 11;
}

/// Minimum ICMP header length.
pub const MIN_HEADER_LEN: usize = 8;

/// Type-specific part of an ICMP message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IcmpMessage {
    /// Echo request or reply.
    Echo { identifier: u16, sequence: u16 },
    /// Destination unreachable or time exceeded; the payload slice holds
    /// the embedded original datagram.
    EmbeddedDatagram,
    /// Any other message type.
    Other,
}

/// Decoded ICMP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcmpHeader {
    pub icmp_type: u8,
    pub code: u8,
    pub checksum: u16,
    pub message: IcmpMessage,
}

impl IcmpHeader {
    /// Decode an ICMP header, returning the header and the payload.
    ///
    /// For echo and embedded-datagram messages the payload starts at byte
    /// 8; for other types it starts right after the checksum.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(DecodeError::Truncated {
                layer: "icmp",
                needed: MIN_HEADER_LEN,
                have: data.len(),
            });
        }

        let icmp_type = data[0];
        let code = data[1];
        let checksum = u16::from_be_bytes([data[2], data[3]]);

        let (message, payload) = match icmp_type {
            icmp_type::ECHO_REQUEST | icmp_type::ECHO_REPLY => (
                IcmpMessage::Echo {
                    identifier: u16::from_be_bytes([data[4], data[5]]),
                    sequence: u16::from_be_bytes([data[6], data[7]]),
                },
                &data[8..],
            ),
            icmp_type::DEST_UNREACHABLE | icmp_type::TIME_EXCEEDED => {
                (IcmpMessage::EmbeddedDatagram, &data[8..])
            }
            _ => (IcmpMessage::Other, &data[4..]),
        };

        Ok((
            Self {
                icmp_type,
                code,
                checksum,
                message,
            },
            payload,
        ))
    }

    /// True for echo requests, the ICMP flavor of a traceroute probe.
    pub fn is_echo_request(&self) -> bool {
        self.icmp_type == icmp_type::ECHO_REQUEST
    }

    /// True for the message types that answer a traceroute probe.
    pub fn is_probe_answer(&self) -> bool {
        matches!(
            self.icmp_type,
            icmp_type::DEST_UNREACHABLE | icmp_type::TIME_EXCEEDED
        )
    }
}
