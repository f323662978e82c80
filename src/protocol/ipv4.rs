//! IPv4 header decoder.

use std::net::Ipv4Addr;

use crate::error::DecodeError;

/// Minimum IPv4 header length (no options).
pub const MIN_HEADER_LEN: usize = 20;

/// Decoded IPv4 header.
///
/// The flags/fragment-offset word is split into named fields:
/// `dont_fragment`, `more_fragments`, and the 13-bit `fragment_offset`
/// in 8-byte units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Header {
    pub version: u8,
    pub ihl: u8,
    pub tos: u8,
    pub total_length: u16,
    pub identification: u16,
    pub dont_fragment: bool,
    pub more_fragments: bool,
    pub fragment_offset: u16,
    pub ttl: u8,
    pub protocol: u8,
    pub checksum: u16,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
}

impl Ipv4Header {
    /// Decode an IPv4 header, returning the header and the payload after
    /// the options region. The header extent comes from the IHL field.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(DecodeError::Truncated {
                layer: "ipv4",
                needed: MIN_HEADER_LEN,
                have: data.len(),
            });
        }

        let version = data[0] >> 4;
        let ihl = data[0] & 0x0f;
        let header_len = ihl as usize * 4;
        if data.len() < header_len {
            return Err(DecodeError::Truncated {
                layer: "ipv4",
                needed: header_len,
                have: data.len(),
            });
        }

        let flags_offset = u16::from_be_bytes([data[6], data[7]]);
        let flags = flags_offset >> 13;

        let header = Self {
            version,
            ihl,
            tos: data[1],
            total_length: u16::from_be_bytes([data[2], data[3]]),
            identification: u16::from_be_bytes([data[4], data[5]]),
            dont_fragment: flags & 0x02 != 0,
            more_fragments: flags & 0x01 != 0,
            fragment_offset: flags_offset & 0x1fff,
            ttl: data[8],
            protocol: data[9],
            checksum: u16::from_be_bytes([data[10], data[11]]),
            src: Ipv4Addr::new(data[12], data[13], data[14], data[15]),
            dst: Ipv4Addr::new(data[16], data[17], data[18], data[19]),
        };

        Ok((header, &data[header_len..]))
    }

    /// Header length in bytes, from the IHL field.
    pub fn header_len(&self) -> usize {
        self.ihl as usize * 4
    }

    /// Payload bytes carried by this datagram (or fragment).
    pub fn payload_len(&self) -> usize {
        (self.total_length as usize).saturating_sub(self.header_len())
    }

    /// Fragment byte offset within the original datagram.
    pub fn fragment_byte_offset(&self) -> usize {
        self.fragment_offset as usize * 8
    }

    /// True if this datagram is one fragment of a larger one.
    pub fn is_fragment(&self) -> bool {
        self.more_fragments || self.fragment_offset != 0
    }
}
