//! UDP header decoder.

use crate::error::DecodeError;

/// Fixed UDP header length.
pub const HEADER_LEN: usize = 8;

/// Decoded UDP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UdpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    /// Length of header plus payload, from the wire.
    pub length: u16,
    pub checksum: u16,
}

impl UdpHeader {
    /// Decode a UDP header, returning the header and the datagram payload.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                layer: "udp",
                needed: HEADER_LEN,
                have: data.len(),
            });
        }

        let header = Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            length: u16::from_be_bytes([data[4], data[5]]),
            checksum: u16::from_be_bytes([data[6], data[7]]),
        };

        Ok((header, &data[HEADER_LEN..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_udp() {
        let header = [
            0xc0, 0x00, // Src port: 49152
            0x82, 0x9b, // Dst port: 33435
            0x00, 0x20, // Length: 32
            0x00, 0x00, // Checksum
            0xde, 0xad, // payload
        ];

        let (udp, payload) = UdpHeader::decode(&header).unwrap();
        assert_eq!(udp.src_port, 49152);
        assert_eq!(udp.dst_port, 33435);
        assert_eq!(udp.length, 32);
        assert_eq!(payload, &[0xde, 0xad]);
    }

    #[test]
    fn decode_udp_too_short() {
        let err = UdpHeader::decode(&[0xc0, 0x00, 0x00, 0x35]).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::Truncated {
                layer: "udp",
                needed: 8,
                have: 4,
            }
        ));
    }
}
