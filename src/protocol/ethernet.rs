//! Ethernet II header decoder.

use crate::error::DecodeError;

/// Link type constant for Ethernet.
pub const LINKTYPE_ETHERNET: u32 = 1;

/// Fixed Ethernet II header length.
pub const HEADER_LEN: usize = 14;

/// Well-known EtherTypes.
pub mod ethertype {
    pub const IPV4: u16 = 0x0800;
    pub const ARP: u16 = 0x0806;
    pub const IPV6: u16 = 0x86DD;
}

/// Decoded Ethernet II header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EthernetHeader {
    pub dst_mac: [u8; 6],
    pub src_mac: [u8; 6],
    pub ethertype: u16,
}

impl EthernetHeader {
    /// Decode an Ethernet II header, returning the header and the payload
    /// that follows it.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if data.len() < HEADER_LEN {
            return Err(DecodeError::Truncated {
                layer: "ethernet",
                needed: HEADER_LEN,
                have: data.len(),
            });
        }

        let mut dst_mac = [0u8; 6];
        dst_mac.copy_from_slice(&data[0..6]);
        let mut src_mac = [0u8; 6];
        src_mac.copy_from_slice(&data[6..12]);
        let ethertype = u16::from_be_bytes([data[12], data[13]]);

        Ok((
            Self {
                dst_mac,
                src_mac,
                ethertype,
            },
            &data[HEADER_LEN..],
        ))
    }
}

/// Format 6 bytes as a MAC address string in colon-separated hex format.
pub fn format_mac(mac: &[u8; 6]) -> String {
    format!(
        "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
        mac[0], mac[1], mac[2], mac[3], mac[4], mac[5]
    )
}
