//! TCP header decoder.

use crate::error::DecodeError;

/// Minimum TCP header length (no options).
pub const MIN_HEADER_LEN: usize = 20;

/// The nine TCP flags, decoded from the 9-bit flag word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TcpFlags {
    pub ns: bool,
    pub cwr: bool,
    pub ece: bool,
    pub urg: bool,
    pub ack: bool,
    pub psh: bool,
    pub rst: bool,
    pub syn: bool,
    pub fin: bool,
}

impl TcpFlags {
    /// Split the low nine bits of the offset/flags word into named flags.
    pub fn from_word(flags: u16) -> Self {
        Self {
            ns: flags & 0x100 != 0,
            cwr: flags & 0x080 != 0,
            ece: flags & 0x040 != 0,
            urg: flags & 0x020 != 0,
            ack: flags & 0x010 != 0,
            psh: flags & 0x008 != 0,
            rst: flags & 0x004 != 0,
            syn: flags & 0x002 != 0,
            fin: flags & 0x001 != 0,
        }
    }
}

/// Decoded TCP header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcpHeader {
    pub src_port: u16,
    pub dst_port: u16,
    pub seq: u32,
    pub ack: u32,
    pub data_offset: u8,
    pub flags: TcpFlags,
    pub window: u16,
    pub checksum: u16,
    pub urgent_pointer: u16,
}

impl TcpHeader {
    /// Decode a TCP header, returning the header and the segment payload.
    /// The header extent comes from the data-offset field.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), DecodeError> {
        if data.len() < MIN_HEADER_LEN {
            return Err(DecodeError::Truncated {
                layer: "tcp",
                needed: MIN_HEADER_LEN,
                have: data.len(),
            });
        }

        let offset_flags = u16::from_be_bytes([data[12], data[13]]);
        let data_offset = ((offset_flags >> 12) & 0x0f) as u8;
        let header_len = data_offset as usize * 4;
        if data.len() < header_len {
            return Err(DecodeError::Truncated {
                layer: "tcp",
                needed: header_len,
                have: data.len(),
            });
        }

        let header = Self {
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst_port: u16::from_be_bytes([data[2], data[3]]),
            seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ack: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            data_offset,
            flags: TcpFlags::from_word(offset_flags & 0x01ff),
            window: u16::from_be_bytes([data[14], data[15]]),
            checksum: u16::from_be_bytes([data[16], data[17]]),
            urgent_pointer: u16::from_be_bytes([data[18], data[19]]),
        };

        Ok((header, &data[header_len..]))
    }

    /// Header length in bytes, from the data-offset field.
    pub fn header_len(&self) -> usize {
        self.data_offset as usize * 4
    }
}
