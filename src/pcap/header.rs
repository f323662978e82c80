//! Capture global header parsing.

use crate::error::CaptureError;

/// Length of the legacy pcap global header.
pub const GLOBAL_HEADER_LEN: usize = 24;

/// Length of a per-record header.
pub const RECORD_HEADER_LEN: usize = 16;

/// pcap magic numbers, as read big-endian from the first four bytes.
pub mod magic {
    pub const MICRO_BE: u32 = 0xa1b2c3d4;
    pub const MICRO_LE: u32 = 0xd4c3b2a1;
    pub const NANO_BE: u32 = 0xa1b23c4d;
    pub const NANO_LE: u32 = 0x4d3cb2a1;
    /// pcapng section header magic: recognized, deliberately unsupported.
    pub const PCAPNG: u32 = 0x0a0d0d0a;
}

/// Byte order of the capture container's integers. Governs only the
/// global and record headers; protocol fields are always network order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    pub fn read_u16(self, bytes: [u8; 2]) -> u16 {
        match self {
            Self::Big => u16::from_be_bytes(bytes),
            Self::Little => u16::from_le_bytes(bytes),
        }
    }

    pub fn read_u32(self, bytes: [u8; 4]) -> u32 {
        match self {
            Self::Big => u32::from_be_bytes(bytes),
            Self::Little => u32::from_le_bytes(bytes),
        }
    }
}

/// Resolution of the record timestamp fraction field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimestampResolution {
    Microsecond,
    Nanosecond,
}

impl TimestampResolution {
    /// Seconds represented by one unit of the fraction field.
    pub fn fraction_seconds(self) -> f64 {
        match self {
            Self::Microsecond => 1e-6,
            Self::Nanosecond => 1e-9,
        }
    }
}

/// Parsed pcap global header. Parsed once per capture; immutable for the
/// session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureHeader {
    pub byte_order: ByteOrder,
    pub resolution: TimestampResolution,
    pub version_major: u16,
    pub version_minor: u16,
    pub thiszone: i32,
    pub sigfigs: u32,
    pub snaplen: u32,
    pub link_type: u32,
}

impl CaptureHeader {
    /// Parse the 24-byte global header. The magic number selects both the
    /// byte order and the timestamp resolution; the pcapng magic fails
    /// fast with its own error.
    pub fn parse(data: &[u8]) -> Result<Self, CaptureError> {
        if data.len() < GLOBAL_HEADER_LEN {
            return Err(CaptureError::TruncatedGlobalHeader { have: data.len() });
        }

        let raw_magic = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let (byte_order, resolution) = match raw_magic {
            magic::MICRO_BE => (ByteOrder::Big, TimestampResolution::Microsecond),
            magic::MICRO_LE => (ByteOrder::Little, TimestampResolution::Microsecond),
            magic::NANO_BE => (ByteOrder::Big, TimestampResolution::Nanosecond),
            magic::NANO_LE => (ByteOrder::Little, TimestampResolution::Nanosecond),
            magic::PCAPNG => return Err(CaptureError::PcapNgUnsupported),
            other => return Err(CaptureError::UnrecognizedFormat { magic: other }),
        };

        Ok(Self {
            byte_order,
            resolution,
            version_major: byte_order.read_u16([data[4], data[5]]),
            version_minor: byte_order.read_u16([data[6], data[7]]),
            thiszone: byte_order.read_u32([data[8], data[9], data[10], data[11]]) as i32,
            sigfigs: byte_order.read_u32([data[12], data[13], data[14], data[15]]),
            snaplen: byte_order.read_u32([data[16], data[17], data[18], data[19]]),
            link_type: byte_order.read_u32([data[20], data[21], data[22], data[23]]),
        })
    }
}
