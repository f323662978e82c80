//! Legacy pcap container support.
//!
//! Only the classic tcpdump format is handled; pcapng is recognized by
//! its section header magic and rejected with a dedicated error.

mod frame;
pub mod header;
mod reader;

pub use frame::Frame;
pub use header::{magic, ByteOrder, CaptureHeader, TimestampResolution};
pub use reader::CaptureReader;
