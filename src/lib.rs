//! Offline network trace analysis.
//!
//! tracelens reads a legacy pcap capture (optionally gzipped), decodes
//! Ethernet/IPv4/TCP/UDP/ICMP headers, and reconstructs two higher-level
//! views of the traffic: TCP connection statistics and the path a
//! traceroute run took through the network, fragmented probes included.
//!
//! ```no_run
//! use tracelens::{Analyzer, CaptureReader};
//!
//! # fn main() -> anyhow::Result<()> {
//! let reader = CaptureReader::open("trace.pcap")?;
//! let analysis = Analyzer::run(reader)?;
//! println!("{}", tracelens::report::render(&analysis));
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod connection;
pub mod error;
pub mod pcap;
pub mod protocol;
pub mod report;
pub mod trace;

pub use analyzer::{Analysis, Analyzer};
pub use error::{Error, Fault, Result};
pub use pcap::{CaptureReader, Frame};
