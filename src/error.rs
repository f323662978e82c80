//! Error types for tracelens.
//!
//! Two kinds of failure are kept apart on purpose:
//!
//! - [`Error`] is fatal to the whole run (bad capture format, truncated
//!   data, I/O).
//! - [`Fault`] is a structural integrity violation inside one
//!   reconstruction (a misordered fragment, a duplicate probe key). It
//!   kills only the affected reconstruction; the analyzer records it and
//!   keeps going.

use std::net::Ipv4Addr;

use thiserror::Error;

/// Main error type for tracelens operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Error reading or parsing the capture file
    #[error("capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Error decoding a protocol header
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to the capture file container.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// File not found
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// The pcapng magic is recognized but the format is not supported
    #[error("pcap Next Generation format not supported")]
    PcapNgUnsupported,

    /// Unknown magic number
    #[error("unrecognized capture format (magic {magic:#010x})")]
    UnrecognizedFormat { magic: u32 },

    /// Global header shorter than 24 bytes
    #[error("truncated global header: need 24 bytes, have {have}")]
    TruncatedGlobalHeader { have: usize },
}

/// Errors from protocol header decoders.
///
/// Raised when a record is long enough to reach a layer but too short to
/// hold that layer's header. Unsupported layers are not errors; they
/// leave the corresponding header absent instead.
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Region too short for the protocol header
    #[error("{layer}: header truncated (need {needed} bytes, have {have})")]
    Truncated {
        layer: &'static str,
        needed: usize,
        have: usize,
    },
}

/// Structural integrity violations.
///
/// Each variant carries enough context to diagnose the offending
/// reconstruction. The analyzer surfaces these and drops only the
/// reconstruction they belong to.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Fault {
    /// A TCP frame resolved to a connection but matched neither flow
    /// direction. Unreachable given key derivation; surfaced if it ever
    /// happens.
    #[error(
        "frame direction {src}:{src_port} -> {dst}:{dst_port} matches neither flow of its connection"
    )]
    FlowMismatch {
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
    },

    /// A fragment arrived at an offset other than the bytes received so far.
    #[error(
        "fragment offset mismatch for {src} -> {dst} id {ident}: expected {expected}, got {got}"
    )]
    FragmentOffset {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        ident: u16,
        expected: usize,
        got: usize,
    },

    /// Two probes registered under the same correlation key.
    #[error("duplicate probe key: {key}")]
    DuplicateProbeKey { key: String },

    /// A probe and its answer carry different inferred OS tags.
    #[error("probe/answer OS hint mismatch: probe {probe}, answer {answer}")]
    OsHintMismatch { probe: String, answer: String },
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
