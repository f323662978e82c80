//! IPv4 fragment reassembly for traceroute probes.
//!
//! Fragments are expected strictly in order: each one's byte offset must
//! equal the bytes collected so far, so the offset-0 fragment opens the
//! datagram and the MF-clear fragment fixes its total length. A fragment
//! that breaks the sequence retires the whole pending datagram with a
//! fault.

use std::collections::hash_map::Entry;
use std::collections::{BTreeSet, HashMap};
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use super::{key_from_layers, OsHint, Probe, ProbeKey};
use crate::error::Fault;
use crate::pcap::Frame;

/// Identity of one fragmented datagram on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FragmentKey {
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    pub ident: u16,
}

/// How a completed datagram was cut up: how many pieces, and the byte
/// offset of the last one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ReassemblyShape {
    pub fragment_count: usize,
    pub final_fragment_offset: usize,
}

/// A datagram still missing fragments.
#[derive(Debug)]
struct PendingDatagram {
    src: Ipv4Addr,
    dst: Ipv4Addr,
    /// TTL of the offset-0 fragment.
    ttl: u8,
    /// Correlation key from the offset-0 fragment. Only UDP probes are
    /// fragmented in practice, so only UDP keys are kept.
    key: Option<ProbeKey>,
    times: Vec<f64>,
    bytes_received: usize,
    /// Fixed once the MF-clear fragment arrives.
    total: Option<usize>,
    final_fragment_offset: usize,
}

/// Rebuilds fragmented probe datagrams and reports how they were split.
#[derive(Debug, Default)]
pub struct FragmentReassembler {
    pending: HashMap<FragmentKey, PendingDatagram>,
    shapes: BTreeSet<ReassemblyShape>,
    completed: usize,
}

impl FragmentReassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment in. Completing a datagram that is a traceroute
    /// probe yields a synthetic [`Probe`] stamped with the mean capture
    /// time of its fragments and the addressing of the first fragment.
    ///
    /// Non-fragment frames pass through untouched.
    pub fn process(&mut self, frame: &Frame) -> Result<Option<Probe>, Fault> {
        let Some(ip) = frame.network.as_ref() else {
            return Ok(None);
        };
        if !ip.is_fragment() {
            return Ok(None);
        }

        let key = FragmentKey {
            src: ip.src,
            dst: ip.dst,
            ident: ip.identification,
        };
        let offset = ip.fragment_byte_offset();
        let len = ip.payload_len();

        match self.pending.entry(key) {
            Entry::Occupied(occupied) => {
                let expected = occupied.get().bytes_received;
                if offset != expected {
                    occupied.remove();
                    return Err(Fault::FragmentOffset {
                        src: key.src,
                        dst: key.dst,
                        ident: key.ident,
                        expected,
                        got: offset,
                    });
                }
            }
            Entry::Vacant(vacant) => {
                if offset != 0 {
                    return Err(Fault::FragmentOffset {
                        src: key.src,
                        dst: key.dst,
                        ident: key.ident,
                        expected: 0,
                        got: offset,
                    });
                }
                trace!(src = %key.src, dst = %key.dst, ident = key.ident, "new fragmented datagram");
                let probe_key = frame
                    .transport
                    .as_ref()
                    .and_then(|t| key_from_layers(ip.src, ip.dst, t))
                    .map(|(key, _)| key)
                    .filter(|key| matches!(key, ProbeKey::Udp { .. }));
                vacant.insert(PendingDatagram {
                    src: ip.src,
                    dst: ip.dst,
                    ttl: ip.ttl,
                    key: probe_key,
                    times: Vec::new(),
                    bytes_received: 0,
                    total: None,
                    final_fragment_offset: 0,
                });
            }
        }

        let Some(entry) = self.pending.get_mut(&key) else {
            return Ok(None);
        };
        entry.bytes_received += len;
        entry.times.push(frame.time_s);
        if !ip.more_fragments {
            entry.total = Some(offset + len);
            entry.final_fragment_offset = offset;
        }

        if entry.total != Some(entry.bytes_received) {
            return Ok(None);
        }

        // Datagram complete
        let Some(entry) = self.pending.remove(&key) else {
            return Ok(None);
        };
        self.completed += 1;
        self.shapes.insert(ReassemblyShape {
            fragment_count: entry.times.len(),
            final_fragment_offset: entry.final_fragment_offset,
        });
        debug!(
            src = %entry.src,
            dst = %entry.dst,
            fragments = entry.times.len(),
            bytes = entry.bytes_received,
            "datagram reassembled"
        );

        let Some(probe_key) = entry.key else {
            return Ok(None);
        };
        let mean_time = entry.times.iter().sum::<f64>() / entry.times.len() as f64;
        Ok(Some(Probe {
            time_s: mean_time,
            src: entry.src,
            dst: entry.dst,
            ttl: entry.ttl,
            // Fragmented probes are the UDP flavor
            os: OsHint::Linux,
            key: probe_key,
            icmp_identifier: None,
        }))
    }

    /// Shapes of every datagram completed so far, ordered.
    pub fn shapes(&self) -> &BTreeSet<ReassemblyShape> {
        &self.shapes
    }

    pub fn completed_count(&self) -> usize {
        self.completed
    }

    /// Datagrams still missing fragments.
    pub fn open_count(&self) -> usize {
        self.pending.len()
    }
}
