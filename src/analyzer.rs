//! The analysis engine: one pass over a capture, every reconstruction
//! fed in parallel.
//!
//! Routing per frame: fragments go to reassembly and nowhere else; TCP
//! frames go to connection tracking; everything else is offered to
//! probe and answer classification. Structural faults retire only the
//! reconstruction they belong to and are collected on the final
//! [`Analysis`].

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::connection::stats::ConnectionStats;
use crate::connection::{Connection, ConnectionTracker};
use crate::error::{Error, Fault};
use crate::pcap::{CaptureReader, Frame};
use crate::trace::fragment::{FragmentReassembler, ReassemblyShape};
use crate::trace::route::TraceRoute;
use crate::trace::{Answer, Probe, ProbeAnswer, ProbeCorrelator};

/// Everything the engine learned from one capture.
#[derive(Debug)]
pub struct Analysis {
    pub frame_count: u64,
    pub connections: Vec<Connection>,
    pub stats: ConnectionStats,
    pub traceroute: TraceRoute,
    pub probe_pairs: Vec<ProbeAnswer>,
    /// Distinct ways completed datagrams were fragmented.
    pub reassembly_shapes: BTreeSet<ReassemblyShape>,
    pub completed_reassemblies: usize,
    /// Datagrams still missing fragments when the capture ended.
    pub open_reassemblies: usize,
    /// IP protocol numbers observed in traceroute traffic.
    pub protocols: BTreeSet<u8>,
    pub faults: Vec<Fault>,
}

/// Single-pass analyzer over capture frames.
#[derive(Debug, Default)]
pub struct Analyzer {
    tracker: ConnectionTracker,
    reassembler: FragmentReassembler,
    correlator: ProbeCorrelator,
    protocols: BTreeSet<u8>,
    faults: Vec<Fault>,
    frame_count: u64,
}

impl Analyzer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route one frame to the reconstruction it belongs to.
    pub fn process_frame(&mut self, frame: &Frame) {
        self.frame_count += 1;

        // The tracker sees every frame; a fragmented datagram's head
        // still carries its TCP header. Non-TCP frames are a no-op here.
        if let Err(fault) = self.tracker.process(frame) {
            self.record_fault(fault);
        }

        if frame.network.as_ref().is_some_and(|ip| ip.is_fragment()) {
            match self.reassembler.process(frame) {
                Ok(Some(probe)) => {
                    // The datagram's protocol counts only once it is whole
                    self.protocols.insert(probe.key.protocol().raw());
                    self.register_probe(probe);
                }
                Ok(None) => {}
                Err(fault) => self.record_fault(fault),
            }
            return;
        }

        if frame.tcp().is_some() {
            return;
        }

        if let Some(probe) = Probe::from_frame(frame) {
            self.protocols.insert(probe.key.protocol().raw());
            self.register_probe(probe);
            return;
        }

        if let Some(answer) = Answer::from_frame(frame) {
            if let Some(ip) = frame.network.as_ref() {
                self.protocols.insert(ip.protocol);
            }
            self.correlator.buffer_answer(answer);
        }
    }

    fn register_probe(&mut self, probe: Probe) {
        if let Err(fault) = self.correlator.register_probe(probe) {
            self.record_fault(fault);
        }
    }

    fn record_fault(&mut self, fault: Fault) {
        warn!(%fault, "reconstruction fault");
        self.faults.push(fault);
    }

    /// Close out the capture: pair buffered answers, then aggregate.
    pub fn finish(mut self) -> Analysis {
        self.faults.extend(self.correlator.pair_answers());

        let connections = self.tracker.into_connections();
        let stats = ConnectionStats::analyze(&connections);
        let probe_pairs = self.correlator.into_pairs();
        let traceroute = TraceRoute::build(&probe_pairs);

        info!(
            frames = self.frame_count,
            connections = connections.len(),
            probes = probe_pairs.len(),
            faults = self.faults.len(),
            "analysis finished"
        );

        Analysis {
            frame_count: self.frame_count,
            connections,
            stats,
            traceroute,
            probe_pairs,
            reassembly_shapes: self.reassembler.shapes().clone(),
            completed_reassemblies: self.reassembler.completed_count(),
            open_reassemblies: self.reassembler.open_count(),
            protocols: self.protocols,
            faults: self.faults,
        }
    }

    /// Drain a reader and analyze every frame in it.
    pub fn run(reader: CaptureReader) -> Result<Analysis, Error> {
        let mut analyzer = Self::new();
        for frame in reader {
            let frame = frame?;
            debug!(number = frame.number, time_s = frame.time_s, "frame");
            analyzer.process_frame(&frame);
        }
        Ok(analyzer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{
        IcmpHeader, IcmpMessage, Ipv4Header, TcpFlags, TcpHeader, TransportHeader, UdpHeader,
    };
    use std::net::Ipv4Addr;

    fn ip_header(src: Ipv4Addr, dst: Ipv4Addr, protocol: u8, ttl: u8) -> Ipv4Header {
        Ipv4Header {
            version: 4,
            ihl: 5,
            tos: 0,
            total_length: 40,
            identification: 0,
            dont_fragment: true,
            more_fragments: false,
            fragment_offset: 0,
            ttl,
            protocol,
            checksum: 0,
            src,
            dst,
        }
    }

    fn frame(number: u64, time_s: f64, network: Ipv4Header, transport: TransportHeader) -> Frame {
        Frame {
            number,
            ts_sec: 0,
            ts_frac: 0,
            time_s,
            captured_len: 64,
            original_len: 64,
            link: None,
            network: Some(network),
            transport: Some(transport),
            payload: Vec::new(),
        }
    }

    fn tcp_frame(
        number: u64,
        time_s: f64,
        src: Ipv4Addr,
        src_port: u16,
        dst: Ipv4Addr,
        dst_port: u16,
        flags: TcpFlags,
    ) -> Frame {
        frame(
            number,
            time_s,
            ip_header(src, dst, 6, 64),
            TransportHeader::Tcp(TcpHeader {
                src_port,
                dst_port,
                seq: 1,
                ack: 0,
                data_offset: 5,
                flags,
                window: 65535,
                checksum: 0,
                urgent_pointer: 0,
            }),
        )
    }

    fn udp_probe_frame(number: u64, time_s: f64, ttl: u8, dst_port: u16) -> Frame {
        frame(
            number,
            time_s,
            ip_header(
                Ipv4Addr::new(192, 168, 1, 10),
                Ipv4Addr::new(8, 8, 8, 8),
                17,
                ttl,
            ),
            TransportHeader::Udp(UdpHeader {
                src_port: 45000,
                dst_port,
                length: 40,
                checksum: 0,
            }),
        )
    }

    /// Time-exceeded answer from `router`, embedding a UDP probe datagram
    /// toward `dst_port`.
    fn answer_frame(number: u64, time_s: f64, router: Ipv4Addr, dst_port: u16) -> Frame {
        let mut embedded = Vec::new();
        embedded.push(0x45);
        embedded.push(0x00);
        embedded.extend_from_slice(&28u16.to_be_bytes()); // total length
        embedded.extend_from_slice(&[0x00, 0x01, 0x00, 0x00]);
        embedded.push(1); // TTL expired
        embedded.push(17); // UDP
        embedded.extend_from_slice(&[0x00, 0x00]);
        embedded.extend_from_slice(&[192, 168, 1, 10]);
        embedded.extend_from_slice(&[8, 8, 8, 8]);
        embedded.extend_from_slice(&45000u16.to_be_bytes());
        embedded.extend_from_slice(&dst_port.to_be_bytes());
        embedded.extend_from_slice(&[0x00, 0x08, 0x00, 0x00]);

        let mut f = frame(
            number,
            time_s,
            ip_header(router, Ipv4Addr::new(192, 168, 1, 10), 1, 254),
            TransportHeader::Icmp(IcmpHeader {
                icmp_type: 11,
                code: 0,
                checksum: 0,
                message: IcmpMessage::EmbeddedDatagram,
            }),
        );
        f.payload = embedded;
        f
    }

    #[test]
    fn mixed_capture_analyzes_all_reconstructions() {
        let client = Ipv4Addr::new(10, 0, 0, 1);
        let server = Ipv4Addr::new(10, 0, 0, 2);
        let router = Ipv4Addr::new(10, 9, 9, 1);
        let syn = TcpFlags {
            syn: true,
            ..TcpFlags::default()
        };
        let fin_ack = TcpFlags {
            fin: true,
            ack: true,
            ..TcpFlags::default()
        };

        let mut analyzer = Analyzer::new();
        analyzer.process_frame(&tcp_frame(1, 0.0, client, 40000, server, 80, syn));
        analyzer.process_frame(&udp_probe_frame(2, 0.1, 1, 33434));
        analyzer.process_frame(&answer_frame(3, 0.15, router, 33434));
        analyzer.process_frame(&tcp_frame(4, 2.0, server, 80, client, 40000, fin_ack));

        let analysis = analyzer.finish();
        assert_eq!(analysis.frame_count, 4);
        assert_eq!(analysis.connections.len(), 1);
        assert!(analysis.connections[0].is_complete());
        assert_eq!(analysis.stats.total, 1);

        assert_eq!(analysis.probe_pairs.len(), 1);
        assert_eq!(analysis.traceroute.routers, vec![router]);
        assert_eq!(
            analysis.protocols.iter().copied().collect::<Vec<_>>(),
            vec![1, 17]
        );
        assert!(analysis.faults.is_empty());
    }

    #[test]
    fn answer_before_probe_still_pairs() {
        let router = Ipv4Addr::new(10, 9, 9, 1);
        let mut analyzer = Analyzer::new();
        analyzer.process_frame(&answer_frame(1, 0.0, router, 33434));
        analyzer.process_frame(&udp_probe_frame(2, 0.5, 1, 33434));

        let analysis = analyzer.finish();
        assert_eq!(analysis.probe_pairs[0].router(), Some(router));
    }

    #[test]
    fn fragmented_tcp_head_still_tracked() {
        let client = Ipv4Addr::new(10, 0, 0, 1);
        let server = Ipv4Addr::new(10, 0, 0, 2);
        let syn = TcpFlags {
            syn: true,
            ..TcpFlags::default()
        };

        let mut head = tcp_frame(1, 0.0, client, 40000, server, 80, syn);
        head.network.as_mut().unwrap().more_fragments = true;

        let mut analyzer = Analyzer::new();
        analyzer.process_frame(&head);
        let analysis = analyzer.finish();

        assert_eq!(analysis.connections.len(), 1);
        assert_eq!(analysis.connections[0].syn_count, 1);
        assert_eq!(analysis.open_reassemblies, 1);
        assert!(analysis.faults.is_empty());
    }

    #[test]
    fn duplicate_probe_recorded_as_fault() {
        let mut analyzer = Analyzer::new();
        analyzer.process_frame(&udp_probe_frame(1, 0.0, 1, 33434));
        analyzer.process_frame(&udp_probe_frame(2, 0.1, 1, 33434));

        let analysis = analyzer.finish();
        assert_eq!(analysis.probe_pairs.len(), 1);
        assert_eq!(analysis.faults.len(), 1);
        assert!(matches!(analysis.faults[0], Fault::DuplicateProbeKey { .. }));
    }
}
