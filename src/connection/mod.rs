//! TCP connection tracking.
//!
//! A connection is identified by the addressing four-tuple of the frame
//! that first mentioned it; frames keyed by the reversed tuple join the
//! same connection on the other flow. Each flow keeps its segments
//! ordered by (sequence number, capture time) so retransmissions and
//! reordered captures land where the byte stream says they belong.

pub mod stats;

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use tracing::trace;

use crate::error::Fault;
use crate::pcap::Frame;
use crate::protocol::TcpFlags;

/// Directed four-tuple naming one flow of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: Ipv4Addr,
    pub src_port: u16,
    pub dst: Ipv4Addr,
    pub dst_port: u16,
}

impl FlowKey {
    /// The same connection seen from the other side.
    pub fn reversed(&self) -> Self {
        Self {
            src: self.dst,
            src_port: self.dst_port,
            dst: self.src,
            dst_port: self.src_port,
        }
    }
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

/// Which flow of a connection a frame belongs to. `Forward` is the
/// direction of the frame that created the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Reverse,
}

/// The TCP facts one frame contributes to a flow.
#[derive(Debug, Clone, Copy)]
pub struct TcpSegment {
    pub time_s: f64,
    pub seq: u32,
    pub ack: u32,
    pub flags: TcpFlags,
    pub window: u16,
    pub payload_len: usize,
}

impl TcpSegment {
    fn from_frame(frame: &Frame) -> Option<Self> {
        let (_, tcp) = frame.tcp()?;
        Some(Self {
            time_s: frame.time_s,
            seq: tcp.seq,
            ack: tcp.ack,
            flags: tcp.flags,
            window: tcp.window,
            payload_len: frame.payload.len(),
        })
    }
}

/// One direction of a connection. Segments stay sorted by
/// (sequence number, capture time); the sort is stable, so equal keys
/// keep their arrival order.
#[derive(Debug, Clone, Default)]
pub struct Flow {
    segments: Vec<TcpSegment>,
}

impl Flow {
    fn push(&mut self, segment: TcpSegment) {
        self.segments.push(segment);
        self.segments
            .sort_by(|a, b| a.seq.cmp(&b.seq).then(a.time_s.total_cmp(&b.time_s)));
    }

    pub fn segments(&self) -> &[TcpSegment] {
        &self.segments
    }

    pub fn packet_count(&self) -> usize {
        self.segments.len()
    }

    pub fn byte_count(&self) -> usize {
        self.segments.iter().map(|s| s.payload_len).sum()
    }
}

/// One tracked TCP connection: both flows plus the lifecycle facts the
/// statistics pass needs.
#[derive(Debug, Clone)]
pub struct Connection {
    pub key: FlowKey,
    pub forward: Flow,
    pub reverse: Flow,
    pub syn_count: u32,
    pub fin_count: u32,
    pub rst_count: u32,
    /// True when the last lifecycle-relevant event was a FIN. Payload
    /// arriving after a FIN reopens the connection.
    pub is_closed: bool,
    first_time: f64,
    last_time: f64,
}

impl Connection {
    fn new(key: FlowKey, first_time: f64) -> Self {
        Self {
            key,
            forward: Flow::default(),
            reverse: Flow::default(),
            syn_count: 0,
            fin_count: 0,
            rst_count: 0,
            is_closed: false,
            first_time,
            last_time: first_time,
        }
    }

    fn add(&mut self, direction: Direction, segment: TcpSegment) {
        if segment.flags.syn {
            self.syn_count += 1;
        }
        if segment.flags.rst {
            self.rst_count += 1;
        }
        if segment.payload_len > 0 {
            self.is_closed = false;
        }
        if segment.flags.fin {
            self.fin_count += 1;
            self.is_closed = true;
        }
        self.last_time = self.last_time.max(segment.time_s);

        match direction {
            Direction::Forward => self.forward.push(segment),
            Direction::Reverse => self.reverse.push(segment),
        }
    }

    /// Both SYN and FIN observed.
    pub fn is_complete(&self) -> bool {
        self.syn_count > 0 && self.fin_count > 0
    }

    /// Opened before the capture started: no SYN on record.
    pub fn opened_before_capture(&self) -> bool {
        self.syn_count == 0
    }

    pub fn saw_reset(&self) -> bool {
        self.rst_count > 0
    }

    pub fn packet_count(&self) -> usize {
        self.forward.packet_count() + self.reverse.packet_count()
    }

    pub fn byte_count(&self) -> usize {
        self.forward.byte_count() + self.reverse.byte_count()
    }

    pub fn start_time(&self) -> f64 {
        self.first_time
    }

    pub fn end_time(&self) -> f64 {
        self.last_time
    }

    /// Capture time between the first and last frame of this connection.
    pub fn duration(&self) -> f64 {
        self.last_time - self.first_time
    }
}

/// Tracks every TCP connection in a capture. Connections are reported in
/// the order they first appeared.
#[derive(Debug, Default)]
pub struct ConnectionTracker {
    connections: Vec<Connection>,
    index: HashMap<FlowKey, usize>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one frame into its connection. Non-TCP frames are ignored.
    pub fn process(&mut self, frame: &Frame) -> Result<(), Fault> {
        let Some((ip, tcp)) = frame.tcp() else {
            return Ok(());
        };
        let Some(segment) = TcpSegment::from_frame(frame) else {
            return Ok(());
        };

        let key = FlowKey {
            src: ip.src,
            src_port: tcp.src_port,
            dst: ip.dst,
            dst_port: tcp.dst_port,
        };

        let (slot, direction) = if let Some(&i) = self.index.get(&key) {
            (i, Direction::Forward)
        } else if let Some(&i) = self.index.get(&key.reversed()) {
            (i, Direction::Reverse)
        } else {
            trace!(%key, "new connection");
            let i = self.connections.len();
            self.connections.push(Connection::new(key, frame.time_s));
            self.index.insert(key, i);
            (i, Direction::Forward)
        };

        let connection = &mut self.connections[slot];
        // Guard against an index entry pointing at the wrong connection.
        if connection.key != key && connection.key != key.reversed() {
            return Err(Fault::FlowMismatch {
                src: key.src,
                src_port: key.src_port,
                dst: key.dst,
                dst_port: key.dst_port,
            });
        }

        connection.add(direction, segment);
        Ok(())
    }

    /// All connections, in order of first appearance.
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn into_connections(self) -> Vec<Connection> {
        self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment(time_s: f64, seq: u32, payload_len: usize, flags: TcpFlags) -> TcpSegment {
        TcpSegment {
            time_s,
            seq,
            ack: 0,
            flags,
            window: 65535,
            payload_len,
        }
    }

    fn syn() -> TcpFlags {
        TcpFlags {
            syn: true,
            ..TcpFlags::default()
        }
    }

    fn fin() -> TcpFlags {
        TcpFlags {
            fin: true,
            ..TcpFlags::default()
        }
    }

    fn key() -> FlowKey {
        FlowKey {
            src: Ipv4Addr::new(10, 0, 0, 1),
            src_port: 40000,
            dst: Ipv4Addr::new(10, 0, 0, 2),
            dst_port: 80,
        }
    }

    #[test]
    fn reversed_key_round_trips() {
        let k = key();
        assert_eq!(k.reversed().reversed(), k);
        assert_eq!(k.reversed().src_port, 80);
    }

    #[test]
    fn flow_reorders_by_seq_then_time() {
        let mut flow = Flow::default();
        flow.push(segment(0.2, 200, 10, TcpFlags::default()));
        flow.push(segment(0.1, 100, 10, TcpFlags::default()));
        flow.push(segment(0.3, 100, 10, TcpFlags::default())); // retransmit

        let seqs: Vec<_> = flow.segments().iter().map(|s| (s.seq, s.time_s)).collect();
        assert_eq!(seqs, vec![(100, 0.1), (100, 0.3), (200, 0.2)]);
    }

    #[test]
    fn completeness_needs_syn_and_fin() {
        let mut conn = Connection::new(key(), 0.0);
        conn.add(Direction::Forward, segment(0.0, 1, 0, syn()));
        assert!(!conn.is_complete());
        assert!(!conn.is_closed);

        conn.add(Direction::Reverse, segment(1.0, 1, 0, fin()));
        assert!(conn.is_complete());
        assert!(conn.is_closed);
    }

    #[test]
    fn payload_after_fin_reopens() {
        let mut conn = Connection::new(key(), 0.0);
        conn.add(Direction::Forward, segment(0.0, 1, 0, fin()));
        assert!(conn.is_closed);

        conn.add(Direction::Forward, segment(1.0, 2, 100, TcpFlags::default()));
        assert!(!conn.is_closed);
        assert!(!conn.is_complete());
        assert_eq!(conn.byte_count(), 100);
    }

    #[test]
    fn fin_with_payload_still_closes() {
        let mut conn = Connection::new(key(), 0.0);
        conn.add(Direction::Forward, segment(0.0, 1, 50, fin()));
        assert!(conn.is_closed);
    }

    #[test]
    fn no_syn_means_opened_before_capture() {
        let mut conn = Connection::new(key(), 0.0);
        conn.add(Direction::Forward, segment(0.0, 500, 20, TcpFlags::default()));
        assert!(conn.opened_before_capture());
    }

    #[test]
    fn tracker_joins_both_directions() {
        use crate::protocol::{Ipv4Header, TcpHeader, TransportHeader};

        fn tcp_frame(
            number: u64,
            time_s: f64,
            src: Ipv4Addr,
            src_port: u16,
            dst: Ipv4Addr,
            dst_port: u16,
            flags: TcpFlags,
        ) -> Frame {
            Frame {
                number,
                ts_sec: 0,
                ts_frac: 0,
                time_s,
                captured_len: 54,
                original_len: 54,
                link: None,
                network: Some(Ipv4Header {
                    version: 4,
                    ihl: 5,
                    tos: 0,
                    total_length: 40,
                    identification: number as u16,
                    dont_fragment: true,
                    more_fragments: false,
                    fragment_offset: 0,
                    ttl: 64,
                    protocol: 6,
                    checksum: 0,
                    src,
                    dst,
                }),
                transport: Some(TransportHeader::Tcp(TcpHeader {
                    src_port,
                    dst_port,
                    seq: 1,
                    ack: 0,
                    data_offset: 5,
                    flags,
                    window: 65535,
                    checksum: 0,
                    urgent_pointer: 0,
                })),
                payload: Vec::new(),
            }
        }

        let client = Ipv4Addr::new(10, 0, 0, 1);
        let server = Ipv4Addr::new(10, 0, 0, 2);

        let mut tracker = ConnectionTracker::new();
        tracker
            .process(&tcp_frame(1, 0.0, client, 40000, server, 80, syn()))
            .unwrap();
        tracker
            .process(&tcp_frame(2, 0.1, server, 80, client, 40000, syn()))
            .unwrap();
        tracker
            .process(&tcp_frame(3, 1.0, client, 40000, server, 80, fin()))
            .unwrap();

        let connections = tracker.connections();
        assert_eq!(connections.len(), 1);
        let conn = &connections[0];
        assert_eq!(conn.forward.packet_count(), 2);
        assert_eq!(conn.reverse.packet_count(), 1);
        assert_eq!(conn.syn_count, 2);
        assert!(conn.is_complete());
    }

    #[test]
    fn duration_spans_first_to_last_frame() {
        let mut conn = Connection::new(key(), 0.5);
        conn.add(Direction::Forward, segment(0.5, 1, 0, syn()));
        conn.add(Direction::Reverse, segment(3.5, 9, 0, fin()));
        assert_eq!(conn.duration(), 3.0);
    }
}
