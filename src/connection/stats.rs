//! Aggregate statistics over tracked connections.
//!
//! Counters cover every connection; distributions (duration, RTT,
//! packets, window sizes) cover complete connections only and are absent
//! when no complete connection contributed a sample.

use super::Connection;

/// Min, mean, and max of one sample distribution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub min: f64,
    pub mean: f64,
    pub max: f64,
}

/// Summarize a sample set. Empty input has no summary.
pub fn summarize(values: &[f64]) -> Option<Summary> {
    let first = *values.first()?;
    let mut min = first;
    let mut max = first;
    let mut sum = 0.0;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    Some(Summary {
        min,
        mean: sum / values.len() as f64,
        max,
    })
}

/// One round-trip time estimate for a connection: the gap between its
/// first segment and the first acknowledgment from the other side that
/// covers that segment's data.
///
/// Only the first covering ack is considered; a negative gap (the ack
/// captured before the segment) yields no sample rather than trying
/// later acks. Arithmetic is widened to u64 so `seq + len` cannot wrap.
pub fn first_ack_rtt(connection: &Connection) -> Option<f64> {
    let first = connection.forward.segments().first()?;
    let target = first.seq as u64 + first.payload_len as u64;

    for answer in connection.reverse.segments() {
        if !answer.flags.ack || (answer.ack as u64) < target {
            continue;
        }
        let rtt = answer.time_s - first.time_s;
        return if rtt >= 0.0 { Some(rtt) } else { None };
    }
    None
}

/// The full statistics block for one capture's connections.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionStats {
    pub total: usize,
    pub complete: usize,
    pub reset: usize,
    /// No SYN observed: already open when the capture started.
    pub open_before_capture: usize,
    /// Not closed by a FIN: still open when the capture ended.
    pub open_after_capture: usize,
    pub duration: Option<Summary>,
    pub rtt: Option<Summary>,
    pub packets: Option<Summary>,
    pub window: Option<Summary>,
}

impl ConnectionStats {
    pub fn analyze(connections: &[Connection]) -> Self {
        let mut durations = Vec::new();
        let mut rtts = Vec::new();
        let mut packets = Vec::new();
        let mut windows = Vec::new();

        for conn in connections.iter().filter(|c| c.is_complete()) {
            durations.push(conn.duration());
            if let Some(rtt) = first_ack_rtt(conn) {
                rtts.push(rtt);
            }
            packets.push(conn.packet_count() as f64);
            for segment in conn
                .forward
                .segments()
                .iter()
                .chain(conn.reverse.segments())
            {
                windows.push(segment.window as f64);
            }
        }

        Self {
            total: connections.len(),
            complete: connections.iter().filter(|c| c.is_complete()).count(),
            reset: connections.iter().filter(|c| c.saw_reset()).count(),
            open_before_capture: connections
                .iter()
                .filter(|c| c.opened_before_capture())
                .count(),
            open_after_capture: connections.iter().filter(|c| !c.is_closed).count(),
            duration: summarize(&durations),
            rtt: summarize(&rtts),
            packets: summarize(&packets),
            window: summarize(&windows),
        }
    }
}
