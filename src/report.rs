//! Plain-text rendering of an [`Analysis`].
//!
//! Two reports: the TCP connection report (sections A through D) and the
//! traceroute report. Distributions with no samples print "undefined"
//! rather than a made-up number.

use std::fmt::Write;

use crate::analyzer::Analysis;
use crate::connection::stats::Summary;
use crate::connection::Connection;
use crate::protocol::IpProtocol;

/// Both reports, connection first.
pub fn render(analysis: &Analysis) -> String {
    let mut out = render_connections(analysis);
    out.push('\n');
    out.push_str(&render_traceroute(analysis));
    out
}

/// The TCP connection report.
pub fn render_connections(analysis: &Analysis) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "A) Total number of connections: {}", analysis.stats.total);
    let _ = writeln!(out);

    let _ = writeln!(out, "B) Connection details:");
    for (i, conn) in analysis.connections.iter().enumerate() {
        render_connection(&mut out, i + 1, conn);
    }
    let _ = writeln!(out);

    let stats = &analysis.stats;
    let _ = writeln!(out, "C) General:");
    let _ = writeln!(out, "Total number of complete TCP connections: {}", stats.complete);
    let _ = writeln!(out, "Number of reset TCP connections: {}", stats.reset);
    let _ = writeln!(
        out,
        "Number of TCP connections that were still open when the trace capture ended: {}",
        stats.open_after_capture
    );
    let _ = writeln!(
        out,
        "Number of TCP connections opened before the trace capture started: {}",
        stats.open_before_capture
    );
    let _ = writeln!(out);

    let _ = writeln!(out, "D) Complete TCP connections:");
    render_summary(&mut out, "time duration", &stats.duration, "s");
    render_summary(&mut out, "RTT value", &stats.rtt, "s");
    render_summary(&mut out, "number of packets", &stats.packets, "");
    render_summary(&mut out, "receive window size", &stats.window, "bytes");

    out
}

fn render_connection(out: &mut String, number: usize, conn: &Connection) {
    let key = &conn.key;
    let _ = writeln!(out, "Connection {number}:");
    let _ = writeln!(out, "Source address: {}", key.src);
    let _ = writeln!(out, "Destination address: {}", key.dst);
    let _ = writeln!(out, "Source port: {}", key.src_port);
    let _ = writeln!(out, "Destination port: {}", key.dst_port);
    let reset = if conn.saw_reset() { "/R" } else { "" };
    let _ = writeln!(out, "Status: S{}F{}{}", conn.syn_count, conn.fin_count, reset);

    // Timing and volume only mean something for a complete connection
    if conn.is_complete() {
        let _ = writeln!(out, "Start time: {:.6} s", conn.start_time());
        let _ = writeln!(out, "End time: {:.6} s", conn.end_time());
        let _ = writeln!(out, "Duration: {:.6} s", conn.duration());
        let _ = writeln!(
            out,
            "Number of packets sent from source to destination: {}",
            conn.forward.packet_count()
        );
        let _ = writeln!(
            out,
            "Number of packets sent from destination to source: {}",
            conn.reverse.packet_count()
        );
        let _ = writeln!(out, "Total number of packets: {}", conn.packet_count());
        let _ = writeln!(
            out,
            "Number of data bytes sent from source to destination: {}",
            conn.forward.byte_count()
        );
        let _ = writeln!(
            out,
            "Number of data bytes sent from destination to source: {}",
            conn.reverse.byte_count()
        );
        let _ = writeln!(out, "Total number of data bytes: {}", conn.byte_count());
    }
    let _ = writeln!(out, "END");
}

fn render_summary(out: &mut String, label: &str, summary: &Option<Summary>, unit: &str) {
    let suffix = if unit.is_empty() {
        String::new()
    } else {
        format!(" {unit}")
    };
    match summary {
        Some(s) => {
            let _ = writeln!(out, "Minimum {label}: {:.6}{suffix}", s.min);
            let _ = writeln!(out, "Mean {label}: {:.6}{suffix}", s.mean);
            let _ = writeln!(out, "Maximum {label}: {:.6}{suffix}", s.max);
        }
        None => {
            let _ = writeln!(out, "Minimum {label}: undefined");
            let _ = writeln!(out, "Mean {label}: undefined");
            let _ = writeln!(out, "Maximum {label}: undefined");
        }
    }
}

/// The traceroute report.
pub fn render_traceroute(analysis: &Analysis) -> String {
    let mut out = String::new();
    let route = &analysis.traceroute;

    match route.source {
        Some(source) => {
            let _ = writeln!(out, "The IP address of the source node: {source}");
        }
        None => {
            let _ = writeln!(out, "No traceroute probes found in this capture.");
            render_faults(&mut out, analysis);
            return out;
        }
    }
    if let Some(destination) = route.destination {
        let _ = writeln!(
            out,
            "The IP address of the ultimate destination node: {destination}"
        );
    }

    let _ = writeln!(out, "The IP addresses of the intermediate destination nodes:");
    let intermediates = route
        .routers
        .iter()
        .filter(|&&r| Some(r) != route.destination);
    for (i, router) in intermediates.enumerate() {
        let _ = writeln!(out, "\trouter {}: {router}", i + 1);
    }
    let _ = writeln!(out);

    let _ = writeln!(out, "The values in the protocol field of IP headers:");
    for &protocol in &analysis.protocols {
        match IpProtocol::from_raw(protocol) {
            Some(p) => {
                let _ = writeln!(out, "\t{}: {}", protocol, p.name());
            }
            None => {
                let _ = writeln!(out, "\t{protocol}");
            }
        }
    }
    let _ = writeln!(out);

    if analysis.reassembly_shapes.is_empty() {
        let _ = writeln!(out, "No datagrams were fragmented.");
    }
    for shape in &analysis.reassembly_shapes {
        let _ = writeln!(
            out,
            "The number of fragments created from the original datagram is: {}",
            shape.fragment_count
        );
        let _ = writeln!(
            out,
            "The offset of the last fragment is: {}",
            shape.final_fragment_offset
        );
    }
    if analysis.open_reassemblies > 0 {
        let _ = writeln!(
            out,
            "Datagrams still incomplete when the capture ended: {}",
            analysis.open_reassemblies
        );
    }
    let _ = writeln!(out);

    for stats in &route.router_rtts {
        let _ = writeln!(
            out,
            "The avg RTT between {} and {} is: {:.6} ms, the s.d. is: {:.6} ms",
            route.source.map(|s| s.to_string()).unwrap_or_default(),
            stats.router,
            stats.mean_ms,
            stats.std_dev_ms
        );
    }
    let _ = writeln!(out);

    if let Some(os) = route.os {
        let _ = writeln!(out, "Probable originating operating system: {os}");
    }
    let _ = writeln!(
        out,
        "Probes answered: {}, unanswered: {}",
        route.answered, route.unanswered
    );

    render_faults(&mut out, analysis);

    out
}

fn render_faults(out: &mut String, analysis: &Analysis) {
    if analysis.faults.is_empty() {
        return;
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Integrity faults encountered:");
    for fault in &analysis.faults {
        let _ = writeln!(out, "\t{fault}");
    }
}
