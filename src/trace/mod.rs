//! Traceroute reconstruction: probe classification, answer correlation,
//! fragment reassembly, and path assembly.
//!
//! Probes are recognized two ways, matching the two traceroute styles in
//! the wild: UDP datagrams aimed at the classic unlikely-port range, and
//! ICMP echo requests. Answers are the ICMP error messages routers send
//! back; each carries the offending original datagram, which is decoded
//! to recover the probe's correlation key.

pub mod fragment;
pub mod route;

use std::collections::HashMap;
use std::fmt;
use std::net::Ipv4Addr;

use tracing::{debug, trace};

use crate::error::Fault;
use crate::pcap::Frame;
use crate::protocol::{decode_embedded_datagram, IcmpMessage, IpProtocol, TransportHeader};

/// First UDP destination port traceroute probes use.
pub const UDP_PROBE_PORT_MIN: u16 = 33434;
/// Last UDP destination port traceroute probes use.
pub const UDP_PROBE_PORT_MAX: u16 = 33529;

/// Operating-system family inferred from the probe style. UDP probes
/// point at Unix-like tools, echo requests at Windows tracert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsHint {
    Linux,
    Windows,
    Unknown,
}

impl fmt::Display for OsHint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Linux => write!(f, "Linux"),
            Self::Windows => write!(f, "Windows"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Correlation key shared by a probe and its answer. The answer side is
/// rebuilt from the datagram embedded in the ICMP error payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProbeKey {
    Udp {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        dst_port: u16,
    },
    IcmpEcho {
        src: Ipv4Addr,
        dst: Ipv4Addr,
        sequence: u16,
    },
}

impl ProbeKey {
    /// IP protocol of the probe datagram this key was derived from.
    pub fn protocol(&self) -> IpProtocol {
        match self {
            Self::Udp { .. } => IpProtocol::Udp,
            Self::IcmpEcho { .. } => IpProtocol::Icmp,
        }
    }
}

impl fmt::Display for ProbeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Udp { src, dst, dst_port } => {
                write!(f, "udp {src} -> {dst}:{dst_port}")
            }
            Self::IcmpEcho { src, dst, sequence } => {
                write!(f, "icmp-echo {src} -> {dst} seq {sequence}")
            }
        }
    }
}

/// Derive the correlation key from a decoded network/transport pair.
/// `None` when the pair is not probe-shaped.
fn key_from_layers(
    src: Ipv4Addr,
    dst: Ipv4Addr,
    transport: &TransportHeader,
) -> Option<(ProbeKey, OsHint)> {
    match transport {
        TransportHeader::Udp(udp)
            if (UDP_PROBE_PORT_MIN..=UDP_PROBE_PORT_MAX).contains(&udp.dst_port) =>
        {
            Some((
                ProbeKey::Udp {
                    src,
                    dst,
                    dst_port: udp.dst_port,
                },
                OsHint::Linux,
            ))
        }
        TransportHeader::Icmp(icmp) if icmp.is_echo_request() => match icmp.message {
            IcmpMessage::Echo { sequence, .. } => Some((
                ProbeKey::IcmpEcho { src, dst, sequence },
                OsHint::Windows,
            )),
            _ => None,
        },
        _ => None,
    }
}

/// One outbound traceroute probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub time_s: f64,
    pub src: Ipv4Addr,
    pub dst: Ipv4Addr,
    /// The hop this probe targets.
    pub ttl: u8,
    pub os: OsHint,
    pub key: ProbeKey,
    /// Echo identifier, present on ICMP probes only. Carried for
    /// reporting; correlation uses the sequence number.
    pub icmp_identifier: Option<u16>,
}

impl Probe {
    /// Classify a frame as a probe. Fragmented datagrams never classify
    /// here; they go through reassembly first.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let ip = frame.network.as_ref()?;
        if ip.is_fragment() {
            return None;
        }
        let transport = frame.transport.as_ref()?;
        let (key, os) = key_from_layers(ip.src, ip.dst, transport)?;
        let icmp_identifier = match transport {
            TransportHeader::Icmp(icmp) => match icmp.message {
                IcmpMessage::Echo { identifier, .. } => Some(identifier),
                _ => None,
            },
            _ => None,
        };
        Some(Self {
            time_s: frame.time_s,
            src: ip.src,
            dst: ip.dst,
            ttl: ip.ttl,
            os,
            key,
            icmp_identifier,
        })
    }
}

/// One ICMP error answering a probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Answer {
    pub time_s: f64,
    /// The node that sent the error: an intermediate router, or the
    /// destination itself.
    pub router: Ipv4Addr,
    pub os: OsHint,
    /// Absent when the embedded datagram could not be decoded; such an
    /// answer never matches anything.
    pub key: Option<ProbeKey>,
}

impl Answer {
    /// Classify a frame as a probe answer (ICMP destination unreachable
    /// or time exceeded).
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let ip = frame.network.as_ref()?;
        let icmp = frame.transport.as_ref()?.as_icmp()?;
        if !icmp.is_probe_answer() {
            return None;
        }

        let key_and_os = decode_embedded_datagram(&frame.payload)
            .and_then(|(inner_ip, inner_transport)| {
                key_from_layers(inner_ip.src, inner_ip.dst, &inner_transport)
            });
        let (key, os) = match key_and_os {
            Some((key, os)) => (Some(key), os),
            None => (None, OsHint::Unknown),
        };

        Some(Self {
            time_s: frame.time_s,
            router: ip.src,
            os,
            key,
        })
    }
}

/// A probe together with its answer, once one arrives.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeAnswer {
    pub probe: Probe,
    pub answer: Option<Answer>,
}

impl ProbeAnswer {
    pub fn hop(&self) -> u8 {
        self.probe.ttl
    }

    pub fn router(&self) -> Option<Ipv4Addr> {
        self.answer.map(|a| a.router)
    }

    /// Probe-to-answer round trip, in seconds.
    pub fn rtt_s(&self) -> Option<f64> {
        self.answer.map(|a| a.time_s - self.probe.time_s)
    }

    /// When the exchange finished: the answer's capture time.
    pub fn completion_time(&self) -> Option<f64> {
        self.answer.map(|a| a.time_s)
    }
}

/// Pairs probes with their answers.
///
/// Probes register as they are classified; answers are buffered and
/// paired only once the whole capture has been read, so an answer
/// captured before its probe (clock skew, reordering) still matches.
#[derive(Debug, Default)]
pub struct ProbeCorrelator {
    pairs: Vec<ProbeAnswer>,
    index: HashMap<ProbeKey, usize>,
    answers: Vec<Answer>,
}

impl ProbeCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an outbound probe. A second probe under the same key is a
    /// structural violation; the duplicate is dropped.
    pub fn register_probe(&mut self, probe: Probe) -> Result<(), Fault> {
        if self.index.contains_key(&probe.key) {
            return Err(Fault::DuplicateProbeKey {
                key: probe.key.to_string(),
            });
        }
        trace!(key = %probe.key, ttl = probe.ttl, "probe registered");
        self.index.insert(probe.key, self.pairs.len());
        self.pairs.push(ProbeAnswer {
            probe,
            answer: None,
        });
        Ok(())
    }

    /// Hold an answer until [`Self::pair_answers`].
    pub fn buffer_answer(&mut self, answer: Answer) {
        self.answers.push(answer);
    }

    /// Match every buffered answer against the registered probes, in
    /// buffer order. An answer with no key, no matching probe, or a probe
    /// that already has an answer is dropped. A probe and answer whose OS
    /// hints disagree stay unpaired and raise a fault.
    pub fn pair_answers(&mut self) -> Vec<Fault> {
        let mut faults = Vec::new();

        for answer in self.answers.drain(..) {
            let Some(key) = answer.key else {
                debug!(router = %answer.router, "answer with undecodable probe ignored");
                continue;
            };
            let Some(&slot) = self.index.get(&key) else {
                debug!(%key, "answer without a matching probe ignored");
                continue;
            };

            let pair = &mut self.pairs[slot];
            if pair.answer.is_some() {
                continue;
            }
            if pair.probe.os != answer.os {
                faults.push(Fault::OsHintMismatch {
                    probe: pair.probe.os.to_string(),
                    answer: answer.os.to_string(),
                });
                continue;
            }
            pair.answer = Some(answer);
        }

        faults
    }

    /// All probe/answer pairs, in probe registration order.
    pub fn pairs(&self) -> &[ProbeAnswer] {
        &self.pairs
    }

    pub fn into_pairs(self) -> Vec<ProbeAnswer> {
        self.pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn probe(ttl: u8, dst_port: u16, time_s: f64) -> Probe {
        Probe {
            time_s,
            src: Ipv4Addr::new(192, 168, 1, 10),
            dst: Ipv4Addr::new(8, 8, 8, 8),
            ttl,
            os: OsHint::Linux,
            key: ProbeKey::Udp {
                src: Ipv4Addr::new(192, 168, 1, 10),
                dst: Ipv4Addr::new(8, 8, 8, 8),
                dst_port,
            },
            icmp_identifier: None,
        }
    }

    fn answer(router: Ipv4Addr, dst_port: u16, time_s: f64) -> Answer {
        Answer {
            time_s,
            router,
            os: OsHint::Linux,
            key: Some(ProbeKey::Udp {
                src: Ipv4Addr::new(192, 168, 1, 10),
                dst: Ipv4Addr::new(8, 8, 8, 8),
                dst_port,
            }),
        }
    }

    #[test]
    fn probes_pair_with_buffered_answers() {
        let mut correlator = ProbeCorrelator::new();
        correlator.register_probe(probe(1, 33434, 0.0)).unwrap();
        correlator.register_probe(probe(2, 33435, 0.1)).unwrap();

        let router = Ipv4Addr::new(10, 0, 0, 1);
        correlator.buffer_answer(answer(router, 33434, 0.05));

        let faults = correlator.pair_answers();
        assert!(faults.is_empty());

        let pairs = correlator.pairs();
        assert_eq!(pairs[0].router(), Some(router));
        assert!((pairs[0].rtt_s().unwrap() - 0.05).abs() < 1e-9);
        assert!(pairs[1].answer.is_none());
    }

    #[test]
    fn duplicate_probe_key_is_a_fault() {
        let mut correlator = ProbeCorrelator::new();
        correlator.register_probe(probe(1, 33434, 0.0)).unwrap();
        let fault = correlator.register_probe(probe(2, 33434, 0.1)).unwrap_err();
        assert!(matches!(fault, Fault::DuplicateProbeKey { .. }));
        assert_eq!(correlator.pairs().len(), 1);
    }

    #[test]
    fn unmatched_answers_are_ignored() {
        let mut correlator = ProbeCorrelator::new();
        correlator.register_probe(probe(1, 33434, 0.0)).unwrap();
        correlator.buffer_answer(answer(Ipv4Addr::new(10, 0, 0, 1), 34000, 0.2));
        correlator.buffer_answer(Answer {
            time_s: 0.3,
            router: Ipv4Addr::new(10, 0, 0, 2),
            os: OsHint::Unknown,
            key: None,
        });

        assert!(correlator.pair_answers().is_empty());
        assert!(correlator.pairs()[0].answer.is_none());
    }

    #[test]
    fn os_hint_mismatch_leaves_probe_unanswered() {
        let mut correlator = ProbeCorrelator::new();
        correlator.register_probe(probe(1, 33434, 0.0)).unwrap();

        let mut bad = answer(Ipv4Addr::new(10, 0, 0, 1), 33434, 0.2);
        bad.os = OsHint::Windows;
        correlator.buffer_answer(bad);

        let faults = correlator.pair_answers();
        assert_eq!(faults.len(), 1);
        assert!(matches!(faults[0], Fault::OsHintMismatch { .. }));
        assert!(correlator.pairs()[0].answer.is_none());
    }

    #[test]
    fn first_answer_wins() {
        let mut correlator = ProbeCorrelator::new();
        correlator.register_probe(probe(1, 33434, 0.0)).unwrap();
        correlator.buffer_answer(answer(Ipv4Addr::new(10, 0, 0, 1), 33434, 0.2));
        correlator.buffer_answer(answer(Ipv4Addr::new(10, 0, 0, 9), 33434, 0.4));

        correlator.pair_answers();
        assert_eq!(
            correlator.pairs()[0].router(),
            Some(Ipv4Addr::new(10, 0, 0, 1))
        );
    }
}
