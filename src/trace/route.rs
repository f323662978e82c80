//! Path assembly over correlated probe/answer pairs.

use std::collections::HashMap;
use std::net::Ipv4Addr;

use super::{OsHint, ProbeAnswer};

/// One (router, hop) group of answered probes.
#[derive(Debug, Clone, PartialEq)]
pub struct Hop {
    pub hop: u8,
    pub router: Ipv4Addr,
    pub rtts_ms: Vec<f64>,
    pub mean_rtt_ms: f64,
    /// Earliest answer time in the group; the tiebreak within a hop.
    pub first_completion: f64,
}

/// Round-trip statistics toward one answering node.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RouterRtt {
    pub router: Ipv4Addr,
    pub mean_ms: f64,
    /// Population standard deviation; 0 with a single sample.
    pub std_dev_ms: f64,
    pub samples: usize,
}

/// The reconstructed traceroute: source, destination, answering nodes in
/// path order, and per-node RTT statistics.
#[derive(Debug, Clone, Default)]
pub struct TraceRoute {
    pub source: Option<Ipv4Addr>,
    pub destination: Option<Ipv4Addr>,
    pub os: Option<OsHint>,
    /// Answered probes grouped by (router, hop), sorted by hop and then
    /// by earliest completion within the hop.
    pub hops: Vec<Hop>,
    /// Unique answering nodes, ordered by first appearance in `hops`.
    pub routers: Vec<Ipv4Addr>,
    /// RTT statistics per node, in `routers` order.
    pub router_rtts: Vec<RouterRtt>,
    pub answered: usize,
    pub unanswered: usize,
}

impl TraceRoute {
    pub fn build(pairs: &[ProbeAnswer]) -> Self {
        let mut route = Self {
            source: pairs.first().map(|p| p.probe.src),
            destination: pairs.first().map(|p| p.probe.dst),
            os: pairs.first().map(|p| p.probe.os),
            ..Self::default()
        };

        let mut answered: Vec<&ProbeAnswer> =
            pairs.iter().filter(|p| p.answer.is_some()).collect();
        answered.sort_by(|a, b| {
            a.hop().cmp(&b.hop()).then(
                a.completion_time()
                    .unwrap_or(0.0)
                    .total_cmp(&b.completion_time().unwrap_or(0.0)),
            )
        });
        route.answered = answered.len();
        route.unanswered = pairs.len() - answered.len();

        // Group by (router, hop), keeping first-appearance order of the
        // sorted pairs so a plain HashMap cannot perturb the output.
        let mut groups: Vec<Hop> = Vec::new();
        let mut slots: HashMap<(Ipv4Addr, u8), usize> = HashMap::new();
        for pair in answered {
            let (Some(router), Some(rtt_s), Some(completed)) =
                (pair.router(), pair.rtt_s(), pair.completion_time())
            else {
                continue;
            };
            let rtt_ms = rtt_s * 1000.0;
            match slots.get(&(router, pair.hop())) {
                Some(&i) => {
                    let group = &mut groups[i];
                    group.rtts_ms.push(rtt_ms);
                    group.first_completion = group.first_completion.min(completed);
                }
                None => {
                    slots.insert((router, pair.hop()), groups.len());
                    groups.push(Hop {
                        hop: pair.hop(),
                        router,
                        rtts_ms: vec![rtt_ms],
                        mean_rtt_ms: 0.0,
                        first_completion: completed,
                    });
                }
            }
        }
        for group in &mut groups {
            group.mean_rtt_ms =
                group.rtts_ms.iter().sum::<f64>() / group.rtts_ms.len() as f64;
        }
        groups.sort_by(|a, b| {
            a.hop
                .cmp(&b.hop)
                .then(a.first_completion.total_cmp(&b.first_completion))
        });

        let mut samples: HashMap<Ipv4Addr, Vec<f64>> = HashMap::new();
        for group in &groups {
            if !route.routers.contains(&group.router) {
                route.routers.push(group.router);
            }
            samples
                .entry(group.router)
                .or_default()
                .extend_from_slice(&group.rtts_ms);
        }
        route.hops = groups;

        route.router_rtts = route
            .routers
            .iter()
            .map(|&router| {
                let values = samples.remove(&router).unwrap_or_default();
                let (mean_ms, std_dev_ms) = mean_std(&values);
                RouterRtt {
                    router,
                    mean_ms,
                    std_dev_ms,
                    samples: values.len(),
                }
            })
            .collect();

        route
    }
}

/// Mean and population standard deviation. Empty input yields zeros.
fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{Answer, Probe, ProbeKey};

    fn pair(ttl: u8, dst_port: u16, sent: f64, answer: Option<(Ipv4Addr, f64)>) -> ProbeAnswer {
        let src = Ipv4Addr::new(192, 168, 1, 10);
        let dst = Ipv4Addr::new(8, 8, 8, 8);
        ProbeAnswer {
            probe: Probe {
                time_s: sent,
                src,
                dst,
                ttl,
                os: OsHint::Linux,
                key: ProbeKey::Udp { src, dst, dst_port },
                icmp_identifier: None,
            },
            answer: answer.map(|(router, time_s)| Answer {
                time_s,
                router,
                os: OsHint::Linux,
                key: Some(ProbeKey::Udp { src, dst, dst_port }),
            }),
        }
    }

    #[test]
    fn empty_pairs_build_empty_route() {
        let route = TraceRoute::build(&[]);
        assert!(route.source.is_none());
        assert!(route.hops.is_empty());
        assert_eq!(route.answered, 0);
    }

    #[test]
    fn routers_ordered_by_hop_not_registration() {
        let r1 = Ipv4Addr::new(10, 0, 0, 1);
        let r2 = Ipv4Addr::new(10, 0, 0, 2);
        // Registration order puts hop 2 first
        let pairs = vec![
            pair(2, 33435, 0.1, Some((r2, 0.25))),
            pair(1, 33434, 0.0, Some((r1, 0.05))),
            pair(3, 33436, 0.2, None),
        ];

        let route = TraceRoute::build(&pairs);
        assert_eq!(route.routers, vec![r1, r2]);
        assert_eq!(route.answered, 2);
        assert_eq!(route.unanswered, 1);
        assert_eq!(route.hops[0].hop, 1);
        assert!((route.hops[0].mean_rtt_ms - 50.0).abs() < 1e-9);
    }

    #[test]
    fn same_hop_routers_ordered_by_completion() {
        let r1 = Ipv4Addr::new(10, 0, 0, 1);
        let r2 = Ipv4Addr::new(10, 0, 0, 2);
        // Both answer at hop 1; r2's answer lands first
        let pairs = vec![
            pair(1, 33434, 0.0, Some((r1, 0.9))),
            pair(1, 33435, 0.1, Some((r2, 0.3))),
        ];

        let route = TraceRoute::build(&pairs);
        assert_eq!(route.routers, vec![r2, r1]);
        assert_eq!(route.hops[0].router, r2);
    }

    #[test]
    fn repeated_router_and_hop_collapse_into_one_group() {
        let r = Ipv4Addr::new(10, 0, 0, 1);
        let pairs = vec![
            pair(1, 33434, 0.0, Some((r, 0.010))),
            pair(1, 33435, 0.0, Some((r, 0.030))),
        ];

        let route = TraceRoute::build(&pairs);
        assert_eq!(route.hops.len(), 1);
        let hop = &route.hops[0];
        assert_eq!(hop.rtts_ms.len(), 2);
        assert!((hop.mean_rtt_ms - 20.0).abs() < 1e-9);
        assert_eq!(hop.first_completion, 0.010);
    }

    #[test]
    fn router_rtt_population_std_dev() {
        let r = Ipv4Addr::new(10, 0, 0, 1);
        let pairs = vec![
            pair(1, 33434, 0.0, Some((r, 0.010))),
            pair(1, 33435, 0.0, Some((r, 0.030))),
        ];

        let route = TraceRoute::build(&pairs);
        let stats = route.router_rtts[0];
        assert_eq!(stats.samples, 2);
        assert!((stats.mean_ms - 20.0).abs() < 1e-9);
        assert!((stats.std_dev_ms - 10.0).abs() < 1e-9);
    }

    #[test]
    fn single_sample_std_dev_is_zero() {
        let r = Ipv4Addr::new(10, 0, 0, 1);
        let route = TraceRoute::build(&[pair(1, 33434, 0.0, Some((r, 0.010)))]);
        assert_eq!(route.router_rtts[0].std_dev_ms, 0.0);
    }
}
