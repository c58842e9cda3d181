//! The geo topology model: candidate generation, ordering and validation.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use meridian_crypto::blake3::encode_multi_field;
use meridian_types::{AccountAddress, Cluster, NetworkTopology, NodeIdentity};

use crate::kmeans::{cluster_count, KMeans};
use crate::{score, Result, TopologyError};

/// Outcome of comparing topology `a` against topology `b`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Preference {
    Better,
    Worse,
    Equal,
}

/// A normalized topology with its score.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredTopology {
    pub topology: NetworkTopology,
    pub score: f64,
}

#[derive(Clone, Copy, Debug, Default)]
pub struct GeoTopologyModel {
    kmeans: KMeans,
}

impl GeoTopologyModel {
    pub fn new(kmeans: KMeans) -> Self {
        Self { kmeans }
    }

    /// `ceil(sqrt(n))`.
    pub fn cluster_count(&self, n: usize) -> usize {
        cluster_count(n)
    }

    /// The k-means candidate for `members`, normalized and scored.
    pub fn propose(&self, members: &[NodeIdentity]) -> ScoredTopology {
        let topology = normalize(NetworkTopology {
            clusters: self
                .kmeans
                .partition(members)
                .into_iter()
                .map(|members| Cluster { members })
                .collect(),
        });
        self.scored(topology)
    }

    pub fn score(&self, topology: &NetworkTopology) -> f64 {
        score::score(topology)
    }

    pub fn scored(&self, topology: NetworkTopology) -> ScoredTopology {
        let score = self.score(&topology);
        ScoredTopology { topology, score }
    }

    /// Total order over scored topologies: lower score first, then smaller
    /// canonical bytes. `Equal` only for byte-identical topologies.
    pub fn compare(&self, a: &ScoredTopology, b: &ScoredTopology) -> Preference {
        let ordering = a
            .score
            .total_cmp(&b.score)
            .then_with(|| canonical_bytes(&a.topology).cmp(&canonical_bytes(&b.topology)));
        match ordering {
            Ordering::Less => Preference::Better,
            Ordering::Greater => Preference::Worse,
            Ordering::Equal => Preference::Equal,
        }
    }

    /// Check that `topology` is a normalized partition of exactly `expected`
    /// into `ceil(sqrt(N))` non-empty clusters with every identity unaltered.
    pub fn validate(&self, topology: &NetworkTopology, expected: &[NodeIdentity]) -> Result<()> {
        let k = cluster_count(expected.len());
        if topology.cluster_count() != k {
            return Err(malformed(format!(
                "expected {k} clusters for {} nodes, got {}",
                expected.len(),
                topology.cluster_count()
            )));
        }
        if topology.clusters.iter().any(|c| c.members.is_empty()) {
            return Err(malformed("empty cluster"));
        }

        let expected: HashMap<AccountAddress, &NodeIdentity> =
            expected.iter().map(|m| (m.account_address, m)).collect();
        let mut seen = HashSet::with_capacity(expected.len());
        for member in topology.members() {
            match expected.get(&member.account_address) {
                None => {
                    return Err(malformed(format!("unexpected node {}", member.account_address)));
                }
                Some(identity) if *identity != member => {
                    return Err(malformed(format!("altered identity {}", member.account_address)));
                }
                Some(_) => {}
            }
            if !seen.insert(member.account_address) {
                return Err(malformed(format!("node {} appears twice", member.account_address)));
            }
        }
        if seen.len() != expected.len() {
            return Err(malformed(format!(
                "{} of {} nodes missing",
                expected.len() - seen.len(),
                expected.len()
            )));
        }

        if !is_normalized(topology) {
            return Err(malformed("topology not in normalized order"));
        }
        Ok(())
    }

    /// The best topology reachable by moving one node to another cluster,
    /// if it is strictly better than `current`.
    ///
    /// Moves never empty a cluster, so the cluster count is preserved.
    pub fn improve(&self, current: &ScoredTopology) -> Option<ScoredTopology> {
        let clusters = &current.topology.clusters;
        let mut best: Option<ScoredTopology> = None;

        for (from, cluster) in clusters.iter().enumerate() {
            if cluster.members.len() <= 1 {
                continue;
            }
            for index in 0..cluster.members.len() {
                for to in (0..clusters.len()).filter(|to| *to != from) {
                    let mut moved = clusters.clone();
                    let node = moved[from].members.remove(index);
                    moved[to].members.push(node);
                    let candidate = self.scored(normalize(NetworkTopology { clusters: moved }));

                    let reference = best.as_ref().unwrap_or(current);
                    if self.compare(&candidate, reference) == Preference::Better {
                        best = Some(candidate);
                    }
                }
            }
        }
        best
    }
}

fn malformed(reason: impl Into<String>) -> TopologyError {
    TopologyError::MalformedTopology(reason.into())
}

/// Members sorted by address, clusters sorted by first member address.
pub fn normalize(mut topology: NetworkTopology) -> NetworkTopology {
    topology.clusters.retain(|c| !c.members.is_empty());
    for cluster in &mut topology.clusters {
        cluster.members.sort_by(|a, b| a.account_address.cmp(&b.account_address));
    }
    topology
        .clusters
        .sort_by(|a, b| a.members[0].account_address.cmp(&b.members[0].account_address));
    topology
}

pub fn is_normalized(topology: &NetworkTopology) -> bool {
    let members_sorted = topology.clusters.iter().all(|c| {
        c.members
            .windows(2)
            .all(|w| w[0].account_address < w[1].account_address)
    });
    let clusters_sorted = topology.clusters.windows(2).all(|w| {
        match (w[0].members.first(), w[1].members.first()) {
            (Some(a), Some(b)) => a.account_address < b.account_address,
            _ => false,
        }
    });
    members_sorted && clusters_sorted
}

/// Length-prefixed encoding of every full identity, cluster by cluster, in
/// topology order.
pub fn canonical_bytes(topology: &NetworkTopology) -> Vec<u8> {
    let clusters: Vec<Vec<u8>> = topology
        .clusters
        .iter()
        .map(|cluster| {
            let members: Vec<Vec<u8>> = cluster.members.iter().map(identity_bytes).collect();
            let fields: Vec<&[u8]> = members.iter().map(Vec::as_slice).collect();
            encode_multi_field(&fields)
        })
        .collect();
    let fields: Vec<&[u8]> = clusters.iter().map(Vec::as_slice).collect();
    encode_multi_field(&fields)
}

fn identity_bytes(identity: &NodeIdentity) -> Vec<u8> {
    encode_multi_field(&[
        &identity.protocol_version.to_le_bytes(),
        &identity.account_address.to_bytes(),
        &identity.geo_location.lat_minutes.to_le_bytes(),
        &identity.geo_location.lon_minutes.to_le_bytes(),
        identity.network_address.as_bytes(),
        &identity.ports.p2p.to_le_bytes(),
        &identity.ports.rpc.to_le_bytes(),
        &identity.timestamp.to_le_bytes(),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{GeoLocation, Ports, PROTOCOL_VERSION};

    fn node(id: u8, lat: i32, lon: i32) -> NodeIdentity {
        NodeIdentity {
            protocol_version: PROTOCOL_VERSION,
            account_address: AccountAddress::from_bytes(&[id; 32]),
            geo_location: GeoLocation {
                lat_minutes: lat,
                lon_minutes: lon,
            },
            network_address: format!("node-{id}"),
            ports: Ports { p2p: 7000, rpc: 7001 },
            timestamp: 0,
        }
    }

    fn four_nodes() -> Vec<NodeIdentity> {
        vec![
            node(4, 0, 0),
            node(3, 20, 30),
            node(2, 2000, 6000),
            node(1, 2030, 6010),
        ]
    }

    fn topology(groups: &[&[NodeIdentity]]) -> NetworkTopology {
        normalize(NetworkTopology {
            clusters: groups
                .iter()
                .map(|g| Cluster {
                    members: g.to_vec(),
                })
                .collect(),
        })
    }

    #[test]
    fn test_propose_is_valid() {
        let model = GeoTopologyModel::default();
        let members = four_nodes();
        let candidate = model.propose(&members);
        assert_eq!(candidate.topology.cluster_count(), 2);
        model
            .validate(&candidate.topology, &members)
            .expect("proposal validates");
        assert_eq!(candidate.score, model.score(&candidate.topology));
    }

    #[test]
    fn test_propose_deterministic() {
        let model = GeoTopologyModel::default();
        let mut members = four_nodes();
        let a = model.propose(&members);
        members.rotate_left(2);
        let b = model.propose(&members);
        assert_eq!(canonical_bytes(&a.topology), canonical_bytes(&b.topology));
        assert_eq!(a.score.to_bits(), b.score.to_bits());
    }

    #[test]
    fn test_compare_total_order() {
        let model = GeoTopologyModel::default();
        let n = four_nodes();
        let good = model.scored(topology(&[&[n[0].clone(), n[1].clone()], &[n[2].clone(), n[3].clone()]]));
        let bad = model.scored(topology(&[&[n[0].clone(), n[2].clone()], &[n[1].clone(), n[3].clone()]]));
        assert_eq!(model.compare(&good, &bad), Preference::Better);
        assert_eq!(model.compare(&bad, &good), Preference::Worse);
        assert_eq!(model.compare(&good, &good.clone()), Preference::Equal);
    }

    #[test]
    fn test_equal_scores_broken_by_bytes() {
        let model = GeoTopologyModel::default();
        let n = four_nodes();
        let a = ScoredTopology {
            topology: topology(&[&[n[0].clone(), n[1].clone()], &[n[2].clone(), n[3].clone()]]),
            score: 1.0,
        };
        let b = ScoredTopology {
            topology: topology(&[&[n[0].clone(), n[2].clone()], &[n[1].clone(), n[3].clone()]]),
            score: 1.0,
        };
        let ab = model.compare(&a, &b);
        let ba = model.compare(&b, &a);
        assert_ne!(ab, Preference::Equal);
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_cluster_boundaries_in_canonical_bytes() {
        let n = four_nodes();
        let split = topology(&[&[n[3].clone(), n[2].clone()], &[n[1].clone(), n[0].clone()]]);
        let joined = topology(&[&n[..]]);
        assert_ne!(canonical_bytes(&split), canonical_bytes(&joined));
    }

    #[test]
    fn test_validate_rejects_wrong_k() {
        let model = GeoTopologyModel::default();
        let members = four_nodes();
        let err = model.validate(&topology(&[&members]), &members).expect_err("k");
        assert!(err.to_string().contains("expected 2 clusters"));
    }

    #[test]
    fn test_validate_rejects_missing_and_extra() {
        let model = GeoTopologyModel::default();
        let members = four_nodes();
        let missing = topology(&[&members[..1], &members[1..3]]);
        assert!(model.validate(&missing, &members).is_err());

        let extra = node(9, 1, 1);
        let with_extra = topology(&[&members[..2], &[members[2].clone(), members[3].clone(), extra]]);
        assert!(model.validate(&with_extra, &members).is_err());
    }

    #[test]
    fn test_validate_rejects_duplicate() {
        let model = GeoTopologyModel::default();
        let members = four_nodes();
        let dup = NetworkTopology {
            clusters: vec![
                Cluster {
                    members: vec![members[3].clone(), members[2].clone()],
                },
                Cluster {
                    members: vec![members[2].clone(), members[1].clone()],
                },
            ],
        };
        assert!(model.validate(&dup, &members).is_err());
    }

    #[test]
    fn test_validate_rejects_altered_identity() {
        let model = GeoTopologyModel::default();
        let members = four_nodes();
        let mut candidate = model.propose(&members).topology;
        candidate.clusters[0].members[0].network_address = "elsewhere".to_string();
        let err = model.validate(&candidate, &members).expect_err("altered");
        assert!(err.to_string().contains("altered"));
    }

    #[test]
    fn test_validate_rejects_unnormalized() {
        let model = GeoTopologyModel::default();
        let members = four_nodes();
        let mut candidate = model.propose(&members).topology;
        candidate.clusters.swap(0, 1);
        assert!(model.validate(&candidate, &members).is_err());
    }

    #[test]
    fn test_improve_finds_better_move() {
        let model = GeoTopologyModel::default();
        let n = vec![
            node(1, 0, 0),
            node(2, 0, 10),
            node(3, 0, 20),
            node(4, 0, 5000),
            node(5, 0, 5010),
        ];
        // Node 3 sits with the far group; moving it home must help.
        let start = model.scored(topology(&[&n[..2], &n[2..]]));
        let improved = model.improve(&start).expect("improvement");
        assert_eq!(model.compare(&improved, &start), Preference::Better);
        assert_eq!(improved.topology.cluster_count(), start.topology.cluster_count());
        assert!(improved.topology.clusters.iter().all(|c| !c.members.is_empty()));
    }

    #[test]
    fn test_improve_stops_at_local_optimum() {
        let model = GeoTopologyModel::default();
        let mut current = model.propose(&four_nodes());
        let mut steps = 0;
        while let Some(next) = model.improve(&current) {
            assert_eq!(model.compare(&next, &current), Preference::Better);
            current = next;
            steps += 1;
            assert!(steps < 100);
        }
    }

    proptest::proptest! {
        /// Property: any member set yields a proposal that validates against it,
        /// whatever order the members arrive in.
        #[test]
        fn proposals_always_validate(
            coords in proptest::collection::vec((-5400i32..=5400, 0i32..=10800), 1..24),
        ) {
            let model = GeoTopologyModel::default();
            let members: Vec<NodeIdentity> = coords
                .iter()
                .enumerate()
                .map(|(i, (lat, lon))| node(i as u8 + 1, *lat, *lon))
                .collect();
            let candidate = model.propose(&members);
            proptest::prop_assert!(model.validate(&candidate.topology, &members).is_ok());

            let mut reversed = members.clone();
            reversed.reverse();
            proptest::prop_assert_eq!(model.propose(&reversed).topology, candidate.topology);
        }
    }
}
