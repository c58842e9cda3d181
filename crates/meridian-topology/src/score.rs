//! Convergence score.
//!
//! `score = Var_i(|p_i - c(p_i)|^2)`: the population variance, over all
//! nodes, of each node's squared distance to its cluster's mean. Lower is
//! more balanced. Sums run in topology order, so normalized topologies score
//! bit-identically everywhere.

use meridian_types::NetworkTopology;

use crate::geo::{self, Point};

/// Score a topology. An empty topology scores `0.0`.
pub fn score(topology: &NetworkTopology) -> f64 {
    let distances = squared_distances(topology);
    if distances.is_empty() {
        return 0.0;
    }
    let n = distances.len() as f64;
    let mean = distances.iter().fold(0.0, |acc, d| acc + d) / n;
    distances
        .iter()
        .fold(0.0, |acc, d| {
            let diff = d - mean;
            acc + diff * diff
        })
        / n
}

/// Squared distance of every node to its cluster centroid, in topology order.
pub fn squared_distances(topology: &NetworkTopology) -> Vec<f64> {
    let mut out = Vec::with_capacity(topology.node_count());
    for cluster in &topology.clusters {
        let points: Vec<Point> = cluster
            .members
            .iter()
            .map(|m| Point::from(&m.geo_location))
            .collect();
        let centre = geo::centroid(&points);
        out.extend(points.iter().map(|p| p.squared_distance(&centre)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_types::{AccountAddress, Cluster, GeoLocation, NodeIdentity, Ports, PROTOCOL_VERSION};

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

    #[test]
    fn test_empty_scores_zero() {
        assert_eq!(score(&NetworkTopology::default()), 0.0);
    }

    #[test]
    fn test_symmetric_clusters_score_zero() {
        let topology = NetworkTopology {
            clusters: vec![
                Cluster {
                    members: vec![node(1, 0, 0), node(2, 0, 2)],
                },
                Cluster {
                    members: vec![node(3, 100, 100), node(4, 100, 102)],
                },
            ],
        };
        // Every node is at squared distance 1 from its centroid.
        assert_eq!(squared_distances(&topology), vec![1.0; 4]);
        assert_eq!(score(&topology), 0.0);
    }

    #[test]
    fn test_variance_value() {
        let topology = NetworkTopology {
            clusters: vec![
                Cluster {
                    members: vec![node(1, 0, 0), node(2, 0, 2)],
                },
                Cluster {
                    members: vec![node(3, 0, 10)],
                },
            ],
        };
        // Distances [1, 1, 0]: mean 2/3, variance 2/9.
        let s = score(&topology);
        assert!((s - 2.0 / 9.0).abs() < 1e-12);
    }
}
