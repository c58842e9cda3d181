//! Cluster topology structures.

use serde::{Deserialize, Serialize};

use crate::{AccountAddress, NodeIdentity, Timestamped, Word256};

/// One cluster of the network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub members: Vec<NodeIdentity>,
}

/// An ordered set of clusters partitioning every node of the network.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkTopology {
    pub clusters: Vec<Cluster>,
}

impl NetworkTopology {
    /// A single-cluster topology; used for genesis.
    pub fn single(members: Vec<NodeIdentity>) -> Self {
        if members.is_empty() {
            return Self::default();
        }
        Self {
            clusters: vec![Cluster { members }],
        }
    }

    pub fn node_count(&self) -> usize {
        self.clusters.iter().map(|c| c.members.len()).sum()
    }

    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }

    /// Every member in cluster order.
    pub fn members(&self) -> impl Iterator<Item = &NodeIdentity> {
        self.clusters.iter().flat_map(|c| c.members.iter())
    }

    pub fn contains(&self, address: &AccountAddress) -> bool {
        self.members().any(|m| &m.account_address == address)
    }

    /// Index of the cluster holding `address`.
    pub fn cluster_of(&self, address: &AccountAddress) -> Option<usize> {
        self.clusters
            .iter()
            .position(|c| c.members.iter().any(|m| &m.account_address == address))
    }
}

/// Payload of a signed topology proposal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyProposal {
    /// Binds the proposal to one handshake.
    pub session_id: Word256,
    /// Committed topology version the proposal was computed against.
    pub baseline_version: u64,
    pub topology: NetworkTopology,
    /// Unix milliseconds. Strictly increasing within a session.
    pub timestamp: u64,
}

impl Timestamped for TopologyProposal {
    fn timestamp(&self) -> u64 {
        self.timestamp
    }
}

/// The committed topology and its version, as served by `get_topology`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologySnapshot {
    pub version: u64,
    pub topology: NetworkTopology,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoLocation, Ports};

    fn node(id: u8) -> NodeIdentity {
        NodeIdentity {
            protocol_version: crate::PROTOCOL_VERSION,
            account_address: AccountAddress::from_bytes(&[id; 32]),
            geo_location: GeoLocation {
                lat_minutes: i32::from(id),
                lon_minutes: i32::from(id),
            },
            network_address: format!("10.0.0.{id}"),
            ports: Ports { p2p: 7000, rpc: 7001 },
            timestamp: 0,
        }
    }

    #[test]
    fn test_single_topology() {
        let topology = NetworkTopology::single(vec![node(1), node(2)]);
        assert_eq!(topology.cluster_count(), 1);
        assert_eq!(topology.node_count(), 2);
        assert!(NetworkTopology::single(Vec::new()).clusters.is_empty());
    }

    #[test]
    fn test_cluster_lookup() {
        let topology = NetworkTopology {
            clusters: vec![
                Cluster {
                    members: vec![node(1)],
                },
                Cluster {
                    members: vec![node(2), node(3)],
                },
            ],
        };
        assert_eq!(topology.cluster_of(&node(3).account_address), Some(1));
        assert_eq!(topology.cluster_of(&node(9).account_address), None);
        assert!(topology.contains(&node(1).account_address));
        assert_eq!(topology.members().count(), 3);
    }
}
