//! Authoritative membership, committed topology and replay cache.
//!
//! All topology mutations go through one lock and bump `version`. Sessions
//! read a [`Baseline`] when they start and hand its version back to
//! [`IdentityRegistry::commit`]; if another session committed in between the
//! commit fails with `StaleTopology`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use meridian_auth::{AuthError, Clock, ReplayCache, ReplayGuard, SystemClock};
use meridian_topology::GeoTopologyModel;
use meridian_types::{AccountAddress, NetworkTopology, NodeIdentity, TopologySnapshot};

use crate::{NegotiationError, Result};

/// A consistent view of the committed state at one version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Baseline {
    pub version: u64,
    /// Members sorted by address.
    pub members: Vec<NodeIdentity>,
    pub topology: NetworkTopology,
}

#[derive(Debug, Default)]
struct RegistryState {
    members: BTreeMap<AccountAddress, NodeIdentity>,
    topology: NetworkTopology,
    version: u64,
}

pub struct IdentityRegistry {
    state: Mutex<RegistryState>,
    replay: Mutex<ReplayCache>,
    clock: Arc<dyn Clock>,
}

impl IdentityRegistry {
    /// An empty registry whose replay cache retains `max_clock_skew`.
    pub fn new(max_clock_skew: Duration) -> Self {
        Self::with_clock(max_clock_skew, Arc::new(SystemClock))
    }

    pub fn with_clock(max_clock_skew: Duration, clock: Arc<dyn Clock>) -> Self {
        Self::with_replay_cache(ReplayCache::with_retention(max_clock_skew), clock)
    }

    pub fn with_replay_cache(cache: ReplayCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            replay: Mutex::new(cache),
            clock,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Install the genesis membership, clustered by `model`.
    ///
    /// Returns the new version.
    pub fn bootstrap(&self, members: Vec<NodeIdentity>, model: &GeoTopologyModel) -> u64 {
        let topology = model.propose(&members).topology;
        let mut state = self.state();
        state.members = members.into_iter().map(|m| (m.account_address, m)).collect();
        state.topology = topology;
        state.version += 1;
        tracing::info!(
            members = state.members.len(),
            clusters = state.topology.cluster_count(),
            version = state.version,
            "registry bootstrapped"
        );
        state.version
    }

    /// Replace local state with a topology agreed elsewhere.
    pub fn adopt(&self, snapshot: TopologySnapshot) {
        let mut state = self.state();
        state.members = snapshot
            .topology
            .members()
            .map(|m| (m.account_address, m.clone()))
            .collect();
        state.topology = snapshot.topology;
        state.version = snapshot.version;
        tracing::info!(members = state.members.len(), version = state.version, "adopted topology");
    }

    fn admit_locked(state: &mut RegistryState, identity: NodeIdentity) -> bool {
        if state.members.contains_key(&identity.account_address) {
            return false;
        }
        state.members.insert(identity.account_address, identity);
        true
    }

    pub fn is_member(&self, address: &AccountAddress) -> bool {
        self.state().members.contains_key(address)
    }

    pub fn member(&self, address: &AccountAddress) -> Option<NodeIdentity> {
        self.state().members.get(address).cloned()
    }

    pub fn member_count(&self) -> usize {
        self.state().members.len()
    }

    pub fn version(&self) -> u64 {
        self.state().version
    }

    pub fn baseline(&self) -> Baseline {
        let state = self.state();
        Baseline {
            version: state.version,
            members: state.members.values().cloned().collect(),
            topology: state.topology.clone(),
        }
    }

    pub fn snapshot(&self) -> TopologySnapshot {
        let state = self.state();
        TopologySnapshot {
            version: state.version,
            topology: state.topology.clone(),
        }
    }

    /// Atomically admit `joiner` and install `topology`, provided nothing
    /// was committed since `expected_version`. Returns the new version.
    pub fn commit(
        &self,
        expected_version: u64,
        joiner: NodeIdentity,
        topology: NetworkTopology,
    ) -> Result<u64> {
        let mut state = self.state();
        if state.version != expected_version {
            tracing::info!(expected = expected_version, actual = state.version, "stale commit rejected");
            return Err(NegotiationError::StaleTopology {
                expected: expected_version,
                actual: state.version,
            });
        }
        let address = joiner.account_address;
        if !Self::admit_locked(&mut state, joiner) {
            return Err(NegotiationError::NotEligible(format!("{address} is already a member")));
        }
        state.topology = topology;
        state.version += 1;
        tracing::info!(
            joiner = %address.short(),
            members = state.members.len(),
            version = state.version,
            "topology committed"
        );
        Ok(state.version)
    }

    /// Record a `(signer, type_tag, timestamp)` triple against the registry clock.
    pub fn record_seen(
        &self,
        signer: &AccountAddress,
        type_tag: &str,
        timestamp: u64,
    ) -> std::result::Result<(), AuthError> {
        ReplayGuard::record_seen(self, signer, type_tag, timestamp, self.clock.now_ms())
    }
}

impl ReplayGuard for IdentityRegistry {
    fn record_seen(
        &self,
        signer: &AccountAddress,
        type_tag: &str,
        timestamp: u64,
        now: u64,
    ) -> std::result::Result<(), AuthError> {
        self.replay
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(signer, type_tag, timestamp, now)
    }
}

impl std::fmt::Debug for IdentityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("IdentityRegistry")
            .field("members", &state.members.len())
            .field("version", &state.version)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_auth::ManualClock;
    use meridian_types::{GeoLocation, Ports, PROTOCOL_VERSION};

    fn node(id: u8) -> NodeIdentity {
        NodeIdentity {
            protocol_version: PROTOCOL_VERSION,
            account_address: AccountAddress::from_bytes(&[id; 32]),
            geo_location: GeoLocation {
                lat_minutes: i32::from(id) * 10,
                lon_minutes: i32::from(id) * 10,
            },
            network_address: format!("node-{id}"),
            ports: Ports { p2p: 7000, rpc: 7001 },
            timestamp: 0,
        }
    }

    fn registry() -> IdentityRegistry {
        IdentityRegistry::with_clock(Duration::from_secs(30), Arc::new(ManualClock::new(1_000_000)))
    }

    #[test]
    fn test_bootstrap() {
        let registry = registry();
        let version = registry.bootstrap(vec![node(1), node(2), node(3)], &GeoTopologyModel::default());
        assert_eq!(version, 1);
        assert!(registry.is_member(&node(2).account_address));
        let baseline = registry.baseline();
        assert_eq!(baseline.members.len(), 3);
        assert_eq!(baseline.topology.cluster_count(), 2);
    }

    #[test]
    fn test_commit_bumps_version() {
        let registry = registry();
        registry.bootstrap(vec![node(1)], &GeoTopologyModel::default());
        let topology = NetworkTopology::single(vec![node(1), node(2)]);
        let version = registry.commit(1, node(2), topology.clone()).expect("commit");
        assert_eq!(version, 2);
        assert!(registry.is_member(&node(2).account_address));
        assert_eq!(registry.snapshot().topology, topology);
    }

    #[test]
    fn test_stale_commit_changes_nothing() {
        let registry = registry();
        registry.bootstrap(vec![node(1)], &GeoTopologyModel::default());
        let err = registry
            .commit(0, node(2), NetworkTopology::default())
            .expect_err("stale");
        assert!(matches!(err, NegotiationError::StaleTopology { expected: 0, actual: 1 }));
        assert!(!registry.is_member(&node(2).account_address));
        assert_eq!(registry.version(), 1);
    }

    #[test]
    fn test_member_cannot_be_committed_twice() {
        let registry = registry();
        registry.bootstrap(vec![node(1)], &GeoTopologyModel::default());
        let err = registry
            .commit(1, node(1), NetworkTopology::single(vec![node(1)]))
            .expect_err("member");
        assert!(matches!(err, NegotiationError::NotEligible(_)));
        assert_eq!(registry.version(), 1);
        assert_eq!(registry.member_count(), 1);
    }

    #[test]
    fn test_members_and_topology_agree_after_commit() {
        let registry = registry();
        registry.bootstrap(vec![node(1), node(2)], &GeoTopologyModel::default());
        let topology = NetworkTopology::single(vec![node(1), node(2), node(3)]);
        registry.commit(1, node(3), topology).expect("commit");

        let baseline = registry.baseline();
        let mut in_topology: Vec<NodeIdentity> = registry.snapshot().topology.members().cloned().collect();
        in_topology.sort_by_key(|m| m.account_address);
        assert_eq!(baseline.members, in_topology);
    }

    #[test]
    fn test_record_seen_detects_replay() {
        let registry = registry();
        let signer = node(1).account_address;
        registry.record_seen(&signer, "tag", 999_000).expect("first");
        let err = registry.record_seen(&signer, "tag", 999_000).expect_err("replay");
        assert!(matches!(err, AuthError::ReplayDetected { .. }));
    }

    #[test]
    fn test_adopt_snapshot() {
        let registry = registry();
        registry.adopt(TopologySnapshot {
            version: 7,
            topology: NetworkTopology::single(vec![node(4), node(5)]),
        });
        assert_eq!(registry.version(), 7);
        assert_eq!(registry.member_count(), 2);
    }
}
