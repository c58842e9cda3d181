//! Identity and topology queries.

use std::sync::Arc;

use serde_json::Value;

use meridian_transport::envelope;

use super::to_value;
use crate::rpc::RpcError;
use crate::DaemonState;

type Result = std::result::Result<Value, RpcError>;

/// This node's `NodeIdentity`, freshly signed, in wire form.
pub async fn get_identity(state: &Arc<DaemonState>) -> Result {
    let signed = state.signed_identity()?;
    to_value(&envelope::to_wire(&signed))
}

/// The committed topology and its version.
pub async fn get_topology(state: &Arc<DaemonState>) -> Result {
    to_value(&state.registry.snapshot())
}

#[cfg(test)]
mod tests {
    use meridian_types::{tags, NodeIdentity, TopologySnapshot, WireEnvelope};

    use super::*;
    use crate::commands::tests::state;

    #[tokio::test]
    async fn test_get_identity_is_signed() {
        let state = state();
        let value = get_identity(&state).await.expect("identity");
        let wire: WireEnvelope = serde_json::from_value(value).expect("envelope");
        assert_eq!(*wire.signer(), state.keypair.address());

        let signed = state.auth.verify_wire(&wire).expect("verify");
        assert_eq!(signed.type_tag, tags::NODE_IDENTITY);
        let identity: NodeIdentity =
            meridian_transport::cbor::from_slice(&signed.payload).expect("decode");
        assert_eq!(identity.geo_location.lon_minutes, 600);
    }

    #[tokio::test]
    async fn test_get_topology_after_genesis() {
        let state = state();
        let empty: TopologySnapshot =
            serde_json::from_value(get_topology(&state).await.expect("topology")).expect("decode");
        assert_eq!(empty.topology.node_count(), 0);

        let version = state.bootstrap_genesis();
        let snapshot: TopologySnapshot =
            serde_json::from_value(get_topology(&state).await.expect("topology")).expect("decode");
        assert_eq!(snapshot.version, version);
        assert!(snapshot.topology.contains(&state.keypair.address()));
    }
}
