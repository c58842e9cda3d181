//! RPC command handlers.
//!
//! Each submodule implements the methods for one area of the node surface.
//! `refactor_network` is not here: it takes over its connection and is
//! served from [`crate::rpc`].

pub mod chain;
pub mod join;
pub mod network;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::rpc::RpcError;

/// Deserialize a required field of `params`.
fn required<T: DeserializeOwned>(params: &Value, name: &str) -> Result<T, RpcError> {
    let value = params
        .get(name)
        .ok_or_else(|| RpcError::invalid_params(&format!("{name} required")))?;
    serde_json::from_value(value.clone())
        .map_err(|e| RpcError::invalid_params(&format!("{name}: {e}")))
}

fn to_value<T: serde::Serialize>(value: &T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&format!("encode: {e}")))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Arc;

    use meridian_auth::ManualClock;
    use meridian_crypto::provider::AccountKeypair;
    use meridian_types::SignatureScheme;

    use crate::config::{Allocation, DaemonConfig};
    use crate::DaemonState;

    pub(crate) const NOW: u64 = 1_700_000_000_000;

    /// A daemon whose own account holds 1000 with 100 staked.
    pub(crate) fn state() -> Arc<DaemonState> {
        state_with(|_| {})
    }

    /// Like [`state`], with `adjust` applied to the config first.
    pub(crate) fn state_with(adjust: impl FnOnce(&mut DaemonConfig)) -> Arc<DaemonState> {
        let keypair = AccountKeypair::generate(SignatureScheme::SchnorrPallasSha3).expect("keypair");
        let mut config = DaemonConfig::default();
        config.identity.lon_minutes = 600;
        config.ledger.allocations.push(Allocation {
            address: keypair.address().to_string(),
            balance: 1000,
            stake: 100,
        });
        adjust(&mut config);
        let state = DaemonState::with_clock(config, keypair, Arc::new(ManualClock::new(NOW)))
            .expect("state");
        Arc::new(state)
    }
}
