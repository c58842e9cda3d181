//! Joining an existing network through a seed node.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use meridian_auth::ReplayGuard;
use meridian_negotiation::driver::run_joiner;
use meridian_negotiation::{JoinerSession, NegotiationOutcome};
use meridian_transport::messages::{RequestFrame, ResponseFrame};
use meridian_transport::stream::{duplex, DEFAULT_CAPACITY};

use crate::client::RpcClient;
use crate::rpc::bridge_frames;
use crate::DaemonState;

/// Negotiate membership with the node at `seed` and install the agreed
/// topology locally.
pub async fn join_network(state: &Arc<DaemonState>, seed: &Path) -> anyhow::Result<NegotiationOutcome> {
    let mut client = RpcClient::connect(seed).await?;
    let baseline = client.get_topology().await.context("fetching seed topology")?;
    info!(
        seed = %seed.display(),
        version = baseline.version,
        nodes = baseline.topology.node_count(),
        "joining network"
    );

    let (reader, writer) = client.into_frames().await.context("starting refactor_network")?;
    let guard: Arc<dyn ReplayGuard> = state.registry.clone();
    let session = JoinerSession::new(state.session_context(), state.identity.clone(), baseline, guard);

    let (driver_end, bridge_end) = duplex::<RequestFrame, ResponseFrame>(DEFAULT_CAPACITY);
    let bridge = tokio::spawn(bridge_frames(
        reader,
        writer,
        bridge_end,
        state.config.network.max_line_bytes,
    ));

    let outcome = run_joiner(session, driver_end).await;
    match bridge.await {
        Ok(Err(e)) => warn!(error = %e, "frame bridge failed"),
        Err(e) => warn!(error = %e, "frame bridge task failed"),
        Ok(Ok(())) => {}
    }
    let outcome = outcome?;

    state.registry.adopt(outcome.snapshot());
    info!(
        version = outcome.baseline_version + 1,
        clusters = outcome.topology.cluster_count(),
        rounds = outcome.rounds,
        "joined network"
    );
    Ok(outcome)
}
