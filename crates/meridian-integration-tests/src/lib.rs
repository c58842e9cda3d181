//! Integration test crate for the Meridian protocol.
//!
//! The flows live under `tests/`; this library only holds the fixtures they
//! share: an in-process network built from library types, and real daemon
//! nodes serving RPC on temporary Unix sockets.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p meridian-integration-tests
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

use meridian_auth::{AuthenticatedMessageService, ManualClock, ReplayCache, ReplayGuard};
use meridian_crypto::provider::{AccountKeypair, SchemeRegistry};
use meridian_daemon::config::DaemonConfig;
use meridian_daemon::rpc::RpcServer;
use meridian_daemon::DaemonState;
use meridian_negotiation::driver::{run_joiner, run_responder};
use meridian_negotiation::{
    IdentityRegistry, JoinerSession, NegotiationConfig, NegotiationOutcome, ResponderSession,
    SessionContext, StaticStakeLedger,
};
use meridian_topology::GeoTopologyModel;
use meridian_transport::stream::{duplex, DEFAULT_CAPACITY};
use meridian_types::{GeoLocation, NodeIdentity, Ports, SignatureScheme, PROTOCOL_VERSION};

/// Fixed wall clock for in-process networks.
pub const NOW: u64 = 1_700_000_000_000;

/// Three members: two in one region, one far away.
pub const MEMBERS: [(i32, i32); 3] = [(3000, 600), (3060, 700), (-2000, 8000)];

/// A joiner next to the far member.
pub const JOINER: (i32, i32) = (-2100, 8100);

pub fn keypair() -> anyhow::Result<Arc<AccountKeypair>> {
    Ok(Arc::new(AccountKeypair::generate(
        SignatureScheme::SchnorrPallasSha3,
    )?))
}

pub fn identity(keypair: &AccountKeypair, (lat, lon): (i32, i32)) -> anyhow::Result<NodeIdentity> {
    Ok(NodeIdentity {
        protocol_version: PROTOCOL_VERSION,
        account_address: keypair.address(),
        geo_location: GeoLocation::new(lat, lon)?,
        network_address: format!("10.0.{}.{}", lat.rem_euclid(256), lon.rem_euclid(256)),
        ports: Ports { p2p: 7400, rpc: 7401 },
        timestamp: NOW,
    })
}

// ---------------------------------------------------------------------------
// In-process network
// ---------------------------------------------------------------------------

/// A committed network whose first member answers `refactor_network`.
pub struct LocalNet {
    pub clock: Arc<ManualClock>,
    pub registry: Arc<IdentityRegistry>,
    pub responder: Arc<AccountKeypair>,
    pub config: NegotiationConfig,
}

impl LocalNet {
    /// Bootstrap a network with one member per location.
    pub fn bootstrap(locations: &[(i32, i32)]) -> anyhow::Result<Self> {
        let clock = Arc::new(ManualClock::new(NOW));
        let config = NegotiationConfig::default();
        let registry = Arc::new(IdentityRegistry::with_clock(config.max_clock_skew, clock.clone()));

        let responder = keypair()?;
        let mut members = Vec::with_capacity(locations.len());
        for (i, location) in locations.iter().enumerate() {
            let kp = if i == 0 { responder.clone() } else { keypair()? };
            members.push(identity(&kp, *location)?);
        }
        registry.bootstrap(members, &GeoTopologyModel::default());

        Ok(Self {
            clock,
            registry,
            responder,
            config,
        })
    }

    pub fn auth(&self) -> AuthenticatedMessageService {
        AuthenticatedMessageService::new(SchemeRegistry::with_default_schemes(), self.clock.clone())
    }

    pub fn context(&self, keypair: Arc<AccountKeypair>) -> SessionContext {
        SessionContext {
            auth: self.auth(),
            model: GeoTopologyModel::default(),
            config: self.config.clone(),
            keypair,
        }
    }

    /// A joiner against the currently committed topology.
    pub fn joiner(&self, keypair: Arc<AccountKeypair>, location: (i32, i32)) -> anyhow::Result<JoinerSession> {
        let identity = identity(&keypair, location)?;
        let guard: Arc<dyn ReplayGuard> = Arc::new(Mutex::new(ReplayCache::with_retention(
            self.config.max_clock_skew,
        )));
        Ok(JoinerSession::new(
            self.context(keypair),
            identity,
            self.registry.snapshot(),
            guard,
        ))
    }

    pub fn responder(&self, stake: StaticStakeLedger) -> ResponderSession {
        ResponderSession::new(
            self.context(self.responder.clone()),
            self.registry.clone(),
            Arc::new(stake),
        )
    }

    /// Run both drivers back to back. Returns (joiner, responder) outcomes.
    pub async fn negotiate(
        &self,
        joiner: JoinerSession,
    ) -> (
        meridian_negotiation::Result<NegotiationOutcome>,
        meridian_negotiation::Result<NegotiationOutcome>,
    ) {
        let (joiner_end, responder_end) = duplex(DEFAULT_CAPACITY);
        let responder = tokio::spawn(run_responder(
            self.responder(StaticStakeLedger::default()),
            responder_end,
        ));
        let joined = run_joiner(joiner, joiner_end).await;
        let served = match responder.await {
            Ok(result) => result,
            Err(e) => Err(meridian_negotiation::NegotiationError::PeerClosed(e.to_string())),
        };
        (joined, served)
    }
}

// ---------------------------------------------------------------------------
// Daemon nodes
// ---------------------------------------------------------------------------

static NEXT_SOCKET: AtomicU32 = AtomicU32::new(0);

/// A fresh socket path under the temp directory.
pub fn socket_path(name: &str) -> PathBuf {
    let n = NEXT_SOCKET.fetch_add(1, Ordering::SeqCst);
    std::env::temp_dir().join(format!("meridian-{}-{n}-{name}.sock", std::process::id()))
}

/// Configuration for a node at `location` listening on a fresh socket.
pub fn node_config(name: &str, (lat, lon): (i32, i32)) -> DaemonConfig {
    let mut config = DaemonConfig::default();
    config.network.listen_socket = socket_path(name).display().to_string();
    config.identity.lat_minutes = lat;
    config.identity.lon_minutes = lon;
    config.identity.network_address = name.to_string();
    config
}

/// A daemon serving RPC in the background. Stops when dropped.
pub struct TestNode {
    pub state: Arc<DaemonState>,
    pub socket: PathBuf,
    server: JoinHandle<()>,
}

impl TestNode {
    /// Build the node state without serving. The caller joins or bootstraps
    /// before calling [`serve`](Self::serve).
    pub fn state(config: DaemonConfig) -> anyhow::Result<Arc<DaemonState>> {
        let keypair = AccountKeypair::generate(config.identity.signature_scheme()?)?;
        Ok(Arc::new(DaemonState::new(config, keypair)?))
    }

    /// Serve RPC for `state` on its configured socket.
    pub fn serve(state: Arc<DaemonState>) -> anyhow::Result<Self> {
        let socket = state.config.listen_socket();
        let server = RpcServer::new(state.clone(), socket.clone());
        let listener = server.bind()?;
        let server = tokio::spawn(async move {
            if let Err(e) = server.serve(listener).await {
                tracing::warn!(error = %e, "test node stopped");
            }
        });
        Ok(Self {
            state,
            socket,
            server,
        })
    }

    /// A node that starts a new network with itself as the only member.
    pub fn genesis(config: DaemonConfig) -> anyhow::Result<Self> {
        let state = Self::state(config)?;
        state.bootstrap_genesis();
        Self::serve(state)
    }
}

impl Drop for TestNode {
    fn drop(&mut self) {
        self.server.abort();
        let _ = std::fs::remove_file(&self.socket);
    }
}

/// Shorten per-round waits for tests that expect a timeout.
pub fn quick_timeouts(config: &mut DaemonConfig, round_secs: u64) {
    config.negotiation.round_timeout_secs = round_secs;
    config.negotiation.session_timeout_secs = round_secs * 3;
}
