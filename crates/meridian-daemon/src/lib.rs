//! # meridian-daemon
//!
//! A Meridian node: serves the node RPC surface over a Unix socket, answers
//! `refactor_network` as responder, and joins an existing network through a
//! seed node on startup.
//!
//! ## Modules
//!
//! - [`config`] — TOML configuration
//! - [`node`] — key file and self-description
//! - [`chain`] — in-memory chain store and stake ledger
//! - [`rpc`] — JSON-RPC server and frame bridging
//! - [`client`] — JSON-RPC client used to join through a seed
//! - [`commands`] — method handlers

pub mod chain;
pub mod client;
pub mod commands;
pub mod config;
pub mod node;
pub mod rpc;

use std::sync::Arc;

use tokio::sync::broadcast;

use meridian_auth::{AuthError, AuthenticatedMessageService, Clock, SystemClock};
use meridian_crypto::provider::{AccountKeypair, SchemeRegistry};
use meridian_crypto::vrf::PallasVrf;
use meridian_negotiation::{IdentityRegistry, NegotiationConfig, SessionContext};
use meridian_topology::GeoTopologyModel;
use meridian_types::{tags, AccountBalance, NodeIdentity, SignedEnvelope};

use crate::chain::ChainStore;
use crate::config::DaemonConfig;

/// Daemon-wide shared state.
pub struct DaemonState {
    pub config: DaemonConfig,
    pub keypair: Arc<AccountKeypair>,
    /// This node's identity; the timestamp is set when signing.
    pub identity: NodeIdentity,
    pub auth: AuthenticatedMessageService,
    pub model: GeoTopologyModel,
    pub negotiation: NegotiationConfig,
    pub registry: Arc<IdentityRegistry>,
    pub chain: Arc<ChainStore>,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    pub fn new(config: DaemonConfig, keypair: AccountKeypair) -> anyhow::Result<Self> {
        Self::with_clock(config, keypair, Arc::new(SystemClock))
    }

    pub fn with_clock(
        config: DaemonConfig,
        keypair: AccountKeypair,
        clock: Arc<dyn Clock>,
    ) -> anyhow::Result<Self> {
        let identity = node::node_identity(&config, &keypair)?;
        let negotiation = config.negotiation.to_config();
        let auth = AuthenticatedMessageService::new(SchemeRegistry::with_default_schemes(), clock.clone());

        let genesis = config
            .ledger
            .allocations
            .iter()
            .map(|a| {
                Ok(AccountBalance {
                    address: a.account()?,
                    balance: a.balance,
                    stake: a.stake,
                })
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let chain = Arc::new(ChainStore::new(
            auth.clone(),
            Arc::new(PallasVrf),
            negotiation.max_clock_skew,
            config.ledger.mempool_capacity,
            genesis,
        ));
        let registry = Arc::new(IdentityRegistry::with_clock(negotiation.max_clock_skew, clock));
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            keypair: Arc::new(keypair),
            identity,
            auth,
            model: GeoTopologyModel::default(),
            negotiation,
            registry,
            chain,
            shutdown_tx,
        })
    }

    /// Start a new network with this node as its only member.
    pub fn bootstrap_genesis(&self) -> u64 {
        self.registry.bootstrap(vec![self.identity.clone()], &self.model)
    }

    pub fn session_context(&self) -> SessionContext {
        SessionContext {
            auth: self.auth.clone(),
            model: self.model,
            config: self.negotiation.clone(),
            keypair: self.keypair.clone(),
        }
    }

    /// This node's identity, freshly timestamped and signed.
    pub fn signed_identity(&self) -> Result<SignedEnvelope, AuthError> {
        let identity = NodeIdentity {
            timestamp: self.auth.now_ms(),
            ..self.identity.clone()
        };
        self.auth.sign_payload(tags::NODE_IDENTITY, &identity, &self.keypair)
    }

    pub fn is_member(&self) -> bool {
        self.registry.is_member(&self.keypair.address())
    }
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState")
            .field("address", &self.keypair.address())
            .field("registry", &self.registry)
            .field("chain", &self.chain)
            .finish()
    }
}
