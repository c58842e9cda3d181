//! Shared fixtures for session and driver tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use meridian_auth::{AuthenticatedMessageService, ManualClock, ReplayCache, ReplayGuard};
use meridian_crypto::provider::{AccountKeypair, SchemeRegistry};
use meridian_topology::GeoTopologyModel;
use meridian_types::{
    AccountAddress, GeoLocation, NodeIdentity, Ports, SignatureScheme, PROTOCOL_VERSION,
};

use crate::eligibility::StaticStakeLedger;
use crate::registry::IdentityRegistry;
use crate::session::{JoinerSession, ResponderSession, SessionContext};
use crate::NegotiationConfig;

pub(crate) const NOW: u64 = 1_700_000_000_000;

pub(crate) struct Net {
    pub clock: Arc<ManualClock>,
    pub registry: Arc<IdentityRegistry>,
    pub responder: Arc<AccountKeypair>,
}

pub(crate) fn keypair() -> Arc<AccountKeypair> {
    Arc::new(AccountKeypair::generate(SignatureScheme::SchnorrPallasSha3).expect("keypair"))
}

/// A node on the equator at `lon` arc-minutes.
pub(crate) fn identity(address: AccountAddress, lon: i32) -> NodeIdentity {
    NodeIdentity {
        protocol_version: PROTOCOL_VERSION,
        account_address: address,
        geo_location: GeoLocation {
            lat_minutes: 0,
            lon_minutes: lon,
        },
        network_address: format!("node-at-{lon}"),
        ports: Ports { p2p: 7000, rpc: 7001 },
        timestamp: NOW,
    }
}

/// Members at lon 0, 100 and 5000; the responder is the first.
pub(crate) fn net() -> Net {
    let clock = Arc::new(ManualClock::new(NOW));
    let registry = Arc::new(IdentityRegistry::with_clock(
        Duration::from_secs(30),
        clock.clone(),
    ));
    let responder = keypair();
    registry.bootstrap(
        vec![
            identity(responder.address(), 0),
            identity(AccountAddress::from_bytes(&[0xB0; 32]), 100),
            identity(AccountAddress::from_bytes(&[0xC0; 32]), 5000),
        ],
        &GeoTopologyModel::default(),
    );
    Net {
        clock,
        registry,
        responder,
    }
}

pub(crate) fn ctx(net: &Net, keypair: Arc<AccountKeypair>, config: NegotiationConfig) -> SessionContext {
    SessionContext {
        auth: AuthenticatedMessageService::new(
            SchemeRegistry::with_default_schemes(),
            net.clock.clone(),
        ),
        model: GeoTopologyModel::default(),
        config,
        keypair,
    }
}

pub(crate) fn joiner_guard() -> Arc<dyn ReplayGuard> {
    Arc::new(Mutex::new(ReplayCache::with_retention(Duration::from_secs(30))))
}

pub(crate) fn joiner(net: &Net, keypair: Arc<AccountKeypair>, lon: i32) -> JoinerSession {
    JoinerSession::new(
        ctx(net, keypair.clone(), NegotiationConfig::default()),
        identity(keypair.address(), lon),
        net.registry.snapshot(),
        joiner_guard(),
    )
}

pub(crate) fn responder(net: &Net, config: NegotiationConfig, stake: StaticStakeLedger) -> ResponderSession {
    ResponderSession::new(
        ctx(net, net.responder.clone(), config),
        net.registry.clone(),
        Arc::new(stake),
    )
}
