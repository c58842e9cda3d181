//! Frames exchanged during `refactor_network` and the RPC method names of the
//! node surface.
//!
//! Once a connection switches into frame mode every line is one frame: the
//! joiner writes [`RequestFrame`]s, the responder writes [`ResponseFrame`]s.

use serde::{Deserialize, Serialize};

use meridian_types::{TopologyAgreement, WireEnvelope};

// ---------------------------------------------------------------------------
// RPC method names
// ---------------------------------------------------------------------------

pub const METHOD_GET_IDENTITY: &str = "get_identity";
pub const METHOD_GET_TOPOLOGY: &str = "get_topology";
pub const METHOD_GET_BLOCK: &str = "get_block";
pub const METHOD_GET_TRANSACTION: &str = "get_transaction";
pub const METHOD_GET_ACCOUNT_BALANCE: &str = "get_account_balance";
pub const METHOD_BROADCAST_TRANSACTION: &str = "broadcast_transaction";
pub const METHOD_BROADCAST_NEW_BLOCK: &str = "broadcast_new_block";
/// Switches the connection into frame mode.
pub const METHOD_REFACTOR_NETWORK: &str = "refactor_network";

/// Every method the node serves.
pub const ALL_METHODS: &[&str] = &[
    METHOD_GET_IDENTITY,
    METHOD_GET_TOPOLOGY,
    METHOD_GET_BLOCK,
    METHOD_GET_TRANSACTION,
    METHOD_GET_ACCOUNT_BALANCE,
    METHOD_BROADCAST_TRANSACTION,
    METHOD_BROADCAST_NEW_BLOCK,
    METHOD_REFACTOR_NETWORK,
];

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// Joiner to responder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum RequestFrame {
    /// The joiner's signed `NodeIdentity`. Always the first frame.
    JoinerIdentity(WireEnvelope),
    /// A signed `TopologyProposal` (initial or counter).
    Proposal(WireEnvelope),
    /// The joiner accepts the responder's pending proposal.
    Agreement(TopologyAgreement),
    /// The joiner gives up; the responder aborts with `PeerClosed`.
    Close { reason: String },
}

/// Responder to joiner.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "body", rename_all = "snake_case")]
pub enum ResponseFrame {
    /// A signed counter-proposal, or a re-seeded proposal after a stale commit.
    Proposal(WireEnvelope),
    /// The committed agreement: the responder's acceptance or the echo of the
    /// joiner's.
    Agreement(TopologyAgreement),
    /// The responder gives up; the joiner aborts with `PeerClosed`.
    Close { reason: String },
}

impl RequestFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::JoinerIdentity(_) => "joiner_identity",
            Self::Proposal(_) => "proposal",
            Self::Agreement(_) => "agreement",
            Self::Close { .. } => "close",
        }
    }
}

impl ResponseFrame {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Proposal(_) => "proposal",
            Self::Agreement(_) => "agreement",
            Self::Close { .. } => "close",
        }
    }
}
