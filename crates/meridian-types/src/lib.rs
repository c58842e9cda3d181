//! # meridian-types
//!
//! Shared domain types used across the Meridian workspace: 256-bit words and
//! account addresses, signatures and signed envelopes, node identities, cluster
//! topologies and the ledger shapes exposed over RPC.

pub mod identity;
pub mod ledger;
pub mod signature;
pub mod topology;
pub mod word;

pub use identity::{GeoLocation, NodeIdentity, Ports};
pub use ledger::{
    AccountBalance, BlockPayload, LeaderElectionProof, TransactionKind, TransactionPayload,
    VerifiableRandomness,
};
pub use signature::{Signature, SignatureScheme, SignedEnvelope, TopologyAgreement, WireEnvelope};
pub use topology::{Cluster, NetworkTopology, TopologyProposal, TopologySnapshot};
pub use word::{AccountAddress, BlockHash, TxHash, Word256};

/// Current node protocol version carried in every [`NodeIdentity`].
pub const PROTOCOL_VERSION: u32 = 1;

/// Registered envelope type tags. Every signed payload is bound to exactly one.
pub mod tags {
    pub const NODE_IDENTITY: &str = "meridian.v1.NodeIdentity";
    pub const TOPOLOGY_PROPOSAL: &str = "meridian.v1.TopologyProposal";
    pub const TRANSACTION: &str = "meridian.v1.Transaction";
    pub const BLOCK: &str = "meridian.v1.Block";

    /// All registered type tags.
    pub const ALL_TAGS: &[&str] = &[NODE_IDENTITY, TOPOLOGY_PROPOSAL, TRANSACTION, BLOCK];
}

/// A payload that carries its own creation time (unix milliseconds).
///
/// Freshness and replay checks read the timestamp through this trait.
pub trait Timestamped {
    fn timestamp(&self) -> u64;
}

/// Errors raised while constructing or parsing shared types.
#[derive(Debug, thiserror::Error)]
pub enum TypesError {
    /// A hex string did not decode to the expected width.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// A coordinate fell outside its allowed range.
    #[error("coordinate out of range: {0}")]
    CoordinateOutOfRange(String),
}

pub type Result<T> = std::result::Result<T, TypesError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_namespaced() {
        for tag in tags::ALL_TAGS {
            assert!(tag.starts_with("meridian.v1."), "tag '{tag}' has wrong prefix");
        }
    }

    #[test]
    fn test_tags_are_distinct() {
        let mut seen = std::collections::HashSet::new();
        for tag in tags::ALL_TAGS {
            assert!(seen.insert(*tag));
        }
    }
}
