//! # meridian-negotiation
//!
//! The `refactor_network` handshake: a joining node and an existing member
//! exchange signed topology proposals until one side accepts, then the
//! responder commits the agreed topology to its [`IdentityRegistry`].
//!
//! ## Protocol
//!
//! ```text
//! Joiner                                   Responder
//!   |--- JoinerIdentity (signed) ------------>|  verify, eligibility, seed baseline
//!   |--- Proposal P0 (signed) --------------->|  validate, rescore
//!   |<-- Proposal P1 (strictly better) -------|  counter ...
//!   |--- Proposal P2 (strictly better) ------>|
//!   |<-- Agreement (both signatures) ---------|  commit, close
//! ```
//!
//! Every proposal must be strictly better than the one before it under the
//! model's total order, so the exchange always terminates; `max_rounds` caps
//! it regardless.
//!
//! ## Modules
//!
//! - [`session`] — sans-IO state machines for both roles
//! - [`driver`] — async loop running a session over a frame stream
//! - [`registry`] — membership, committed topology and replay cache
//! - [`eligibility`] — stake lookups

pub mod driver;
pub mod eligibility;
pub mod registry;
pub mod session;

#[cfg(test)]
mod test_support;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use meridian_auth::AuthError;
use meridian_topology::TopologyError;

pub use eligibility::{StakeLedger, StaticStakeLedger};
pub use registry::{Baseline, IdentityRegistry};
pub use session::{
    JoinerSession, NegotiationOutcome, ResponderSession, SessionContext, SessionState,
};

/// Which side of the handshake a session plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Joiner,
    Responder,
}

impl Role {
    pub fn other(self) -> Self {
        match self {
            Self::Joiner => Self::Responder,
            Self::Responder => Self::Joiner,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Joiner => write!(f, "joiner"),
            Self::Responder => write!(f, "responder"),
        }
    }
}

/// Why a session ended in `Aborted`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    MalformedEnvelope,
    AddressMismatch,
    UnknownScheme,
    InvalidSignature,
    StaleTimestamp,
    ReplayDetected,
    NotEligible,
    MalformedTopology,
    NonImprovingProposal,
    StaleTopology,
    SessionTimeout,
    PeerClosed,
    /// A frame arrived that the current state does not accept.
    ProtocolViolation,
}

impl fmt::Display for AbortReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::MalformedEnvelope => "malformed_envelope",
            Self::AddressMismatch => "address_mismatch",
            Self::UnknownScheme => "unknown_scheme",
            Self::InvalidSignature => "invalid_signature",
            Self::StaleTimestamp => "stale_timestamp",
            Self::ReplayDetected => "replay_detected",
            Self::NotEligible => "not_eligible",
            Self::MalformedTopology => "malformed_topology",
            Self::NonImprovingProposal => "non_improving_proposal",
            Self::StaleTopology => "stale_topology",
            Self::SessionTimeout => "session_timeout",
            Self::PeerClosed => "peer_closed",
            Self::ProtocolViolation => "protocol_violation",
        };
        f.write_str(name)
    }
}

/// Error types for the negotiation.
#[derive(Debug, thiserror::Error)]
pub enum NegotiationError {
    /// Envelope verification or freshness failed.
    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Proposed topology failed validation.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The joiner may not join.
    #[error("not eligible: {0}")]
    NotEligible(String),

    /// The joiner's identity is not acceptable.
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    /// A proposal was not strictly better than the one it answers.
    #[error("proposal does not improve on the current best")]
    NonImprovingProposal,

    /// A proposal's timestamp does not advance past the last accepted one.
    #[error("proposal timestamp {timestamp} not after {last}")]
    ProposalNotNewer { timestamp: u64, last: u64 },

    /// The committed topology moved underneath the session.
    #[error("stale topology: expected version {expected}, found {actual}")]
    StaleTopology { expected: u64, actual: u64 },

    /// Round cap reached.
    #[error("round limit {0} reached")]
    RoundLimit(u32),

    /// Per-round or session deadline passed.
    #[error("session timed out: {0}")]
    SessionTimeout(String),

    /// The peer closed the stream or sent `Close`.
    #[error("peer closed: {0}")]
    PeerClosed(String),

    /// A frame arrived that does not belong to this session or state.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Operation not allowed in the current state.
    #[error("invalid state: expected {expected}, got {actual}")]
    InvalidState { expected: String, actual: String },

    /// The session already ended.
    #[error("session aborted: {0}")]
    Aborted(AbortReason),
}

impl NegotiationError {
    /// Map onto the abort taxonomy.
    pub fn reason(&self) -> AbortReason {
        match self {
            Self::Auth(auth) => match auth {
                AuthError::MalformedEnvelope(_) => AbortReason::MalformedEnvelope,
                AuthError::AddressMismatch { .. } => AbortReason::AddressMismatch,
                AuthError::UnknownScheme(_) => AbortReason::UnknownScheme,
                AuthError::InvalidSignature(_) | AuthError::Signing(_) => {
                    AbortReason::InvalidSignature
                }
                AuthError::StaleTimestamp { .. } => AbortReason::StaleTimestamp,
                AuthError::ReplayDetected { .. } | AuthError::ReplayCacheFull { .. } => {
                    AbortReason::ReplayDetected
                }
            },
            Self::Topology(_) => AbortReason::MalformedTopology,
            Self::NotEligible(_) => AbortReason::NotEligible,
            Self::InvalidIdentity(_) => AbortReason::MalformedEnvelope,
            Self::NonImprovingProposal => AbortReason::NonImprovingProposal,
            Self::ProposalNotNewer { .. } => AbortReason::StaleTimestamp,
            Self::StaleTopology { .. } => AbortReason::StaleTopology,
            Self::RoundLimit(_) | Self::SessionTimeout(_) => AbortReason::SessionTimeout,
            Self::PeerClosed(_) => AbortReason::PeerClosed,
            Self::ProtocolViolation(_) | Self::InvalidState { .. } => AbortReason::ProtocolViolation,
            Self::Aborted(reason) => *reason,
        }
    }
}

pub type Result<T> = std::result::Result<T, NegotiationError>;

/// Default proposal cap per session.
pub const DEFAULT_MAX_ROUNDS: u32 = 64;

/// Session limits and admission policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NegotiationConfig {
    /// Proposals exchanged (both directions) before the session aborts.
    pub max_rounds: u32,
    /// Longest wait for any single peer frame.
    pub round_timeout: Duration,
    /// Wall-clock budget for the whole session.
    pub session_timeout: Duration,
    /// Stake a joiner must hold.
    pub min_stake: u64,
    /// Freshness window for signed payloads, and replay retention.
    pub max_clock_skew: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            round_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(60),
            min_stake: 0,
            max_clock_skew: Duration::from_secs(30),
        }
    }
}
