//! # meridian-auth
//!
//! Authenticated messages for the Meridian protocol.
//!
//! Every signed structure travels as a [`SignedEnvelope`](meridian_types::SignedEnvelope)
//! whose signature covers the canonical encoding of `(type_tag, payload)`.
//! [`AuthenticatedMessageService`] signs and verifies envelopes;
//! [`verify_fresh`](AuthenticatedMessageService::verify_fresh) adds type-tag
//! domain separation, timestamp freshness and replay rejection.
//!
//! ## Verification order
//!
//! 1. canonical encoding (`MalformedEnvelope`)
//! 2. `hash(public_key) == signer` (`AddressMismatch`), before any cryptography
//! 3. provider lookup (`UnknownScheme`)
//! 4. signature (`InvalidSignature`)
//! 5. type tag (`MalformedEnvelope`)
//! 6. freshness (`StaleTimestamp`)
//! 7. replay window (`ReplayDetected`, or `ReplayCacheFull` when the window
//!    cannot hold another triple)

pub mod freshness;
pub mod replay;
pub mod service;

pub use freshness::{Clock, FreshnessPolicy, ManualClock, ReplayGuard, SystemClock};
pub use replay::ReplayCache;
pub use service::AuthenticatedMessageService;

use meridian_types::AccountAddress;

/// Error types for message authentication.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The envelope bytes, type tag or payload encoding were rejected.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// The declared signer is not the hash of the attached public key.
    #[error("address mismatch: declared {declared}, public key hashes to {derived}")]
    AddressMismatch {
        declared: AccountAddress,
        derived: AccountAddress,
    },

    /// No provider is registered for the declared scheme.
    #[error("unknown signature scheme code {0}")]
    UnknownScheme(u32),

    /// The signature does not verify.
    #[error("invalid signature from {0}")]
    InvalidSignature(AccountAddress),

    /// The payload timestamp is outside the freshness window.
    #[error("stale timestamp {timestamp} (now {now})")]
    StaleTimestamp { timestamp: u64, now: u64 },

    /// The `(signer, type_tag, timestamp)` triple was already seen.
    #[error("replay detected: {signer} {type_tag} at {timestamp}")]
    ReplayDetected {
        signer: AccountAddress,
        type_tag: String,
        timestamp: u64,
    },

    /// The replay cache is full of triples still inside the window, so a
    /// replay cannot be ruled out.
    #[error("replay cache full ({capacity} entries)")]
    ReplayCacheFull { capacity: usize },

    /// Signing failed locally.
    #[error("signing failed: {0}")]
    Signing(String),
}

impl From<meridian_transport::TransportError> for AuthError {
    fn from(err: meridian_transport::TransportError) -> Self {
        Self::MalformedEnvelope(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
