//! # meridian-crypto
//!
//! Cryptographic primitives for the Meridian protocol.
//!
//! Signature schemes are pluggable: callers sign and verify through the
//! [`provider::SignatureProvider`] capability, looked up by
//! [`SignatureScheme`](meridian_types::SignatureScheme) in a
//! [`provider::SchemeRegistry`]. Adding a scheme means registering one more
//! provider; nothing upstream changes.
//!
//! ## Modules
//!
//! - [`blake3`] — Domain-separated BLAKE3 hashing, addresses, nonces
//! - [`poseidon`] — Poseidon sponge over the Pallas base field
//! - [`schnorr`] — Schnorr signatures over Pallas (SHA3 and Poseidon challenges)
//! - [`provider`] — `SignatureProvider` capability, scheme registry, keypairs
//! - [`vrf`] — Verifiable random function used for leader election

pub mod blake3;
pub mod poseidon;
pub mod provider;
pub mod schnorr;
pub mod vrf;

/// Error types for cryptographic operations.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// Signature verification failed.
    #[error("signature verification failed")]
    SignatureVerification,

    /// Public or secret key bytes do not describe a valid key.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// A signature or proof had the wrong length.
    #[error("invalid length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    /// No provider is registered for the requested scheme.
    #[error("unsupported signature scheme: {0}")]
    UnsupportedScheme(String),

    /// VRF proof generation or verification failed.
    #[error("VRF error: {0}")]
    Vrf(String),

    /// Point or scalar serialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, CryptoError>;
