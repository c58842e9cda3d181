//! Domain-separated BLAKE3 hashing for the Meridian protocol.
//!
//! ## Modes
//!
//! - [`hash`] — Pure hashing: account addresses, envelope digests
//! - [`derive_key`] / [`derive_key_wide`] — Key derivation mode, used for
//!   deterministic nonces and hash-to-field
//!
//! Every derivation uses one of the registered [`contexts`]. Unregistered
//! context strings are a protocol violation.

/// Registered BLAKE3 context strings.
pub mod contexts {
    pub const SCHNORR_NONCE_SHA3: &str = "Meridian v1 schnorr-nonce-sha3";
    pub const SCHNORR_NONCE_POSEIDON: &str = "Meridian v1 schnorr-nonce-poseidon";
    pub const POSEIDON_ROUND_CONSTANTS: &str = "Meridian v1 poseidon-round-constants";
    pub const VRF_HASH_TO_CURVE: &str = "Meridian v1 vrf-hash-to-curve";
    pub const VRF_NONCE: &str = "Meridian v1 vrf-nonce";
    pub const VRF_CHALLENGE: &str = "Meridian v1 vrf-challenge";
    pub const VRF_OUTPUT: &str = "Meridian v1 vrf-output";
    pub const NEGOTIATION_SESSION_ID: &str = "Meridian v1 negotiation-session-id";

    /// All registered context strings. Used for validation.
    pub const ALL_CONTEXTS: &[&str] = &[
        SCHNORR_NONCE_SHA3,
        SCHNORR_NONCE_POSEIDON,
        POSEIDON_ROUND_CONSTANTS,
        VRF_HASH_TO_CURVE,
        VRF_NONCE,
        VRF_CHALLENGE,
        VRF_OUTPUT,
        NEGOTIATION_SESSION_ID,
    ];
}

/// Compute BLAKE3 hash of the input data.
pub fn hash(data: &[u8]) -> [u8; 32] {
    *::blake3::hash(data).as_bytes()
}

/// Derive a 32-byte key using BLAKE3's key derivation mode.
pub fn derive_key(context: &str, key_material: &[u8]) -> [u8; 32] {
    debug_assert!(is_registered_context(context), "unregistered context {context}");
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    *hasher.finalize().as_bytes()
}

/// Derive 64 bytes in key derivation mode.
///
/// Reducing 512 bits modulo a ~255-bit field order keeps the bias negligible,
/// so scalars and field elements are always derived from this width.
pub fn derive_key_wide(context: &str, key_material: &[u8]) -> [u8; 64] {
    debug_assert!(is_registered_context(context), "unregistered context {context}");
    let mut out = [0u8; 64];
    let mut hasher = ::blake3::Hasher::new_derive_key(context);
    hasher.update(key_material);
    hasher.finalize_xof().fill(&mut out);
    out
}

/// Verify that a context string is registered.
pub fn is_registered_context(context: &str) -> bool {
    contexts::ALL_CONTEXTS.contains(&context)
}

/// Encode multiple dynamic fields using length-prefixed encoding.
///
/// `LE32(len(field1)) || field1 || LE32(len(field2)) || field2 || ...`
pub fn encode_multi_field(fields: &[&[u8]]) -> Vec<u8> {
    let total_len: usize = fields.iter().map(|f| 4 + f.len()).sum();
    let mut output = Vec::with_capacity(total_len);
    for field in fields {
        output.extend_from_slice(&(field.len() as u32).to_le_bytes());
        output.extend_from_slice(field);
    }
    output
}
