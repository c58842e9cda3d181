//! Signing and verification of envelopes.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use meridian_crypto::provider::{derive_address, AccountKeypair, SchemeRegistry};
use meridian_transport::{cbor, envelope};
use meridian_types::{Signature, SignedEnvelope, Timestamped, WireEnvelope};

use crate::freshness::{Clock, FreshnessPolicy, ReplayGuard, SystemClock};
use crate::{AuthError, Result};

/// Signs and verifies [`SignedEnvelope`]s against a set of signature schemes.
#[derive(Clone)]
pub struct AuthenticatedMessageService {
    schemes: SchemeRegistry,
    clock: Arc<dyn Clock>,
}

impl AuthenticatedMessageService {
    pub fn new(schemes: SchemeRegistry, clock: Arc<dyn Clock>) -> Self {
        Self { schemes, clock }
    }

    /// Both Pallas Schnorr schemes and the system clock.
    pub fn with_defaults() -> Self {
        Self::new(SchemeRegistry::with_default_schemes(), Arc::new(SystemClock))
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn schemes(&self) -> &SchemeRegistry {
        &self.schemes
    }

    /// Sign raw payload bytes under `type_tag`.
    pub fn sign(&self, type_tag: &str, payload: Vec<u8>, keypair: &AccountKeypair) -> Result<SignedEnvelope> {
        let provider = self
            .schemes
            .get(keypair.scheme())
            .ok_or(AuthError::UnknownScheme(keypair.scheme().code()))?;

        let canonical = envelope::encode(type_tag, &payload);
        let signature = provider
            .sign(keypair.secret(), &canonical)
            .map_err(|e| AuthError::Signing(e.to_string()))?;

        Ok(SignedEnvelope {
            type_tag: type_tag.to_string(),
            payload,
            signature: Signature {
                signer: keypair.address(),
                scheme: keypair.scheme(),
                public_key: keypair.public_key_bytes().to_vec(),
                signature,
            },
        })
    }

    /// CBOR-encode `value` and sign it under `type_tag`.
    pub fn sign_payload<T: Serialize>(
        &self,
        type_tag: &str,
        value: &T,
        keypair: &AccountKeypair,
    ) -> Result<SignedEnvelope> {
        let payload = cbor::to_vec(value).map_err(|e| AuthError::Signing(e.to_string()))?;
        self.sign(type_tag, payload, keypair)
    }

    /// Verify an envelope's signature. Returns the payload bytes.
    ///
    /// Pure: consults neither the clock nor any replay state.
    pub fn verify<'a>(&self, signed: &'a SignedEnvelope) -> Result<&'a [u8]> {
        let canonical = envelope::encode(&signed.type_tag, &signed.payload);
        self.verify_canonical(&canonical, &signed.signature)?;
        Ok(&signed.payload)
    }

    /// Verify an envelope as received from a connection.
    ///
    /// Non-canonical bytes are rejected before any signature check.
    pub fn verify_wire(&self, wire: &WireEnvelope) -> Result<SignedEnvelope> {
        let signed = envelope::from_wire(wire)?;
        self.verify_canonical(&wire.envelope, &wire.signature)?;
        Ok(signed)
    }

    fn verify_canonical(&self, canonical: &[u8], signature: &Signature) -> Result<()> {
        let derived = derive_address(&signature.public_key);
        if derived != signature.signer {
            return Err(AuthError::AddressMismatch {
                declared: signature.signer,
                derived,
            });
        }

        let provider = self
            .schemes
            .get(signature.scheme)
            .ok_or(AuthError::UnknownScheme(signature.scheme.code()))?;

        provider
            .verify(&signature.public_key, canonical, &signature.signature)
            .map_err(|e| {
                tracing::debug!(signer = %signature.signer, error = %e, "signature rejected");
                AuthError::InvalidSignature(signature.signer)
            })
    }

    /// Verify an envelope, enforce its type tag and freshness, decode its
    /// payload, and record it in `guard`.
    pub fn verify_fresh<T>(
        &self,
        signed: &SignedEnvelope,
        policy: &FreshnessPolicy,
        guard: &dyn ReplayGuard,
    ) -> Result<T>
    where
        T: Timestamped + DeserializeOwned,
    {
        self.verify(signed)?;
        self.check_fresh(signed, policy, guard)
    }

    /// [`verify_wire`](Self::verify_wire), then everything
    /// [`verify_fresh`](Self::verify_fresh) checks. Returns the decoded
    /// envelope with its payload.
    pub fn verify_fresh_wire<T>(
        &self,
        wire: &WireEnvelope,
        policy: &FreshnessPolicy,
        guard: &dyn ReplayGuard,
    ) -> Result<(SignedEnvelope, T)>
    where
        T: Timestamped + DeserializeOwned,
    {
        let signed = self.verify_wire(wire)?;
        let value = self.check_fresh(&signed, policy, guard)?;
        Ok((signed, value))
    }

    /// Tag, payload decoding, freshness and replay. The signature must
    /// already have been verified.
    fn check_fresh<T>(
        &self,
        signed: &SignedEnvelope,
        policy: &FreshnessPolicy,
        guard: &dyn ReplayGuard,
    ) -> Result<T>
    where
        T: Timestamped + DeserializeOwned,
    {
        if signed.type_tag != policy.expected_tag {
            return Err(AuthError::MalformedEnvelope(format!(
                "expected type tag {}, got {}",
                policy.expected_tag, signed.type_tag
            )));
        }

        let value: T = cbor::from_slice_named(&signed.payload, &signed.type_tag)?;
        let timestamp = value.timestamp();
        let now = self.clock.now_ms();
        policy.check_timestamp(timestamp, now)?;

        guard
            .record_seen(signed.signer(), &signed.type_tag, timestamp, now)
            .inspect_err(|e| {
                tracing::warn!(signer = %signed.signer(), tag = %signed.type_tag, timestamp, error = %e, "envelope refused by replay guard");
            })?;
        Ok(value)
    }
}

impl std::fmt::Debug for AuthenticatedMessageService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedMessageService")
            .field("schemes", &self.schemes)
            .field("now_ms", &self.clock.now_ms())
            .finish()
    }
}
