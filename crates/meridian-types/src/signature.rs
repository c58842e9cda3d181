//! Signatures, signed envelopes and topology agreements.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_with::serde_as;

use crate::AccountAddress;

/// Signature scheme identifier.
///
/// Travels as a `u32` code so that codes minted by newer peers still decode;
/// verification rejects them as unknown instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum SignatureScheme {
    /// Schnorr over Pallas, SHA3-512 challenge.
    SchnorrPallasSha3,
    /// Schnorr over Pallas, Poseidon challenge over the base field.
    SchnorrPallasPoseidon,
    /// A code this build does not know.
    Unrecognized(u32),
}

impl SignatureScheme {
    pub const SCHNORR_PALLAS_SHA3_CODE: u32 = 1;
    pub const SCHNORR_PALLAS_POSEIDON_CODE: u32 = 2;

    pub fn code(&self) -> u32 {
        u32::from(*self)
    }
}

impl From<u32> for SignatureScheme {
    fn from(code: u32) -> Self {
        match code {
            Self::SCHNORR_PALLAS_SHA3_CODE => Self::SchnorrPallasSha3,
            Self::SCHNORR_PALLAS_POSEIDON_CODE => Self::SchnorrPallasPoseidon,
            other => Self::Unrecognized(other),
        }
    }
}

impl From<SignatureScheme> for u32 {
    fn from(scheme: SignatureScheme) -> Self {
        match scheme {
            SignatureScheme::SchnorrPallasSha3 => SignatureScheme::SCHNORR_PALLAS_SHA3_CODE,
            SignatureScheme::SchnorrPallasPoseidon => SignatureScheme::SCHNORR_PALLAS_POSEIDON_CODE,
            SignatureScheme::Unrecognized(code) => code,
        }
    }
}

impl fmt::Display for SignatureScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SchnorrPallasSha3 => write!(f, "schnorr-pallas-sha3"),
            Self::SchnorrPallasPoseidon => write!(f, "schnorr-pallas-poseidon"),
            Self::Unrecognized(code) => write!(f, "unrecognized({code})"),
        }
    }
}

/// A detached signature. Never embeds the bytes it signs.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    /// Declared signer. Must equal the hash of `public_key`.
    pub signer: AccountAddress,
    pub scheme: SignatureScheme,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub public_key: Vec<u8>,
    #[serde_as(as = "serde_with::hex::Hex")]
    pub signature: Vec<u8>,
}

/// A payload bound to a type tag and signed over the canonical encoding of
/// `(type_tag, payload)`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedEnvelope {
    pub type_tag: String,
    /// CBOR-encoded payload.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub payload: Vec<u8>,
    pub signature: Signature,
}

impl SignedEnvelope {
    pub fn signer(&self) -> &AccountAddress {
        &self.signature.signer
    }
}

/// A signed envelope as it crosses a connection: the exact canonical bytes
/// that were signed, plus the detached signature.
///
/// Receivers decode `envelope` strictly before checking the signature, so a
/// re-encoded or padded wrapper never reaches verification.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireEnvelope {
    #[serde_as(as = "serde_with::hex::Hex")]
    pub envelope: Vec<u8>,
    pub signature: Signature,
}

impl WireEnvelope {
    pub fn signer(&self) -> &AccountAddress {
        &self.signature.signer
    }
}

/// Mutual acceptance of one topology proposal.
///
/// `peer_signature` is the proposer's signature, `own_signature` the
/// acceptor's. Both cover the canonical encoding of `(type_tag, proposal)`.
#[serde_as]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyAgreement {
    pub type_tag: String,
    /// The accepted proposal's payload bytes.
    #[serde_as(as = "serde_with::hex::Hex")]
    pub proposal: Vec<u8>,
    pub peer_signature: Signature,
    pub own_signature: Signature,
}

impl TopologyAgreement {
    /// The proposal as the signed envelope the proposer sent.
    pub fn proposal_envelope(&self) -> SignedEnvelope {
        SignedEnvelope {
            type_tag: self.type_tag.clone(),
            payload: self.proposal.clone(),
            signature: self.peer_signature.clone(),
        }
    }

    /// The proposal re-signed by the acceptor.
    pub fn acceptance_envelope(&self) -> SignedEnvelope {
        SignedEnvelope {
            type_tag: self.type_tag.clone(),
            payload: self.proposal.clone(),
            signature: self.own_signature.clone(),
        }
    }
}
