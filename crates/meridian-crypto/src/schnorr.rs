//! Schnorr signatures over the Pallas curve.
//!
//! Two challenge hashes are supported, selected by [`ChallengeHash`]:
//!
//! - `Sha3`: `e = SHA3-512(domain || R || P || m) mod r`
//! - `Poseidon`: `e = Poseidon(R.x, R.y, P.x, P.y, pack(m))`, mapped into the
//!   scalar field
//!
//! Nonces are deterministic: `k = BLAKE3::derive_key_wide(ctx, encode(sk, m)) mod r`.
//!
//! ## Encodings
//!
//! - Public key: compressed affine point, 32 bytes
//! - Signature: `R (32 bytes, compressed) || s (32 bytes, little-endian)`

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::{BigInt, BigInteger, PrimeField};
use ark_pallas::{Affine, Fr, Projective};
use ark_serialize::{CanonicalDeserialize, CanonicalSerialize};
use rand::RngCore;
use sha3::{Digest, Sha3_512};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::blake3::{self, contexts};
use crate::{poseidon, CryptoError, Result};

pub const PUBLIC_KEY_LENGTH: usize = 32;
pub const SECRET_KEY_LENGTH: usize = 32;
pub const SIGNATURE_LENGTH: usize = 64;

const SHA3_CHALLENGE_DOMAIN: &[u8] = b"meridian-schnorr-pallas-sha3";

/// Which hash produces the Fiat-Shamir challenge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeHash {
    Sha3,
    Poseidon,
}

impl ChallengeHash {
    fn nonce_context(self) -> &'static str {
        match self {
            Self::Sha3 => contexts::SCHNORR_NONCE_SHA3,
            Self::Poseidon => contexts::SCHNORR_NONCE_POSEIDON,
        }
    }

    fn challenge(self, r: &Affine, public: &Affine, message: &[u8]) -> Result<Fr> {
        match self {
            Self::Sha3 => {
                let mut hasher = Sha3_512::new();
                hasher.update(SHA3_CHALLENGE_DOMAIN);
                hasher.update(point_to_bytes(r)?);
                hasher.update(point_to_bytes(public)?);
                hasher.update(message);
                Ok(Fr::from_le_bytes_mod_order(&hasher.finalize()))
            }
            Self::Poseidon => {
                let mut inputs = vec![r.x, r.y, public.x, public.y];
                inputs.extend(poseidon::bytes_to_fields(message));
                let digest = poseidon::hash_many(&inputs);
                Ok(Fr::from_le_bytes_mod_order(&poseidon::field_to_bytes(
                    &digest,
                )))
            }
        }
    }
}

/// A Pallas secret scalar, stored as canonical little-endian bytes.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecretKey {
    bytes: [u8; SECRET_KEY_LENGTH],
}

/// A Pallas public key (non-identity curve point).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PublicKey {
    point: Affine,
}

impl SecretKey {
    /// Generate a new random secret key.
    pub fn generate() -> Self {
        let mut rng = rand::rngs::OsRng;
        loop {
            let mut wide = [0u8; 64];
            rng.fill_bytes(&mut wide);
            let scalar = Fr::from_le_bytes_mod_order(&wide);
            wide.zeroize();
            if scalar != Fr::from(0u64) {
                return Self {
                    bytes: scalar_to_bytes(&scalar),
                };
            }
        }
    }

    /// Create a secret key from canonical little-endian scalar bytes.
    pub fn from_bytes(bytes: &[u8; SECRET_KEY_LENGTH]) -> Result<Self> {
        let scalar = scalar_from_bytes(bytes)
            .ok_or_else(|| CryptoError::InvalidKey("secret scalar not canonical".to_string()))?;
        if scalar == Fr::from(0u64) {
            return Err(CryptoError::InvalidKey("secret scalar is zero".to_string()));
        }
        Ok(Self { bytes: *bytes })
    }

    pub fn to_bytes(&self) -> [u8; SECRET_KEY_LENGTH] {
        self.bytes
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            point: (Projective::from(Affine::generator()) * self.scalar()).into_affine(),
        }
    }

    pub(crate) fn scalar(&self) -> Fr {
        Fr::from_le_bytes_mod_order(&self.bytes)
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretKey")
            .field("public", &self.public_key())
            .finish()
    }
}

impl PublicKey {
    /// Parse a compressed point. The identity is rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: PUBLIC_KEY_LENGTH,
                actual: bytes.len(),
            });
        }
        let point = point_from_bytes(bytes)?;
        Ok(Self { point })
    }

    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LENGTH] {
        let mut out = [0u8; PUBLIC_KEY_LENGTH];
        // A valid non-identity point always compresses to exactly 32 bytes.
        if let Ok(bytes) = point_to_bytes(&self.point) {
            out.copy_from_slice(&bytes);
        }
        out
    }

    pub(crate) fn point(&self) -> Affine {
        self.point
    }
}

/// Sign `message` with `secret`.
pub fn sign(secret: &SecretKey, message: &[u8], hash: ChallengeHash) -> Result<Vec<u8>> {
    let x = secret.scalar();
    let public = secret.public_key().point;

    let mut material = blake3::encode_multi_field(&[&secret.bytes, message]);
    let k = Fr::from_le_bytes_mod_order(&blake3::derive_key_wide(hash.nonce_context(), &material));
    material.zeroize();
    if k == Fr::from(0u64) {
        return Err(CryptoError::InvalidKey("derived zero nonce".to_string()));
    }

    let r = (Projective::from(Affine::generator()) * k).into_affine();
    let e = hash.challenge(&r, &public, message)?;
    let s = k + e * x;

    let mut signature = Vec::with_capacity(SIGNATURE_LENGTH);
    signature.extend_from_slice(&point_to_bytes(&r)?);
    signature.extend_from_slice(&scalar_to_bytes(&s));
    Ok(signature)
}

/// Verify `signature` on `message` under the compressed `public_key`.
pub fn verify(
    public_key: &[u8],
    message: &[u8],
    signature: &[u8],
    hash: ChallengeHash,
) -> Result<()> {
    let public = PublicKey::from_bytes(public_key)?.point;
    if signature.len() != SIGNATURE_LENGTH {
        return Err(CryptoError::InvalidLength {
            expected: SIGNATURE_LENGTH,
            actual: signature.len(),
        });
    }

    let r = point_from_bytes(&signature[..32]).map_err(|_| CryptoError::SignatureVerification)?;
    let s = scalar_from_bytes(&signature[32..]).ok_or(CryptoError::SignatureVerification)?;
    let e = hash.challenge(&r, &public, message)?;

    let lhs = Projective::from(Affine::generator()) * s;
    let rhs = Projective::from(r) + Projective::from(public) * e;
    if lhs != rhs {
        return Err(CryptoError::SignatureVerification);
    }
    Ok(())
}

pub(crate) fn point_to_bytes(point: &Affine) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(PUBLIC_KEY_LENGTH);
    point
        .serialize_compressed(&mut out)
        .map_err(|e| CryptoError::Serialization(e.to_string()))?;
    Ok(out)
}

/// Decompress a point, checking curve membership and rejecting the identity.
pub(crate) fn point_from_bytes(bytes: &[u8]) -> Result<Affine> {
    let point = Affine::deserialize_compressed(bytes)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    if point.is_zero() {
        return Err(CryptoError::InvalidKey("identity point".to_string()));
    }
    Ok(point)
}

pub(crate) fn scalar_to_bytes(scalar: &Fr) -> [u8; 32] {
    let le = scalar.into_bigint().to_bytes_le();
    let mut out = [0u8; 32];
    out[..le.len().min(32)].copy_from_slice(&le[..le.len().min(32)]);
    out
}

/// Parse a canonical little-endian scalar. Values at or above the group order
/// are rejected rather than reduced.
pub(crate) fn scalar_from_bytes(bytes: &[u8]) -> Option<Fr> {
    if bytes.len() != 32 {
        return None;
    }
    let mut limbs = [0u64; 4];
    for (limb, chunk) in limbs.iter_mut().zip(bytes.chunks_exact(8)) {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(chunk);
        *limb = u64::from_le_bytes(buf);
    }
    Fr::from_bigint(BigInt::<4>::new(limbs))
}

#[cfg(test)]
mod tests {
    use super::*;

    const BOTH: [ChallengeHash; 2] = [ChallengeHash::Sha3, ChallengeHash::Poseidon];

    #[test]
    fn test_sign_verify_roundtrip() {
        let sk = SecretKey::generate();
        let pk = sk.public_key().to_bytes();
        for hash in BOTH {
            let sig = sign(&sk, b"meridian test message", hash).expect("sign");
            assert_eq!(sig.len(), SIGNATURE_LENGTH);
            verify(&pk, b"meridian test message", &sig, hash).expect("verify");
        }
    }

    #[test]
    fn test_signing_is_deterministic() {
        let sk = SecretKey::generate();
        let a = sign(&sk, b"msg", ChallengeHash::Sha3).expect("sign");
        let b = sign(&sk, b"msg", ChallengeHash::Sha3).expect("sign");
        assert_eq!(a, b);
    }

    #[test]
    fn test_wrong_message_fails() {
        let sk = SecretKey::generate();
        let pk = sk.public_key().to_bytes();
        for hash in BOTH {
            let sig = sign(&sk, b"correct message", hash).expect("sign");
            assert!(verify(&pk, b"wrong message", &sig, hash).is_err());
        }
    }

    #[test]
    fn test_wrong_key_fails() {
        let sk1 = SecretKey::generate();
        let sk2 = SecretKey::generate();
        let sig = sign(&sk1, b"test", ChallengeHash::Sha3).expect("sign");
        assert!(verify(&sk2.public_key().to_bytes(), b"test", &sig, ChallengeHash::Sha3).is_err());
    }

    #[test]
    fn test_challenge_hashes_do_not_cross_verify() {
        let sk = SecretKey::generate();
        let pk = sk.public_key().to_bytes();
        let sig = sign(&sk, b"test", ChallengeHash::Sha3).expect("sign");
        assert!(verify(&pk, b"test", &sig, ChallengeHash::Poseidon).is_err());
    }

    #[test]
    fn test_tampered_signature_fails() {
        let sk = SecretKey::generate();
        let pk = sk.public_key().to_bytes();
        let mut sig = sign(&sk, b"test", ChallengeHash::Poseidon).expect("sign");
        sig[40] ^= 0x01;
        assert!(verify(&pk, b"test", &sig, ChallengeHash::Poseidon).is_err());
    }

    #[test]
    fn test_truncated_signature_rejected() {
        let sk = SecretKey::generate();
        let pk = sk.public_key().to_bytes();
        let sig = sign(&sk, b"test", ChallengeHash::Sha3).expect("sign");
        let err = verify(&pk, b"test", &sig[..63], ChallengeHash::Sha3).expect_err("short");
        assert!(matches!(err, CryptoError::InvalidLength { expected: 64, actual: 63 }));
    }

    #[test]
    fn test_non_canonical_s_rejected() {
        let sk = SecretKey::generate();
        let pk = sk.public_key().to_bytes();
        let mut sig = sign(&sk, b"test", ChallengeHash::Sha3).expect("sign");
        sig[32..].copy_from_slice(&[0xFF; 32]);
        assert!(verify(&pk, b"test", &sig, ChallengeHash::Sha3).is_err());
    }

    #[test]
    fn test_secret_key_roundtrip() {
        let sk = SecretKey::generate();
        let restored = SecretKey::from_bytes(&sk.to_bytes()).expect("restore");
        assert_eq!(sk.public_key(), restored.public_key());
    }

    #[test]
    fn test_zero_secret_rejected() {
        assert!(SecretKey::from_bytes(&[0u8; 32]).is_err());
        assert!(SecretKey::from_bytes(&[0xFF; 32]).is_err());
    }

    #[test]
    fn test_public_key_roundtrip() {
        let pk = SecretKey::generate().public_key();
        let parsed = PublicKey::from_bytes(&pk.to_bytes()).expect("parse");
        assert_eq!(pk, parsed);
        assert!(PublicKey::from_bytes(&[0u8; 31]).is_err());
    }
}
