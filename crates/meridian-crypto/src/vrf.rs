//! Verifiable random function over Pallas.
//!
//! An ECVRF-style construction used for single-secret leader election:
//!
//! - `H = hash_to_curve(pk, input)` (try-and-increment)
//! - `Gamma = x * H`
//! - `k = BLAKE3::derive_key_wide(VRF_NONCE, encode(sk, H)) mod r`
//! - `c = BLAKE3::derive_key_wide(VRF_CHALLENGE, encode(pk, H, Gamma, kG, kH)) mod r`
//! - `s = k + c * x`
//!
//! Proof: `Gamma (32) || c (32) || s (32)`. Output:
//! `BLAKE3::derive_key(VRF_OUTPUT, Gamma)`.

use ark_ec::{AffineRepr, CurveGroup};
use ark_ff::PrimeField;
use ark_pallas::{Affine, Fq, Fr, Projective};

use crate::blake3::{self, contexts};
use crate::schnorr::{self, PublicKey, SecretKey};
use crate::{CryptoError, Result};

pub const PROOF_LENGTH: usize = 96;
pub const OUTPUT_LENGTH: usize = 32;

/// Verifies VRF proofs. Implemented by [`PallasVrf`]; the daemon only ever
/// verifies.
pub trait VrfVerifier: Send + Sync {
    /// Check `proof` for `input` under `public_key` and return the output.
    fn verify(&self, public_key: &[u8], input: &[u8], proof: &[u8]) -> Result<[u8; OUTPUT_LENGTH]>;
}

/// The Pallas VRF.
#[derive(Clone, Copy, Debug, Default)]
pub struct PallasVrf;

impl PallasVrf {
    /// Evaluate the VRF on `input`, returning `(output, proof)`.
    pub fn prove(secret: &SecretKey, input: &[u8]) -> Result<([u8; OUTPUT_LENGTH], Vec<u8>)> {
        let x = secret.scalar();
        let public = secret.public_key();
        let pk_bytes = public.to_bytes();

        let h = hash_to_curve(&pk_bytes, input)?;
        let h_bytes = schnorr::point_to_bytes(&h)?;
        let gamma = (Projective::from(h) * x).into_affine();

        let nonce_material = blake3::encode_multi_field(&[&secret.to_bytes(), &h_bytes]);
        let k = Fr::from_le_bytes_mod_order(&blake3::derive_key_wide(contexts::VRF_NONCE, &nonce_material));
        let u = (Projective::from(Affine::generator()) * k).into_affine();
        let v = (Projective::from(h) * k).into_affine();

        let c = challenge(&pk_bytes, &h_bytes, &gamma, &u, &v)?;
        let s = k + c * x;

        let gamma_bytes = schnorr::point_to_bytes(&gamma)?;
        let mut proof = Vec::with_capacity(PROOF_LENGTH);
        proof.extend_from_slice(&gamma_bytes);
        proof.extend_from_slice(&schnorr::scalar_to_bytes(&c));
        proof.extend_from_slice(&schnorr::scalar_to_bytes(&s));

        Ok((blake3::derive_key(contexts::VRF_OUTPUT, &gamma_bytes), proof))
    }
}

impl VrfVerifier for PallasVrf {
    fn verify(&self, public_key: &[u8], input: &[u8], proof: &[u8]) -> Result<[u8; OUTPUT_LENGTH]> {
        if proof.len() != PROOF_LENGTH {
            return Err(CryptoError::InvalidLength {
                expected: PROOF_LENGTH,
                actual: proof.len(),
            });
        }
        let public = PublicKey::from_bytes(public_key)?.point();
        let gamma = schnorr::point_from_bytes(&proof[..32])
            .map_err(|e| CryptoError::Vrf(format!("gamma: {e}")))?;
        let c = schnorr::scalar_from_bytes(&proof[32..64])
            .ok_or_else(|| CryptoError::Vrf("challenge not canonical".to_string()))?;
        let s = schnorr::scalar_from_bytes(&proof[64..])
            .ok_or_else(|| CryptoError::Vrf("response not canonical".to_string()))?;

        let h = hash_to_curve(public_key, input)?;
        let h_bytes = schnorr::point_to_bytes(&h)?;

        let u = (Projective::from(Affine::generator()) * s - Projective::from(public) * c).into_affine();
        let v = (Projective::from(h) * s - Projective::from(gamma) * c).into_affine();

        if challenge(public_key, &h_bytes, &gamma, &u, &v)? != c {
            return Err(CryptoError::Vrf("proof does not verify".to_string()));
        }
        Ok(blake3::derive_key(contexts::VRF_OUTPUT, &proof[..32]))
    }
}

/// Map `(public_key, input)` to a curve point by try-and-increment.
///
/// Pallas has cofactor 1, so every point found lies in the prime-order group.
fn hash_to_curve(public_key: &[u8], input: &[u8]) -> Result<Affine> {
    for counter in 0u8..=u8::MAX {
        let digest = blake3::derive_key_wide(
            contexts::VRF_HASH_TO_CURVE,
            &blake3::encode_multi_field(&[public_key, input, &[counter]]),
        );
        let x = Fq::from_le_bytes_mod_order(&digest[..32]);
        let greatest = digest[32] & 1 == 1;
        if let Some(point) = Affine::get_point_from_x_unchecked(x, greatest) {
            if !point.is_zero() {
                return Ok(point);
            }
        }
    }
    Err(CryptoError::Vrf("hash to curve exhausted".to_string()))
}

fn challenge(pk: &[u8], h: &[u8], gamma: &Affine, u: &Affine, v: &Affine) -> Result<Fr> {
    let gamma = schnorr::point_to_bytes(gamma)?;
    let u = schnorr::point_to_bytes(u)?;
    let v = schnorr::point_to_bytes(v)?;
    let material = blake3::encode_multi_field(&[pk, h, &gamma, &u, &v]);
    Ok(Fr::from_le_bytes_mod_order(&blake3::derive_key_wide(
        contexts::VRF_CHALLENGE,
        &material,
    )))
}
