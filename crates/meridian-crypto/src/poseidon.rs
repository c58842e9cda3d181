//! Poseidon sponge over the Pallas base field.
//!
//! Provides the challenge hash for the `SchnorrPallasPoseidon` signature
//! scheme. Curve point coordinates live in the base field, so they are
//! absorbed directly without byte conversion.
//!
//! ## Parameters
//!
//! - Field: Pallas base field `Fq`
//! - Width (t): 3 (capacity 1, rate 2)
//! - Full rounds (R_F): 8 (4 before, 4 after partial rounds)
//! - Partial rounds (R_P): 56
//! - S-box: x^5
//! - Round constants: `BLAKE3::derive_key_wide("Meridian v1 poseidon-round-constants", LE64(i))`

use std::sync::OnceLock;

use ark_ff::{BigInteger, Field, PrimeField};
use ark_pallas::Fq;

use crate::blake3::{self, contexts};

/// Bytes packed into one field element. 31 bytes always fit below the modulus.
const BYTES_PER_ELEMENT: usize = 31;

/// Poseidon parameters for the Pallas base field.
pub struct PoseidonParams {
    /// Round constants, `(R_F + R_P) * t` field elements.
    pub round_constants: Vec<Fq>,
    /// MDS matrix (t x t).
    pub mds_matrix: Vec<Vec<Fq>>,
    pub full_rounds: usize,
    pub partial_rounds: usize,
    pub width: usize,
}

fn generate_round_constants(num_constants: usize) -> Vec<Fq> {
    (0..num_constants)
        .map(|i| {
            let wide =
                blake3::derive_key_wide(contexts::POSEIDON_ROUND_CONSTANTS, &(i as u64).to_le_bytes());
            Fq::from_le_bytes_mod_order(&wide)
        })
        .collect()
}

/// Cauchy matrix: `M[i][j] = 1 / (x_i + y_j)` with `x_i = i + 1`, `y_j = t + j + 1`.
fn generate_mds_matrix(t: usize) -> Vec<Vec<Fq>> {
    let mut matrix = vec![vec![Fq::from(0u64); t]; t];
    for (i, row) in matrix.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            let sum = Fq::from((i + 1) as u64) + Fq::from((t + j + 1) as u64);
            *cell = sum.inverse().unwrap_or(Fq::from(0u64));
        }
    }
    matrix
}

/// The Meridian Poseidon parameters, computed once.
pub fn default_params() -> &'static PoseidonParams {
    static PARAMS: OnceLock<PoseidonParams> = OnceLock::new();
    PARAMS.get_or_init(|| {
        let full_rounds = 8;
        let partial_rounds = 56;
        let width = 3;
        PoseidonParams {
            round_constants: generate_round_constants((full_rounds + partial_rounds) * width),
            mds_matrix: generate_mds_matrix(width),
            full_rounds,
            partial_rounds,
            width,
        }
    })
}

fn sbox(x: Fq) -> Fq {
    let x2 = x * x;
    let x4 = x2 * x2;
    x4 * x
}

fn mds_mul(matrix: &[Vec<Fq>], state: &[Fq]) -> Vec<Fq> {
    matrix
        .iter()
        .map(|row| {
            row.iter()
                .zip(state.iter())
                .fold(Fq::from(0u64), |acc, (m, s)| acc + *m * *s)
        })
        .collect()
}

fn permute(params: &PoseidonParams, state: &mut Vec<Fq>) {
    let half_f = params.full_rounds / 2;
    let total_rounds = params.full_rounds + params.partial_rounds;

    for round in 0..total_rounds {
        let offset = round * params.width;
        for (j, s) in state.iter_mut().enumerate() {
            *s += params.round_constants[offset + j];
        }

        let is_full = round < half_f || round >= half_f + params.partial_rounds;
        if is_full {
            for s in state.iter_mut() {
                *s = sbox(*s);
            }
        } else {
            state[0] = sbox(state[0]);
        }

        *state = mds_mul(&params.mds_matrix, state);
    }
}

/// Hash two field elements.
pub fn hash(a: Fq, b: Fq) -> Fq {
    hash_many(&[a, b])
}

/// Sponge hash over any number of field elements.
///
/// The input length is placed in the capacity element so inputs of different
/// lengths never collide by zero padding.
pub fn hash_many(inputs: &[Fq]) -> Fq {
    let params = default_params();
    let mut state = vec![Fq::from(inputs.len() as u64), Fq::from(0u64), Fq::from(0u64)];

    if inputs.is_empty() {
        permute(params, &mut state);
    }
    for chunk in inputs.chunks(2) {
        state[1] += chunk[0];
        if let Some(second) = chunk.get(1) {
            state[2] += *second;
        }
        permute(params, &mut state);
    }

    state[1]
}

/// Pack bytes into field elements, 31 bytes per element, prefixed by the
/// byte length.
pub fn bytes_to_fields(bytes: &[u8]) -> Vec<Fq> {
    let mut out = Vec::with_capacity(1 + bytes.len().div_ceil(BYTES_PER_ELEMENT));
    out.push(Fq::from(bytes.len() as u64));
    out.extend(
        bytes
            .chunks(BYTES_PER_ELEMENT)
            .map(Fq::from_le_bytes_mod_order),
    );
    out
}

/// Little-endian canonical bytes of a field element.
pub fn field_to_bytes(f: &Fq) -> [u8; 32] {
    let le = f.into_bigint().to_bytes_le();
    let mut bytes = [0u8; 32];
    bytes[..le.len().min(32)].copy_from_slice(&le[..le.len().min(32)]);
    bytes
}
