// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Shamir sharing of a guardian's secret over `Z_q` with discrete log commitments.
//!
//! A guardian's polynomial has degree `K - 1` and its constant term is the guardian's secret.
//! Each coefficient `a_k` is published as `C_k = g^{a_k}` with a Schnorr proof, which lets
//! anyone check `g^{P(x)} = prod_k C_k^{x^k}` without learning the coefficients.

use derivative::Derivative;
use eg_group::{ElementModP, ElementModQ};
use eg_proofs::SchnorrProof;
use rand::{CryptoRng, RngCore};

use crate::errors::{ElectionError, ElectionResult};
use crate::types::GuardianIndex;

#[derive(Derivative)]
#[derivative(Debug)]
struct Coefficient {
    #[derivative(Debug = "ignore")]
    value: ElementModQ,
    commitment: ElementModP,
    proof: SchnorrProof,
}

/// A secret polynomial. Never serialized and never cloned out of the guardian that owns it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct ElectionPolynomial {
    coefficients: Vec<Coefficient>,
}

impl ElectionPolynomial {
    /// Samples `quorum` coefficients. The constant term is non-zero so it is usable as a key.
    /// A polynomial needs at least the constant term, so a zero quorum is rejected.
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(
        quorum: u64,
        rng: &mut R,
    ) -> ElectionResult<Self> {
        if quorum == 0 {
            return Err(ElectionError::invalid_parameters(
                "a polynomial needs at least one coefficient",
            ));
        }
        let coefficients = (0..quorum)
            .map(|k| {
                let value = if k == 0 {
                    ElementModQ::random_nonzero(rng)
                } else {
                    ElementModQ::random(rng)
                };
                let commitment = ElementModP::g_pow(&value);
                let proof = SchnorrProof::make(&value, &commitment, &ElementModQ::random(rng));
                Coefficient {
                    value,
                    commitment,
                    proof,
                }
            })
            .collect();
        Ok(Self { coefficients })
    }

    pub(crate) fn secret(&self) -> &ElementModQ {
        &self.coefficients[0].value
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len().saturating_sub(1)
    }

    pub fn commitments(&self) -> Vec<ElementModP> {
        self.coefficients
            .iter()
            .map(|c| c.commitment.clone())
            .collect()
    }

    pub fn proofs(&self) -> Vec<SchnorrProof> {
        self.coefficients.iter().map(|c| c.proof.clone()).collect()
    }

    /// `P(x) mod q` by Horner's rule.
    pub(crate) fn evaluate(&self, x: GuardianIndex) -> ElementModQ {
        let x = ElementModQ::from_u64(x);
        self.coefficients
            .iter()
            .rev()
            .fold(ElementModQ::zero(), |acc, c| &(&acc * &x) + &c.value)
    }
}

/// `prod_k C_k^{x^k}`, the public key of the share `P(x)`.
pub fn compute_recovery_public_key(x: GuardianIndex, commitments: &[ElementModP]) -> ElementModP {
    let x = ElementModQ::from_u64(x);
    let mut exponent = ElementModQ::one();
    let mut product = ElementModP::one();
    for commitment in commitments {
        product = product.mul(&commitment.pow(&exponent));
        exponent = &exponent * &x;
    }
    product
}

/// Checks a share `P(x)` against the published commitments.
pub fn verify_polynomial_value(
    value: &ElementModQ,
    x: GuardianIndex,
    commitments: &[ElementModP],
) -> bool {
    ElementModP::g_pow(value) == compute_recovery_public_key(x, commitments)
}

/// Lagrange coefficient `w_x = prod_{m != x} m / (m - x)` for interpolating at zero over the
/// indices that actually supplied shares.
pub fn compute_lagrange_coefficient(
    x: GuardianIndex,
    others: &[GuardianIndex],
) -> ElectionResult<ElementModQ> {
    let xq = ElementModQ::from_u64(x);
    let mut numerator = ElementModQ::one();
    let mut denominator = ElementModQ::one();
    for &m in others {
        if m == x {
            return Err(ElectionError::invalid_parameters(format!(
                "index {} appears twice in interpolation set",
                x
            )));
        }
        let mq = ElementModQ::from_u64(m);
        numerator = &numerator * &mq;
        denominator = &denominator * &(&mq - &xq);
    }
    Ok(&numerator * &denominator.inverse()?)
}

/// Lagrange coefficients for every index in `indices`, keyed in the same order.
pub fn lagrange_coefficients(
    indices: &[GuardianIndex],
) -> ElectionResult<Vec<(GuardianIndex, ElementModQ)>> {
    indices
        .iter()
        .map(|&x| {
            let others: Vec<_> = indices.iter().copied().filter(|&m| m != x).collect();
            if others.len() + 1 != indices.len() {
                return Err(ElectionError::invalid_parameters(format!(
                    "index {} appears twice in interpolation set",
                    x
                )));
            }
            Ok((x, compute_lagrange_coefficient(x, &others)?))
        })
        .collect()
}

/// Recovers `P(0)` from `(x, P(x))` pairs.
pub fn interpolate_at_zero(points: &[(GuardianIndex, ElementModQ)]) -> ElectionResult<ElementModQ> {
    let indices: Vec<_> = points.iter().map(|(x, _)| *x).collect();
    let coefficients = lagrange_coefficients(&indices)?;
    Ok(points
        .iter()
        .zip(coefficients)
        .fold(ElementModQ::zero(), |acc, ((_, y), (_, w))| &acc + &(y * &w)))
}
