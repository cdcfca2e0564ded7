// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Chaum-Pedersen proofs of discrete log equality and the two ballot proofs built on them.
//!
//! Every challenge is bound to the election's extended base hash `Q̄`, so a proof made for one
//! election never verifies in another.

use eg_group::{hash_elems, ElGamalCiphertext, ElementModP, ElementModQ, Nonces};
use serde::{Deserialize, Serialize};

use crate::ensure;
use crate::errors::{ProofError, ProofResult};

fn residue(proof: &'static str, element: &'static str, value: &ElementModP) -> ProofResult<()> {
    ensure(
        value.is_valid_residue(),
        ProofError::InvalidResidue { proof, element },
    )
}

fn equation(proof: &'static str, equation: &'static str, holds: bool) -> ProofResult<()> {
    ensure(holds, ProofError::EquationFailed { proof, equation })
}

/// Proves `log_g(K_i) = log_A(M_i)` for a ciphertext `(A, B)`: the partial decryption `M_i` was
/// made with the secret behind the public key `K_i`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChaumPedersenProof {
    pub pad: ElementModP,
    pub data: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

impl ChaumPedersenProof {
    const NAME: &'static str = "Chaum-Pedersen";

    pub fn make(
        message: &ElGamalCiphertext,
        secret: &ElementModQ,
        partial_decryption: &ElementModP,
        seed: &ElementModQ,
        extended_base_hash: &ElementModQ,
    ) -> Self {
        let u = Nonces::new(seed, &"chaum-pedersen-proof").get(0);
        let pad = ElementModP::g_pow(&u);
        let data = message.pad.pow(&u);
        let challenge = hash_elems(&[
            extended_base_hash,
            &message.pad,
            &message.data,
            &pad,
            &data,
            partial_decryption,
        ]);
        let response = &u + &(&challenge * secret);
        Self {
            pad,
            data,
            challenge,
            response,
        }
    }

    pub fn verify(
        &self,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        partial_decryption: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> ProofResult<()> {
        residue(Self::NAME, "message pad", &message.pad)?;
        residue(Self::NAME, "public key", public_key)?;
        residue(Self::NAME, "partial decryption", partial_decryption)?;
        residue(Self::NAME, "commitment a", &self.pad)?;
        residue(Self::NAME, "commitment b", &self.data)?;

        let expected = hash_elems(&[
            extended_base_hash,
            &message.pad,
            &message.data,
            &self.pad,
            &self.data,
            partial_decryption,
        ]);
        ensure(
            self.challenge == expected,
            ProofError::ChallengeMismatch { proof: Self::NAME },
        )?;

        equation(
            Self::NAME,
            "g^v = a * K^c",
            ElementModP::g_pow(&self.response) == self.pad.mul(&public_key.pow(&self.challenge)),
        )?;
        equation(
            Self::NAME,
            "A^v = b * M^c",
            message.pad.pow(&self.response)
                == self.data.mul(&partial_decryption.pow(&self.challenge)),
        )
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        partial_decryption: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        self.verify(message, public_key, partial_decryption, extended_base_hash)
            .is_ok()
    }
}

/// Proves an ElGamal ciphertext encrypts 0 or 1 without revealing which.
///
/// One branch is a real Chaum-Pedersen proof, the other is simulated from a chosen challenge.
/// The two branch challenges must sum to the transcript hash.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisjunctiveChaumPedersenProof {
    pub proof_zero_pad: ElementModP,
    pub proof_zero_data: ElementModP,
    pub proof_one_pad: ElementModP,
    pub proof_one_data: ElementModP,
    pub proof_zero_challenge: ElementModQ,
    pub proof_one_challenge: ElementModQ,
    pub challenge: ElementModQ,
    pub proof_zero_response: ElementModQ,
    pub proof_one_response: ElementModQ,
}

impl DisjunctiveChaumPedersenProof {
    const NAME: &'static str = "Disjunctive Chaum-Pedersen";

    /// `nonce` is the ElGamal nonce `r` used to produce `message`.
    pub fn make(
        message: &ElGamalCiphertext,
        nonce: &ElementModQ,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
        seed: &ElementModQ,
        plaintext: u64,
    ) -> ProofResult<Self> {
        let nonces = Nonces::new(seed, &"disjoint-chaum-pedersen-proof");
        let (alpha, beta) = (&message.pad, &message.data);

        match plaintext {
            0 => {
                let u0 = nonces.get(0);
                let c1 = nonces.get(1);
                let v1 = nonces.get(2);
                let a0 = ElementModP::g_pow(&u0);
                let b0 = public_key.pow(&u0);
                let neg_c1 = c1.negate();
                let a1 = ElementModP::g_pow(&v1).mul(&alpha.pow(&neg_c1));
                let b1 = public_key
                    .pow(&v1)
                    .mul(&ElementModP::g_pow(&c1))
                    .mul(&beta.pow(&neg_c1));
                let c = hash_elems(&[extended_base_hash, alpha, beta, &a0, &b0, &a1, &b1]);
                let c0 = &c - &c1;
                let v0 = &u0 + &(&c0 * nonce);
                Ok(Self {
                    proof_zero_pad: a0,
                    proof_zero_data: b0,
                    proof_one_pad: a1,
                    proof_one_data: b1,
                    proof_zero_challenge: c0,
                    proof_one_challenge: c1,
                    challenge: c,
                    proof_zero_response: v0,
                    proof_one_response: v1,
                })
            }
            1 => {
                let u1 = nonces.get(0);
                let c0 = nonces.get(1);
                let v0 = nonces.get(2);
                let neg_c0 = c0.negate();
                let a0 = ElementModP::g_pow(&v0).mul(&alpha.pow(&neg_c0));
                let b0 = public_key.pow(&v0).mul(&beta.pow(&neg_c0));
                let a1 = ElementModP::g_pow(&u1);
                let b1 = public_key.pow(&u1);
                let c = hash_elems(&[extended_base_hash, alpha, beta, &a0, &b0, &a1, &b1]);
                let c1 = &c - &c0;
                let v1 = &u1 + &(&c1 * nonce);
                Ok(Self {
                    proof_zero_pad: a0,
                    proof_zero_data: b0,
                    proof_one_pad: a1,
                    proof_one_data: b1,
                    proof_zero_challenge: c0,
                    proof_one_challenge: c1,
                    challenge: c,
                    proof_zero_response: v0,
                    proof_one_response: v1,
                })
            }
            other => Err(ProofError::InvalidStatement {
                proof: Self::NAME,
                message: format!("plaintext {} is neither 0 nor 1", other),
            }),
        }
    }

    pub fn verify(
        &self,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> ProofResult<()> {
        let (alpha, beta) = (&message.pad, &message.data);
        residue(Self::NAME, "alpha", alpha)?;
        residue(Self::NAME, "beta", beta)?;
        residue(Self::NAME, "a0", &self.proof_zero_pad)?;
        residue(Self::NAME, "b0", &self.proof_zero_data)?;
        residue(Self::NAME, "a1", &self.proof_one_pad)?;
        residue(Self::NAME, "b1", &self.proof_one_data)?;

        let expected = hash_elems(&[
            extended_base_hash,
            alpha,
            beta,
            &self.proof_zero_pad,
            &self.proof_zero_data,
            &self.proof_one_pad,
            &self.proof_one_data,
        ]);
        ensure(
            self.challenge == expected,
            ProofError::ChallengeMismatch { proof: Self::NAME },
        )?;
        equation(
            Self::NAME,
            "c = c0 + c1",
            self.challenge == &self.proof_zero_challenge + &self.proof_one_challenge,
        )?;

        let (c0, c1) = (&self.proof_zero_challenge, &self.proof_one_challenge);
        let (v0, v1) = (&self.proof_zero_response, &self.proof_one_response);
        equation(
            Self::NAME,
            "g^v0 = a0 * alpha^c0",
            ElementModP::g_pow(v0) == self.proof_zero_pad.mul(&alpha.pow(c0)),
        )?;
        equation(
            Self::NAME,
            "K^v0 = b0 * beta^c0",
            public_key.pow(v0) == self.proof_zero_data.mul(&beta.pow(c0)),
        )?;
        equation(
            Self::NAME,
            "g^v1 = a1 * alpha^c1",
            ElementModP::g_pow(v1) == self.proof_one_pad.mul(&alpha.pow(c1)),
        )?;
        equation(
            Self::NAME,
            "g^c1 * K^v1 = b1 * beta^c1",
            ElementModP::g_pow(c1).mul(&public_key.pow(v1))
                == self.proof_one_data.mul(&beta.pow(c1)),
        )
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        self.verify(message, public_key, extended_base_hash).is_ok()
    }
}

/// Proves a ciphertext encrypts the public constant `constant` given its aggregate nonce.
///
/// Used to show a contest's selections sum to exactly the number of votes allowed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConstantChaumPedersenProof {
    pub pad: ElementModP,
    pub data: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
    pub constant: u64,
}

impl ConstantChaumPedersenProof {
    const NAME: &'static str = "Constant Chaum-Pedersen";

    pub fn make(
        message: &ElGamalCiphertext,
        nonce: &ElementModQ,
        public_key: &ElementModP,
        seed: &ElementModQ,
        extended_base_hash: &ElementModQ,
        constant: u64,
    ) -> Self {
        let u = Nonces::new(seed, &"constant-chaum-pedersen-proof").get(0);
        let pad = ElementModP::g_pow(&u);
        let data = public_key.pow(&u);
        let challenge = hash_elems(&[
            extended_base_hash,
            &message.pad,
            &message.data,
            &pad,
            &data,
        ]);
        let response = &u + &(&challenge * nonce);
        Self {
            pad,
            data,
            challenge,
            response,
            constant,
        }
    }

    pub fn verify(
        &self,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> ProofResult<()> {
        residue(Self::NAME, "message pad", &message.pad)?;
        residue(Self::NAME, "message data", &message.data)?;
        residue(Self::NAME, "commitment a", &self.pad)?;
        residue(Self::NAME, "commitment b", &self.data)?;

        let expected = hash_elems(&[
            extended_base_hash,
            &message.pad,
            &message.data,
            &self.pad,
            &self.data,
        ]);
        ensure(
            self.challenge == expected,
            ProofError::ChallengeMismatch { proof: Self::NAME },
        )?;

        equation(
            Self::NAME,
            "g^v = a * A^c",
            ElementModP::g_pow(&self.response) == self.pad.mul(&message.pad.pow(&self.challenge)),
        )?;
        let unblinded = message
            .data
            .mul(&ElementModP::g_pow(&ElementModQ::from_u64(self.constant).negate()));
        equation(
            Self::NAME,
            "K^v = b * (B / g^L)^c",
            public_key.pow(&self.response) == self.data.mul(&unblinded.pow(&self.challenge)),
        )
    }

    pub fn is_valid(
        &self,
        message: &ElGamalCiphertext,
        public_key: &ElementModP,
        extended_base_hash: &ElementModQ,
    ) -> bool {
        self.verify(message, public_key, extended_base_hash).is_ok()
    }
}
