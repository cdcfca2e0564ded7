// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use eg_group::{hash_elems, ElementModP, ElementModQ, Nonces};
use serde::{Deserialize, Serialize};

use crate::errors::{ProofError, ProofResult};
use crate::ensure;

const PROOF: &str = "Schnorr";

/// Non-interactive proof of knowledge of `s` with `public_key = g^s`.
///
/// `h = g^u`, `c = H(K, h)`, `v = u + c * s`. Verifies with `g^v = h * K^c`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchnorrProof {
    pub public_key: ElementModP,
    pub commitment: ElementModP,
    pub challenge: ElementModQ,
    pub response: ElementModQ,
}

impl SchnorrProof {
    /// `seed` must be secret and never reused for another proof over the same key.
    pub fn make(secret: &ElementModQ, public_key: &ElementModP, seed: &ElementModQ) -> Self {
        let u = Nonces::new(seed, &"schnorr-proof").get(0);
        let commitment = ElementModP::g_pow(&u);
        let challenge = hash_elems(&[public_key, &commitment]);
        let response = &u + &(&challenge * secret);
        Self {
            public_key: public_key.clone(),
            commitment,
            challenge,
            response,
        }
    }

    pub fn verify(&self) -> ProofResult<()> {
        ensure(
            self.public_key.is_valid_residue(),
            ProofError::InvalidResidue {
                proof: PROOF,
                element: "public key",
            },
        )?;
        ensure(
            self.commitment.is_valid_residue(),
            ProofError::InvalidResidue {
                proof: PROOF,
                element: "commitment",
            },
        )?;
        ensure(
            self.challenge == hash_elems(&[&self.public_key, &self.commitment]),
            ProofError::ChallengeMismatch { proof: PROOF },
        )?;
        ensure(
            ElementModP::g_pow(&self.response)
                == self.commitment.mul(&self.public_key.pow(&self.challenge)),
            ProofError::EquationFailed {
                proof: PROOF,
                equation: "g^v = h * K^c",
            },
        )
    }

    pub fn is_valid(&self) -> bool {
        self.verify().is_ok()
    }
}
