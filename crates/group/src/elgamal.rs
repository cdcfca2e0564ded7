// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Exponential ElGamal over the election group.
//!
//! A message `m` is encrypted as `(g^r, g^m * K^r)`. Multiplying ciphertexts component-wise adds
//! the messages, which is what makes the tally homomorphic.

use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::dlog::DiscreteLog;
use crate::errors::{GroupError, GroupResult};
use crate::group::{ElementModP, ElementModQ};
use crate::hash::{hash_elems, CryptoHashable};

/// A secret exponent and its public key `g^secret`.
#[derive(Clone, PartialEq, Eq)]
pub struct ElGamalKeyPair {
    secret_key: ElementModQ,
    public_key: ElementModP,
}

impl ElGamalKeyPair {
    pub fn from_secret(secret_key: ElementModQ) -> GroupResult<Self> {
        if secret_key.is_zero() {
            return Err(GroupError::out_of_range("secret key must be non-zero"));
        }
        let public_key = ElementModP::g_pow(&secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn random<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        let secret_key = ElementModQ::random_nonzero(rng);
        let public_key = ElementModP::g_pow(&secret_key);
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn secret_key(&self) -> &ElementModQ {
        &self.secret_key
    }

    pub fn public_key(&self) -> &ElementModP {
        &self.public_key
    }
}

impl std::fmt::Debug for ElGamalKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElGamalKeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElGamalCiphertext {
    pub pad: ElementModP,
    pub data: ElementModP,
}

/// Encrypts `message` under `public_key` with the given nonce. Pure in all three inputs.
pub fn elgamal_encrypt(
    message: u64,
    nonce: &ElementModQ,
    public_key: &ElementModP,
) -> GroupResult<ElGamalCiphertext> {
    if nonce.is_zero() {
        return Err(GroupError::InvalidNonce {
            message: "ElGamal nonce must be non-zero".to_string(),
        });
    }
    let pad = ElementModP::g_pow(nonce);
    let data = ElementModP::g_pow(&ElementModQ::from_u64(message)).mul(&public_key.pow(nonce));
    Ok(ElGamalCiphertext { pad, data })
}

impl ElGamalCiphertext {
    /// Encryption of zero with a zero nonce; the identity for [`ElGamalCiphertext::add`].
    pub fn zero() -> Self {
        Self {
            pad: ElementModP::one(),
            data: ElementModP::one(),
        }
    }

    pub fn add(&self, other: &ElGamalCiphertext) -> Self {
        Self {
            pad: self.pad.mul(&other.pad),
            data: self.data.mul(&other.data),
        }
    }

    pub fn add_all<'a>(ciphertexts: impl IntoIterator<Item = &'a ElGamalCiphertext>) -> Self {
        ciphertexts
            .into_iter()
            .fold(Self::zero(), |acc, ciphertext| acc.add(ciphertext))
    }

    /// `pad^secret`, one guardian's contribution to decryption.
    pub fn partial_decrypt(&self, secret: &ElementModQ) -> ElementModP {
        self.pad.pow(secret)
    }

    /// `data / product`, which is `g^m` once `product = K^r`.
    pub fn decrypt_known_product(&self, product: &ElementModP) -> GroupResult<ElementModP> {
        self.data.div(product)
    }

    /// Single-key decryption, used where the whole secret is at hand.
    pub fn decrypt(&self, secret: &ElementModQ, dlog: &DiscreteLog) -> GroupResult<Option<u64>> {
        let encoded = self.decrypt_known_product(&self.partial_decrypt(secret))?;
        Ok(dlog.find(&encoded))
    }

    pub fn is_valid(&self) -> bool {
        self.pad.is_valid_residue() && self.data.is_valid_residue()
    }

    pub fn crypto_hash(&self) -> ElementModQ {
        hash_elems(&[&self.pad, &self.data])
    }
}

impl CryptoHashable for ElGamalCiphertext {
    fn hash_repr(&self) -> String {
        self.crypto_hash().to_hex()
    }
}
