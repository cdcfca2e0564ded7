// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Elements of the scalar field `Z_q` and of the order `q` subgroup of `Z_p^*`.
//!
//! Both types keep their value reduced at all times so equality and hashing are structural.
//! They serialize as uppercase hex strings and refuse out of range values on the way in.

use std::fmt;
use std::ops::{Add, Mul, Sub};

use num_bigint::{BigUint, RandBigInt};
use num_traits::{One, Zero};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::constants::{GENERATOR, LARGE_PRIME, SMALL_PRIME};
use crate::errors::{GroupError, GroupResult};

/// Byte length of a serialized scalar.
pub const Q_BYTES: usize = 32;
/// Byte length of a serialized group element.
pub const P_BYTES: usize = 256;

fn parse_hex(value: &str) -> GroupResult<BigUint> {
    let trimmed = value.trim_start_matches("0x");
    BigUint::parse_bytes(trimmed.as_bytes(), 16)
        .ok_or_else(|| GroupError::parse(format!("'{}' is not a hex number", value)))
}

fn padded_bytes(value: &BigUint, len: usize) -> Vec<u8> {
    let raw = value.to_bytes_be();
    let mut out = vec![0u8; len.saturating_sub(raw.len())];
    out.extend_from_slice(&raw);
    out
}

/// An element of `Z_q`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementModQ(BigUint);

impl ElementModQ {
    /// Reduces `value` into the field.
    pub fn new(value: BigUint) -> Self {
        Self(value % &*SMALL_PRIME)
    }

    /// Accepts `value` only when it is already reduced.
    pub fn try_new(value: BigUint) -> GroupResult<Self> {
        if value >= *SMALL_PRIME {
            return Err(GroupError::out_of_range("scalar is not below q"));
        }
        Ok(Self(value))
    }

    pub fn zero() -> Self {
        Self(BigUint::zero())
    }

    pub fn one() -> Self {
        Self(BigUint::one())
    }

    pub fn from_u64(value: u64) -> Self {
        Self::new(BigUint::from(value))
    }

    /// Interprets big-endian bytes as an integer and reduces it.
    pub fn from_bytes_be(bytes: &[u8]) -> Self {
        Self::new(BigUint::from_bytes_be(bytes))
    }

    /// Uniform sample from `[0, q)`.
    pub fn random<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_biguint_below(&SMALL_PRIME))
    }

    /// Uniform sample from `[1, q)`.
    pub fn random_nonzero<R: RngCore + CryptoRng + ?Sized>(rng: &mut R) -> Self {
        Self(rng.gen_biguint_range(&BigUint::one(), &SMALL_PRIME))
    }

    pub fn from_hex(value: &str) -> GroupResult<Self> {
        Self::try_new(parse_hex(value)?)
    }

    pub fn to_hex(&self) -> String {
        format!("{:X}", self.0)
    }

    pub fn to_bytes_be(&self) -> Vec<u8> {
        padded_bytes(&self.0, Q_BYTES)
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Small values (vote counts, indices) convert back losslessly.
    pub fn to_u64(&self) -> Option<u64> {
        u64::try_from(&self.0).ok()
    }

    pub fn negate(&self) -> Self {
        if self.0.is_zero() {
            return self.clone();
        }
        Self(&*SMALL_PRIME - &self.0)
    }

    pub fn inverse(&self) -> GroupResult<Self> {
        self.0
            .modinv(&SMALL_PRIME)
            .map(Self)
            .ok_or(GroupError::NotInvertible)
    }

    pub fn pow_u64(&self, exponent: u64) -> Self {
        Self(self.0.modpow(&BigUint::from(exponent), &SMALL_PRIME))
    }
}

impl TryFrom<String> for ElementModQ {
    type Error = GroupError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ElementModQ> for String {
    fn from(value: ElementModQ) -> Self {
        value.to_hex()
    }
}

impl From<u64> for ElementModQ {
    fn from(value: u64) -> Self {
        Self::from_u64(value)
    }
}

impl fmt::Debug for ElementModQ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ElementModQ({})", self.to_hex())
    }
}

impl fmt::Display for ElementModQ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

macro_rules! impl_mod_q_op {
    ($trait:ident, $method:ident, $body:expr) => {
        impl<'a> $trait<&'a ElementModQ> for &'a ElementModQ {
            type Output = ElementModQ;
            fn $method(self, rhs: &'a ElementModQ) -> ElementModQ {
                let f: fn(&BigUint, &BigUint) -> BigUint = $body;
                ElementModQ::new(f(&self.0, &rhs.0))
            }
        }

        impl $trait for ElementModQ {
            type Output = ElementModQ;
            fn $method(self, rhs: ElementModQ) -> ElementModQ {
                (&self).$method(&rhs)
            }
        }
    };
}

impl_mod_q_op!(Add, add, |a, b| a + b);
impl_mod_q_op!(Sub, sub, |a, b| a + &*SMALL_PRIME - b);
impl_mod_q_op!(Mul, mul, |a, b| a * b);

/// An element of `Z_p^*`. Membership in the order `q` subgroup is checked separately with
/// [`ElementModP::is_valid_residue`] because it costs a full exponentiation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ElementModP(BigUint);

impl ElementModP {
    pub fn try_new(value: BigUint) -> GroupResult<Self> {
        if value >= *LARGE_PRIME {
            return Err(GroupError::out_of_range("element is not below p"));
        }
        Ok(Self(value))
    }

    pub fn one() -> Self {
        Self(BigUint::one())
    }

    pub fn generator() -> Self {
        Self(GENERATOR.clone())
    }

    /// `g^exponent mod p`
    pub fn g_pow(exponent: &ElementModQ) -> Self {
        Self(GENERATOR.modpow(&exponent.0, &LARGE_PRIME))
    }

    /// `self^exponent mod p`
    pub fn pow(&self, exponent: &ElementModQ) -> Self {
        Self(self.0.modpow(&exponent.0, &LARGE_PRIME))
    }

    pub fn mul(&self, other: &ElementModP) -> Self {
        Self((&self.0 * &other.0) % &*LARGE_PRIME)
    }

    pub fn inverse(&self) -> GroupResult<Self> {
        self.0
            .modinv(&LARGE_PRIME)
            .map(Self)
            .ok_or(GroupError::NotInvertible)
    }

    pub fn div(&self, denominator: &ElementModP) -> GroupResult<Self> {
        Ok(self.mul(&denominator.inverse()?))
    }

    pub fn product<'a>(elements: impl IntoIterator<Item = &'a ElementModP>) -> Self {
        elements
            .into_iter()
            .fold(Self::one(), |acc, element| Self::mul(&acc, element))
    }

    /// True when `0 < x < p` and `x^q = 1`.
    pub fn is_valid_residue(&self) -> bool {
        !self.0.is_zero()
            && self.0 < *LARGE_PRIME
            && self.0.modpow(&SMALL_PRIME, &LARGE_PRIME).is_one()
    }

    pub fn from_hex(value: &str) -> GroupResult<Self> {
        Self::try_new(parse_hex(value)?)
    }

    pub fn to_hex(&self) -> String {
        format!("{:X}", self.0)
    }

    pub fn to_bytes_be(&self) -> Vec<u8> {
        padded_bytes(&self.0, P_BYTES)
    }

    pub fn value(&self) -> &BigUint {
        &self.0
    }
}

impl TryFrom<String> for ElementModP {
    type Error = GroupError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ElementModP> for String {
    fn from(value: ElementModP) -> Self {
        value.to_hex()
    }
}

impl fmt::Debug for ElementModP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        if hex.len() > 16 {
            write!(f, "ElementModP({}..{})", &hex[..8], &hex[hex.len() - 8..])
        } else {
            write!(f, "ElementModP({})", hex)
        }
    }
}

impl fmt::Display for ElementModP {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl<'a> Mul<&'a ElementModP> for &'a ElementModP {
    type Output = ElementModP;
    fn mul(self, rhs: &'a ElementModP) -> ElementModP {
        ElementModP::mul(self, rhs)
    }
}

impl Mul for ElementModP {
    type Output = ElementModP;
    fn mul(self, rhs: ElementModP) -> ElementModP {
        ElementModP::mul(&self, &rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn arb_scalar() -> impl Strategy<Value = ElementModQ> {
        prop::collection::vec(any::<u8>(), 32).prop_map(|bytes| ElementModQ::from_bytes_be(&bytes))
    }

    #[test]
    fn scalar_wraps_at_q() {
        let q_minus_one = ElementModQ::new(&*SMALL_PRIME - BigUint::one());
        assert_eq!(&q_minus_one + &ElementModQ::one(), ElementModQ::zero());
        assert_eq!(&ElementModQ::zero() - &ElementModQ::one(), q_minus_one);
        assert!(ElementModQ::try_new(SMALL_PRIME.clone()).is_err());
    }

    #[test]
    fn zero_has_no_inverse() {
        assert_eq!(ElementModQ::zero().inverse(), Err(GroupError::NotInvertible));
        assert!(ElementModP::try_new(BigUint::zero())
            .and_then(|z| z.inverse())
            .is_err());
    }

    #[test]
    fn generator_powers_are_residues() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let exponent = ElementModQ::random_nonzero(&mut rng);
        let element = ElementModP::g_pow(&exponent);
        assert!(element.is_valid_residue());
        assert!(!ElementModP::try_new(LARGE_PRIME.clone() - BigUint::one())
            .map(|e| e.is_valid_residue())
            .unwrap_or(true));
    }

    #[test]
    fn exponent_addition_is_group_multiplication() {
        let mut rng = ChaCha20Rng::seed_from_u64(7);
        let a = ElementModQ::random(&mut rng);
        let b = ElementModQ::random(&mut rng);
        assert_eq!(
            ElementModP::g_pow(&(&a + &b)),
            ElementModP::mul(&ElementModP::g_pow(&a), &ElementModP::g_pow(&b))
        );
        let ga = ElementModP::g_pow(&a);
        assert_eq!(ga.div(&ga).unwrap(), ElementModP::one());
    }

    #[test]
    fn hex_serialization_rejects_out_of_range() {
        let element = ElementModP::g_pow(&ElementModQ::from_u64(5));
        let json = serde_json::to_string(&element).unwrap();
        let back: ElementModP = serde_json::from_str(&json).unwrap();
        assert_eq!(back, element);

        let too_big = format!("\"{:X}\"", &*LARGE_PRIME);
        assert!(serde_json::from_str::<ElementModP>(&too_big).is_err());
        assert!(serde_json::from_str::<ElementModQ>("\"not hex\"").is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn scalar_field_laws(a in arb_scalar(), b in arb_scalar(), c in arb_scalar()) {
            prop_assert_eq!(&a + &b, &b + &a);
            prop_assert_eq!(&(&a * &b) * &c, &a * &(&b * &c));
            prop_assert_eq!(&a * &(&b + &c), &(&a * &b) + &(&a * &c));
            prop_assert_eq!(&(&a - &b) + &b, a.clone());
            prop_assert_eq!(&a + &a.negate(), ElementModQ::zero());
            if !a.is_zero() {
                prop_assert_eq!(&a * &a.inverse().unwrap(), ElementModQ::one());
            }
        }
    }
}
