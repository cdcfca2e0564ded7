// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use crate::group::ElementModQ;
use crate::hash::{hash_elems, CryptoHashable};

/// Deterministic sequence of scalars derived from a seed and a header.
///
/// `nonces.get(i) = H(H(seed, header), i)`. Everything that is encrypted or proven from the
/// same seed is reproducible, so the seed must be secret and unique per ballot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Nonces {
    seed: ElementModQ,
}

impl Nonces {
    pub fn new(seed: &ElementModQ, header: &dyn CryptoHashable) -> Self {
        Self {
            seed: hash_elems(&[seed, header]),
        }
    }

    pub fn get(&self, index: u64) -> ElementModQ {
        hash_elems(&[&self.seed, &index])
    }

    /// The first `count` nonces.
    pub fn take(&self, count: usize) -> Vec<ElementModQ> {
        (0..count as u64).map(|i| self.get(i)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_reproducible_and_header_bound() {
        let seed = ElementModQ::from_u64(1234);
        let a = Nonces::new(&seed, &"contest-1");
        let b = Nonces::new(&seed, &"contest-1");
        let c = Nonces::new(&seed, &"contest-2");
        assert_eq!(a.take(3), b.take(3));
        assert_ne!(a.get(0), c.get(0));
        assert_ne!(a.get(0), a.get(1));
    }
}
