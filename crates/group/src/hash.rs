// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Fiat-Shamir hashing into the scalar field.
//!
//! Inputs are rendered to text, joined with `|` delimiters, hashed with SHA-256 and reduced
//! mod q. Sequences hash recursively so `[a, b]` and `a, b` never collide.

use sha2::{Digest, Sha256};

use crate::group::{ElementModP, ElementModQ};

/// Something that can be fed to [`hash_elems`].
pub trait CryptoHashable {
    fn hash_repr(&self) -> String;
}

impl CryptoHashable for ElementModP {
    fn hash_repr(&self) -> String {
        self.to_hex()
    }
}

impl CryptoHashable for ElementModQ {
    fn hash_repr(&self) -> String {
        self.to_hex()
    }
}

impl CryptoHashable for str {
    fn hash_repr(&self) -> String {
        self.to_string()
    }
}

impl CryptoHashable for String {
    fn hash_repr(&self) -> String {
        self.clone()
    }
}

impl CryptoHashable for u64 {
    fn hash_repr(&self) -> String {
        self.to_string()
    }
}

impl CryptoHashable for u32 {
    fn hash_repr(&self) -> String {
        self.to_string()
    }
}

impl<T: CryptoHashable + ?Sized> CryptoHashable for &T {
    fn hash_repr(&self) -> String {
        (**self).hash_repr()
    }
}

impl<T: CryptoHashable> CryptoHashable for Option<T> {
    fn hash_repr(&self) -> String {
        match self {
            Some(value) => value.hash_repr(),
            None => "null".to_string(),
        }
    }
}

impl<T: CryptoHashable> CryptoHashable for [T] {
    fn hash_repr(&self) -> String {
        if self.is_empty() {
            return "null".to_string();
        }
        let items: Vec<&dyn CryptoHashable> =
            self.iter().map(|item| item as &dyn CryptoHashable).collect();
        hash_elems(&items).to_hex()
    }
}

impl<T: CryptoHashable> CryptoHashable for Vec<T> {
    fn hash_repr(&self) -> String {
        self.as_slice().hash_repr()
    }
}

/// `SHA-256("|" + e_1 + "|" + ... + e_n + "|") mod q`
pub fn hash_elems(elems: &[&dyn CryptoHashable]) -> ElementModQ {
    let mut hasher = Sha256::new();
    hasher.update(b"|");
    for elem in elems {
        hasher.update(elem.hash_repr().as_bytes());
        hasher.update(b"|");
    }
    ElementModQ::from_bytes_be(&hasher.finalize())
}
