// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Parameters of the fixed Schnorr group used by every election.
//!
//! `q = 2^256 - 189` is the scalar field modulus. The 2048-bit prime `p = q * r + 1` was found
//! by expanding the public seed `b"threshold election group v1"` with SHA-256 in counter mode
//! (`SHA-256(seed || i as u32 BE)` for `i = 0..8`, top bit forced), taking `r` as the even part of
//! `x / q` and stepping `r += 2` until `p` was prime. The generator is `g = 2^r mod p`, which has
//! order `q`.

use num_bigint::BigUint;
use num_traits::One;
use once_cell::sync::Lazy;

/// Bit length of the scalar field.
pub const Q_BITS: u64 = 256;
const Q_OFFSET: u32 = 189;

/// Big-endian bytes of the group modulus `p`.
const P_BYTES: [u8; 256] = [
    0xa7, 0xf1, 0x5b, 0x78, 0x1f, 0xd9, 0x48, 0x35, 0x69, 0xcc, 0x68, 0x6b,
    0xa7, 0xb2, 0x28, 0xf2, 0x24, 0x68, 0x5b, 0x32, 0x08, 0x8c, 0x22, 0x59,
    0x4a, 0x7c, 0x8a, 0x3f, 0xc6, 0x70, 0x8b, 0x18, 0x85, 0x14, 0x90, 0x4f,
    0x9a, 0x98, 0x17, 0xd1, 0x0a, 0xaa, 0x5e, 0xa1, 0x5d, 0xa4, 0xa1, 0xc8,
    0xf1, 0x8a, 0x29, 0x5c, 0x2f, 0xcb, 0x05, 0x3b, 0x2a, 0x42, 0x07, 0x6b,
    0x48, 0x9f, 0xed, 0xf9, 0x01, 0x16, 0x79, 0xa9, 0x0e, 0x15, 0x09, 0x12,
    0x23, 0x8d, 0x36, 0xab, 0xc9, 0xec, 0xd3, 0x3b, 0xcb, 0x85, 0xe7, 0x25,
    0x7e, 0x7e, 0xd5, 0xdf, 0x8b, 0x28, 0xbc, 0xc8, 0x3e, 0x71, 0x58, 0x44,
    0x62, 0xa5, 0xc8, 0xc0, 0xd3, 0x1e, 0x31, 0x46, 0xf4, 0x7f, 0x43, 0x1c,
    0x51, 0x1c, 0x79, 0xce, 0x8d, 0x48, 0x95, 0xc2, 0xcc, 0x24, 0xe5, 0x99,
    0x0d, 0x5f, 0xfc, 0xc8, 0x0f, 0x25, 0xf7, 0xe3, 0x46, 0x02, 0xaa, 0xbc,
    0xd4, 0x63, 0x69, 0xf0, 0x48, 0xaa, 0x21, 0xbc, 0x9d, 0x1d, 0x22, 0xb0,
    0x9f, 0x1c, 0x1b, 0x2e, 0xbd, 0xed, 0xbb, 0x18, 0xb1, 0xbe, 0xfc, 0x45,
    0x50, 0x2f, 0xe1, 0xce, 0x3d, 0x1e, 0x1c, 0xaf, 0x61, 0x66, 0x2e, 0xd3,
    0x9d, 0x8e, 0xaf, 0xa2, 0xa3, 0x64, 0x5a, 0x19, 0xd1, 0x04, 0xef, 0x4c,
    0x77, 0x59, 0x76, 0xe8, 0x64, 0x64, 0x02, 0x9d, 0x7c, 0x0d, 0xa6, 0x39,
    0xb5, 0xa6, 0xe0, 0x4d, 0x4d, 0xda, 0x6c, 0x1b, 0x9e, 0x2d, 0x94, 0x38,
    0x68, 0xd6, 0xd9, 0x9f, 0x5b, 0x09, 0xa5, 0xb6, 0xdc, 0xf5, 0xd4, 0xf8,
    0xe1, 0x13, 0xc3, 0xb5, 0xf5, 0x07, 0x4e, 0xe0, 0x8e, 0xbd, 0xcb, 0x73,
    0x27, 0xf9, 0x47, 0x4b, 0xd6, 0x2d, 0xcc, 0x04, 0x05, 0x30, 0x56, 0x00,
    0x37, 0x67, 0x78, 0x60, 0xeb, 0x27, 0x44, 0xc9, 0x9c, 0xba, 0xf5, 0x87,
    0x79, 0x24, 0xd6, 0x8f,
];

/// Big-endian bytes of the cofactor `r = (p - 1) / q`.
const R_BYTES: [u8; 224] = [
    0xa7, 0xf1, 0x5b, 0x78, 0x1f, 0xd9, 0x48, 0x35, 0x69, 0xcc, 0x68, 0x6b,
    0xa7, 0xb2, 0x28, 0xf2, 0x24, 0x68, 0x5b, 0x32, 0x08, 0x8c, 0x22, 0x59,
    0x4a, 0x7c, 0x8a, 0x3f, 0xc6, 0x70, 0x8b, 0x94, 0x82, 0x45, 0x17, 0xff,
    0x1e, 0x02, 0x67, 0x40, 0x26, 0x93, 0x76, 0x1c, 0x2c, 0x2c, 0xdc, 0x8d,
    0xd2, 0x95, 0x7d, 0x4c, 0x7f, 0x40, 0x61, 0x27, 0x28, 0x34, 0x18, 0x80,
    0xc9, 0xb6, 0xfa, 0x9d, 0x2e, 0x19, 0x31, 0x02, 0x35, 0xdb, 0x43, 0x6e,
    0x9e, 0x6b, 0x69, 0x78, 0x67, 0x0b, 0xa7, 0xf0, 0x43, 0xe3, 0x68, 0x9f,
    0x71, 0x06, 0x8f, 0xc8, 0x39, 0x9e, 0xd3, 0xdd, 0x2a, 0x88, 0x5e, 0x4f,
    0x6b, 0x3e, 0xf7, 0x62, 0x95, 0xfe, 0xf9, 0xf1, 0xe9, 0xcc, 0x21, 0x00,
    0x64, 0xb7, 0x76, 0x30, 0xac, 0x2c, 0xd3, 0x79, 0x3d, 0xfd, 0x0c, 0x6b,
    0x97, 0xa2, 0x67, 0x10, 0x75, 0xd3, 0x98, 0x85, 0x73, 0x7f, 0x4e, 0x85,
    0x91, 0xa1, 0xf1, 0x89, 0xe4, 0x5e, 0x7f, 0x06, 0xf8, 0x8f, 0x64, 0x9f,
    0xbc, 0x34, 0x3b, 0xb1, 0x81, 0xbf, 0xe6, 0x87, 0xa4, 0xa5, 0x13, 0x6c,
    0x4d, 0x67, 0x7c, 0x54, 0x82, 0x1b, 0x15, 0x4b, 0xe5, 0xf5, 0x81, 0xa1,
    0x37, 0x52, 0x77, 0xc8, 0x25, 0x41, 0xa4, 0x07, 0xc3, 0x95, 0x01, 0x59,
    0x42, 0x06, 0xa9, 0x0c, 0xf2, 0x43, 0x59, 0x92, 0xa1, 0x74, 0x70, 0x9d,
    0xc3, 0xa5, 0x99, 0x56, 0x14, 0x1b, 0x20, 0x21, 0x76, 0x10, 0x02, 0xfb,
    0xea, 0x4c, 0xf3, 0x5a, 0xc0, 0x0b, 0xa4, 0x9c, 0x9b, 0xe0, 0xa3, 0x87,
    0xbc, 0xcc, 0xe4, 0xf7, 0x27, 0xfe, 0x73, 0x5a,
];

/// Big-endian bytes of the generator `g`.
const G_BYTES: [u8; 256] = [
    0x8b, 0x9b, 0x09, 0x24, 0xff, 0xc8, 0x3f, 0x12, 0x6c, 0x9c, 0xbb, 0x72,
    0x40, 0x5d, 0x55, 0x5d, 0x1b, 0x6d, 0x4a, 0x42, 0xb1, 0xfe, 0x1a, 0xd8,
    0x7f, 0xdc, 0x77, 0x20, 0x86, 0xa0, 0xd0, 0xac, 0x0c, 0x2d, 0xd2, 0x4c,
    0x15, 0x07, 0x9e, 0x79, 0xa6, 0xdd, 0x7b, 0x03, 0x92, 0xf9, 0x5e, 0x2a,
    0x0a, 0x89, 0x33, 0x6b, 0xa1, 0xee, 0x23, 0xc1, 0xad, 0x86, 0x62, 0x7f,
    0x1e, 0x7b, 0xcf, 0x27, 0x0a, 0x60, 0xc1, 0xf3, 0x0d, 0x43, 0x27, 0x53,
    0xfd, 0x5a, 0xd0, 0x05, 0x86, 0xf3, 0x99, 0x62, 0x95, 0xf7, 0xbe, 0x82,
    0x7f, 0x92, 0x7a, 0x23, 0xec, 0x49, 0x08, 0xe2, 0xbb, 0x86, 0xb3, 0x87,
    0x46, 0xca, 0x0c, 0x48, 0x03, 0x78, 0xba, 0x0d, 0xf1, 0x16, 0x2e, 0x83,
    0x42, 0xec, 0x75, 0xe7, 0xd5, 0x36, 0x12, 0x67, 0x53, 0x40, 0xec, 0x10,
    0xdf, 0x7b, 0xa5, 0x66, 0xc3, 0xc3, 0x58, 0xe0, 0x6a, 0x8b, 0x62, 0x3f,
    0x7a, 0x2a, 0x7d, 0x30, 0xeb, 0xd3, 0xa0, 0xae, 0xa1, 0x07, 0xdf, 0xf5,
    0xd4, 0x48, 0x24, 0x3c, 0x66, 0xe6, 0x6b, 0x1e, 0x12, 0x73, 0xa0, 0x86,
    0x75, 0x06, 0x50, 0xf6, 0x38, 0x6e, 0x8b, 0x17, 0x2d, 0x8c, 0xbf, 0x49,
    0xcc, 0xd0, 0xcc, 0x7c, 0x76, 0xe1, 0x4d, 0x28, 0xb1, 0x61, 0xff, 0x34,
    0xc1, 0x5f, 0xa1, 0x53, 0x6d, 0x63, 0x3b, 0x69, 0x75, 0xce, 0xed, 0x76,
    0xfc, 0x19, 0xf6, 0x71, 0x87, 0x46, 0xc7, 0xcb, 0xca, 0x39, 0xc6, 0x1c,
    0xd7, 0x82, 0xb9, 0xbb, 0xf9, 0xc2, 0x70, 0x06, 0x6a, 0x0d, 0x99, 0x6a,
    0x8a, 0xc4, 0x88, 0xc4, 0x76, 0x33, 0x2c, 0x03, 0x23, 0xf5, 0xc3, 0x55,
    0x24, 0xf7, 0x82, 0x42, 0x92, 0xee, 0xa0, 0xe7, 0x58, 0xf3, 0x47, 0x39,
    0x36, 0x79, 0xa8, 0x82, 0x21, 0x5d, 0xd8, 0x39, 0xb9, 0x2b, 0x80, 0x72,
    0xf2, 0x94, 0xd1, 0x63,
];

pub static LARGE_PRIME: Lazy<BigUint> = Lazy::new(|| BigUint::from_bytes_be(&P_BYTES));
pub static SMALL_PRIME: Lazy<BigUint> =
    Lazy::new(|| (BigUint::one() << Q_BITS) - BigUint::from(Q_OFFSET));
pub static COFACTOR: Lazy<BigUint> = Lazy::new(|| BigUint::from_bytes_be(&R_BYTES));
pub static GENERATOR: Lazy<BigUint> = Lazy::new(|| BigUint::from_bytes_be(&G_BYTES));
