// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

pub mod constants;
mod dlog;
mod elgamal;
mod errors;
mod group;
mod hash;
mod nonces;

pub use dlog::*;
pub use elgamal::*;
pub use errors::*;
pub use group::*;
pub use hash::*;
pub use nonces::*;
