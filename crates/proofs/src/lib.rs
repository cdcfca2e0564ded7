// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod chaum_pedersen;
mod errors;
mod schnorr;

pub use chaum_pedersen::*;
pub use errors::*;
pub use schnorr::*;

pub(crate) fn ensure(condition: bool, error: ProofError) -> ProofResult<()> {
    if condition {
        Ok(())
    } else {
        Err(error)
    }
}
