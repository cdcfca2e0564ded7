// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod ballots;
mod ceremony;
mod decryption;
mod utils;

pub use ballots::*;
pub use ceremony::*;
pub use decryption::*;
pub use utils::*;
