// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod backup;
mod ballot;
mod context;
mod decryption;
mod decryption_mediator;
mod errors;
mod guardian;
mod key_ceremony;
mod manifest;
mod polynomial;
mod tally;
mod types;

pub use backup::*;
pub use ballot::*;
pub use context::*;
pub use decryption::*;
pub use decryption_mediator::*;
pub use errors::*;
pub use guardian::*;
pub use key_ceremony::*;
pub use manifest::*;
pub use polynomial::*;
pub use tally::*;
pub use types::*;
