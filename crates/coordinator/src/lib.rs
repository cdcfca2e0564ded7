// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

mod config;
mod coordinator;
mod election;

pub use config::*;
pub use coordinator::*;
pub use election::{BallotBoxState, ElectionPhase};
