// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Error types for proof construction and verification.

use eg_group::GroupError;
use thiserror::Error;

/// Names the proof kind and the check that failed so faults can be reported precisely.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProofError {
    /// A public value is not a member of the order q subgroup
    #[error("{proof} proof: {element} is not a valid residue")]
    InvalidResidue {
        proof: &'static str,
        element: &'static str,
    },

    /// The stored challenge is not the hash of the transcript
    #[error("{proof} proof: challenge does not match transcript")]
    ChallengeMismatch { proof: &'static str },

    /// A verification equation does not hold
    #[error("{proof} proof: equation {equation} does not hold")]
    EquationFailed {
        proof: &'static str,
        equation: &'static str,
    },

    /// The statement cannot be proven with the given witness
    #[error("{proof} proof: {message}")]
    InvalidStatement {
        proof: &'static str,
        message: String,
    },

    #[error(transparent)]
    Group(#[from] GroupError),
}

pub type ProofResult<T> = Result<T, ProofError>;
