// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Error types for group operations.

use thiserror::Error;

/// Errors that can occur while constructing or combining group elements.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GroupError {
    /// Value does not fit the modulus it was constructed for
    #[error("Value out of range: {message}")]
    OutOfRange { message: String },

    /// Element has no multiplicative inverse (zero)
    #[error("Element is not invertible")]
    NotInvertible,

    /// A nonce of zero would leak the plaintext
    #[error("Invalid nonce: {message}")]
    InvalidNonce { message: String },

    /// Hex text could not be parsed into an element
    #[error("Parse error: {message}")]
    ParseError { message: String },
}

impl GroupError {
    pub fn out_of_range(message: impl Into<String>) -> Self {
        Self::OutOfRange {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
        }
    }
}

pub type GroupResult<T> = Result<T, GroupError>;
