// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Error taxonomy for the election protocol.
//!
//! Verification failures are scoped to one party and carry a [`FaultReport`] naming that party
//! and the protocol step, so a failed guardian, backup, share or ballot can be retried or
//! replaced without aborting the rest of the ceremony.

use std::fmt;

use eg_group::GroupError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::GuardianIndex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolStep {
    CeremonySetup,
    KeyGeneration,
    KeyAnnouncement,
    BackupDistribution,
    BackupVerification,
    BackupChallenge,
    JointKey,
    ElectionSetup,
    BallotEncryption,
    BallotSubmission,
    Tally,
    Decryption,
    CompensatedDecryption,
    Combine,
}

impl fmt::Display for ProtocolStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ProtocolStep::CeremonySetup => "ceremony setup",
            ProtocolStep::KeyGeneration => "key generation",
            ProtocolStep::KeyAnnouncement => "key announcement",
            ProtocolStep::BackupDistribution => "backup distribution",
            ProtocolStep::BackupVerification => "backup verification",
            ProtocolStep::BackupChallenge => "backup challenge",
            ProtocolStep::JointKey => "joint key",
            ProtocolStep::ElectionSetup => "election setup",
            ProtocolStep::BallotEncryption => "ballot encryption",
            ProtocolStep::BallotSubmission => "ballot submission",
            ProtocolStep::Tally => "tally",
            ProtocolStep::Decryption => "decryption",
            ProtocolStep::CompensatedDecryption => "compensated decryption",
            ProtocolStep::Combine => "combine",
        };
        f.write_str(name)
    }
}

/// The party a fault is attributed to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Party {
    Guardian(GuardianIndex),
    /// The backup `sender` addressed to `recipient`
    Backup {
        sender: GuardianIndex,
        recipient: GuardianIndex,
    },
    /// `present` standing in for `missing` during decryption
    Compensation {
        present: GuardianIndex,
        missing: GuardianIndex,
    },
    Ballot(String),
}

impl fmt::Display for Party {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Party::Guardian(index) => write!(f, "guardian {}", index),
            Party::Backup { sender, recipient } => {
                write!(f, "backup from guardian {} to guardian {}", sender, recipient)
            }
            Party::Compensation { present, missing } => write!(
                f,
                "guardian {} compensating for guardian {}",
                present, missing
            ),
            Party::Ballot(id) => write!(f, "ballot {}", id),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultReport {
    pub party: Party,
    pub step: ProtocolStep,
    pub reason: String,
}

impl FaultReport {
    pub fn new(party: Party, step: ProtocolStep, reason: impl Into<String>) -> Self {
        Self {
            party,
            step,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for FaultReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed at {}: {}", self.party, self.step, self.reason)
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ElectionError {
    /// Operation attempted out of round order
    #[error("Invalid state for {step}: {state}")]
    InvalidState { step: ProtocolStep, state: String },

    /// Fewer participants than the protocol needs
    #[error("Insufficient guardians for {step}: {available} available, {required} required")]
    InsufficientGuardians {
        step: ProtocolStep,
        required: u64,
        available: u64,
    },

    /// A zero knowledge proof or commitment check failed
    #[error("Proof invalid: {0}")]
    ProofInvalid(FaultReport),

    /// Ballot does not match the manifest
    #[error("Malformed ballot {ballot_id}: {reason}")]
    MalformedBallot { ballot_id: String, reason: String },

    /// Fewer valid decryption contributions than the quorum
    #[error("Quorum not met: {available} valid contributions, {required} required (missing {missing:?})")]
    QuorumNotMet {
        required: u64,
        available: u64,
        missing: Vec<GuardianIndex>,
    },

    /// Structural violation, fatal for the object being created
    #[error("Invalid parameters: {reason}")]
    InvalidParameters { reason: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    /// The decrypted value is outside the discrete log bound
    #[error("Decryption failed for {contest}/{selection}: {reason}")]
    DecryptionFailed {
        contest: String,
        selection: String,
        reason: String,
    },

    #[error(transparent)]
    Group(#[from] GroupError),
}

impl ElectionError {
    pub fn invalid_state(step: ProtocolStep, state: impl Into<String>) -> Self {
        Self::InvalidState {
            step,
            state: state.into(),
        }
    }

    pub fn proof_invalid(party: Party, step: ProtocolStep, reason: impl Into<String>) -> Self {
        Self::ProofInvalid(FaultReport::new(party, step, reason))
    }

    pub fn malformed(ballot_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedBallot {
            ballot_id: ballot_id.into(),
            reason: reason.into(),
        }
    }

    pub fn invalid_parameters(reason: impl Into<String>) -> Self {
        Self::InvalidParameters {
            reason: reason.into(),
        }
    }

    /// The fault report for errors attributable to a single party.
    pub fn fault(&self) -> Option<FaultReport> {
        match self {
            ElectionError::ProofInvalid(report) => Some(report.clone()),
            ElectionError::MalformedBallot { ballot_id, reason } => Some(FaultReport::new(
                Party::Ballot(ballot_id.clone()),
                ProtocolStep::BallotSubmission,
                reason.clone(),
            )),
            _ => None,
        }
    }
}

pub type ElectionResult<T> = Result<T, ElectionError>;
