// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeMap;
use std::fmt;

use eg_election::{
    DecryptionMediator, ElectionContext, ElectionError, ElectionPublicKey, ElectionResult,
    EncryptedBallot, EncryptedTally, FaultReport, Manifest, PlaintextTally, ProtocolStep,
};
use eg_group::ElementModQ;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElectionPhase {
    /// Accepting ballots
    Open,
    /// Intake closed, collecting decryption shares
    Tallied,
    /// Result combined and frozen
    Published,
}

/// What happens to a submitted ballot: counted, or set aside and decrypted on its own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BallotBoxState {
    Cast,
    Spoiled,
}

impl fmt::Display for BallotBoxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BallotBoxState::Cast => write!(f, "cast"),
            BallotBoxState::Spoiled => write!(f, "spoiled"),
        }
    }
}

impl fmt::Display for ElectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ElectionPhase::Open => "open",
            ElectionPhase::Tallied => "tallied",
            ElectionPhase::Published => "published",
        };
        write!(f, "{}", name)
    }
}

/// A ballot kept out of the tally. Its mediator decrypts it as a one-ballot tally once intake
/// has closed.
pub(crate) struct SpoiledBallot {
    pub hash: ElementModQ,
    pub mediator: DecryptionMediator,
    pub result: Option<PlaintextTally>,
}

pub(crate) struct ElectionRecord {
    pub id: String,
    pub manifest: Manifest,
    pub context: ElectionContext,
    pub public_keys: Vec<ElectionPublicKey>,
    pub phase: ElectionPhase,
    pub tally: EncryptedTally,
    /// Hash of every counted ballot by id
    pub cast: BTreeMap<String, ElementModQ>,
    pub spoiled: BTreeMap<String, SpoiledBallot>,
    pub mediator: Option<DecryptionMediator>,
    pub result: Option<PlaintextTally>,
    pub rejected: Vec<FaultReport>,
}

impl ElectionRecord {
    pub fn new(
        id: String,
        manifest: Manifest,
        context: ElectionContext,
        public_keys: Vec<ElectionPublicKey>,
    ) -> Self {
        let tally = EncryptedTally::new(&manifest);
        Self {
            id,
            manifest,
            context,
            public_keys,
            phase: ElectionPhase::Open,
            tally,
            cast: BTreeMap::new(),
            spoiled: BTreeMap::new(),
            mediator: None,
            result: None,
            rejected: Vec::new(),
        }
    }

    pub fn require(&self, step: ProtocolStep, phase: ElectionPhase) -> ElectionResult<()> {
        if self.phase != phase {
            return Err(ElectionError::invalid_state(
                step,
                format!("election {} is {}, expected {}", self.id, self.phase, phase),
            ));
        }
        Ok(())
    }

    /// Casts or spoils a ballot that already passed validation. Rechecks phase and duplicates
    /// under the lock since validation runs outside it. Ballot ids are unique across cast and
    /// spoiled ballots. Returns whether the ballot was newly accepted.
    pub fn accept(
        &mut self,
        ballot: &EncryptedBallot,
        state: BallotBoxState,
        reject_duplicates: bool,
    ) -> ElectionResult<bool> {
        self.require(ProtocolStep::BallotSubmission, ElectionPhase::Open)?;
        let hash = ballot.crypto_hash();
        let previous = match (
            self.cast.get(&ballot.object_id),
            self.spoiled.get(&ballot.object_id),
        ) {
            (Some(existing), _) => Some((BallotBoxState::Cast, existing)),
            (None, Some(spoiled)) => Some((BallotBoxState::Spoiled, &spoiled.hash)),
            (None, None) => None,
        };
        if let Some((previous, existing)) = previous {
            if !reject_duplicates && previous == state && existing == &hash {
                return Ok(false);
            }
            return Err(ElectionError::malformed(
                &ballot.object_id,
                format!("ballot id has already been {}", previous),
            ));
        }

        match state {
            BallotBoxState::Cast => {
                self.tally.fold(ballot)?;
                self.cast.insert(ballot.object_id.clone(), hash);
            }
            BallotBoxState::Spoiled => {
                let mediator = DecryptionMediator::new(
                    self.context.clone(),
                    EncryptedTally::from_ballot(&self.manifest, ballot)?,
                    self.public_keys.clone(),
                )?;
                self.spoiled.insert(
                    ballot.object_id.clone(),
                    SpoiledBallot {
                        hash,
                        mediator,
                        result: None,
                    },
                );
            }
        }
        Ok(true)
    }

    pub fn mediator(&mut self, step: ProtocolStep) -> ElectionResult<&mut DecryptionMediator> {
        self.require(step, ElectionPhase::Tallied)?;
        self.mediator.as_mut().ok_or_else(|| {
            ElectionError::invalid_state(step, format!("election {} has no tally", self.id))
        })
    }

    /// Spoiled ballots are decrypted once intake has closed, before or after the result is
    /// published.
    pub fn spoiled(
        &mut self,
        step: ProtocolStep,
        ballot_id: &str,
    ) -> ElectionResult<&mut SpoiledBallot> {
        if self.phase == ElectionPhase::Open {
            return Err(ElectionError::invalid_state(
                step,
                format!("election {} is still accepting ballots", self.id),
            ));
        }
        self.spoiled
            .get_mut(ballot_id)
            .ok_or_else(|| ElectionError::NotFound {
                kind: "spoiled ballot",
                id: ballot_id.to_string(),
            })
    }
}
