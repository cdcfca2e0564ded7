// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Guardian-side decryption of an encrypted tally.
//!
//! A present guardian `i` publishes `M_i = A^{s_i}` for every tally selection. When guardian
//! `m` is missing, each present guardian `i` holding a verified backup from `m` publishes
//! `M_{m,i} = A^{P_m(i)}` instead, proven against `g^{P_m(i)}`. Both come with Chaum-Pedersen
//! proofs bound to the extended base hash.

use std::collections::BTreeMap;

use eg_group::{ElGamalCiphertext, ElementModP, ElementModQ};
use eg_proofs::ChaumPedersenProof;
use rand::{CryptoRng, RngCore};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::context::ElectionContext;
use crate::errors::{ElectionError, ElectionResult, Party, ProtocolStep};
use crate::guardian::{ElectionPublicKey, Guardian};
use crate::tally::EncryptedTally;
use crate::types::GuardianIndex;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectionShare {
    pub share: ElementModP,
    pub proof: ChaumPedersenProof,
}

/// Shares keyed by contest id, then selection id.
pub type ContestShares = BTreeMap<String, BTreeMap<String, SelectionShare>>;

/// A present guardian's partial decryption of the whole tally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionShare {
    pub guardian: GuardianIndex,
    pub public_key: ElementModP,
    pub contests: ContestShares,
}

/// A present guardian's partial decryption on behalf of a missing guardian.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensatedShare {
    pub present: GuardianIndex,
    pub missing: GuardianIndex,
    /// `g^{P_missing(present)}`, recomputable from the missing guardian's commitments
    pub recovery_public_key: ElementModP,
    pub contests: ContestShares,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptionContribution {
    Direct(DecryptionShare),
    Compensated(CompensatedShare),
}

impl DecryptionContribution {
    /// The guardian that produced the contribution.
    pub fn submitter(&self) -> GuardianIndex {
        match self {
            DecryptionContribution::Direct(share) => share.guardian,
            DecryptionContribution::Compensated(share) => share.present,
        }
    }
}

fn decrypt_selections<R, F>(
    tally: &EncryptedTally,
    rng: &mut R,
    decrypt: F,
) -> ElectionResult<ContestShares>
where
    R: RngCore + CryptoRng + ?Sized,
    F: Fn(&ElGamalCiphertext, &ElementModQ) -> ElectionResult<(ElementModP, ChaumPedersenProof)>
        + Sync,
{
    // Seeds come off the rng in a fixed order so the result is reproducible from the rng state.
    let work: Vec<_> = tally
        .selections()
        .map(|(contest, selection)| (contest, selection, ElementModQ::random(rng)))
        .collect();

    let decrypted = work
        .par_iter()
        .map(|(contest, selection, seed)| {
            let (share, proof) = decrypt(&selection.ciphertext, seed)?;
            Ok((*contest, selection.object_id.as_str(), SelectionShare { share, proof }))
        })
        .collect::<ElectionResult<Vec<_>>>()?;

    let mut contests = ContestShares::new();
    for (contest, selection, share) in decrypted {
        contests
            .entry(contest.to_string())
            .or_default()
            .insert(selection.to_string(), share);
    }
    Ok(contests)
}

fn verify_selections(
    contests: &ContestShares,
    tally: &EncryptedTally,
    context: &ElectionContext,
    public_key: &ElementModP,
    fault: impl Fn(String) -> ElectionError,
) -> ElectionResult<()> {
    let expected: usize = tally.contests.values().map(|c| c.selections.len()).sum();
    let supplied: usize = contests.values().map(BTreeMap::len).sum();
    if supplied != expected {
        return Err(fault(format!(
            "expected shares for {} selections, got {}",
            expected, supplied
        )));
    }
    for (contest, selection) in tally.selections() {
        let share = contests
            .get(contest)
            .and_then(|c| c.get(&selection.object_id))
            .ok_or_else(|| fault(format!("no share for {}/{}", contest, selection.object_id)))?;
        share
            .proof
            .verify(
                &selection.ciphertext,
                public_key,
                &share.share,
                &context.crypto_extended_base_hash,
            )
            .map_err(|e| fault(format!("{}/{}: {}", contest, selection.object_id, e)))?;
    }
    Ok(())
}

impl DecryptionShare {
    pub fn selection(&self, contest: &str, selection: &str) -> Option<&SelectionShare> {
        self.contests.get(contest)?.get(selection)
    }

    /// Checks every selection's proof against the guardian's announced key.
    pub fn verify(
        &self,
        tally: &EncryptedTally,
        context: &ElectionContext,
        guardian_key: &ElectionPublicKey,
    ) -> ElectionResult<()> {
        let fault = |reason: String| {
            ElectionError::proof_invalid(
                Party::Guardian(self.guardian),
                ProtocolStep::Decryption,
                reason,
            )
        };
        if guardian_key.owner != self.guardian || guardian_key.key != self.public_key {
            return Err(fault("share is not for the announced key".to_string()));
        }
        verify_selections(&self.contests, tally, context, &self.public_key, fault)
    }
}

impl CompensatedShare {
    pub fn selection(&self, contest: &str, selection: &str) -> Option<&SelectionShare> {
        self.contests.get(contest)?.get(selection)
    }

    /// Checks the recovery key against the missing guardian's commitments, then every proof.
    pub fn verify(
        &self,
        tally: &EncryptedTally,
        context: &ElectionContext,
        missing_key: &ElectionPublicKey,
    ) -> ElectionResult<()> {
        let fault = |reason: String| {
            ElectionError::proof_invalid(
                Party::Compensation {
                    present: self.present,
                    missing: self.missing,
                },
                ProtocolStep::CompensatedDecryption,
                reason,
            )
        };
        if self.present == self.missing {
            return Err(fault("a guardian cannot compensate for itself".to_string()));
        }
        if missing_key.owner != self.missing
            || missing_key.recovery_public_key_for(self.present) != self.recovery_public_key
        {
            return Err(fault(
                "recovery key does not match the missing guardian's commitments".to_string(),
            ));
        }
        verify_selections(
            &self.contests,
            tally,
            context,
            &self.recovery_public_key,
            fault,
        )
    }
}

/// Computes `M_i` and its proof for every selection of the tally.
pub fn partial_decrypt<R: RngCore + CryptoRng + ?Sized>(
    guardian: &Guardian,
    tally: &EncryptedTally,
    context: &ElectionContext,
    rng: &mut R,
) -> ElectionResult<DecryptionShare> {
    let hash = &context.crypto_extended_base_hash;
    let contests = decrypt_selections(tally, rng, |ciphertext, seed| {
        Ok(guardian.partial_decrypt_ciphertext(ciphertext, hash, seed))
    })?;
    info!(guardian = guardian.index(), "computed decryption share");
    Ok(DecryptionShare {
        guardian: guardian.index(),
        public_key: guardian.share_public_key().key,
        contests,
    })
}

/// Computes `M_{m,i}` for the missing guardian `m` from the backup `present` holds.
pub fn compensated_decrypt<R: RngCore + CryptoRng + ?Sized>(
    present: &Guardian,
    missing_key: &ElectionPublicKey,
    tally: &EncryptedTally,
    context: &ElectionContext,
    rng: &mut R,
) -> ElectionResult<CompensatedShare> {
    let missing = missing_key.owner;
    if missing == present.index() {
        return Err(ElectionError::invalid_parameters(
            "a guardian cannot compensate for itself",
        ));
    }
    let hash = &context.crypto_extended_base_hash;
    let contests = decrypt_selections(tally, rng, |ciphertext, seed| {
        present.compensate_ciphertext(missing, ciphertext, hash, seed)
    })?;
    info!(
        guardian = present.index(),
        missing, "computed compensated decryption share"
    );
    Ok(CompensatedShare {
        present: present.index(),
        missing,
        recovery_public_key: missing_key.recovery_public_key_for(present.index()),
        contests,
    })
}
