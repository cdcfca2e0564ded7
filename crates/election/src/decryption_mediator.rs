// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::{BTreeMap, BTreeSet};

use eg_group::{DiscreteLog, ElGamalCiphertext, ElementModP, ElementModQ};
use eg_proofs::ChaumPedersenProof;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ballot::EncryptedBallot;
use crate::context::ElectionContext;
use crate::decryption::{CompensatedShare, DecryptionContribution, DecryptionShare};
use crate::errors::{ElectionError, ElectionResult, FaultReport, Party, ProtocolStep};
use crate::guardian::ElectionPublicKey;
use crate::manifest::Manifest;
use crate::polynomial::lagrange_coefficients;
use crate::tally::{CiphertextTallySelection, EncryptedTally};
use crate::types::{CeremonyDetails, GuardianIndex};

/// One compensated contribution toward a missing guardian's share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensatedPart {
    pub present: GuardianIndex,
    pub share: ElementModP,
    pub proof: ChaumPedersenProof,
    pub recovery_public_key: ElementModP,
    pub lagrange_coefficient: ElementModQ,
}

/// How one guardian's `M_i` entered the combined decryption.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareRecord {
    Direct {
        guardian: GuardianIndex,
        share: ElementModP,
        proof: ChaumPedersenProof,
    },
    /// `M_m = prod_i M_{m,i}^{w_i}` over the guardians that compensated
    Reconstructed {
        missing: GuardianIndex,
        share: ElementModP,
        parts: Vec<CompensatedPart>,
    },
}

impl ShareRecord {
    pub fn guardian(&self) -> GuardianIndex {
        match self {
            ShareRecord::Direct { guardian, .. } => *guardian,
            ShareRecord::Reconstructed { missing, .. } => *missing,
        }
    }

    pub fn share(&self) -> &ElementModP {
        match self {
            ShareRecord::Direct { share, .. } | ShareRecord::Reconstructed { share, .. } => share,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextTallySelection {
    pub object_id: String,
    pub tally: u64,
    /// `g^tally`
    pub value: ElementModP,
    pub message: ElGamalCiphertext,
    pub shares: Vec<ShareRecord>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextTallyContest {
    pub object_id: String,
    pub selections: BTreeMap<String, PlaintextTallySelection>,
}

/// The published result. Carries every share and proof needed to check it against the
/// encrypted tally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextTally {
    pub manifest_hash: ElementModQ,
    pub cast_ballot_count: u64,
    pub contests: BTreeMap<String, PlaintextTallyContest>,
}

impl PlaintextTally {
    pub fn count(&self, contest: &str, selection: &str) -> Option<u64> {
        Some(self.contests.get(contest)?.selections.get(selection)?.tally)
    }

    /// Counts by contest, then selection.
    pub fn counts(&self) -> BTreeMap<String, BTreeMap<String, u64>> {
        self.contests
            .iter()
            .map(|(id, contest)| {
                let counts = contest
                    .selections
                    .iter()
                    .map(|(s, selection)| (s.clone(), selection.tally))
                    .collect();
                (id.clone(), counts)
            })
            .collect()
    }

    /// Re-checks every share proof, every Lagrange coefficient and every decoded count.
    /// A bad share is `ProofInvalid` against its guardian; a result that does not match the
    /// tally at all is `InvalidParameters`.
    pub fn verify(
        &self,
        context: &ElectionContext,
        public_keys: &[ElectionPublicKey],
        tally: &EncryptedTally,
    ) -> ElectionResult<()> {
        let keys: BTreeMap<_, _> = public_keys.iter().map(|k| (k.owner, k)).collect();
        let fault = |party: Party, reason: String| {
            ElectionError::proof_invalid(party, ProtocolStep::Combine, reason)
        };
        let tally_fault = ElectionError::invalid_parameters;

        if self.manifest_hash != tally.manifest_hash
            || self.cast_ballot_count != tally.cast_ballot_count()
        {
            return Err(tally_fault("result does not belong to this tally".to_string()));
        }
        let hash = &context.crypto_extended_base_hash;

        for (contest, encrypted) in tally.selections() {
            let label = format!("{}/{}", contest, encrypted.object_id);
            let selection = self
                .contests
                .get(contest)
                .and_then(|c| c.selections.get(&encrypted.object_id))
                .ok_or_else(|| tally_fault(format!("missing result for {}", label)))?;
            if selection.message != encrypted.ciphertext {
                return Err(tally_fault(format!("{} decrypts a different ciphertext", label)));
            }

            let covered: BTreeSet<_> = selection.shares.iter().map(ShareRecord::guardian).collect();
            if covered.len() != selection.shares.len()
                || covered.len() as u64 != context.number_of_guardians
                || covered.iter().any(|i| !keys.contains_key(i))
            {
                return Err(tally_fault(format!(
                    "{} does not have exactly one share per guardian",
                    label
                )));
            }

            for record in &selection.shares {
                match record {
                    ShareRecord::Direct {
                        guardian,
                        share,
                        proof,
                    } => {
                        let key = keys[guardian];
                        proof
                            .verify(&selection.message, &key.key, share, hash)
                            .map_err(|e| {
                                fault(Party::Guardian(*guardian), format!("{}: {}", label, e))
                            })?;
                    }
                    ShareRecord::Reconstructed {
                        missing,
                        share,
                        parts,
                    } => {
                        let key = keys[missing];
                        let indices: Vec<_> = parts.iter().map(|p| p.present).collect();
                        let coefficients = lagrange_coefficients(&indices)?;
                        if (parts.len() as u64) < context.quorum {
                            return Err(fault(
                                Party::Guardian(*missing),
                                format!("{} reconstructed from too few guardians", label),
                            ));
                        }
                        for (part, (_, w)) in parts.iter().zip(&coefficients) {
                            let party = Party::Compensation {
                                present: part.present,
                                missing: *missing,
                            };
                            if part.recovery_public_key != key.recovery_public_key_for(part.present)
                                || &part.lagrange_coefficient != w
                            {
                                return Err(fault(
                                    party,
                                    format!("{}: recovery key or coefficient mismatch", label),
                                ));
                            }
                            part.proof
                                .verify(
                                    &selection.message,
                                    &part.recovery_public_key,
                                    &part.share,
                                    hash,
                                )
                                .map_err(|e| fault(party.clone(), format!("{}: {}", label, e)))?;
                        }
                        if &reconstruct(parts) != share {
                            return Err(fault(
                                Party::Guardian(*missing),
                                format!("{} reconstructed share does not match parts", label),
                            ));
                        }
                    }
                }
            }

            let product = ElementModP::product(selection.shares.iter().map(ShareRecord::share));
            let value = selection.message.decrypt_known_product(&product)?;
            if value != selection.value
                || ElementModP::g_pow(&ElementModQ::from_u64(selection.tally)) != value
            {
                return Err(tally_fault(format!("{} count does not match shares", label)));
            }
        }
        Ok(())
    }
}

fn reconstruct(parts: &[CompensatedPart]) -> ElementModP {
    parts.iter().fold(ElementModP::one(), |acc, part| {
        acc.mul(&part.share.pow(&part.lagrange_coefficient))
    })
}

/// Collects decryption contributions for one tally and combines them once a quorum is present.
///
/// Every submission is verified on arrival. A contribution that fails verification is recorded
/// as a fault and discarded; a guardian whose direct share was discarded stays missing and can
/// be compensated for.
#[derive(Debug)]
pub struct DecryptionMediator {
    context: ElectionContext,
    tally: EncryptedTally,
    details: CeremonyDetails,
    public_keys: BTreeMap<GuardianIndex, ElectionPublicKey>,
    shares: BTreeMap<GuardianIndex, DecryptionShare>,
    /// Keyed by missing guardian, then by the present guardian that compensated
    compensated: BTreeMap<GuardianIndex, BTreeMap<GuardianIndex, CompensatedShare>>,
    faults: Vec<FaultReport>,
}

impl DecryptionMediator {
    pub fn new(
        context: ElectionContext,
        tally: EncryptedTally,
        public_keys: Vec<ElectionPublicKey>,
    ) -> ElectionResult<Self> {
        let details = CeremonyDetails::new(context.number_of_guardians, context.quorum)?;
        if tally.manifest_hash != context.manifest_hash {
            return Err(ElectionError::invalid_parameters(
                "tally was accumulated for a different manifest",
            ));
        }
        let public_keys: BTreeMap<_, _> = public_keys.into_iter().map(|k| (k.owner, k)).collect();
        if public_keys.len() as u64 != details.number_of_guardians()
            || public_keys.keys().any(|i| !details.contains(*i))
        {
            return Err(ElectionError::invalid_parameters(format!(
                "expected one public key for each of {} guardians",
                details.number_of_guardians()
            )));
        }
        Ok(Self {
            context,
            tally,
            details,
            public_keys,
            shares: BTreeMap::new(),
            compensated: BTreeMap::new(),
            faults: Vec::new(),
        })
    }

    /// Decrypts a single spoiled ballot. The ballot is validated and wrapped in a one-ballot
    /// tally, so guardians answer it with the same direct and compensated shares they use for
    /// the election tally.
    pub fn for_ballot(
        context: ElectionContext,
        manifest: &Manifest,
        ballot: &EncryptedBallot,
        public_keys: Vec<ElectionPublicKey>,
    ) -> ElectionResult<Self> {
        ballot.validate(manifest, &context)?;
        let tally = EncryptedTally::from_ballot(manifest, ballot)?;
        Self::new(context, tally, public_keys)
    }

    pub fn tally(&self) -> &EncryptedTally {
        &self.tally
    }

    pub fn faults(&self) -> &[FaultReport] {
        &self.faults
    }

    pub fn available_guardians(&self) -> Vec<GuardianIndex> {
        self.shares.keys().copied().collect()
    }

    /// Guardians without an accepted direct share.
    pub fn missing_guardians(&self) -> Vec<GuardianIndex> {
        self.details
            .guardian_indices()
            .filter(|i| !self.shares.contains_key(i))
            .collect()
    }

    fn key(&self, index: GuardianIndex) -> ElectionResult<&ElectionPublicKey> {
        self.public_keys
            .get(&index)
            .ok_or_else(|| ElectionError::NotFound {
                kind: "guardian key",
                id: index.to_string(),
            })
    }

    fn record(&mut self, error: ElectionError) -> ElectionError {
        if let Some(fault) = error.fault() {
            warn!(%fault, "rejected decryption contribution");
            self.faults.push(fault);
        }
        error
    }

    pub fn submit(&mut self, contribution: DecryptionContribution) -> ElectionResult<()> {
        match contribution {
            DecryptionContribution::Direct(share) => self.submit_share(share),
            DecryptionContribution::Compensated(share) => self.submit_compensated(share),
        }
    }

    fn submit_share(&mut self, share: DecryptionShare) -> ElectionResult<()> {
        let key = self.key(share.guardian)?;
        if let Err(e) = share.verify(&self.tally, &self.context, key) {
            return Err(self.record(e));
        }
        if let Some(existing) = self.shares.get(&share.guardian) {
            if existing == &share {
                return Ok(());
            }
            return Err(ElectionError::invalid_state(
                ProtocolStep::Decryption,
                format!("guardian {} already submitted a share", share.guardian),
            ));
        }
        info!(guardian = share.guardian, "decryption share accepted");
        self.shares.insert(share.guardian, share);
        Ok(())
    }

    fn submit_compensated(&mut self, share: CompensatedShare) -> ElectionResult<()> {
        self.key(share.present)?;
        let missing_key = self.key(share.missing)?;
        if let Err(e) = share.verify(&self.tally, &self.context, missing_key) {
            return Err(self.record(e));
        }
        let slot = self.compensated.entry(share.missing).or_default();
        if let Some(existing) = slot.get(&share.present) {
            if existing == &share {
                return Ok(());
            }
            return Err(ElectionError::invalid_state(
                ProtocolStep::CompensatedDecryption,
                format!(
                    "guardian {} already compensated for guardian {}",
                    share.present, share.missing
                ),
            ));
        }
        info!(
            guardian = share.present,
            missing = share.missing,
            "compensated share accepted"
        );
        slot.insert(share.present, share);
        Ok(())
    }

    /// For each missing guardian, the compensations from guardians that are themselves present.
    fn usable_compensations(
        &self,
        missing: &[GuardianIndex],
    ) -> ElectionResult<Vec<(GuardianIndex, Vec<(&CompensatedShare, ElementModQ)>)>> {
        let quorum = self.details.quorum();
        missing
            .iter()
            .map(|&m| {
                let parts: Vec<&CompensatedShare> = self
                    .compensated
                    .get(&m)
                    .map(|by_present| {
                        by_present
                            .values()
                            .filter(|s| self.shares.contains_key(&s.present))
                            .collect()
                    })
                    .unwrap_or_default();
                if (parts.len() as u64) < quorum {
                    return Err(ElectionError::QuorumNotMet {
                        required: quorum,
                        available: parts.len() as u64,
                        missing: vec![m],
                    });
                }
                let indices: Vec<_> = parts.iter().map(|s| s.present).collect();
                let coefficients = lagrange_coefficients(&indices)?;
                Ok((
                    m,
                    parts
                        .into_iter()
                        .zip(coefficients)
                        .map(|(share, (_, w))| (share, w))
                        .collect(),
                ))
            })
            .collect()
    }

    fn combine_selection(
        &self,
        contest: &str,
        selection: &CiphertextTallySelection,
        compensations: &[(GuardianIndex, Vec<(&CompensatedShare, ElementModQ)>)],
        dlog: &DiscreteLog,
    ) -> ElectionResult<PlaintextTallySelection> {
        let absent = |what: &str| ElectionError::DecryptionFailed {
            contest: contest.to_string(),
            selection: selection.object_id.clone(),
            reason: format!("{} share missing", what),
        };

        let mut records = Vec::with_capacity(self.public_keys.len());
        for share in self.shares.values() {
            let entry = share
                .selection(contest, &selection.object_id)
                .ok_or_else(|| absent("direct"))?;
            records.push(ShareRecord::Direct {
                guardian: share.guardian,
                share: entry.share.clone(),
                proof: entry.proof.clone(),
            });
        }
        for (missing, parts) in compensations {
            let parts = parts
                .iter()
                .map(|(share, w)| {
                    let entry = share
                        .selection(contest, &selection.object_id)
                        .ok_or_else(|| absent("compensated"))?;
                    Ok(CompensatedPart {
                        present: share.present,
                        share: entry.share.clone(),
                        proof: entry.proof.clone(),
                        recovery_public_key: share.recovery_public_key.clone(),
                        lagrange_coefficient: w.clone(),
                    })
                })
                .collect::<ElectionResult<Vec<_>>>()?;
            records.push(ShareRecord::Reconstructed {
                missing: *missing,
                share: reconstruct(&parts),
                parts,
            });
        }
        records.sort_by_key(ShareRecord::guardian);

        let product = ElementModP::product(records.iter().map(ShareRecord::share));
        let value = selection.ciphertext.decrypt_known_product(&product)?;
        let tally = dlog
            .find(&value)
            .ok_or_else(|| ElectionError::DecryptionFailed {
                contest: contest.to_string(),
                selection: selection.object_id.clone(),
                reason: format!("count exceeds discrete log bound {}", dlog.bound()),
            })?;
        Ok(PlaintextTallySelection {
            object_id: selection.object_id.clone(),
            tally,
            value,
            message: selection.ciphertext.clone(),
            shares: records,
        })
    }

    /// Combines accepted shares into the plaintext tally.
    ///
    /// Needs direct shares from at least `K` guardians and, for every missing guardian,
    /// compensations from at least `K` of the present ones. Lagrange coefficients are taken
    /// over the guardians that actually compensated.
    pub fn combine(&self, dlog: &DiscreteLog) -> ElectionResult<PlaintextTally> {
        let quorum = self.details.quorum();
        let missing = self.missing_guardians();
        if (self.shares.len() as u64) < quorum {
            return Err(ElectionError::QuorumNotMet {
                required: quorum,
                available: self.shares.len() as u64,
                missing,
            });
        }
        let compensations = self.usable_compensations(&missing)?;

        let work: Vec<_> = self.tally.selections().collect();
        let decrypted = work
            .par_iter()
            .map(|(contest, selection)| {
                self.combine_selection(contest, selection, &compensations, dlog)
                    .map(|s| (*contest, s))
            })
            .collect::<ElectionResult<Vec<_>>>()?;

        let mut contests: BTreeMap<String, PlaintextTallyContest> = BTreeMap::new();
        for (contest, selection) in decrypted {
            contests
                .entry(contest.to_string())
                .or_insert_with(|| PlaintextTallyContest {
                    object_id: contest.to_string(),
                    selections: BTreeMap::new(),
                })
                .selections
                .insert(selection.object_id.clone(), selection);
        }
        info!(
            present = self.shares.len(),
            compensated = missing.len(),
            "tally decrypted"
        );
        Ok(PlaintextTally {
            manifest_hash: self.tally.manifest_hash.clone(),
            cast_ballot_count: self.tally.cast_ballot_count(),
            contests,
        })
    }
}
