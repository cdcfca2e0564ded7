// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Homomorphic accumulation of cast ballots into one ciphertext per selection.

use std::collections::{BTreeMap, BTreeSet};

use eg_group::{ElGamalCiphertext, ElementModQ};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::ballot::EncryptedBallot;
use crate::errors::{ElectionError, ElectionResult};
use crate::manifest::Manifest;

const BATCH_SIZE: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextTallySelection {
    pub object_id: String,
    pub description_hash: ElementModQ,
    pub ciphertext: ElGamalCiphertext,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextTallyContest {
    pub object_id: String,
    pub description_hash: ElementModQ,
    pub selections: BTreeMap<String, CiphertextTallySelection>,
}

/// Component-wise product of every cast ballot's real selections.
///
/// Placeholders are dropped. The result does not depend on the order ballots are folded in or
/// on how the ballot set is partitioned before merging.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedTally {
    pub manifest_hash: ElementModQ,
    pub contests: BTreeMap<String, CiphertextTallyContest>,
    pub cast_ballot_ids: BTreeSet<String>,
}

impl EncryptedTally {
    /// Every manifest selection starts at the encryption of zero with nonce zero.
    pub fn new(manifest: &Manifest) -> Self {
        let contests = manifest
            .contests
            .iter()
            .map(|contest| {
                let selections = contest
                    .selections
                    .iter()
                    .map(|s| {
                        (
                            s.object_id.clone(),
                            CiphertextTallySelection {
                                object_id: s.object_id.clone(),
                                description_hash: s.crypto_hash(),
                                ciphertext: ElGamalCiphertext::zero(),
                            },
                        )
                    })
                    .collect();
                (
                    contest.object_id.clone(),
                    CiphertextTallyContest {
                        object_id: contest.object_id.clone(),
                        description_hash: contest.crypto_hash(),
                        selections,
                    },
                )
            })
            .collect();
        Self {
            manifest_hash: manifest.crypto_hash(),
            contests,
            cast_ballot_ids: BTreeSet::new(),
        }
    }

    pub fn cast_ballot_count(&self) -> u64 {
        self.cast_ballot_ids.len() as u64
    }

    pub fn selection(&self, contest: &str, selection: &str) -> Option<&CiphertextTallySelection> {
        self.contests.get(contest)?.selections.get(selection)
    }

    /// Iterates `(contest, selection)` in a fixed order.
    pub fn selections(&self) -> impl Iterator<Item = (&str, &CiphertextTallySelection)> {
        self.contests.values().flat_map(|contest| {
            contest
                .selections
                .values()
                .map(move |s| (contest.object_id.as_str(), s))
        })
    }

    /// Adds one ballot. Proofs are not checked here, but the ballot must carry exactly the
    /// tally's contests and each contest exactly its real selections. A ballot that falls short
    /// is `MalformedBallot` and leaves the tally unchanged.
    pub fn fold(&mut self, ballot: &EncryptedBallot) -> ElectionResult<()> {
        if ballot.manifest_hash != self.manifest_hash {
            return Err(ElectionError::malformed(
                &ballot.object_id,
                "ballot was made for a different manifest",
            ));
        }
        if self.cast_ballot_ids.contains(&ballot.object_id) {
            return Err(ElectionError::malformed(
                &ballot.object_id,
                "ballot has already been counted",
            ));
        }
        let malformed = |reason: String| ElectionError::malformed(&ballot.object_id, reason);

        // Check everything before touching the accumulators so a bad ballot leaves no trace.
        let mut updates = Vec::new();
        let mut seen_contests = BTreeSet::new();
        for contest in &ballot.contests {
            let Some(tally_contest) = self.contests.get(&contest.object_id) else {
                return Err(malformed(format!("unknown contest {}", contest.object_id)));
            };
            if !seen_contests.insert(contest.object_id.as_str()) {
                return Err(malformed(format!("contest {} appears twice", contest.object_id)));
            }
            let mut seen_selections = BTreeSet::new();
            for selection in contest.votes() {
                if !tally_contest.selections.contains_key(&selection.object_id) {
                    return Err(malformed(format!(
                        "contest {} has no selection {}",
                        contest.object_id, selection.object_id
                    )));
                }
                if !seen_selections.insert(selection.object_id.as_str()) {
                    return Err(malformed(format!(
                        "selection {} appears twice in contest {}",
                        selection.object_id, contest.object_id
                    )));
                }
                updates.push((
                    contest.object_id.as_str(),
                    selection.object_id.as_str(),
                    &selection.ciphertext,
                ));
            }
            if let Some(missing) = tally_contest
                .selections
                .keys()
                .find(|id| !seen_selections.contains(id.as_str()))
            {
                return Err(malformed(format!(
                    "contest {} is missing selection {}",
                    contest.object_id, missing
                )));
            }
        }
        if let Some(missing) = self
            .contests
            .keys()
            .find(|id| !seen_contests.contains(id.as_str()))
        {
            return Err(malformed(format!("ballot is missing contest {}", missing)));
        }

        for (contest, selection, ciphertext) in updates {
            if let Some(entry) = self
                .contests
                .get_mut(contest)
                .and_then(|c| c.selections.get_mut(selection))
            {
                entry.ciphertext = entry.ciphertext.add(ciphertext);
            }
        }
        self.cast_ballot_ids.insert(ballot.object_id.clone());
        Ok(())
    }

    /// Combines two partial tallies over disjoint ballot sets.
    pub fn merge(&mut self, other: &EncryptedTally) -> ElectionResult<()> {
        if other.manifest_hash != self.manifest_hash {
            return Err(ElectionError::invalid_parameters(
                "cannot merge tallies for different manifests",
            ));
        }
        if let Some(id) = self.cast_ballot_ids.intersection(&other.cast_ballot_ids).next() {
            return Err(ElectionError::malformed(id, "ballot is counted in both tallies"));
        }
        for (contest_id, contest) in self.contests.iter_mut() {
            let Some(theirs) = other.contests.get(contest_id) else {
                continue;
            };
            for (selection_id, selection) in contest.selections.iter_mut() {
                if let Some(their_selection) = theirs.selections.get(selection_id) {
                    selection.ciphertext = selection.ciphertext.add(&their_selection.ciphertext);
                }
            }
        }
        self.cast_ballot_ids.extend(other.cast_ballot_ids.iter().cloned());
        Ok(())
    }

    /// Tallies a batch of already validated ballots in parallel. Each chunk is folded into its
    /// own partial tally and the partials are merged.
    pub fn accumulate(manifest: &Manifest, ballots: &[EncryptedBallot]) -> ElectionResult<Self> {
        let partials = ballots
            .par_chunks(BATCH_SIZE)
            .map(|chunk| {
                let mut partial = Self::new(manifest);
                for ballot in chunk {
                    partial.fold(ballot)?;
                }
                Ok(partial)
            })
            .collect::<ElectionResult<Vec<_>>>()?;

        let mut tally = Self::new(manifest);
        for partial in &partials {
            tally.merge(partial)?;
        }
        debug!(batches = partials.len(), "merged partial tallies");
        info!(ballots = tally.cast_ballot_count(), "ballots accumulated");
        Ok(tally)
    }

    /// A tally holding one ballot, so a spoiled ballot can be decrypted selection by selection.
    pub fn from_ballot(manifest: &Manifest, ballot: &EncryptedBallot) -> ElectionResult<Self> {
        let mut tally = Self::new(manifest);
        tally.fold(ballot)?;
        Ok(tally)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ballot::{
        encrypt_ballot, PlaintextBallot, PlaintextBallotContest, PlaintextBallotSelection,
    };
    use crate::context::ElectionContext;
    use crate::key_ceremony::ElectionJointKey;
    use crate::manifest::{ContestDescription, SelectionDescription};
    use crate::types::CeremonyDetails;
    use eg_group::{DiscreteLog, ElGamalKeyPair};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn manifest() -> Manifest {
        Manifest {
            election_scope_id: "tally".to_string(),
            contests: vec![ContestDescription {
                object_id: "measure".to_string(),
                sequence_order: 0,
                votes_allowed: 1,
                selections: vec![
                    SelectionDescription::new("yes", 0),
                    SelectionDescription::new("no", 1),
                ],
            }],
        }
    }

    struct Fixture {
        keypair: ElGamalKeyPair,
        manifest: Manifest,
        ballots: Vec<EncryptedBallot>,
    }

    fn fixture(seed: u64, choices: &[Option<&str>]) -> Fixture {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let keypair = ElGamalKeyPair::random(&mut rng);
        let manifest = manifest();
        let joint_key = ElectionJointKey {
            joint_public_key: keypair.public_key().clone(),
            commitment_hash: ElementModQ::random(&mut rng),
        };
        let details = CeremonyDetails::new(2, 2).unwrap();
        let context = ElectionContext::new(&details, &joint_key, &manifest).unwrap();
        let ballots = choices
            .iter()
            .enumerate()
            .map(|(i, choice)| {
                let ballot = PlaintextBallot {
                    object_id: format!("ballot-{}", i),
                    contests: vec![PlaintextBallotContest {
                        object_id: "measure".to_string(),
                        selections: choice
                            .iter()
                            .map(|s| PlaintextBallotSelection {
                                object_id: s.to_string(),
                                vote: 1,
                            })
                            .collect(),
                    }],
                };
                encrypt_ballot(&ballot, &manifest, &context, &ElementModQ::random(&mut rng))
                    .unwrap()
            })
            .collect();
        Fixture {
            keypair,
            manifest,
            ballots,
        }
    }

    fn counts(tally: &EncryptedTally, keypair: &ElGamalKeyPair) -> (u64, u64) {
        let dlog = DiscreteLog::new(16);
        let count = |s: &str| {
            tally
                .selection("measure", s)
                .unwrap()
                .ciphertext
                .decrypt(keypair.secret_key(), &dlog)
                .unwrap()
                .unwrap()
        };
        (count("yes"), count("no"))
    }

    #[test]
    fn empty_tally_decrypts_to_zero() {
        let f = fixture(1, &[]);
        let tally = EncryptedTally::new(&f.manifest);
        assert_eq!(tally.cast_ballot_count(), 0);
        assert_eq!(counts(&tally, &f.keypair), (0, 0));
    }

    #[test]
    fn folded_ballots_sum_per_selection() {
        let f = fixture(2, &[Some("yes"), Some("no"), Some("yes"), None]);
        let mut tally = EncryptedTally::new(&f.manifest);
        for ballot in &f.ballots {
            tally.fold(ballot).unwrap();
        }
        assert_eq!(tally.cast_ballot_count(), 4);
        assert_eq!(counts(&tally, &f.keypair), (2, 1));
        // Placeholders never enter the tally.
        assert_eq!(tally.contests["measure"].selections.len(), 2);
    }

    #[test]
    fn duplicate_ballot_is_rejected_without_side_effects() {
        let f = fixture(3, &[Some("yes")]);
        let mut tally = EncryptedTally::new(&f.manifest);
        tally.fold(&f.ballots[0]).unwrap();
        let before = tally.clone();
        assert!(matches!(
            tally.fold(&f.ballots[0]),
            Err(ElectionError::MalformedBallot { .. })
        ));
        assert_eq!(tally, before);
    }

    #[test]
    fn ballot_without_contests_is_rejected() {
        let f = fixture(6, &[Some("yes")]);
        let mut tally = EncryptedTally::new(&f.manifest);
        let mut ballot = f.ballots[0].clone();
        ballot.contests.clear();
        assert!(matches!(
            tally.fold(&ballot),
            Err(ElectionError::MalformedBallot { .. })
        ));
        assert_eq!(tally.cast_ballot_count(), 0);
        assert_eq!(tally, EncryptedTally::new(&f.manifest));
    }

    #[test]
    fn ballot_missing_a_selection_is_rejected() {
        let f = fixture(7, &[Some("no")]);
        let mut tally = EncryptedTally::new(&f.manifest);
        let mut ballot = f.ballots[0].clone();
        ballot.contests[0]
            .selections
            .retain(|s| s.is_placeholder || s.object_id != "yes");
        let err = tally.fold(&ballot).unwrap_err();
        assert!(matches!(err, ElectionError::MalformedBallot { .. }));
        assert!(err.to_string().contains("missing selection yes"));
        assert_eq!(tally.cast_ballot_count(), 0);
    }

    #[test]
    fn repeated_selection_is_rejected() {
        let f = fixture(8, &[Some("yes")]);
        let mut tally = EncryptedTally::new(&f.manifest);
        let mut ballot = f.ballots[0].clone();
        let yes = ballot.contests[0].selections[0].clone();
        ballot.contests[0].selections[1] = yes;
        assert!(matches!(
            tally.fold(&ballot),
            Err(ElectionError::MalformedBallot { .. })
        ));
        assert_eq!(tally.cast_ballot_count(), 0);
    }

    #[test]
    fn single_ballot_tally_holds_its_choices() {
        let f = fixture(9, &[Some("no")]);
        let tally = EncryptedTally::from_ballot(&f.manifest, &f.ballots[0]).unwrap();
        assert_eq!(tally.cast_ballot_count(), 1);
        assert_eq!(counts(&tally, &f.keypair), (0, 1));
    }

    #[test]
    fn overlapping_partials_do_not_merge() {
        let f = fixture(4, &[Some("yes"), Some("no")]);
        let mut left = EncryptedTally::new(&f.manifest);
        left.fold(&f.ballots[0]).unwrap();
        let mut right = EncryptedTally::new(&f.manifest);
        right.fold(&f.ballots[0]).unwrap();
        right.fold(&f.ballots[1]).unwrap();
        assert!(left.merge(&right).is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn tally_is_independent_of_order_and_partition(
            order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
            split in 0..=6usize,
        ) {
            let f = fixture(
                5,
                &[Some("yes"), Some("no"), Some("yes"), None, Some("yes"), Some("no")],
            );
            let sequential = {
                let mut tally = EncryptedTally::new(&f.manifest);
                for ballot in &f.ballots {
                    tally.fold(ballot).unwrap();
                }
                tally
            };

            let shuffled: Vec<_> = order.iter().map(|&i| f.ballots[i].clone()).collect();
            let mut left = EncryptedTally::new(&f.manifest);
            for ballot in &shuffled[..split] {
                left.fold(ballot).unwrap();
            }
            let mut right = EncryptedTally::new(&f.manifest);
            for ballot in &shuffled[split..] {
                right.fold(ballot).unwrap();
            }
            left.merge(&right).unwrap();

            prop_assert_eq!(&left, &sequential);
            prop_assert_eq!(
                EncryptedTally::accumulate(&f.manifest, &shuffled).unwrap(),
                sequential
            );
        }
    }
}
