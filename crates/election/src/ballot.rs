// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Ballot encryption and validation.
//!
//! Each selection is an ElGamal encryption of 0 or 1 with a disjunctive proof. Each contest
//! carries `votes_allowed` placeholder selections so the sum over real and placeholder
//! selections is exactly `votes_allowed`, which the contest's constant proof shows.
//! All nonces derive from one master nonce per ballot, so encryption is reproducible from
//! `(ballot, manifest, context, master_nonce)`.

use std::collections::{BTreeMap, HashSet};

use eg_group::{
    elgamal_encrypt, hash_elems, ElGamalCiphertext, ElementModP, ElementModQ, Nonces,
};
use eg_proofs::{ConstantChaumPedersenProof, DisjunctiveChaumPedersenProof};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::context::ElectionContext;
use crate::errors::{ElectionError, ElectionResult, Party, ProtocolStep};
use crate::manifest::{ContestDescription, Manifest, SelectionDescription};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextBallotSelection {
    pub object_id: String,
    pub vote: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextBallotContest {
    pub object_id: String,
    pub selections: Vec<PlaintextBallotSelection>,
}

/// A voter's choices. Contests and selections left out count as no vote.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaintextBallot {
    pub object_id: String,
    pub contests: Vec<PlaintextBallotContest>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextBallotSelection {
    pub object_id: String,
    pub description_hash: ElementModQ,
    pub ciphertext: ElGamalCiphertext,
    pub is_placeholder: bool,
    pub proof: DisjunctiveChaumPedersenProof,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CiphertextBallotContest {
    pub object_id: String,
    pub description_hash: ElementModQ,
    /// Real selections in manifest order followed by the placeholders
    pub selections: Vec<CiphertextBallotSelection>,
    pub proof: ConstantChaumPedersenProof,
}

impl CiphertextBallotContest {
    pub fn aggregate(&self) -> ElGamalCiphertext {
        ElGamalCiphertext::add_all(self.selections.iter().map(|s| &s.ciphertext))
    }

    /// Real selections only.
    pub fn votes(&self) -> impl Iterator<Item = &CiphertextBallotSelection> {
        self.selections.iter().filter(|s| !s.is_placeholder)
    }
}

/// An encrypted ballot. Immutable once cast.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBallot {
    pub object_id: String,
    pub manifest_hash: ElementModQ,
    pub contests: Vec<CiphertextBallotContest>,
}

/// Encrypts one selection. Returns the selection and the ElGamal nonce it used.
/// A vote other than 0 or 1 is `MalformedBallot`, attributed to the selection id.
pub fn encrypt_selection(
    description: &SelectionDescription,
    vote: u64,
    public_key: &ElementModP,
    extended_base_hash: &ElementModQ,
    nonce_seed: &ElementModQ,
    is_placeholder: bool,
) -> ElectionResult<(CiphertextBallotSelection, ElementModQ)> {
    let description_hash = description.crypto_hash();
    let nonces = Nonces::new(nonce_seed, &description_hash);
    let nonce = nonces.get(0);
    let ciphertext = elgamal_encrypt(vote, &nonce, public_key)?;
    let proof = DisjunctiveChaumPedersenProof::make(
        &ciphertext,
        &nonce,
        public_key,
        extended_base_hash,
        &nonces.get(1),
        vote,
    )
    .map_err(|e| ElectionError::malformed(&description.object_id, e.to_string()))?;
    Ok((
        CiphertextBallotSelection {
            object_id: description.object_id.clone(),
            description_hash,
            ciphertext,
            is_placeholder,
            proof,
        },
        nonce,
    ))
}

fn contest_votes(
    ballot_id: &str,
    description: &ContestDescription,
    plaintext: Option<&PlaintextBallotContest>,
) -> ElectionResult<Vec<u64>> {
    let mut chosen: BTreeMap<&str, u64> = BTreeMap::new();
    if let Some(contest) = plaintext {
        for selection in &contest.selections {
            if description.selection(&selection.object_id).is_none() {
                return Err(ElectionError::malformed(
                    ballot_id,
                    format!(
                        "contest {} has no selection {}",
                        description.object_id, selection.object_id
                    ),
                ));
            }
            if selection.vote > 1 {
                return Err(ElectionError::malformed(
                    ballot_id,
                    format!(
                        "selection {} has vote {}, expected 0 or 1",
                        selection.object_id, selection.vote
                    ),
                ));
            }
            if chosen
                .insert(selection.object_id.as_str(), selection.vote)
                .is_some()
            {
                return Err(ElectionError::malformed(
                    ballot_id,
                    format!("selection {} appears twice", selection.object_id),
                ));
            }
        }
    }
    let votes: Vec<u64> = description
        .selections
        .iter()
        .map(|s| chosen.get(s.object_id.as_str()).copied().unwrap_or(0))
        .collect();
    let total: u64 = votes.iter().sum();
    if total > description.votes_allowed {
        return Err(ElectionError::malformed(
            ballot_id,
            format!(
                "contest {} has {} votes but allows {}",
                description.object_id, total, description.votes_allowed
            ),
        ));
    }
    Ok(votes)
}

/// Encrypts a contest, filling placeholders so the total is exactly `votes_allowed`.
/// An overvote is rejected before anything is encrypted.
pub fn encrypt_contest(
    ballot_id: &str,
    description: &ContestDescription,
    plaintext: Option<&PlaintextBallotContest>,
    public_key: &ElementModP,
    extended_base_hash: &ElementModQ,
    nonce_seed: &ElementModQ,
) -> ElectionResult<CiphertextBallotContest> {
    let votes = contest_votes(ballot_id, description, plaintext)?;
    let description_hash = description.crypto_hash();
    let contest_seed = hash_elems(&[nonce_seed, &description_hash]);

    let mut undervotes = description.votes_allowed - votes.iter().sum::<u64>();
    let placeholders: Vec<(SelectionDescription, u64)> = description
        .placeholders()
        .into_iter()
        .map(|p| {
            let vote = u64::from(undervotes > 0);
            undervotes = undervotes.saturating_sub(1);
            (p, vote)
        })
        .collect();

    let mut selections = Vec::with_capacity(votes.len() + placeholders.len());
    let mut aggregate_nonce = ElementModQ::zero();
    let real = description.selections.iter().cloned().zip(votes);
    for (is_placeholder, (selection, vote)) in real
        .map(|pair| (false, pair))
        .chain(placeholders.into_iter().map(|pair| (true, pair)))
    {
        let (encrypted, nonce) = encrypt_selection(
            &selection,
            vote,
            public_key,
            extended_base_hash,
            &contest_seed,
            is_placeholder,
        )?;
        aggregate_nonce = &aggregate_nonce + &nonce;
        selections.push(encrypted);
    }

    let aggregate = ElGamalCiphertext::add_all(selections.iter().map(|s| &s.ciphertext));
    let proof = ConstantChaumPedersenProof::make(
        &aggregate,
        &aggregate_nonce,
        public_key,
        &Nonces::new(&contest_seed, &"contest-proof").get(0),
        extended_base_hash,
        description.votes_allowed,
    );

    Ok(CiphertextBallotContest {
        object_id: description.object_id.clone(),
        description_hash,
        selections,
        proof,
    })
}

/// Encrypts every contest of the manifest for this ballot.
pub fn encrypt_ballot(
    ballot: &PlaintextBallot,
    manifest: &Manifest,
    context: &ElectionContext,
    master_nonce: &ElementModQ,
) -> ElectionResult<EncryptedBallot> {
    let mut by_id: BTreeMap<&str, &PlaintextBallotContest> = BTreeMap::new();
    for contest in &ballot.contests {
        if manifest.contest(&contest.object_id).is_none() {
            return Err(ElectionError::malformed(
                &ballot.object_id,
                format!("unknown contest {}", contest.object_id),
            ));
        }
        if by_id.insert(contest.object_id.as_str(), contest).is_some() {
            return Err(ElectionError::malformed(
                &ballot.object_id,
                format!("contest {} appears twice", contest.object_id),
            ));
        }
    }

    let nonce_seed = hash_elems(&[&context.manifest_hash, &ballot.object_id, master_nonce]);
    let contests = manifest
        .contests
        .iter()
        .map(|description| {
            encrypt_contest(
                &ballot.object_id,
                description,
                by_id.get(description.object_id.as_str()).copied(),
                &context.joint_public_key,
                &context.crypto_extended_base_hash,
                &nonce_seed,
            )
        })
        .collect::<ElectionResult<Vec<_>>>()?;

    debug!(ballot = %ballot.object_id, "ballot encrypted");
    Ok(EncryptedBallot {
        object_id: ballot.object_id.clone(),
        manifest_hash: context.manifest_hash.clone(),
        contests,
    })
}

impl EncryptedBallot {
    fn malformed(&self, reason: String) -> ElectionError {
        ElectionError::malformed(&self.object_id, reason)
    }

    /// Checks the ballot has exactly the manifest's contests and selections, in order, with the
    /// right number of placeholders and a contest proof for `votes_allowed`.
    pub fn validate_shape(&self, manifest: &Manifest) -> ElectionResult<()> {
        if self.manifest_hash != manifest.crypto_hash() {
            return Err(self.malformed("ballot was made for a different manifest".to_string()));
        }
        if self.contests.len() != manifest.contests.len() {
            return Err(self.malformed(format!(
                "expected {} contests, found {}",
                manifest.contests.len(),
                self.contests.len()
            )));
        }
        for (contest, description) in self.contests.iter().zip(&manifest.contests) {
            if contest.object_id != description.object_id
                || contest.description_hash != description.crypto_hash()
            {
                return Err(self.malformed(format!(
                    "contest {} does not match manifest contest {}",
                    contest.object_id, description.object_id
                )));
            }
            if contest.proof.constant != description.votes_allowed {
                return Err(self.malformed(format!(
                    "contest {} claims {} votes but allows {}",
                    contest.object_id, contest.proof.constant, description.votes_allowed
                )));
            }

            let expected: Vec<(SelectionDescription, bool)> = description
                .selections
                .iter()
                .cloned()
                .map(|s| (s, false))
                .chain(description.placeholders().into_iter().map(|s| (s, true)))
                .collect();
            if contest.selections.len() != expected.len() {
                return Err(self.malformed(format!(
                    "contest {} has {} selections, expected {}",
                    contest.object_id,
                    contest.selections.len(),
                    expected.len()
                )));
            }
            let mut seen = HashSet::new();
            for (selection, (expected_selection, is_placeholder)) in
                contest.selections.iter().zip(&expected)
            {
                if selection.object_id != expected_selection.object_id
                    || selection.is_placeholder != *is_placeholder
                    || selection.description_hash != expected_selection.crypto_hash()
                    || !seen.insert(selection.object_id.as_str())
                {
                    return Err(self.malformed(format!(
                        "contest {} selection {} does not match manifest",
                        contest.object_id, selection.object_id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Verifies every selection and contest proof against the election context.
    pub fn verify_proofs(&self, context: &ElectionContext) -> ElectionResult<()> {
        let fault = |reason: String| {
            ElectionError::proof_invalid(
                Party::Ballot(self.object_id.clone()),
                ProtocolStep::BallotSubmission,
                reason,
            )
        };
        let key = &context.joint_public_key;
        let hash = &context.crypto_extended_base_hash;
        for contest in &self.contests {
            for selection in &contest.selections {
                selection
                    .proof
                    .verify(&selection.ciphertext, key, hash)
                    .map_err(|e| {
                        fault(format!(
                            "contest {} selection {}: {}",
                            contest.object_id, selection.object_id, e
                        ))
                    })?;
            }
            contest
                .proof
                .verify(&contest.aggregate(), key, hash)
                .map_err(|e| fault(format!("contest {}: {}", contest.object_id, e)))?;
        }
        Ok(())
    }

    /// Shape first, then proofs: a ballot that does not fit the manifest is `MalformedBallot`,
    /// one whose proofs fail is `ProofInvalid`.
    ///
    /// Only a plaintext overvote is `MalformedBallot`, and [`encrypt_contest`] rejects it before
    /// encrypting. An encrypted contest whose selections really sum past `votes_allowed` still
    /// carries a constant proof claiming `votes_allowed`, so it fails as
    /// `ProofInvalid(Party::Ballot(..))`.
    pub fn validate(&self, manifest: &Manifest, context: &ElectionContext) -> ElectionResult<()> {
        if self.manifest_hash != context.manifest_hash {
            return Err(self.malformed("ballot was made for a different election".to_string()));
        }
        self.validate_shape(manifest)?;
        self.verify_proofs(context)
    }

    pub fn crypto_hash(&self) -> ElementModQ {
        let contest_hashes: Vec<ElementModQ> = self
            .contests
            .iter()
            .map(|c| {
                let ciphertexts: Vec<_> =
                    c.selections.iter().map(|s| s.ciphertext.clone()).collect();
                hash_elems(&[&c.object_id, &ciphertexts])
            })
            .collect();
        hash_elems(&[&self.object_id, &self.manifest_hash, &contest_hashes])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_ceremony::ElectionJointKey;
    use crate::types::CeremonyDetails;
    use eg_group::{DiscreteLog, ElGamalKeyPair};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn manifest() -> Manifest {
        Manifest {
            election_scope_id: "spring".to_string(),
            contests: vec![
                ContestDescription {
                    object_id: "mayor".to_string(),
                    sequence_order: 0,
                    votes_allowed: 1,
                    selections: vec![
                        SelectionDescription::new("alice", 0),
                        SelectionDescription::new("bob", 1),
                    ],
                },
                ContestDescription {
                    object_id: "council".to_string(),
                    sequence_order: 1,
                    votes_allowed: 2,
                    selections: vec![
                        SelectionDescription::new("carol", 0),
                        SelectionDescription::new("dave", 1),
                        SelectionDescription::new("erin", 2),
                    ],
                },
            ],
        }
    }

    fn setup(seed: u64) -> (ElGamalKeyPair, ElectionContext, ChaCha20Rng) {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let keypair = ElGamalKeyPair::random(&mut rng);
        let joint_key = ElectionJointKey {
            joint_public_key: keypair.public_key().clone(),
            commitment_hash: ElementModQ::random(&mut rng),
        };
        let details = CeremonyDetails::new(3, 2).unwrap();
        let context = ElectionContext::new(&details, &joint_key, &manifest()).unwrap();
        (keypair, context, rng)
    }

    fn vote(id: &str, contests: &[(&str, &[&str])]) -> PlaintextBallot {
        PlaintextBallot {
            object_id: id.to_string(),
            contests: contests
                .iter()
                .map(|(contest, chosen)| PlaintextBallotContest {
                    object_id: contest.to_string(),
                    selections: chosen
                        .iter()
                        .map(|s| PlaintextBallotSelection {
                            object_id: s.to_string(),
                            vote: 1,
                        })
                        .collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn encrypted_ballot_validates_and_decrypts() {
        let (keypair, context, mut rng) = setup(1);
        let manifest = manifest();
        let ballot = vote("b1", &[("mayor", &["bob"]), ("council", &["carol"])]);
        let encrypted =
            encrypt_ballot(&ballot, &manifest, &context, &ElementModQ::random(&mut rng)).unwrap();
        assert_eq!(encrypted.validate(&manifest, &context), Ok(()));

        let dlog = DiscreteLog::new(5);
        let decrypt = |contest: usize, selection: usize| {
            encrypted.contests[contest].selections[selection]
                .ciphertext
                .decrypt(keypair.secret_key(), &dlog)
                .unwrap()
        };
        assert_eq!(decrypt(0, 0), Some(0));
        assert_eq!(decrypt(0, 1), Some(1));
        assert_eq!(decrypt(1, 0), Some(1));
        // One undervote in council is absorbed by the first placeholder.
        assert_eq!(encrypted.contests[1].selections.len(), 5);
        assert_eq!(decrypt(1, 3), Some(1));
        assert_eq!(decrypt(1, 4), Some(0));
    }

    #[test]
    fn encryption_is_reproducible_from_master_nonce() {
        let (_, context, mut rng) = setup(2);
        let manifest = manifest();
        let ballot = vote("b2", &[("mayor", &["alice"])]);
        let nonce = ElementModQ::random(&mut rng);
        assert_eq!(
            encrypt_ballot(&ballot, &manifest, &context, &nonce).unwrap(),
            encrypt_ballot(&ballot, &manifest, &context, &nonce).unwrap()
        );
    }

    #[test]
    fn plaintext_overvote_is_malformed() {
        let (_, context, mut rng) = setup(3);
        let ballot = vote("over", &[("mayor", &["alice", "bob"])]);
        assert!(matches!(
            encrypt_ballot(&ballot, &manifest(), &context, &ElementModQ::random(&mut rng)),
            Err(ElectionError::MalformedBallot { ballot_id, .. }) if ballot_id == "over"
        ));
    }

    #[test]
    fn unknown_selection_is_malformed() {
        let (_, context, mut rng) = setup(4);
        let ballot = vote("typo", &[("mayor", &["mallory"])]);
        assert!(matches!(
            encrypt_ballot(&ballot, &manifest(), &context, &ElementModQ::random(&mut rng)),
            Err(ElectionError::MalformedBallot { .. })
        ));
    }

    #[test]
    fn missing_contest_is_malformed_and_tampering_is_proof_invalid() {
        let (_, context, mut rng) = setup(5);
        let manifest = manifest();
        let ballot = vote("b5", &[("mayor", &["alice"])]);
        let encrypted =
            encrypt_ballot(&ballot, &manifest, &context, &ElementModQ::random(&mut rng)).unwrap();

        let mut truncated = encrypted.clone();
        truncated.contests.pop();
        assert!(matches!(
            truncated.validate(&manifest, &context),
            Err(ElectionError::MalformedBallot { .. })
        ));

        let mut tampered = encrypted.clone();
        let selection = &mut tampered.contests[0].selections[0];
        selection.ciphertext.data = selection.ciphertext.data.mul(&ElementModP::generator());
        assert!(matches!(
            tampered.validate(&manifest, &context),
            Err(ElectionError::ProofInvalid(fault)) if fault.party == Party::Ballot("b5".to_string())
        ));
    }

    #[test]
    fn encrypted_overvote_fails_its_contest_proof() {
        let (_, context, mut rng) = setup(6);
        let manifest = manifest();
        let for_alice = encrypt_ballot(
            &vote("b6", &[("mayor", &["alice"])]),
            &manifest,
            &context,
            &ElementModQ::random(&mut rng),
        )
        .unwrap();
        let for_bob = encrypt_ballot(
            &vote("b6", &[("mayor", &["bob"])]),
            &manifest,
            &context,
            &ElementModQ::random(&mut rng),
        )
        .unwrap();

        // Both real selections now encrypt one; the shape still fits the manifest.
        let mut overvote = for_alice.clone();
        overvote.contests[0].selections[1] = for_bob.contests[0].selections[1].clone();
        assert_eq!(overvote.validate_shape(&manifest), Ok(()));
        assert!(matches!(
            overvote.validate(&manifest, &context),
            Err(ElectionError::ProofInvalid(fault)) if fault.party == Party::Ballot("b6".to_string())
        ));
    }
}
