// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeMap;

use anyhow::Result;
use eg_election::{
    encrypt_ballot, ContestDescription, ElectionContext, EncryptedBallot, Manifest,
    PlaintextBallot, PlaintextBallotContest, PlaintextBallotSelection, SelectionDescription,
};
use eg_group::ElementModQ;
use rand::seq::SliceRandom;
use rand::{CryptoRng, Rng, RngCore};

fn contest(id: &str, order: u64, votes_allowed: u64, selections: &[&str]) -> ContestDescription {
    ContestDescription {
        object_id: id.to_string(),
        sequence_order: order,
        votes_allowed,
        selections: selections
            .iter()
            .enumerate()
            .map(|(i, s)| SelectionDescription::new(*s, i as u64))
            .collect(),
    }
}

/// A referendum (one vote) and a council race (two votes out of four).
pub fn sample_manifest() -> Manifest {
    Manifest {
        election_scope_id: "sample-election".to_string(),
        contests: vec![
            contest("referendum", 0, 1, &["yes", "no"]),
            contest("council", 1, 2, &["ada", "grace", "edsger", "barbara"]),
        ],
    }
}

pub fn plaintext_ballot(id: &str, choices: &[(&str, &[&str])]) -> PlaintextBallot {
    PlaintextBallot {
        object_id: id.to_string(),
        contests: choices
            .iter()
            .map(|(contest, selections)| PlaintextBallotContest {
                object_id: contest.to_string(),
                selections: selections
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

/// Ballots with a random number of votes, up to the limit, in every contest.
pub fn random_ballots<R: Rng>(
    manifest: &Manifest,
    count: usize,
    rng: &mut R,
) -> Vec<PlaintextBallot> {
    (0..count)
        .map(|i| PlaintextBallot {
            object_id: format!("ballot-{}", i),
            contests: manifest
                .contests
                .iter()
                .map(|contest| {
                    let votes = rng.gen_range(0..=contest.votes_allowed) as usize;
                    PlaintextBallotContest {
                        object_id: contest.object_id.clone(),
                        selections: contest
                            .selections
                            .choose_multiple(rng, votes)
                            .map(|s| PlaintextBallotSelection {
                                object_id: s.object_id.clone(),
                                vote: 1,
                            })
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect()
}

/// Plaintext counts by contest then selection, with zeros for selections nobody chose.
pub fn expected_tally(
    manifest: &Manifest,
    ballots: &[PlaintextBallot],
) -> BTreeMap<String, BTreeMap<String, u64>> {
    let mut tally: BTreeMap<String, BTreeMap<String, u64>> = manifest
        .contests
        .iter()
        .map(|c| {
            let selections = c
                .selections
                .iter()
                .map(|s| (s.object_id.clone(), 0))
                .collect();
            (c.object_id.clone(), selections)
        })
        .collect();
    for ballot in ballots {
        for contest in &ballot.contests {
            for selection in &contest.selections {
                if let Some(count) = tally
                    .get_mut(&contest.object_id)
                    .and_then(|c| c.get_mut(&selection.object_id))
                {
                    *count += selection.vote;
                }
            }
        }
    }
    tally
}

pub fn encrypt_ballots<R: RngCore + CryptoRng>(
    ballots: &[PlaintextBallot],
    manifest: &Manifest,
    context: &ElectionContext,
    rng: &mut R,
) -> Result<Vec<EncryptedBallot>> {
    ballots
        .iter()
        .map(|ballot| {
            let master_nonce = ElementModQ::random(rng);
            Ok(encrypt_ballot(ballot, manifest, context, &master_nonce)?)
        })
        .collect()
}
