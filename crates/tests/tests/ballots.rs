// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use eg_election::{encrypt_ballot, ElectionError, EncryptedTally, Party, ProtocolStep};
use eg_group::{elgamal_encrypt, ElementModQ};
use eg_test_helpers::{
    encrypt_ballots, perform_full_ceremony, plaintext_ballot, random_ballots, sample_manifest,
    seeded_rng,
};
use proptest::prelude::*;
use rand::seq::SliceRandom;

#[test]
fn encrypted_ballots_validate() -> Result<()> {
    let mut rng = seeded_rng(300);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = random_ballots(&manifest, 3, &mut rng);
    for ballot in encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)? {
        ballot.validate(&manifest, &context)?;
    }
    Ok(())
}

#[test]
fn overvote_is_malformed() -> Result<()> {
    let mut rng = seeded_rng(301);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let overvote = plaintext_ballot("greedy", &[("council", &["ada", "grace", "edsger"])]);
    assert!(matches!(
        encrypt_ballot(&overvote, &manifest, &context, &ElementModQ::random(&mut rng)),
        Err(ElectionError::MalformedBallot { ballot_id, .. }) if ballot_id == "greedy"
    ));
    Ok(())
}

#[test]
fn substituted_ciphertext_fails_its_proof() -> Result<()> {
    let mut rng = seeded_rng(302);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = vec![plaintext_ballot("b", &[("referendum", &["no"])])];
    let mut ballot = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?.remove(0);

    // Swap in a fresh encryption of one vote for "yes" while keeping the old proof.
    let nonce = ElementModQ::random_nonzero(&mut rng);
    ballot.contests[0].selections[0].ciphertext =
        elgamal_encrypt(1, &nonce, &context.joint_public_key)?;

    ballot.validate_shape(&manifest)?;
    assert!(matches!(
        ballot.validate(&manifest, &context),
        Err(ElectionError::ProofInvalid(fault))
            if fault.party == Party::Ballot("b".to_string())
                && fault.step == ProtocolStep::BallotSubmission
    ));
    Ok(())
}

#[test]
fn dropping_a_placeholder_is_malformed() -> Result<()> {
    let mut rng = seeded_rng(303);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = vec![plaintext_ballot("c", &[("council", &["edsger"])])];
    let mut ballot = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?.remove(0);
    ballot.contests[1].selections.pop();
    assert!(matches!(
        ballot.validate(&manifest, &context),
        Err(ElectionError::MalformedBallot { .. })
    ));
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(4))]

    #[test]
    fn tally_does_not_depend_on_order_or_partition(seed in any::<u64>(), split in 0usize..=5) {
        let mut rng = seeded_rng(seed);
        let fixture = perform_full_ceremony(3, 2, &mut rng).unwrap();
        let manifest = sample_manifest();
        let context = fixture.context(&manifest).unwrap();
        let plaintexts = random_ballots(&manifest, 5, &mut rng);
        let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng).unwrap();

        let whole = EncryptedTally::accumulate(&manifest, &ballots).unwrap();
        let mut shuffled = ballots.clone();
        shuffled.shuffle(&mut rng);
        let (left, right) = shuffled.split_at(split);
        let mut merged = EncryptedTally::accumulate(&manifest, left).unwrap();
        merged.merge(&EncryptedTally::accumulate(&manifest, right).unwrap()).unwrap();
        prop_assert_eq!(whole, merged);
    }
}
