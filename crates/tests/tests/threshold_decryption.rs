// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use eg_election::{
    compensated_decrypt, partial_decrypt, DecryptionContribution, DecryptionMediator,
    ElectionError, EncryptedTally, GuardianIndex, Party, ProtocolStep,
};
use eg_group::{DiscreteLog, ElementModP};
use eg_test_helpers::{
    decrypt_with_guardians, encrypt_ballots, expected_tally, init_test_tracing,
    perform_full_ceremony, random_ballots, sample_manifest, seeded_rng,
};

fn subsets(n: u64, k: usize) -> Vec<Vec<GuardianIndex>> {
    let mut out = Vec::new();
    let mut current = Vec::new();
    fn walk(
        start: u64,
        n: u64,
        k: usize,
        current: &mut Vec<GuardianIndex>,
        out: &mut Vec<Vec<GuardianIndex>>,
    ) {
        if current.len() == k {
            out.push(current.clone());
            return;
        }
        for i in start..=n {
            current.push(i);
            walk(i + 1, n, k, current, out);
            current.pop();
        }
    }
    walk(1, n, k, &mut current, &mut out);
    out
}

#[test]
fn every_quorum_subset_recovers_the_same_tally() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(200);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = random_ballots(&manifest, 4, &mut rng);
    let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;
    let tally = EncryptedTally::accumulate(&manifest, &ballots)?;
    let expected = expected_tally(&manifest, &plaintexts);

    let mut values: Option<Vec<ElementModP>> = None;
    for present in subsets(3, 2).into_iter().chain([vec![1, 2, 3]]) {
        let result = decrypt_with_guardians(&fixture, &context, &tally, &present, &mut rng)?;
        assert_eq!(result.counts(), expected, "guardians {:?}", present);
        result.verify(&context, &fixture.public_keys, &tally)?;

        let these: Vec<ElementModP> = result
            .contests
            .values()
            .flat_map(|c| c.selections.values().map(|s| s.value.clone()))
            .collect();
        match &values {
            Some(first) => assert_eq!(first, &these),
            None => values = Some(these),
        }
    }
    Ok(())
}

#[test]
fn two_missing_of_five_matches_all_online() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(201);
    let fixture = perform_full_ceremony(5, 3, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = random_ballots(&manifest, 3, &mut rng);
    let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;
    let tally = EncryptedTally::accumulate(&manifest, &ballots)?;

    let everyone =
        decrypt_with_guardians(&fixture, &context, &tally, &[1, 2, 3, 4, 5], &mut rng)?;
    // Guardians 2 and 5 are offline.
    let compensated =
        decrypt_with_guardians(&fixture, &context, &tally, &[1, 3, 4], &mut rng)?;
    assert_eq!(everyone.counts(), compensated.counts());
    assert_eq!(everyone.counts(), expected_tally(&manifest, &plaintexts));
    compensated.verify(&context, &fixture.public_keys, &tally)?;
    Ok(())
}

#[test]
fn fewer_than_quorum_cannot_decrypt() -> Result<()> {
    let mut rng = seeded_rng(202);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = random_ballots(&manifest, 2, &mut rng);
    let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;
    let tally = EncryptedTally::accumulate(&manifest, &ballots)?;

    let result = decrypt_with_guardians(&fixture, &context, &tally, &[2], &mut rng);
    let err = result.expect_err("one guardian is below quorum");
    assert!(matches!(
        err.downcast_ref::<ElectionError>(),
        Some(ElectionError::QuorumNotMet { required: 2, .. })
    ));
    Ok(())
}

#[test]
fn tampered_shares_are_rejected_and_attributed() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(203);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = random_ballots(&manifest, 2, &mut rng);
    let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;
    let tally = EncryptedTally::accumulate(&manifest, &ballots)?;
    let mut mediator =
        DecryptionMediator::new(context.clone(), tally.clone(), fixture.public_keys.clone())?;

    let guardian = fixture.guardian(1).expect("guardian 1");
    let honest = partial_decrypt(guardian, &tally, &context, &mut rng)?;
    let mut tampered = honest.clone();
    let share = tampered
        .contests
        .get_mut("referendum")
        .and_then(|c| c.get_mut("yes"))
        .expect("referendum share");
    share.share = share.share.mul(&ElementModP::generator());
    assert!(matches!(
        mediator.submit(DecryptionContribution::Direct(tampered)),
        Err(ElectionError::ProofInvalid(fault))
            if fault.party == Party::Guardian(1) && fault.step == ProtocolStep::Decryption
    ));
    mediator.submit(DecryptionContribution::Direct(honest))?;

    let present = fixture.guardian(2).expect("guardian 2");
    let missing_key = fixture.public_key(3).expect("guardian 3 key");
    let mut compensation = compensated_decrypt(present, missing_key, &tally, &context, &mut rng)?;
    compensation.recovery_public_key = compensation
        .recovery_public_key
        .mul(&ElementModP::generator());
    assert!(matches!(
        mediator.submit(DecryptionContribution::Compensated(compensation)),
        Err(ElectionError::ProofInvalid(fault))
            if fault.party == Party::Compensation { present: 2, missing: 3 }
    ));
    assert_eq!(mediator.faults().len(), 2);

    // The faults do not block an honest quorum.
    let share = partial_decrypt(present, &tally, &context, &mut rng)?;
    mediator.submit(DecryptionContribution::Direct(share))?;
    assert_eq!(mediator.missing_guardians(), vec![3]);
    for compensating in [guardian, present] {
        let share = compensated_decrypt(compensating, missing_key, &tally, &context, &mut rng)?;
        mediator.submit(DecryptionContribution::Compensated(share))?;
    }
    let result = mediator.combine(&DiscreteLog::new(tally.cast_ballot_count()))?;
    assert_eq!(result.counts(), expected_tally(&manifest, &plaintexts));
    Ok(())
}

#[test]
fn each_spoiled_ballot_decrypts_to_its_own_choices() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(204);
    let fixture = perform_full_ceremony(5, 3, &mut rng)?;
    let manifest = sample_manifest();
    let context = fixture.context(&manifest)?;
    let plaintexts = random_ballots(&manifest, 3, &mut rng);
    let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;

    // Guardians 1 and 4 are offline for every spoiled ballot.
    for (plaintext, ballot) in plaintexts.iter().zip(&ballots) {
        let spoiled = EncryptedTally::from_ballot(&manifest, ballot)?;
        let result = decrypt_with_guardians(&fixture, &context, &spoiled, &[2, 3, 5], &mut rng)?;
        assert_eq!(
            result.counts(),
            expected_tally(&manifest, std::slice::from_ref(plaintext)),
            "ballot {}",
            ballot.object_id
        );
        result.verify(&context, &fixture.public_keys, &spoiled)?;
    }

    // A spoiled ballot is checked like a cast one before anyone decrypts it.
    let mut forged = ballots[0].clone();
    forged.contests.truncate(1);
    assert!(matches!(
        DecryptionMediator::for_ballot(
            context.clone(),
            &manifest,
            &forged,
            fixture.public_keys.clone()
        ),
        Err(ElectionError::MalformedBallot { .. })
    ));
    Ok(())
}
