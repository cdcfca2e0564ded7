// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::thread;

use anyhow::{Context, Result};
use eg_coordinator::{Coordinator, CoordinatorConfig, ElectionPhase};
use eg_election::{
    compensated_decrypt, partial_decrypt, CeremonyDetails, DecryptionContribution,
    ElectionError, Guardian,
};
use eg_test_helpers::{
    encrypt_ballots, expected_tally, init_test_tracing, random_ballots, sample_manifest,
    seeded_rng,
};
use rand_chacha::ChaCha20Rng;

fn ceremony(
    coordinator: &Coordinator,
    n: u64,
    k: u64,
    rng: &mut ChaCha20Rng,
) -> Result<(String, Vec<Guardian>)> {
    let id = coordinator.start_key_ceremony(n, k)?;
    let details = CeremonyDetails::new(n, k)?;
    let mut guardians = details
        .guardian_indices()
        .map(|i| Guardian::generate(i, details, rng))
        .collect::<Result<Vec<_>, _>>()?;
    for guardian in &guardians {
        coordinator.submit_guardian_key(&id, guardian.index(), guardian.share_public_key())?;
    }
    let keys = coordinator.guardian_public_keys(&id)?;
    for guardian in &guardians {
        let backups = guardian.generate_backups(&keys, rng)?;
        coordinator.submit_backups(&id, guardian.index(), backups.into_values().collect())?;
    }
    for guardian in guardians.iter_mut() {
        for backup in coordinator.backups_for(&id, guardian.index())? {
            let sender = keys
                .iter()
                .find(|k| k.owner == backup.sender)
                .context("sender key")?;
            let verification = guardian.verify_backup(&backup, sender);
            coordinator.submit_backup_verification(&id, verification)?;
        }
    }
    coordinator.finalize_joint_key(&id)?;
    Ok((id, guardians))
}

#[test]
fn concurrent_submissions_to_separate_elections() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(400);
    let coordinator = Coordinator::new(CoordinatorConfig {
        worker_threads: 4,
        ..CoordinatorConfig::default()
    })?;
    let (ceremony_id, guardians) = ceremony(&coordinator, 3, 2, &mut rng)?;
    let manifest = sample_manifest();

    // Two elections share the joint key. Each gets its own voters submitting from four threads.
    let mut elections = Vec::new();
    for _ in 0..2 {
        let election_id = coordinator.open_election(&ceremony_id, manifest.clone())?;
        let context = coordinator.election_context(&election_id)?;
        let plaintexts = random_ballots(&manifest, 8, &mut rng);
        let ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;
        elections.push((election_id, context, plaintexts, ballots));
    }

    thread::scope(|scope| {
        for (election_id, _, _, ballots) in &elections {
            for chunk in ballots.chunks(2) {
                let coordinator = &coordinator;
                scope.spawn(move || {
                    for ballot in chunk {
                        coordinator
                            .submit_encrypted_ballot(election_id, ballot.clone())
                            .unwrap();
                    }
                });
            }
        }
    });

    let keys = coordinator.guardian_public_keys(&ceremony_id)?;
    for (election_id, context, plaintexts, _) in &elections {
        let tally = coordinator.request_tally(election_id)?;
        assert_eq!(tally.cast_ballot_count(), 8);

        // Guardian 1 is offline for every decryption.
        for guardian in &guardians[1..] {
            let share = partial_decrypt(guardian, &tally, context, &mut rng)?;
            coordinator
                .submit_decryption_share(election_id, DecryptionContribution::Direct(share))?;
        }
        for guardian in &guardians[1..] {
            let share = compensated_decrypt(guardian, &keys[0], &tally, context, &mut rng)?;
            coordinator
                .submit_decryption_share(election_id, DecryptionContribution::Compensated(share))?;
        }
        let result = coordinator.finalize_result(election_id)?;
        assert_eq!(result.counts(), expected_tally(&manifest, plaintexts));
        assert_eq!(coordinator.election_phase(election_id)?, ElectionPhase::Published);
    }
    Ok(())
}

#[test]
fn batch_submission_reports_each_ballot() -> Result<()> {
    let mut rng = seeded_rng(401);
    let coordinator = Coordinator::new(CoordinatorConfig {
        worker_threads: 2,
        ..CoordinatorConfig::default()
    })?;
    let (ceremony_id, _) = ceremony(&coordinator, 3, 2, &mut rng)?;
    let manifest = sample_manifest();
    let election_id = coordinator.open_election(&ceremony_id, manifest.clone())?;
    let context = coordinator.election_context(&election_id)?;
    let plaintexts = random_ballots(&manifest, 3, &mut rng);
    let mut ballots = encrypt_ballots(&plaintexts, &manifest, &context, &mut rng)?;
    ballots[1].contests.swap(0, 1);

    let outcomes = coordinator.submit_encrypted_ballots(&election_id, ballots)?;
    assert!(outcomes[0].is_ok());
    assert!(matches!(
        outcomes[1],
        Err(ElectionError::MalformedBallot { .. })
    ));
    assert!(outcomes[2].is_ok());
    assert_eq!(coordinator.rejected_ballots(&election_id)?.len(), 1);
    assert_eq!(coordinator.request_tally(&election_id)?.cast_ballot_count(), 2);
    Ok(())
}
