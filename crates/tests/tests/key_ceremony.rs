// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::Result;
use eg_election::{
    compute_joint_key, BackupStatus, BackupVerification, CeremonyDetails, CeremonyState,
    ElectionError, Guardian, KeyCeremony, Party, ProtocolStep,
};
use eg_group::{ElementModP, ElementModQ};
use eg_test_helpers::{init_test_tracing, perform_full_ceremony, seeded_rng};
use rand::seq::SliceRandom;

#[test]
fn joint_key_is_the_product_of_guardian_keys() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(100);
    let fixture = perform_full_ceremony(4, 3, &mut rng)?;

    let product = ElementModP::product(fixture.public_keys.iter().map(|k| &k.key));
    assert_eq!(fixture.joint_key.joint_public_key, product);

    let mut shuffled = fixture.public_keys.clone();
    shuffled.shuffle(&mut rng);
    assert_eq!(compute_joint_key(&shuffled), product);
    Ok(())
}

#[test]
fn every_guardian_holds_a_verified_backup_from_every_other() -> Result<()> {
    let mut rng = seeded_rng(101);
    let fixture = perform_full_ceremony(3, 2, &mut rng)?;
    for guardian in &fixture.guardians {
        for sender in fixture.details.guardian_indices() {
            if sender != guardian.index() {
                assert!(guardian.has_verified_backup_from(sender));
            }
        }
    }
    Ok(())
}

#[test]
fn ceremony_rounds_cannot_be_skipped() -> Result<()> {
    let mut rng = seeded_rng(102);
    let details = CeremonyDetails::new(3, 2)?;
    let mut ceremony = KeyCeremony::new("skip", details);
    let guardian = ceremony.generate_key_pair(1, &mut rng)?;
    ceremony.announce(guardian.share_public_key())?;

    assert!(matches!(
        ceremony.publish_joint_key(),
        Err(ElectionError::InsufficientGuardians {
            step: ProtocolStep::JointKey,
            ..
        })
    ));
    assert_eq!(ceremony.state(), CeremonyState::Created);
    Ok(())
}

#[test]
fn disputed_backup_is_settled_by_a_public_challenge() -> Result<()> {
    let _guard = init_test_tracing();
    let mut rng = seeded_rng(103);
    let details = CeremonyDetails::new(3, 2)?;
    let mut ceremony = KeyCeremony::new("challenge", details);
    let mut guardians = details
        .guardian_indices()
        .map(|i| ceremony.generate_key_pair(i, &mut rng))
        .collect::<Result<Vec<Guardian>, _>>()?;
    for guardian in &guardians {
        ceremony.announce(guardian.share_public_key())?;
    }
    let keys = ceremony.public_keys();
    for guardian in &guardians {
        let backups = guardian.generate_backups(&keys, &mut rng)?;
        ceremony.receive_backups(guardian.index(), backups.into_values())?;
    }

    // Guardian 2 disputes the backup from guardian 1.
    let disputed = BackupVerification {
        sender: 1,
        recipient: 2,
        verified: false,
    };
    assert_eq!(
        ceremony.receive_verification(disputed)?,
        BackupStatus::Faulted
    );
    for guardian in guardians.iter_mut() {
        for backup in ceremony.backups_for(guardian.index()) {
            if (backup.sender, backup.recipient) == (1, 2) {
                continue;
            }
            let sender = &keys[(backup.sender - 1) as usize];
            let verification = guardian.verify_backup(&backup, sender);
            ceremony.receive_verification(verification)?;
        }
    }
    assert_eq!(ceremony.state(), CeremonyState::BackupsDistributed);

    // A wrong answer is blamed on the sender and leaves the pair faulted.
    let mut forged = guardians[0].answer_challenge(2)?;
    forged.value = &forged.value + &ElementModQ::one();
    assert!(matches!(
        ceremony.resolve_challenge(forged),
        Err(ElectionError::ProofInvalid(fault)) if fault.party == Party::Guardian(1)
    ));
    assert_eq!(ceremony.backup_status(1, 2), Some(BackupStatus::Faulted));

    let answer = guardians[0].answer_challenge(2)?;
    assert_eq!(
        ceremony.resolve_challenge(answer)?,
        BackupStatus::Verified
    );
    let published = ceremony
        .challenge_for(1, 2)
        .cloned()
        .expect("challenge recorded");
    assert!(guardians[1].accept_challenge(&published, &keys[0]).verified);
    assert!(guardians[1].has_verified_backup_from(1));

    assert_eq!(ceremony.state(), CeremonyState::BackupsVerified);
    ceremony.publish_joint_key()?;
    assert_eq!(ceremony.state(), CeremonyState::Complete);
    Ok(())
}
