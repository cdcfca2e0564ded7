// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{bail, Context, Result};
use eg_election::{
    CeremonyDetails, ElectionContext, ElectionJointKey, ElectionPublicKey, Guardian,
    GuardianIndex, KeyCeremony, Manifest,
};
use rand::{CryptoRng, RngCore};
use tracing::info;

/// Guardians holding verified backups from every other guardian, and the ceremony's output.
pub struct CeremonyFixture {
    pub details: CeremonyDetails,
    pub guardians: Vec<Guardian>,
    pub public_keys: Vec<ElectionPublicKey>,
    pub joint_key: ElectionJointKey,
}

impl CeremonyFixture {
    pub fn guardian(&self, index: GuardianIndex) -> Option<&Guardian> {
        self.guardians.iter().find(|g| g.index() == index)
    }

    pub fn public_key(&self, index: GuardianIndex) -> Option<&ElectionPublicKey> {
        self.public_keys.iter().find(|k| k.owner == index)
    }

    pub fn context(&self, manifest: &Manifest) -> Result<ElectionContext> {
        Ok(ElectionContext::new(&self.details, &self.joint_key, manifest)?)
    }
}

/// Runs every round of a key ceremony with honest in-process guardians.
pub fn perform_full_ceremony<R: RngCore + CryptoRng>(
    number_of_guardians: u64,
    quorum: u64,
    rng: &mut R,
) -> Result<CeremonyFixture> {
    let details = CeremonyDetails::new(number_of_guardians, quorum)?;
    let mut ceremony = KeyCeremony::new("fixture", details);

    let mut guardians = details
        .guardian_indices()
        .map(|i| ceremony.generate_key_pair(i, rng))
        .collect::<Result<Vec<_>, _>>()?;
    for guardian in &guardians {
        ceremony.announce(guardian.share_public_key())?;
    }

    let public_keys = ceremony.public_keys();
    for guardian in &guardians {
        let backups = guardian.generate_backups(&public_keys, rng)?;
        ceremony.receive_backups(guardian.index(), backups.into_values())?;
    }

    for guardian in guardians.iter_mut() {
        for backup in ceremony.backups_for(guardian.index()) {
            let sender = ceremony
                .public_key(backup.sender)
                .cloned()
                .context("backup from unannounced guardian")?;
            let verification = guardian.verify_backup(&backup, &sender);
            if !verification.verified {
                bail!(
                    "guardian {} rejected backup from {}",
                    guardian.index(),
                    backup.sender
                );
            }
            ceremony.receive_verification(verification)?;
        }
    }

    let joint_key = ceremony.publish_joint_key()?;
    info!(
        guardians = number_of_guardians,
        quorum, "fixture key ceremony complete"
    );
    Ok(CeremonyFixture {
        details,
        guardians,
        public_keys,
        joint_key,
    })
}
