// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Public bookkeeping for one key ceremony.
//!
//! The ceremony only ever sees public keys, encrypted backups, verification results and
//! challenge answers. It advances `Created -> KeysGenerated -> BackupsDistributed ->
//! BackupsVerified -> Complete`; a failed backup only affects its own `(sender, recipient)` pair.

use std::collections::BTreeMap;

use eg_group::{hash_elems, ElementModP, ElementModQ};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::backup::{BackupChallenge, BackupVerification, EncryptedBackup};
use crate::errors::{ElectionError, ElectionResult, FaultReport, Party, ProtocolStep};
use crate::guardian::{ElectionPublicKey, Guardian};
use crate::types::{CeremonyDetails, GuardianIndex};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CeremonyState {
    Created,
    KeysGenerated,
    BackupsDistributed,
    BackupsVerified,
    Complete,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupStatus {
    Distributed,
    Verified,
    Faulted,
}

/// The output of a completed ceremony.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionJointKey {
    pub joint_public_key: ElementModP,
    /// Hash over every guardian's coefficient commitments in index order
    pub commitment_hash: ElementModQ,
}

/// Product of all guardian key shares. Independent of the order of `public_keys`.
pub fn compute_joint_key(public_keys: &[ElectionPublicKey]) -> ElementModP {
    ElementModP::product(public_keys.iter().map(|k| &k.key))
}

fn compute_commitment_hash(public_keys: &BTreeMap<GuardianIndex, ElectionPublicKey>) -> ElementModQ {
    let commitments: Vec<ElementModP> = public_keys
        .values()
        .flat_map(|k| k.coefficient_commitments.iter().cloned())
        .collect();
    hash_elems(&[&commitments])
}

type Pair = (GuardianIndex, GuardianIndex);

#[derive(Clone, Debug)]
struct BackupEntry {
    backup: EncryptedBackup,
    status: BackupStatus,
}

#[derive(Clone, Debug)]
pub struct KeyCeremony {
    id: String,
    details: CeremonyDetails,
    state: CeremonyState,
    public_keys: BTreeMap<GuardianIndex, ElectionPublicKey>,
    backups: BTreeMap<Pair, BackupEntry>,
    challenges: BTreeMap<Pair, BackupChallenge>,
    faults: Vec<FaultReport>,
    joint_key: Option<ElectionJointKey>,
}

impl KeyCeremony {
    pub fn new(id: impl Into<String>, details: CeremonyDetails) -> Self {
        let id = id.into();
        info!(
            ceremony = %id,
            guardians = details.number_of_guardians(),
            quorum = details.quorum(),
            "key ceremony created"
        );
        Self {
            id,
            details,
            state: CeremonyState::Created,
            public_keys: BTreeMap::new(),
            backups: BTreeMap::new(),
            challenges: BTreeMap::new(),
            faults: Vec::new(),
            joint_key: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn details(&self) -> &CeremonyDetails {
        &self.details
    }

    pub fn state(&self) -> CeremonyState {
        self.state
    }

    pub fn faults(&self) -> &[FaultReport] {
        &self.faults
    }

    pub fn public_keys(&self) -> Vec<ElectionPublicKey> {
        self.public_keys.values().cloned().collect()
    }

    pub fn public_key(&self, index: GuardianIndex) -> Option<&ElectionPublicKey> {
        self.public_keys.get(&index)
    }

    pub fn joint_key(&self) -> Option<&ElectionJointKey> {
        self.joint_key.as_ref()
    }

    pub fn backup_status(
        &self,
        sender: GuardianIndex,
        recipient: GuardianIndex,
    ) -> Option<BackupStatus> {
        self.backups.get(&(sender, recipient)).map(|e| e.status)
    }

    fn require(&self, step: ProtocolStep, allowed: &[CeremonyState]) -> ElectionResult<()> {
        if allowed.contains(&self.state) {
            return Ok(());
        }
        Err(ElectionError::invalid_state(
            step,
            format!("ceremony {} is {:?}", self.id, self.state),
        ))
    }

    fn log_fault(&mut self, fault: FaultReport) {
        warn!(ceremony = %self.id, fault = %fault, "fault recorded");
        self.faults.push(fault);
    }

    /// Logs the fault and returns it as the error for the rejected submission.
    fn record_fault(&mut self, fault: FaultReport) -> ElectionError {
        self.log_fault(fault.clone());
        ElectionError::ProofInvalid(fault)
    }

    /// Creates the guardian for `index`. Only possible while keys are still being collected.
    pub fn generate_key_pair<R: RngCore + CryptoRng + ?Sized>(
        &self,
        index: GuardianIndex,
        rng: &mut R,
    ) -> ElectionResult<Guardian> {
        self.require(ProtocolStep::KeyGeneration, &[CeremonyState::Created])?;
        if self.public_keys.contains_key(&index) {
            return Err(ElectionError::invalid_state(
                ProtocolStep::KeyGeneration,
                format!("guardian {} already announced a key", index),
            ));
        }
        Guardian::generate(index, self.details, rng)
    }

    /// Records a guardian's public key after checking every coefficient proof.
    pub fn announce(&mut self, public_key: ElectionPublicKey) -> ElectionResult<()> {
        self.require(ProtocolStep::KeyAnnouncement, &[CeremonyState::Created])?;
        if let Err(e) = public_key.verify(&self.details) {
            return Err(match e {
                ElectionError::ProofInvalid(fault) => self.record_fault(fault),
                other => other,
            });
        }
        match self.public_keys.get(&public_key.owner) {
            Some(existing) if existing == &public_key => return Ok(()),
            Some(_) => {
                return Err(ElectionError::invalid_state(
                    ProtocolStep::KeyAnnouncement,
                    format!("guardian {} already announced a key", public_key.owner),
                ))
            }
            None => {}
        }

        info!(ceremony = %self.id, guardian = public_key.owner, "guardian key announced");
        self.public_keys.insert(public_key.owner, public_key);
        if self.public_keys.len() as u64 == self.details.number_of_guardians() {
            self.state = CeremonyState::KeysGenerated;
            info!(ceremony = %self.id, "all guardian keys announced");
        }
        Ok(())
    }

    fn check_backup_shape(
        &self,
        sender: GuardianIndex,
        backup: &EncryptedBackup,
    ) -> Result<(), FaultReport> {
        let fault = |reason: String| {
            FaultReport::new(
                Party::Backup {
                    sender: backup.sender,
                    recipient: backup.recipient,
                },
                ProtocolStep::BackupDistribution,
                reason,
            )
        };
        if backup.sender != sender {
            return Err(fault(format!(
                "backup claims sender {} but was submitted by {}",
                backup.sender, sender
            )));
        }
        if !self.details.contains(backup.recipient) || backup.recipient == sender {
            return Err(fault(format!("invalid recipient {}", backup.recipient)));
        }
        if !backup.pad.is_valid_residue() {
            return Err(fault("pad is not a valid residue".to_string()));
        }
        Ok(())
    }

    /// Stores the backups one guardian generated for the others.
    pub fn receive_backups(
        &mut self,
        sender: GuardianIndex,
        backups: impl IntoIterator<Item = EncryptedBackup>,
    ) -> ElectionResult<()> {
        self.require(
            ProtocolStep::BackupDistribution,
            &[CeremonyState::KeysGenerated, CeremonyState::BackupsDistributed],
        )?;
        let backups: Vec<_> = backups.into_iter().collect();
        for backup in &backups {
            if let Err(fault) = self.check_backup_shape(sender, backup) {
                return Err(self.record_fault(fault));
            }
            if let Some(entry) = self.backups.get(&(backup.sender, backup.recipient)) {
                if entry.backup != *backup {
                    return Err(ElectionError::invalid_state(
                        ProtocolStep::BackupDistribution,
                        format!(
                            "backup from {} to {} already delivered",
                            backup.sender, backup.recipient
                        ),
                    ));
                }
            }
        }

        for backup in backups {
            let pair = (backup.sender, backup.recipient);
            if self.backups.contains_key(&pair) {
                continue;
            }
            self.backups.insert(
                pair,
                BackupEntry {
                    backup,
                    status: BackupStatus::Distributed,
                },
            );
        }

        let n = self.details.number_of_guardians();
        if self.backups.len() as u64 == n * (n - 1) {
            self.state = CeremonyState::BackupsDistributed;
            info!(ceremony = %self.id, "all backups distributed");
        }
        Ok(())
    }

    /// Backups addressed to `recipient`, ordered by sender.
    pub fn backups_for(&self, recipient: GuardianIndex) -> Vec<EncryptedBackup> {
        self.backups
            .iter()
            .filter(|((_, r), _)| *r == recipient)
            .map(|(_, entry)| entry.backup.clone())
            .collect()
    }

    /// The public challenge answer for a pair, if one resolved it.
    pub fn challenge_for(
        &self,
        sender: GuardianIndex,
        recipient: GuardianIndex,
    ) -> Option<&BackupChallenge> {
        self.challenges.get(&(sender, recipient))
    }

    fn all_verified(&self) -> bool {
        let n = self.details.number_of_guardians();
        self.backups.len() as u64 == n * (n - 1)
            && self
                .backups
                .values()
                .all(|entry| entry.status == BackupStatus::Verified)
    }

    fn refresh_verification_state(&mut self) {
        if self.all_verified() {
            self.state = CeremonyState::BackupsVerified;
            info!(ceremony = %self.id, "all backups verified");
        } else {
            self.state = CeremonyState::BackupsDistributed;
        }
    }

    /// Records a recipient's verdict on one backup. A failed verification marks the pair as
    /// faulted and waits for a reissued backup or a challenge answer.
    pub fn receive_verification(
        &mut self,
        verification: BackupVerification,
    ) -> ElectionResult<BackupStatus> {
        self.require(
            ProtocolStep::BackupVerification,
            &[
                CeremonyState::BackupsDistributed,
                CeremonyState::BackupsVerified,
            ],
        )?;
        let pair = (verification.sender, verification.recipient);
        let status = match self.backups.get(&pair) {
            Some(entry) => entry.status,
            None => {
                return Err(ElectionError::NotFound {
                    kind: "backup",
                    id: format!("{}->{}", pair.0, pair.1),
                })
            }
        };

        match (status, verification.verified) {
            (BackupStatus::Verified, true) => return Ok(BackupStatus::Verified),
            (BackupStatus::Verified, false) => {
                return Err(ElectionError::invalid_state(
                    ProtocolStep::BackupVerification,
                    format!("backup from {} to {} is already verified", pair.0, pair.1),
                ))
            }
            (BackupStatus::Faulted, _) => {
                return Err(ElectionError::invalid_state(
                    ProtocolStep::BackupVerification,
                    format!(
                        "backup from {} to {} awaits reissue or challenge",
                        pair.0, pair.1
                    ),
                ))
            }
            (BackupStatus::Distributed, _) => {}
        }

        let new_status = if verification.verified {
            BackupStatus::Verified
        } else {
            let fault = FaultReport::new(
                Party::Backup {
                    sender: pair.0,
                    recipient: pair.1,
                },
                ProtocolStep::BackupVerification,
                "recipient could not verify backup against sender commitments",
            );
            self.log_fault(fault);
            BackupStatus::Faulted
        };
        if let Some(entry) = self.backups.get_mut(&pair) {
            entry.status = new_status;
        }
        self.refresh_verification_state();
        Ok(new_status)
    }

    /// Replaces a faulted backup with a freshly generated one.
    pub fn reissue_backup(&mut self, backup: EncryptedBackup) -> ElectionResult<()> {
        self.require(
            ProtocolStep::BackupDistribution,
            &[CeremonyState::BackupsDistributed],
        )?;
        if let Err(fault) = self.check_backup_shape(backup.sender, &backup) {
            return Err(self.record_fault(fault));
        }
        let pair = (backup.sender, backup.recipient);
        match self.backups.get_mut(&pair) {
            Some(entry) if entry.status == BackupStatus::Faulted => {
                info!(
                    ceremony = %self.id,
                    sender = pair.0,
                    recipient = pair.1,
                    "backup reissued"
                );
                entry.backup = backup;
                entry.status = BackupStatus::Distributed;
                Ok(())
            }
            _ => Err(ElectionError::invalid_state(
                ProtocolStep::BackupDistribution,
                format!("backup from {} to {} is not faulted", pair.0, pair.1),
            )),
        }
    }

    /// Settles a faulted pair with the sender's public evaluation. A wrong answer keeps the
    /// pair faulted and is attributed to the sender.
    pub fn resolve_challenge(
        &mut self,
        challenge: BackupChallenge,
    ) -> ElectionResult<BackupStatus> {
        self.require(
            ProtocolStep::BackupChallenge,
            &[CeremonyState::BackupsDistributed],
        )?;
        let pair = (challenge.sender, challenge.recipient);
        if self.backup_status(pair.0, pair.1) != Some(BackupStatus::Faulted) {
            return Err(ElectionError::invalid_state(
                ProtocolStep::BackupChallenge,
                format!("backup from {} to {} is not faulted", pair.0, pair.1),
            ));
        }
        let commitments = match self.public_keys.get(&challenge.sender) {
            Some(key) => key.coefficient_commitments.clone(),
            None => {
                return Err(ElectionError::NotFound {
                    kind: "guardian key",
                    id: challenge.sender.to_string(),
                })
            }
        };

        if !challenge.verify(&commitments) {
            let fault = FaultReport::new(
                Party::Guardian(challenge.sender),
                ProtocolStep::BackupChallenge,
                format!(
                    "challenge answer for guardian {} does not match commitments",
                    challenge.recipient
                ),
            );
            return Err(self.record_fault(fault));
        }

        info!(
            ceremony = %self.id,
            sender = pair.0,
            recipient = pair.1,
            "backup challenge resolved"
        );
        if let Some(entry) = self.backups.get_mut(&pair) {
            entry.status = BackupStatus::Verified;
        }
        self.challenges.insert(pair, challenge);
        self.refresh_verification_state();
        Ok(BackupStatus::Verified)
    }

    /// Computes the joint key once every backup is verified. Idempotent once complete.
    pub fn publish_joint_key(&mut self) -> ElectionResult<ElectionJointKey> {
        if let (CeremonyState::Complete, Some(joint_key)) = (self.state, &self.joint_key) {
            return Ok(joint_key.clone());
        }
        let announced = self.public_keys.len() as u64;
        if announced < self.details.number_of_guardians() {
            return Err(ElectionError::InsufficientGuardians {
                step: ProtocolStep::JointKey,
                required: self.details.number_of_guardians(),
                available: announced,
            });
        }
        self.require(ProtocolStep::JointKey, &[CeremonyState::BackupsVerified])?;

        let keys = self.public_keys();
        let joint_key = ElectionJointKey {
            joint_public_key: compute_joint_key(&keys),
            commitment_hash: compute_commitment_hash(&self.public_keys),
        };
        self.joint_key = Some(joint_key.clone());
        self.state = CeremonyState::Complete;
        info!(ceremony = %self.id, joint_key = ?joint_key.joint_public_key, "key ceremony complete");
        Ok(joint_key)
    }
}
