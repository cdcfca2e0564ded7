// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::collections::BTreeMap;

use derivative::Derivative;
use eg_group::{ElGamalCiphertext, ElementModP, ElementModQ};
use eg_proofs::{ChaumPedersenProof, SchnorrProof};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backup::{BackupChallenge, BackupVerification, EncryptedBackup};
use crate::errors::{ElectionError, ElectionResult, Party, ProtocolStep};
use crate::polynomial::{compute_recovery_public_key, verify_polynomial_value, ElectionPolynomial};
use crate::types::{CeremonyDetails, GuardianIndex};

/// Everything a guardian publishes about its key share.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionPublicKey {
    pub owner: GuardianIndex,
    pub key: ElementModP,
    pub coefficient_commitments: Vec<ElementModP>,
    pub coefficient_proofs: Vec<SchnorrProof>,
}

impl ElectionPublicKey {
    /// Proof of knowledge of the key share itself.
    pub fn proof(&self) -> Option<&SchnorrProof> {
        self.coefficient_proofs.first()
    }

    /// `g^{P(index)}` for this guardian's polynomial.
    pub fn recovery_public_key_for(&self, index: GuardianIndex) -> ElementModP {
        compute_recovery_public_key(index, &self.coefficient_commitments)
    }

    pub fn verify(&self, details: &CeremonyDetails) -> ElectionResult<()> {
        let fault = |reason: String| {
            ElectionError::proof_invalid(
                Party::Guardian(self.owner),
                ProtocolStep::KeyAnnouncement,
                reason,
            )
        };

        if !details.contains(self.owner) {
            return Err(fault(format!("index {} outside the ceremony", self.owner)));
        }
        let quorum = details.quorum() as usize;
        if self.coefficient_commitments.len() != quorum || self.coefficient_proofs.len() != quorum
        {
            return Err(fault(format!(
                "expected {} commitments and proofs, got {} and {}",
                quorum,
                self.coefficient_commitments.len(),
                self.coefficient_proofs.len()
            )));
        }
        if self.coefficient_commitments.first() != Some(&self.key) {
            return Err(fault("key is not the constant term commitment".to_string()));
        }
        for (k, (commitment, proof)) in self
            .coefficient_commitments
            .iter()
            .zip(&self.coefficient_proofs)
            .enumerate()
        {
            if &proof.public_key != commitment {
                return Err(fault(format!("proof {} is for a different commitment", k)));
            }
            proof
                .verify()
                .map_err(|e| fault(format!("coefficient {}: {}", k, e)))?;
        }
        Ok(())
    }
}

/// A guardian and its private key material.
///
/// The secret polynomial and the backups received from other guardians stay inside this type.
/// Only public keys, encrypted backups, proofs and decryption shares leave it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Guardian {
    index: GuardianIndex,
    details: CeremonyDetails,
    #[derivative(Debug = "ignore")]
    polynomial: ElectionPolynomial,
    public_key: ElectionPublicKey,
    /// `P_sender(index)` for every sender whose backup this guardian verified
    #[derivative(Debug = "ignore")]
    backup_values: BTreeMap<GuardianIndex, ElementModQ>,
}

impl Guardian {
    pub fn generate<R: RngCore + CryptoRng + ?Sized>(
        index: GuardianIndex,
        details: CeremonyDetails,
        rng: &mut R,
    ) -> ElectionResult<Self> {
        details.ensure_guardian(index)?;
        let polynomial = ElectionPolynomial::generate(details.quorum(), rng)?;
        let coefficient_commitments = polynomial.commitments();
        let public_key = ElectionPublicKey {
            owner: index,
            key: coefficient_commitments[0].clone(),
            coefficient_commitments,
            coefficient_proofs: polynomial.proofs(),
        };
        info!(guardian = index, "generated election key pair");
        Ok(Self {
            index,
            details,
            polynomial,
            public_key,
            backup_values: BTreeMap::new(),
        })
    }

    pub fn index(&self) -> GuardianIndex {
        self.index
    }

    pub fn details(&self) -> &CeremonyDetails {
        &self.details
    }

    pub fn share_public_key(&self) -> ElectionPublicKey {
        self.public_key.clone()
    }

    /// Evaluates this guardian's polynomial at every other announced guardian and encrypts the
    /// value to that guardian.
    pub fn generate_backups<R: RngCore + CryptoRng + ?Sized>(
        &self,
        public_keys: &[ElectionPublicKey],
        rng: &mut R,
    ) -> ElectionResult<BTreeMap<GuardianIndex, EncryptedBackup>> {
        let mut registered: BTreeMap<GuardianIndex, &ElectionPublicKey> = BTreeMap::new();
        for key in public_keys {
            key.verify(&self.details)?;
            registered.insert(key.owner, key);
        }
        registered.insert(self.index, &self.public_key);

        if (registered.len() as u64) < self.details.quorum() {
            return Err(ElectionError::InsufficientGuardians {
                step: ProtocolStep::BackupDistribution,
                required: self.details.quorum(),
                available: registered.len() as u64,
            });
        }

        let mut backups = BTreeMap::new();
        for (&recipient, key) in registered.iter().filter(|(i, _)| **i != self.index) {
            let value = self.polynomial.evaluate(recipient);
            let backup = EncryptedBackup::seal(self.index, recipient, &value, &key.key, rng)?;
            backups.insert(recipient, backup);
        }
        debug!(
            guardian = self.index,
            count = backups.len(),
            "generated partial key backups"
        );
        Ok(backups)
    }

    /// Decrypts a backup addressed to this guardian and checks it against the sender's
    /// commitments. A bad backup yields `verified: false`; it is never an error.
    pub fn verify_backup(
        &mut self,
        backup: &EncryptedBackup,
        sender_public_key: &ElectionPublicKey,
    ) -> BackupVerification {
        let verified = self.check_backup(backup, sender_public_key);
        if verified {
            debug!(guardian = self.index, sender = backup.sender, "backup verified");
        } else {
            warn!(
                guardian = self.index,
                sender = backup.sender,
                "backup failed verification"
            );
        }
        BackupVerification {
            sender: backup.sender,
            recipient: backup.recipient,
            verified,
        }
    }

    fn check_backup(&mut self, backup: &EncryptedBackup, sender_public_key: &ElectionPublicKey) -> bool {
        if backup.recipient != self.index
            || backup.sender != sender_public_key.owner
            || backup.sender == self.index
        {
            return false;
        }
        let value = match backup.open(self.polynomial.secret()) {
            Ok(value) => value,
            Err(e) => {
                debug!(guardian = self.index, error = %e, "could not open backup");
                return false;
            }
        };
        if !verify_polynomial_value(&value, self.index, &sender_public_key.coefficient_commitments)
        {
            return false;
        }
        self.backup_values.insert(backup.sender, value);
        true
    }

    /// Publishes the evaluation for `recipient` in the clear to settle a disputed backup.
    pub fn answer_challenge(&self, recipient: GuardianIndex) -> ElectionResult<BackupChallenge> {
        self.details.ensure_guardian(recipient)?;
        if recipient == self.index {
            return Err(ElectionError::invalid_parameters(
                "a guardian does not back up to itself",
            ));
        }
        info!(
            guardian = self.index,
            recipient, "answering backup challenge"
        );
        Ok(BackupChallenge {
            sender: self.index,
            recipient,
            value: self.polynomial.evaluate(recipient),
        })
    }

    /// Adopts a publicly verified challenge answer as this guardian's backup from the sender.
    pub fn accept_challenge(
        &mut self,
        challenge: &BackupChallenge,
        sender_public_key: &ElectionPublicKey,
    ) -> BackupVerification {
        let verified = challenge.recipient == self.index
            && challenge.sender == sender_public_key.owner
            && challenge.verify(&sender_public_key.coefficient_commitments);
        if verified {
            self.backup_values
                .insert(challenge.sender, challenge.value.clone());
        }
        BackupVerification {
            sender: challenge.sender,
            recipient: challenge.recipient,
            verified,
        }
    }

    pub fn has_verified_backup_from(&self, sender: GuardianIndex) -> bool {
        self.backup_values.contains_key(&sender)
    }

    /// `M_i = A^{s_i}` with a proof that it matches this guardian's public key.
    pub fn partial_decrypt_ciphertext(
        &self,
        ciphertext: &ElGamalCiphertext,
        extended_base_hash: &ElementModQ,
        proof_seed: &ElementModQ,
    ) -> (ElementModP, ChaumPedersenProof) {
        let secret = self.polynomial.secret();
        let share = ciphertext.partial_decrypt(secret);
        let proof =
            ChaumPedersenProof::make(ciphertext, secret, &share, proof_seed, extended_base_hash);
        (share, proof)
    }

    /// `M_{m,i} = A^{P_m(i)}` standing in for the missing guardian `m`, with a proof against the
    /// recovery public key `g^{P_m(i)}`.
    pub fn compensate_ciphertext(
        &self,
        missing: GuardianIndex,
        ciphertext: &ElGamalCiphertext,
        extended_base_hash: &ElementModQ,
        proof_seed: &ElementModQ,
    ) -> ElectionResult<(ElementModP, ChaumPedersenProof)> {
        let value = self.backup_values.get(&missing).ok_or_else(|| {
            ElectionError::invalid_state(
                ProtocolStep::CompensatedDecryption,
                format!(
                    "guardian {} holds no verified backup from guardian {}",
                    self.index, missing
                ),
            )
        })?;
        let share = ciphertext.partial_decrypt(value);
        let proof =
            ChaumPedersenProof::make(ciphertext, value, &share, proof_seed, extended_base_hash);
        Ok((share, proof))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn guardians(n: u64, k: u64, rng: &mut ChaCha20Rng) -> Vec<Guardian> {
        let details = CeremonyDetails::new(n, k).unwrap();
        (1..=n)
            .map(|i| Guardian::generate(i, details, rng).unwrap())
            .collect()
    }

    #[test]
    fn public_key_verifies_and_binds_to_owner() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let g = guardians(3, 2, &mut rng);
        let key = g[0].share_public_key();
        assert_eq!(key.verify(g[0].details()), Ok(()));
        assert_eq!(key.recovery_public_key_for(0), key.key);

        let mut forged = key.clone();
        forged.key = g[1].share_public_key().key;
        assert!(matches!(
            forged.verify(g[0].details()),
            Err(ElectionError::ProofInvalid(_))
        ));
    }

    #[test]
    fn backups_verify_for_their_recipient() {
        let mut rng = ChaCha20Rng::seed_from_u64(2);
        let mut g = guardians(3, 2, &mut rng);
        let keys: Vec<_> = g.iter().map(|x| x.share_public_key()).collect();
        let backups = g[0].generate_backups(&keys, &mut rng).unwrap();
        assert_eq!(backups.keys().copied().collect::<Vec<_>>(), vec![2, 3]);

        let verification = g[1].verify_backup(&backups[&2], &keys[0]);
        assert!(verification.verified);
        assert!(g[1].has_verified_backup_from(1));

        // Guardian 3 cannot use guardian 2's backup.
        assert!(!g[2].verify_backup(&backups[&2], &keys[0]).verified);
    }

    #[test]
    fn generating_backups_needs_a_quorum_of_keys() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let g = guardians(4, 3, &mut rng);
        let keys = vec![g[1].share_public_key()];
        assert_eq!(
            g[0].generate_backups(&keys, &mut rng).unwrap_err(),
            ElectionError::InsufficientGuardians {
                step: ProtocolStep::BackupDistribution,
                required: 3,
                available: 2,
            }
        );
    }

    #[test]
    fn challenge_answer_replaces_a_bad_backup() {
        let mut rng = ChaCha20Rng::seed_from_u64(4);
        let mut g = guardians(3, 2, &mut rng);
        let keys: Vec<_> = g.iter().map(|x| x.share_public_key()).collect();
        let mut backup = g[0].generate_backups(&keys, &mut rng).unwrap()[&3].clone();
        backup.ciphertext[0] ^= 0xff;
        assert!(!g[2].verify_backup(&backup, &keys[0]).verified);

        let challenge = g[0].answer_challenge(3).unwrap();
        assert!(challenge.verify(&keys[0].coefficient_commitments));
        assert!(g[2].accept_challenge(&challenge, &keys[0]).verified);
        assert!(g[2].has_verified_backup_from(1));
    }

    #[test]
    fn compensation_requires_a_verified_backup() {
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let g = guardians(3, 2, &mut rng);
        let ciphertext = ElGamalCiphertext {
            pad: ElementModP::generator(),
            data: ElementModP::generator(),
        };
        assert!(matches!(
            g[0].compensate_ciphertext(2, &ciphertext, &ElementModQ::one(), &ElementModQ::one()),
            Err(ElectionError::InvalidState {
                step: ProtocolStep::CompensatedDecryption,
                ..
            })
        ));
    }
}
