// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use eg_group::{ElementModP, ElementModQ};
use rand::{CryptoRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::errors::{ElectionError, ElectionResult, Party, ProtocolStep};
use crate::polynomial::verify_polynomial_value;
use crate::types::GuardianIndex;

const BACKUP_DOMAIN: &[u8] = b"election-partial-key-backup";
const AES_NONCE_LEN: usize = 12;

/// One evaluation of a guardian's secret polynomial, encrypted to the recipient.
///
/// Hashed ElGamal: `pad = g^r`, the AES-256-GCM key is derived from `K_recipient^r` and both
/// indices, and the indices are bound again as associated data.
/// Layout of `ciphertext`: `[nonce][aes-gcm ciphertext]`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedBackup {
    pub sender: GuardianIndex,
    pub recipient: GuardianIndex,
    pub pad: ElementModP,
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

fn associated_data(sender: GuardianIndex, recipient: GuardianIndex) -> [u8; 16] {
    let mut aad = [0u8; 16];
    aad[..8].copy_from_slice(&sender.to_be_bytes());
    aad[8..].copy_from_slice(&recipient.to_be_bytes());
    aad
}

fn derive_key(
    sender: GuardianIndex,
    recipient: GuardianIndex,
    pad: &ElementModP,
    shared: &ElementModP,
) -> Zeroizing<Vec<u8>> {
    let mut hasher = Sha256::new();
    hasher.update(BACKUP_DOMAIN);
    hasher.update(associated_data(sender, recipient));
    hasher.update(pad.to_bytes_be());
    hasher.update(Zeroizing::new(shared.to_bytes_be()).as_slice());
    Zeroizing::new(hasher.finalize().to_vec())
}

impl EncryptedBackup {
    pub(crate) fn seal<R: RngCore + CryptoRng + ?Sized>(
        sender: GuardianIndex,
        recipient: GuardianIndex,
        value: &ElementModQ,
        recipient_key: &ElementModP,
        rng: &mut R,
    ) -> ElectionResult<Self> {
        let r = ElementModQ::random_nonzero(rng);
        let pad = ElementModP::g_pow(&r);
        let key = derive_key(sender, recipient, &pad, &recipient_key.pow(&r));

        let mut nonce_bytes = [0u8; AES_NONCE_LEN];
        rng.fill_bytes(&mut nonce_bytes);

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| ElectionError::invalid_parameters("backup key has wrong length"))?;
        let plaintext = Zeroizing::new(value.to_bytes_be());
        let aad = associated_data(sender, recipient);
        let sealed = cipher
            .encrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: plaintext.as_slice(),
                    aad: &aad,
                },
            )
            .map_err(|_| ElectionError::invalid_parameters("could not encrypt backup"))?;

        let mut ciphertext = Vec::with_capacity(AES_NONCE_LEN + sealed.len());
        ciphertext.extend_from_slice(&nonce_bytes);
        ciphertext.extend_from_slice(&sealed);

        Ok(Self {
            sender,
            recipient,
            pad,
            ciphertext,
        })
    }

    fn fault(&self, reason: &str) -> ElectionError {
        ElectionError::proof_invalid(
            Party::Backup {
                sender: self.sender,
                recipient: self.recipient,
            },
            ProtocolStep::BackupVerification,
            reason,
        )
    }

    /// Decrypts with the recipient's secret. Any tampering surfaces as a fault on this backup.
    pub(crate) fn open(&self, recipient_secret: &ElementModQ) -> ElectionResult<ElementModQ> {
        if !self.pad.is_valid_residue() {
            return Err(self.fault("backup pad is not a valid residue"));
        }
        if self.ciphertext.len() <= AES_NONCE_LEN {
            return Err(self.fault("backup ciphertext is truncated"));
        }

        let key = derive_key(
            self.sender,
            self.recipient,
            &self.pad,
            &self.pad.pow(recipient_secret),
        );
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|_| self.fault("backup key has wrong length"))?;
        let aad = associated_data(self.sender, self.recipient);
        let plaintext = Zeroizing::new(
            cipher
                .decrypt(
                    Nonce::from_slice(&self.ciphertext[..AES_NONCE_LEN]),
                    Payload {
                        msg: &self.ciphertext[AES_NONCE_LEN..],
                        aad: &aad,
                    },
                )
                .map_err(|_| self.fault("backup could not be decrypted"))?,
        );

        if plaintext.len() != eg_group::Q_BYTES {
            return Err(self.fault("backup plaintext has wrong length"));
        }
        let value = ElementModQ::from_bytes_be(&plaintext);
        if value.to_bytes_be().as_slice() != plaintext.as_slice() {
            return Err(self.fault("backup plaintext is not a scalar"));
        }
        Ok(value)
    }
}

/// A sender's public answer to a disputed backup: the evaluation for `recipient` in the clear.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupChallenge {
    pub sender: GuardianIndex,
    pub recipient: GuardianIndex,
    pub value: ElementModQ,
}

impl BackupChallenge {
    /// Anyone can check the answer against the sender's commitments.
    pub fn verify(&self, sender_commitments: &[ElementModP]) -> bool {
        verify_polynomial_value(&self.value, self.recipient, sender_commitments)
    }
}

/// Outcome of a recipient checking the backup addressed to it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupVerification {
    pub sender: GuardianIndex,
    pub recipient: GuardianIndex,
    pub verified: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use eg_group::ElGamalKeyPair;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn sealed_backup_opens_for_recipient_only() {
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let recipient = ElGamalKeyPair::random(&mut rng);
        let stranger = ElGamalKeyPair::random(&mut rng);
        let value = ElementModQ::random(&mut rng);

        let backup =
            EncryptedBackup::seal(1, 2, &value, recipient.public_key(), &mut rng).unwrap();
        assert_eq!(backup.open(recipient.secret_key()).unwrap(), value);
        assert!(matches!(
            backup.open(stranger.secret_key()),
            Err(ElectionError::ProofInvalid(_))
        ));
    }

    #[test]
    fn tampering_is_detected() {
        let mut rng = ChaCha20Rng::seed_from_u64(43);
        let recipient = ElGamalKeyPair::random(&mut rng);
        let value = ElementModQ::random(&mut rng);
        let backup =
            EncryptedBackup::seal(3, 1, &value, recipient.public_key(), &mut rng).unwrap();

        let mut flipped = backup.clone();
        let last = flipped.ciphertext.len() - 1;
        flipped.ciphertext[last] ^= 0x01;
        assert!(flipped.open(recipient.secret_key()).is_err());

        // Re-addressing the backup changes the associated data and the derived key.
        let mut readdressed = backup.clone();
        readdressed.sender = 2;
        assert!(readdressed.open(recipient.secret_key()).is_err());
    }

    #[test]
    fn backup_serializes_ciphertext_as_hex() {
        let mut rng = ChaCha20Rng::seed_from_u64(44);
        let recipient = ElGamalKeyPair::random(&mut rng);
        let backup = EncryptedBackup::seal(
            1,
            2,
            &ElementModQ::from_u64(9),
            recipient.public_key(),
            &mut rng,
        )
        .unwrap();
        let json = serde_json::to_value(&backup).unwrap();
        assert_eq!(json["ciphertext"], hex::encode(&backup.ciphertext));
        let back: EncryptedBackup = serde_json::from_value(json).unwrap();
        assert_eq!(back, backup);
    }
}
