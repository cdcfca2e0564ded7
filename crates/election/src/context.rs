// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use eg_group::constants::{GENERATOR, LARGE_PRIME, SMALL_PRIME};
use eg_group::{hash_elems, ElementModP, ElementModQ};
use serde::{Deserialize, Serialize};

use crate::errors::ElectionResult;
use crate::key_ceremony::ElectionJointKey;
use crate::manifest::Manifest;
use crate::types::CeremonyDetails;

/// Public values every encryption and proof in an election is bound to.
///
/// `crypto_base_hash = H(p, q, g, N, K, manifest)` and
/// `crypto_extended_base_hash = H(base, commitment_hash)`, so proofs are tied to the group, the
/// manifest and every guardian's coefficient commitments.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionContext {
    pub number_of_guardians: u64,
    pub quorum: u64,
    pub joint_public_key: ElementModP,
    pub commitment_hash: ElementModQ,
    pub manifest_hash: ElementModQ,
    pub crypto_base_hash: ElementModQ,
    pub crypto_extended_base_hash: ElementModQ,
}

impl ElectionContext {
    pub fn new(
        details: &CeremonyDetails,
        joint_key: &ElectionJointKey,
        manifest: &Manifest,
    ) -> ElectionResult<Self> {
        manifest.validate()?;
        let manifest_hash = manifest.crypto_hash();
        let crypto_base_hash = hash_elems(&[
            &format!("{:X}", &*LARGE_PRIME),
            &format!("{:X}", &*SMALL_PRIME),
            &format!("{:X}", &*GENERATOR),
            &details.number_of_guardians(),
            &details.quorum(),
            &manifest_hash,
        ]);
        let crypto_extended_base_hash =
            hash_elems(&[&crypto_base_hash, &joint_key.commitment_hash]);
        Ok(Self {
            number_of_guardians: details.number_of_guardians(),
            quorum: details.quorum(),
            joint_public_key: joint_key.joint_public_key.clone(),
            commitment_hash: joint_key.commitment_hash.clone(),
            manifest_hash,
            crypto_base_hash,
            crypto_extended_base_hash,
        })
    }
}
