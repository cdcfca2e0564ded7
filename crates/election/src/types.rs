// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::errors::{ElectionError, ElectionResult, ProtocolStep};

/// Guardian sequence index. Fixed to `1..=N` for the lifetime of an election.
pub type GuardianIndex = u64;

#[derive(Deserialize)]
struct RawCeremonyDetails {
    number_of_guardians: u64,
    quorum: u64,
}

/// Guardian count `N` and decryption threshold `K` with `1 < K <= N`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawCeremonyDetails")]
pub struct CeremonyDetails {
    number_of_guardians: u64,
    quorum: u64,
}

impl CeremonyDetails {
    pub fn new(number_of_guardians: u64, quorum: u64) -> ElectionResult<Self> {
        if quorum <= 1 {
            return Err(ElectionError::invalid_parameters(format!(
                "quorum must be greater than 1, got {}",
                quorum
            )));
        }
        if number_of_guardians < quorum {
            return Err(ElectionError::InsufficientGuardians {
                step: ProtocolStep::CeremonySetup,
                required: quorum,
                available: number_of_guardians,
            });
        }
        Ok(Self {
            number_of_guardians,
            quorum,
        })
    }

    pub fn number_of_guardians(&self) -> u64 {
        self.number_of_guardians
    }

    pub fn quorum(&self) -> u64 {
        self.quorum
    }

    pub fn guardian_indices(&self) -> RangeInclusive<GuardianIndex> {
        1..=self.number_of_guardians
    }

    pub fn contains(&self, index: GuardianIndex) -> bool {
        self.guardian_indices().contains(&index)
    }

    pub(crate) fn ensure_guardian(&self, index: GuardianIndex) -> ElectionResult<()> {
        if !self.contains(index) {
            return Err(ElectionError::invalid_parameters(format!(
                "guardian index {} outside 1..={}",
                index, self.number_of_guardians
            )));
        }
        Ok(())
    }
}

impl TryFrom<RawCeremonyDetails> for CeremonyDetails {
    type Error = ElectionError;
    fn try_from(raw: RawCeremonyDetails) -> Result<Self, Self::Error> {
        Self::new(raw.number_of_guardians, raw.quorum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_must_exceed_one() {
        assert!(matches!(
            CeremonyDetails::new(3, 1),
            Err(ElectionError::InvalidParameters { .. })
        ));
    }

    #[test]
    fn guardians_must_cover_threshold() {
        assert_eq!(
            CeremonyDetails::new(2, 3),
            Err(ElectionError::InsufficientGuardians {
                step: ProtocolStep::CeremonySetup,
                required: 3,
                available: 2,
            })
        );
        let details = CeremonyDetails::new(3, 3).unwrap();
        assert!(details.contains(3));
        assert!(!details.contains(0));
    }

    #[test]
    fn deserialization_validates() {
        assert!(serde_json::from_str::<CeremonyDetails>(
            r#"{"number_of_guardians":5,"quorum":3}"#
        )
        .is_ok());
        assert!(serde_json::from_str::<CeremonyDetails>(
            r#"{"number_of_guardians":5,"quorum":1}"#
        )
        .is_err());
    }
}
