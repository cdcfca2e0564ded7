// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

use anyhow::{Context, Result};
use eg_election::{
    compensated_decrypt, partial_decrypt, DecryptionContribution, DecryptionMediator,
    ElectionContext, EncryptedTally, GuardianIndex, PlaintextTally,
};
use eg_group::DiscreteLog;
use rand::{CryptoRng, RngCore};

use crate::CeremonyFixture;

/// Decrypts `tally` with only the `present` guardians online. Every present guardian compensates
/// for every guardian left out.
pub fn decrypt_with_guardians<R: RngCore + CryptoRng>(
    fixture: &CeremonyFixture,
    context: &ElectionContext,
    tally: &EncryptedTally,
    present: &[GuardianIndex],
    rng: &mut R,
) -> Result<PlaintextTally> {
    let mut mediator =
        DecryptionMediator::new(context.clone(), tally.clone(), fixture.public_keys.clone())?;
    for index in present {
        let guardian = fixture
            .guardian(*index)
            .with_context(|| format!("no guardian {}", index))?;
        let share = partial_decrypt(guardian, tally, context, rng)?;
        mediator.submit(DecryptionContribution::Direct(share))?;
    }
    for missing in mediator.missing_guardians() {
        let missing_key = fixture
            .public_key(missing)
            .with_context(|| format!("no public key for guardian {}", missing))?;
        for index in present {
            let guardian = fixture
                .guardian(*index)
                .with_context(|| format!("no guardian {}", index))?;
            let share = compensated_decrypt(guardian, missing_key, tally, context, rng)?;
            mediator.submit(DecryptionContribution::Compensated(share))?;
        }
    }
    let dlog = DiscreteLog::new(tally.cast_ballot_count());
    Ok(mediator.combine(&dlog)?)
}
