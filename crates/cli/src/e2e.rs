// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! Runs a whole election in one process: every guardian is simulated locally and talks to the
//! coordinator through the same calls a networked deployment would make.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::PathBuf;

use anyhow::{bail, ensure, Context, Result};
use clap::Args;
use eg_coordinator::{Coordinator, CoordinatorConfig};
use eg_election::{
    compensated_decrypt, encrypt_ballot, partial_decrypt, CeremonyDetails, ContestDescription,
    DecryptionContribution, ElectionContext, ElectionPublicKey, ElectionResult, EncryptedTally,
    Guardian, GuardianIndex, Manifest, PlaintextBallot, PlaintextBallotContest,
    PlaintextBallotSelection, SelectionDescription,
};
use eg_group::ElementModQ;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde_json::json;
use tracing::{info, instrument, warn};

#[derive(Args, Debug)]
pub struct E2eArgs {
    /// Number of guardians
    #[arg(short = 'n', long, default_value_t = 5)]
    pub guardians: u64,

    /// Guardians needed to decrypt
    #[arg(short = 'k', long, default_value_t = 3)]
    pub quorum: u64,

    /// Number of random ballots to cast
    #[arg(short, long, default_value_t = 10)]
    pub ballots: usize,

    /// Guardians that take part in the key ceremony but not in decryption, eg. `--offline 2,5`
    #[arg(long, value_delimiter = ',')]
    pub offline: Vec<GuardianIndex>,

    /// Seed for every random choice, so a run can be replayed
    #[arg(short, long, default_value_t = 42)]
    pub seed: u64,

    /// Manifest as JSON. A two contest sample is used when absent
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,

    /// Write the published result as JSON
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Spoil this ballot instead of casting it, eg. `--spoil-id ballot-3`. It is decrypted on
    /// its own and printed after the tally
    #[arg(long)]
    pub spoil_id: Option<String>,
}

impl E2eArgs {
    fn validate(&self) -> Result<BTreeSet<GuardianIndex>> {
        let offline: BTreeSet<_> = self.offline.iter().copied().collect();
        ensure!(
            offline.len() == self.offline.len(),
            "offline guardians must be distinct"
        );
        if let Some(index) = offline.iter().find(|i| **i == 0 || **i > self.guardians) {
            bail!(
                "offline guardian {} is outside 1..={}",
                index,
                self.guardians
            );
        }
        let online = self.guardians.saturating_sub(offline.len() as u64);
        ensure!(
            online >= self.quorum,
            "{} guardians online but the quorum is {}",
            online,
            self.quorum
        );
        Ok(offline)
    }
}

fn sample_manifest() -> Manifest {
    let contest = |id: &str, order: u64, votes_allowed: u64, selections: &[&str]| {
        ContestDescription {
            object_id: id.to_string(),
            sequence_order: order,
            votes_allowed,
            selections: selections
                .iter()
                .enumerate()
                .map(|(i, s)| SelectionDescription::new(*s, i as u64))
                .collect(),
        }
    };
    Manifest {
        election_scope_id: "e2e-election".to_string(),
        contests: vec![
            contest("referendum", 0, 1, &["yes", "no"]),
            contest("council", 1, 2, &["ada", "grace", "edsger", "barbara"]),
        ],
    }
}

fn read_manifest(path: Option<&PathBuf>) -> Result<Manifest> {
    let Some(path) = path else {
        return Ok(sample_manifest());
    };
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Could not read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("Could not parse manifest {}", path.display()))?;
    manifest.validate()?;
    Ok(manifest)
}

fn random_ballots(
    manifest: &Manifest,
    count: usize,
    rng: &mut ChaCha20Rng,
) -> Vec<PlaintextBallot> {
    (0..count)
        .map(|i| PlaintextBallot {
            object_id: format!("ballot-{}", i),
            contests: manifest
                .contests
                .iter()
                .map(|contest| {
                    let votes = rng.gen_range(0..=contest.votes_allowed) as usize;
                    PlaintextBallotContest {
                        object_id: contest.object_id.clone(),
                        selections: contest
                            .selections
                            .choose_multiple(rng, votes)
                            .map(|s| PlaintextBallotSelection {
                                object_id: s.object_id.clone(),
                                vote: 1,
                            })
                            .collect(),
                    }
                })
                .collect(),
        })
        .collect()
}

type Counts = BTreeMap<String, BTreeMap<String, u64>>;

fn print_counts(counts: &Counts) {
    for (contest, selections) in counts {
        for (selection, count) in selections {
            println!("{:>16} {:>12} {}", contest, selection, count);
        }
    }
}

fn count_plaintexts(manifest: &Manifest, ballots: &[PlaintextBallot]) -> Counts {
    let mut counts: Counts = manifest
        .contests
        .iter()
        .map(|c| {
            let zeros = c.selections.iter().map(|s| (s.object_id.clone(), 0)).collect();
            (c.object_id.clone(), zeros)
        })
        .collect();
    for contest in ballots.iter().flat_map(|b| &b.contests) {
        for selection in &contest.selections {
            if let Some(count) = counts
                .get_mut(&contest.object_id)
                .and_then(|c| c.get_mut(&selection.object_id))
            {
                *count += selection.vote;
            }
        }
    }
    counts
}

/// Key ceremony through the coordinator. Returns the ceremony id and the guardians holding their
/// verified backups.
fn run_ceremony(
    coordinator: &Coordinator,
    details: CeremonyDetails,
    rng: &mut ChaCha20Rng,
) -> Result<(String, Vec<Guardian>)> {
    let id = coordinator.start_key_ceremony(details.number_of_guardians(), details.quorum())?;
    let mut guardians = (1..=details.number_of_guardians())
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
                .with_context(|| format!("No public key for guardian {}", backup.sender))?;
            let verification = guardian.verify_backup(&backup, sender);
            coordinator.submit_backup_verification(&id, verification)?;
        }
    }
    Ok((id, guardians))
}

/// Sends a direct share from every present guardian, then a compensated share from each of
/// them for every offline guardian.
fn contribute(
    present: &[&Guardian],
    offline: &BTreeSet<GuardianIndex>,
    keys: &[ElectionPublicKey],
    tally: &EncryptedTally,
    context: &ElectionContext,
    rng: &mut ChaCha20Rng,
    mut submit: impl FnMut(DecryptionContribution) -> ElectionResult<()>,
) -> Result<()> {
    for guardian in present {
        let share = partial_decrypt(guardian, tally, context, rng)?;
        submit(DecryptionContribution::Direct(share))?;
    }
    for missing_key in keys.iter().filter(|k| offline.contains(&k.owner)) {
        for guardian in present {
            let share = compensated_decrypt(guardian, missing_key, tally, context, rng)?;
            submit(DecryptionContribution::Compensated(share))?;
        }
    }
    Ok(())
}

#[instrument(name = "e2e", skip_all, fields(seed = args.seed))]
pub fn execute(config: CoordinatorConfig, args: E2eArgs) -> Result<()> {
    let offline = args.validate()?;
    let details = CeremonyDetails::new(args.guardians, args.quorum)?;
    let manifest = read_manifest(args.manifest.as_ref())?;
    let mut rng = ChaCha20Rng::seed_from_u64(args.seed);

    let mut plaintexts = random_ballots(&manifest, args.ballots, &mut rng);
    let spoiled_plaintext = match &args.spoil_id {
        Some(id) => {
            let Some(position) = plaintexts.iter().position(|b| &b.object_id == id) else {
                bail!("no ballot {} among the {} generated", id, args.ballots);
            };
            Some(plaintexts.remove(position))
        }
        None => None,
    };

    let coordinator = Coordinator::new(config)?;
    let (ceremony_id, guardians) = run_ceremony(&coordinator, details, &mut rng)?;
    let joint_key = coordinator.finalize_joint_key(&ceremony_id)?;
    info!(guardians = args.guardians, quorum = args.quorum, "joint key published");

    let election_id = coordinator.open_election(&ceremony_id, manifest.clone())?;
    let context = coordinator.election_context(&election_id)?;

    let ballots = plaintexts
        .iter()
        .map(|ballot| encrypt_ballot(ballot, &manifest, &context, &ElementModQ::random(&mut rng)))
        .collect::<Result<Vec<_>, _>>()?;
    let outcomes = coordinator.submit_encrypted_ballots(&election_id, ballots)?;
    for outcome in outcomes {
        outcome?;
    }
    if let Some(ballot) = &spoiled_plaintext {
        let encrypted =
            encrypt_ballot(ballot, &manifest, &context, &ElementModQ::random(&mut rng))?;
        coordinator.spoil_encrypted_ballot(&election_id, encrypted)?;
    }
    let tally = coordinator.request_tally(&election_id)?;
    info!(ballots = tally.cast_ballot_count(), "tally computed");

    let present: Vec<&Guardian> = guardians
        .iter()
        .filter(|g| !offline.contains(&g.index()))
        .collect();
    let keys = coordinator.guardian_public_keys(&ceremony_id)?;
    for missing in &offline {
        warn!(guardian = *missing, "guardian offline, compensating");
    }
    contribute(&present, &offline, &keys, &tally, &context, &mut rng, |contribution| {
        coordinator.submit_decryption_share(&election_id, contribution)
    })?;

    let result = coordinator.finalize_result(&election_id)?;
    result.verify(&context, &keys, &tally)?;
    let expected = count_plaintexts(&manifest, &plaintexts);
    ensure!(
        result.counts() == expected,
        "decrypted tally does not match the cast ballots"
    );

    let mut spoiled = None;
    if let Some(ballot) = &spoiled_plaintext {
        let ballot_id = ballot.object_id.as_str();
        let spoiled_tally = coordinator.spoiled_ballot_tally(&election_id, ballot_id)?;
        contribute(
            &present,
            &offline,
            &keys,
            &spoiled_tally,
            &context,
            &mut rng,
            |contribution| {
                coordinator.submit_spoiled_ballot_share(&election_id, ballot_id, contribution)
            },
        )?;
        let decrypted = coordinator.finalize_spoiled_ballot(&election_id, ballot_id)?;
        decrypted.verify(&context, &keys, &spoiled_tally)?;
        ensure!(
            decrypted.counts() == count_plaintexts(&manifest, std::slice::from_ref(ballot)),
            "spoiled ballot {} does not decrypt to its choices",
            ballot_id
        );
        spoiled = Some((ballot_id.to_string(), decrypted));
    }

    println!("joint public key: {}", joint_key.to_hex());
    println!(
        "ballots cast: {}, offline guardians: {:?}",
        result.cast_ballot_count, offline
    );
    print_counts(&expected);
    if let Some((ballot_id, decrypted)) = &spoiled {
        println!("spoiled ballot {}:", ballot_id);
        print_counts(&decrypted.counts());
    }

    if let Some(path) = &args.output {
        let document = json!({
            "joint_public_key": joint_key,
            "context": context,
            "tally": tally,
            "result": result,
            "spoiled": spoiled.as_ref().map(|(ballot_id, decrypted)| json!({
                "object_id": ballot_id,
                "result": decrypted,
            })),
        });
        fs::write(path, serde_json::to_string_pretty(&document)?)
            .with_context(|| format!("Could not write result to {}", path.display()))?;
        info!(path = %path.display(), "result written");
    }
    Ok(())
}
