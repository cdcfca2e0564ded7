// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! The boundary between the election core and whatever orchestrates it.
//!
//! Each ceremony and election lives behind its own mutex, so unrelated elections never contend.
//! The coordinator only ever sees public values: keys, encrypted backups, ballots, shares.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use anyhow::{Context, Result};
use eg_election::{
    BackupChallenge, BackupStatus, BackupVerification, CeremonyDetails, CeremonyState,
    DecryptionContribution, DecryptionMediator, ElectionContext, ElectionError,
    ElectionPublicKey, ElectionResult, EncryptedBackup, EncryptedBallot, EncryptedTally,
    FaultReport, GuardianIndex, KeyCeremony, Manifest, Party, PlaintextTally, ProtocolStep,
};
use eg_group::{DiscreteLog, ElementModP};
use rayon::prelude::*;
use tracing::{info, instrument, warn};

use crate::config::CoordinatorConfig;
use crate::election::{BallotBoxState, ElectionPhase, ElectionRecord};

pub type CeremonyId = String;
pub type ElectionId = String;

type Registry<T> = RwLock<HashMap<String, Arc<Mutex<T>>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lookup<T>(
    registry: &Registry<T>,
    kind: &'static str,
    id: &str,
) -> ElectionResult<Arc<Mutex<T>>> {
    registry
        .read()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .get(id)
        .cloned()
        .ok_or_else(|| ElectionError::NotFound {
            kind,
            id: id.to_string(),
        })
}

fn insert<T>(registry: &Registry<T>, id: String, value: T) {
    registry
        .write()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
        .insert(id, Arc::new(Mutex::new(value)));
}

pub struct Coordinator {
    config: CoordinatorConfig,
    pool: rayon::ThreadPool,
    next_id: AtomicU64,
    ceremonies: Registry<KeyCeremony>,
    elections: Registry<ElectionRecord>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("eg-worker-{}", i))
            .build()
            .context("Could not start ballot validation pool")?;
        info!(
            worker_threads = config.worker_threads,
            max_tally = config.max_tally,
            "coordinator started"
        );
        Ok(Self {
            config,
            pool,
            next_id: AtomicU64::new(1),
            ceremonies: RwLock::new(HashMap::new()),
            elections: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}-{}", prefix, self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    fn ceremony(&self, id: &str) -> ElectionResult<Arc<Mutex<KeyCeremony>>> {
        lookup(&self.ceremonies, "ceremony", id)
    }

    fn election(&self, id: &str) -> ElectionResult<Arc<Mutex<ElectionRecord>>> {
        lookup(&self.elections, "election", id)
    }

    // Key ceremony

    #[instrument(skip_all)]
    pub fn start_key_ceremony(
        &self,
        number_of_guardians: u64,
        quorum: u64,
    ) -> ElectionResult<CeremonyId> {
        let details = CeremonyDetails::new(number_of_guardians, quorum)?;
        let id = self.next_id("ceremony");
        insert(&self.ceremonies, id.clone(), KeyCeremony::new(id.clone(), details));
        Ok(id)
    }

    pub fn ceremony_state(&self, id: &str) -> ElectionResult<CeremonyState> {
        Ok(lock(&*self.ceremony(id)?).state())
    }

    pub fn ceremony_faults(&self, id: &str) -> ElectionResult<Vec<FaultReport>> {
        Ok(lock(&*self.ceremony(id)?).faults().to_vec())
    }

    /// Registers a guardian's public key share and its coefficient proofs.
    #[instrument(skip_all, fields(ceremony = %id, guardian = index))]
    pub fn submit_guardian_key(
        &self,
        id: &str,
        index: GuardianIndex,
        public_key: ElectionPublicKey,
    ) -> ElectionResult<()> {
        let ceremony = self.ceremony(id)?;
        if public_key.owner != index {
            return Err(ElectionError::proof_invalid(
                Party::Guardian(index),
                ProtocolStep::KeyAnnouncement,
                format!("submitted key belongs to guardian {}", public_key.owner),
            ));
        }
        let result = lock(&ceremony).announce(public_key);
        result
    }

    #[instrument(skip_all, fields(ceremony = %id, guardian = index))]
    pub fn submit_backups(
        &self,
        id: &str,
        index: GuardianIndex,
        backups: Vec<EncryptedBackup>,
    ) -> ElectionResult<()> {
        let ceremony = self.ceremony(id)?;
        let result = lock(&ceremony).receive_backups(index, backups);
        result
    }

    pub fn backups_for(
        &self,
        id: &str,
        recipient: GuardianIndex,
    ) -> ElectionResult<Vec<EncryptedBackup>> {
        Ok(lock(&*self.ceremony(id)?).backups_for(recipient))
    }

    #[instrument(skip_all, fields(ceremony = %id))]
    pub fn submit_backup_verification(
        &self,
        id: &str,
        verification: BackupVerification,
    ) -> ElectionResult<BackupStatus> {
        let ceremony = self.ceremony(id)?;
        let result = lock(&ceremony).receive_verification(verification);
        result
    }

    #[instrument(skip_all, fields(ceremony = %id))]
    pub fn reissue_backup(&self, id: &str, backup: EncryptedBackup) -> ElectionResult<()> {
        let ceremony = self.ceremony(id)?;
        let result = lock(&ceremony).reissue_backup(backup);
        result
    }

    #[instrument(skip_all, fields(ceremony = %id))]
    pub fn resolve_backup_challenge(
        &self,
        id: &str,
        challenge: BackupChallenge,
    ) -> ElectionResult<BackupStatus> {
        let ceremony = self.ceremony(id)?;
        let result = lock(&ceremony).resolve_challenge(challenge);
        result
    }

    /// Publishes the joint key once every backup is verified.
    #[instrument(skip_all, fields(ceremony = %id))]
    pub fn finalize_joint_key(&self, id: &str) -> ElectionResult<ElementModP> {
        let ceremony = self.ceremony(id)?;
        let joint_key = lock(&ceremony).publish_joint_key()?;
        Ok(joint_key.joint_public_key)
    }

    pub fn guardian_public_keys(&self, id: &str) -> ElectionResult<Vec<ElectionPublicKey>> {
        Ok(lock(&*self.ceremony(id)?).public_keys())
    }

    // Election

    /// Opens an election under a completed ceremony's joint key.
    #[instrument(skip_all, fields(ceremony = %ceremony_id))]
    pub fn open_election(
        &self,
        ceremony_id: &str,
        manifest: Manifest,
    ) -> ElectionResult<ElectionId> {
        let (details, joint_key, public_keys) = {
            let ceremony = self.ceremony(ceremony_id)?;
            let ceremony = lock(&ceremony);
            let joint_key = ceremony.joint_key().cloned().ok_or_else(|| {
                ElectionError::invalid_state(
                    ProtocolStep::ElectionSetup,
                    format!("ceremony {} has not published a joint key", ceremony_id),
                )
            })?;
            (*ceremony.details(), joint_key, ceremony.public_keys())
        };
        let context = ElectionContext::new(&details, &joint_key, &manifest)?;
        let id = self.next_id("election");
        info!(election = %id, contests = manifest.contests.len(), "election opened");
        insert(
            &self.elections,
            id.clone(),
            ElectionRecord::new(id.clone(), manifest, context, public_keys),
        );
        Ok(id)
    }

    pub fn election_context(&self, id: &str) -> ElectionResult<ElectionContext> {
        Ok(lock(&*self.election(id)?).context.clone())
    }

    pub fn election_phase(&self, id: &str) -> ElectionResult<ElectionPhase> {
        Ok(lock(&*self.election(id)?).phase)
    }

    pub fn rejected_ballots(&self, id: &str) -> ElectionResult<Vec<FaultReport>> {
        Ok(lock(&*self.election(id)?).rejected.clone())
    }

    fn snapshot(
        &self,
        id: &str,
    ) -> ElectionResult<(Arc<Mutex<ElectionRecord>>, Manifest, ElectionContext)> {
        let election = self.election(id)?;
        let (manifest, context) = {
            let record = lock(&election);
            record.require(ProtocolStep::BallotSubmission, ElectionPhase::Open)?;
            (record.manifest.clone(), record.context.clone())
        };
        Ok((election, manifest, context))
    }

    fn accept(
        &self,
        record: &mut ElectionRecord,
        ballot: &EncryptedBallot,
        state: BallotBoxState,
        validation: ElectionResult<()>,
    ) -> ElectionResult<()> {
        let outcome = validation.and_then(|_| {
            record
                .accept(ballot, state, self.config.reject_duplicate_ballots)
                .map(|_| ())
        });
        if let Err(e) = &outcome {
            warn!(election = %record.id, ballot = %ballot.object_id, error = %e, "ballot rejected");
            if let Some(fault) = e.fault() {
                record.rejected.push(fault);
            }
        }
        outcome
    }

    /// Validates a ballot against the manifest and its proofs, then counts it.
    #[instrument(skip_all, fields(election = %id, ballot = %ballot.object_id))]
    pub fn submit_encrypted_ballot(
        &self,
        id: &str,
        ballot: EncryptedBallot,
    ) -> ElectionResult<()> {
        let (election, manifest, context) = self.snapshot(id)?;
        let validation = ballot.validate(&manifest, &context);
        let mut record = lock(&election);
        self.accept(&mut record, &ballot, BallotBoxState::Cast, validation)
    }

    /// Validates a ballot like a cast one but keeps it out of the tally. It is decrypted on its
    /// own after intake closes.
    #[instrument(skip_all, fields(election = %id, ballot = %ballot.object_id))]
    pub fn spoil_encrypted_ballot(
        &self,
        id: &str,
        ballot: EncryptedBallot,
    ) -> ElectionResult<()> {
        let (election, manifest, context) = self.snapshot(id)?;
        let validation = ballot.validate(&manifest, &context);
        let mut record = lock(&election);
        self.accept(&mut record, &ballot, BallotBoxState::Spoiled, validation)?;
        info!("ballot spoiled");
        Ok(())
    }

    /// Validates a batch on the worker pool and counts the valid ballots in submission order.
    /// Returns one outcome per ballot; only an unknown or closed election fails the batch.
    #[instrument(skip_all, fields(election = %id, ballots = ballots.len()))]
    pub fn submit_encrypted_ballots(
        &self,
        id: &str,
        ballots: Vec<EncryptedBallot>,
    ) -> ElectionResult<Vec<ElectionResult<()>>> {
        let (election, manifest, context) = self.snapshot(id)?;
        let validations: Vec<ElectionResult<()>> = self.pool.install(|| {
            ballots
                .par_iter()
                .map(|ballot| ballot.validate(&manifest, &context))
                .collect()
        });

        let mut record = lock(&election);
        record.require(ProtocolStep::BallotSubmission, ElectionPhase::Open)?;
        let outcomes: Vec<_> = ballots
            .iter()
            .zip(validations)
            .map(|(ballot, validation)| {
                self.accept(&mut record, ballot, BallotBoxState::Cast, validation)
            })
            .collect();
        info!(
            accepted = outcomes.iter().filter(|o| o.is_ok()).count(),
            rejected = outcomes.iter().filter(|o| o.is_err()).count(),
            "ballot batch processed"
        );
        Ok(outcomes)
    }

    /// Closes ballot intake and returns the encrypted tally. Idempotent afterwards.
    #[instrument(skip_all, fields(election = %id))]
    pub fn request_tally(&self, id: &str) -> ElectionResult<EncryptedTally> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        if record.phase == ElectionPhase::Open {
            let mediator = DecryptionMediator::new(
                record.context.clone(),
                record.tally.clone(),
                record.public_keys.clone(),
            )?;
            record.mediator = Some(mediator);
            record.phase = ElectionPhase::Tallied;
            info!(ballots = record.tally.cast_ballot_count(), "ballot intake closed");
        }
        Ok(record.tally.clone())
    }

    #[instrument(skip_all, fields(election = %id, guardian = contribution.submitter()))]
    pub fn submit_decryption_share(
        &self,
        id: &str,
        contribution: DecryptionContribution,
    ) -> ElectionResult<()> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        let step = match contribution {
            DecryptionContribution::Direct(_) => ProtocolStep::Decryption,
            DecryptionContribution::Compensated(_) => ProtocolStep::CompensatedDecryption,
        };
        record.mediator(step)?.submit(contribution)
    }

    /// Guardians that still need to be compensated for.
    pub fn missing_guardians(&self, id: &str) -> ElectionResult<Vec<GuardianIndex>> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        Ok(record.mediator(ProtocolStep::Decryption)?.missing_guardians())
    }

    pub fn decryption_faults(&self, id: &str) -> ElectionResult<Vec<FaultReport>> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        Ok(record.mediator(ProtocolStep::Decryption)?.faults().to_vec())
    }

    /// Combines the accepted shares and freezes the result. Idempotent once published.
    #[instrument(skip_all, fields(election = %id))]
    pub fn finalize_result(&self, id: &str) -> ElectionResult<PlaintextTally> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        if let (ElectionPhase::Published, Some(result)) = (record.phase, &record.result) {
            return Ok(result.clone());
        }
        let bound = record.tally.cast_ballot_count().min(self.config.max_tally);
        let dlog = DiscreteLog::new(bound);
        let mediator = record.mediator(ProtocolStep::Combine)?;
        let result = self.pool.install(|| mediator.combine(&dlog))?;
        record.result = Some(result.clone());
        record.phase = ElectionPhase::Published;
        info!(ballots = result.cast_ballot_count, "election result published");
        Ok(result)
    }

    // Spoiled ballots

    pub fn spoiled_ballot_ids(&self, id: &str) -> ElectionResult<Vec<String>> {
        Ok(lock(&*self.election(id)?).spoiled.keys().cloned().collect())
    }

    /// The one-ballot tally guardians decrypt for a spoiled ballot.
    pub fn spoiled_ballot_tally(
        &self,
        id: &str,
        ballot_id: &str,
    ) -> ElectionResult<EncryptedTally> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        let spoiled = record.spoiled(ProtocolStep::Decryption, ballot_id)?;
        Ok(spoiled.mediator.tally().clone())
    }

    #[instrument(
        skip_all,
        fields(election = %id, ballot = %ballot_id, guardian = contribution.submitter())
    )]
    pub fn submit_spoiled_ballot_share(
        &self,
        id: &str,
        ballot_id: &str,
        contribution: DecryptionContribution,
    ) -> ElectionResult<()> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        let step = match contribution {
            DecryptionContribution::Direct(_) => ProtocolStep::Decryption,
            DecryptionContribution::Compensated(_) => ProtocolStep::CompensatedDecryption,
        };
        record.spoiled(step, ballot_id)?.mediator.submit(contribution)
    }

    /// Decrypts a spoiled ballot from its accepted shares. Idempotent once decrypted.
    #[instrument(skip_all, fields(election = %id, ballot = %ballot_id))]
    pub fn finalize_spoiled_ballot(
        &self,
        id: &str,
        ballot_id: &str,
    ) -> ElectionResult<PlaintextTally> {
        let election = self.election(id)?;
        let mut record = lock(&election);
        let spoiled = record.spoiled(ProtocolStep::Combine, ballot_id)?;
        if let Some(result) = &spoiled.result {
            return Ok(result.clone());
        }
        // A single selection encrypts zero or one.
        let dlog = DiscreteLog::new(1);
        let mediator = &spoiled.mediator;
        let result = self.pool.install(|| mediator.combine(&dlog))?;
        spoiled.result = Some(result.clone());
        info!("spoiled ballot decrypted");
        Ok(result)
    }
}
