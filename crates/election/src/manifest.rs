// SPDX-License-Identifier: LGPL-3.0-only
//
// This file is provided WITHOUT ANY WARRANTY;
// without even the implied warranty of MERCHANTABILITY
// or FITNESS FOR A PARTICULAR PURPOSE.

//! The cryptographic shape of an election: contests, their selections and vote limits.
//! Names and presentation metadata belong to the caller.

use std::collections::HashSet;

use eg_group::{hash_elems, ElementModQ};
use serde::{Deserialize, Serialize};

use crate::errors::{ElectionError, ElectionResult};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SelectionDescription {
    pub object_id: String,
    pub sequence_order: u64,
}

impl SelectionDescription {
    pub fn new(object_id: impl Into<String>, sequence_order: u64) -> Self {
        Self {
            object_id: object_id.into(),
            sequence_order,
        }
    }

    pub fn crypto_hash(&self) -> ElementModQ {
        hash_elems(&[&self.object_id, &self.sequence_order])
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContestDescription {
    pub object_id: String,
    pub sequence_order: u64,
    pub votes_allowed: u64,
    pub selections: Vec<SelectionDescription>,
}

impl ContestDescription {
    pub fn crypto_hash(&self) -> ElementModQ {
        let selection_hashes: Vec<_> = self.selections.iter().map(|s| s.crypto_hash()).collect();
        hash_elems(&[
            &self.object_id,
            &self.sequence_order,
            &self.votes_allowed,
            &selection_hashes,
        ])
    }

    pub fn selection(&self, object_id: &str) -> Option<&SelectionDescription> {
        self.selections.iter().find(|s| s.object_id == object_id)
    }

    /// One placeholder per allowed vote, numbered after the real selections. Placeholders absorb
    /// undervotes so every contest sums to exactly `votes_allowed`.
    pub fn placeholders(&self) -> Vec<SelectionDescription> {
        let next = self
            .selections
            .iter()
            .map(|s| s.sequence_order)
            .max()
            .map_or(0, |max| max + 1);
        (0..self.votes_allowed)
            .map(|i| {
                SelectionDescription::new(
                    format!("{}-placeholder-{}", self.object_id, i),
                    next + i,
                )
            })
            .collect()
    }

    fn validate(&self) -> ElectionResult<()> {
        if self.selections.is_empty() {
            return Err(ElectionError::invalid_parameters(format!(
                "contest {} has no selections",
                self.object_id
            )));
        }
        if self.votes_allowed == 0 || self.votes_allowed > self.selections.len() as u64 {
            return Err(ElectionError::invalid_parameters(format!(
                "contest {} allows {} votes over {} selections",
                self.object_id,
                self.votes_allowed,
                self.selections.len()
            )));
        }
        let mut ids = HashSet::new();
        let mut orders = HashSet::new();
        for selection in &self.selections {
            if !ids.insert(selection.object_id.as_str()) {
                return Err(ElectionError::invalid_parameters(format!(
                    "contest {} repeats selection {}",
                    self.object_id, selection.object_id
                )));
            }
            if !orders.insert(selection.sequence_order) {
                return Err(ElectionError::invalid_parameters(format!(
                    "contest {} repeats sequence order {}",
                    self.object_id, selection.sequence_order
                )));
            }
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Manifest {
    pub election_scope_id: String,
    pub contests: Vec<ContestDescription>,
}

impl Manifest {
    pub fn validate(&self) -> ElectionResult<()> {
        if self.contests.is_empty() {
            return Err(ElectionError::invalid_parameters("manifest has no contests"));
        }
        let mut ids = HashSet::new();
        for contest in &self.contests {
            if !ids.insert(contest.object_id.as_str()) {
                return Err(ElectionError::invalid_parameters(format!(
                    "manifest repeats contest {}",
                    contest.object_id
                )));
            }
            contest.validate()?;
        }
        Ok(())
    }

    pub fn crypto_hash(&self) -> ElementModQ {
        let contest_hashes: Vec<_> = self.contests.iter().map(|c| c.crypto_hash()).collect();
        hash_elems(&[&self.election_scope_id, &contest_hashes])
    }

    pub fn contest(&self, object_id: &str) -> Option<&ContestDescription> {
        self.contests.iter().find(|c| c.object_id == object_id)
    }
}
