//! Round-based retry bookkeeping for every mutant.
//!
//! An unkilled mutant carries the number of attempts that failed to kill it. Batches are drawn
//! only from mutants whose counter equals the current round, so every surviving mutant gets an
//! attempt before any mutant gets another.

use std::collections::BTreeMap;

use crate::error::KillerError;
use crate::mutants::{ExecutionStatus, MutantId};
use crate::tree::MutationTree;

#[derive(Debug)]
pub struct Scheduler {
    unkilled: BTreeMap<MutantId, u32>,
    killed: BTreeMap<MutantId, ExecutionStatus>,
    round: u32,
    total: usize,
    rng: fastrand::Rng,
}

impl Scheduler {
    pub fn new(total: usize, rng: fastrand::Rng) -> Self {
        Scheduler {
            unkilled: (0..total as MutantId).map(|m| (m, 0)).collect(),
            killed: BTreeMap::new(),
            round: 0,
            total,
            rng,
        }
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn killed(&self) -> &BTreeMap<MutantId, ExecutionStatus> {
        &self.killed
    }

    pub fn unkilled_count(&self) -> usize {
        self.unkilled.len()
    }

    pub fn all_killed(&self) -> bool {
        self.unkilled.is_empty()
    }

    pub fn is_killed(&self, mutant: MutantId) -> bool {
        self.killed.contains_key(&mutant)
    }

    /// `None` once the mutant is killed.
    pub fn attempts(&self, mutant: MutantId) -> Option<u32> {
        self.unkilled.get(&mutant).copied()
    }

    /// Mutants still waiting for their attempt in the current round.
    pub fn pending_in_round(&self) -> usize {
        self.unkilled.values().filter(|&&r| r == self.round).count()
    }

    fn eligible(&self) -> Vec<MutantId> {
        self.unkilled
            .iter()
            .filter(|&(_, &r)| r == self.round)
            .map(|(&m, _)| m)
            .collect()
    }

    /// Picks up to `max_size` mutually compatible mutants from the current round, advancing the
    /// round first if it has been exhausted. Empty only when every mutant is killed.
    pub fn select_batch(
        &mut self,
        tree: &MutationTree,
        max_size: usize,
    ) -> Result<Vec<MutantId>, KillerError> {
        let mut available = self.eligible();
        if available.is_empty() {
            // Consolidation can push counters past round + 1, so jump to the lowest one left.
            let Some(&next) = self.unkilled.values().min() else {
                return Ok(Vec::new());
            };
            self.round = next;
            tracing::info!("Moving to round {}", self.round);
            available = self.eligible();
        }

        let mut batch = Vec::new();
        while !available.is_empty() && batch.len() < max_size {
            let selected = available[self.rng.usize(..available.len())];
            batch.push(selected);
            let incompatible = tree.incompatible_mutant_ids(selected)?;
            available.retain(|m| *m != selected && !incompatible.contains(m));
        }
        Ok(batch)
    }

    pub fn record_failed_attempt(&mut self, mutants: &[MutantId]) {
        for mutant in mutants {
            if let Some(attempts) = self.unkilled.get_mut(mutant) {
                *attempts += 1;
            }
        }
    }

    /// Returns false if the mutant was already killed; its first classification is kept.
    pub fn record_kill(&mut self, mutant: MutantId, status: ExecutionStatus) -> bool {
        if self.unkilled.remove(&mutant).is_none() {
            return false;
        }
        self.killed.insert(mutant, status);
        true
    }

    pub fn check_invariant(&self) -> Result<(), KillerError> {
        if self.killed.len() + self.unkilled.len() != self.total {
            return Err(KillerError::InvariantViolation {
                killed: self.killed.len(),
                unkilled: self.unkilled.len(),
                total: self.total,
            });
        }
        Ok(())
    }
}
