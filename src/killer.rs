//! The kill search: bisection of batches, consolidation of kills, and the per-program loop.

use tracing::{debug, info, warn};

use crate::config::KillerConfig;
use crate::error::KillerError;
use crate::mutants::{ExecutionStatus, MutantId, ProgramBaseline};
use crate::reduce::{self, ReducedKill, Reducer};
use crate::scheduler::Scheduler;
use crate::state::{KillReport, KilledMutant};
use crate::tree::MutationTree;

/// Produces programs and tries mutants against them.
pub trait Harness {
    /// Generates a program that compiles and runs with the unmutated compiler, retrying as
    /// long as it takes.
    fn generate_program(&mut self) -> Result<ProgramBaseline, KillerError>;

    /// Compiles and runs the current program with exactly `mutants` enabled.
    fn try_mutants(
        &mut self,
        baseline: &ProgramBaseline,
        mutants: &[MutantId],
    ) -> Result<ExecutionStatus, KillerError>;
}

/// What happened while one program was being worked.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ProgramOutcome {
    pub attempts: u32,
    pub successful_attempts: u32,
    pub kills: usize,
}

pub struct MutantKiller<H, R> {
    tree: MutationTree,
    scheduler: Scheduler,
    harness: H,
    reducer: R,
    config: KillerConfig,
    programs: u64,
    reduced: Vec<ReducedKill>,
}

impl<H: Harness, R: Reducer> MutantKiller<H, R> {
    pub fn new(
        tree: MutationTree,
        harness: H,
        reducer: R,
        config: KillerConfig,
        rng: fastrand::Rng,
    ) -> Self {
        let scheduler = Scheduler::new(tree.num_mutants(), rng);
        MutantKiller {
            tree,
            scheduler,
            harness,
            reducer,
            config,
            programs: 0,
            reduced: Vec::new(),
        }
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn harness(&self) -> &H {
        &self.harness
    }

    pub fn reducer(&self) -> &R {
        &self.reducer
    }

    pub fn reduced(&self) -> &[ReducedKill] {
        &self.reduced
    }

    pub fn programs(&self) -> u64 {
        self.programs
    }

    pub fn all_killed(&self) -> bool {
        self.scheduler.all_killed()
    }

    /// Generates a fresh program and spends the configured number of attempts on it.
    pub fn hunt_with_new_program(&mut self) -> Result<ProgramOutcome, KillerError> {
        info!("Generating a program...");
        let baseline = self.harness.generate_program()?;
        self.programs += 1;
        info!(
            compile_ms = baseline.compile_time.as_millis() as u64,
            run_ms = baseline.execution_time.as_millis() as u64,
            "Generated program {}",
            self.programs
        );
        self.attempt_kills(&baseline)
    }

    pub fn attempt_kills(
        &mut self,
        baseline: &ProgramBaseline,
    ) -> Result<ProgramOutcome, KillerError> {
        let killed_before = self.scheduler.killed().len();
        let mut outcome = ProgramOutcome::default();
        let mut consecutive_failures = 0;
        while outcome.attempts < self.config.max_attempts_per_program
            && consecutive_failures < self.config.max_consecutive_failed_attempts_per_program
            && !self.scheduler.all_killed()
        {
            debug!(
                attempts = outcome.attempts,
                consecutive_failures,
                killed = self.scheduler.killed().len(),
                remaining = self.scheduler.unkilled_count(),
                pending_in_round = self.scheduler.pending_in_round(),
                round = self.scheduler.round(),
                "Trying a kill attempt"
            );
            let batch = self
                .scheduler
                .select_batch(&self.tree, self.config.max_simultaneous_mutations)?;
            if batch.is_empty() {
                break;
            }
            if self.bisect(baseline, &batch)? {
                consecutive_failures = 0;
                outcome.successful_attempts += 1;
            } else {
                consecutive_failures += 1;
            }
            self.scheduler.check_invariant()?;
            outcome.attempts += 1;
        }
        outcome.kills = self.scheduler.killed().len() - killed_before;
        info!(
            "Finished with program after {} attempts: {} new kills, {} mutants remaining",
            outcome.attempts,
            outcome.kills,
            self.scheduler.unkilled_count()
        );
        Ok(outcome)
    }

    /// Finds which mutants of `batch` are killed by the program, splitting the batch in halves
    /// until single mutants are isolated. Returns whether anything was killed.
    ///
    /// Halves are searched left first; mutants killed in the meantime are dropped from the
    /// right half before it is tried.
    pub fn bisect(
        &mut self,
        baseline: &ProgramBaseline,
        batch: &[MutantId],
    ) -> Result<bool, KillerError> {
        if batch.is_empty() {
            return Err(KillerError::EmptyBatch);
        }
        let mut found_kill = false;
        let mut pending: Vec<Vec<MutantId>> = vec![batch.to_vec()];
        while let Some(selection) = pending.pop() {
            let selection: Vec<MutantId> = selection
                .into_iter()
                .filter(|m| !self.scheduler.is_killed(*m))
                .collect();
            if selection.is_empty() {
                continue;
            }
            debug!("Searching for kills among {} mutant(s)", selection.len());
            let status = self.harness.try_mutants(baseline, &selection)?;
            if !status.is_kill() {
                self.scheduler.record_failed_attempt(&selection);
                continue;
            }
            if let [mutant] = selection.as_slice() {
                let mutant = *mutant;
                info!(mutant, %status, "Killed mutant");
                self.scheduler.record_kill(mutant, status);
                found_kill = true;
                self.consolidate(mutant, status, baseline)?;
                continue;
            }
            let (lhs, rhs) = selection.split_at(selection.len() / 2);
            pending.push(rhs.to_vec());
            pending.push(lhs.to_vec());
        }
        Ok(found_kill)
    }

    /// Tries each tree relative of a freshly killed mutant on its own, then reduces any
    /// miscompilations found along the way.
    fn consolidate(
        &mut self,
        mutant: MutantId,
        status: ExecutionStatus,
        baseline: &ProgramBaseline,
    ) -> Result<(), KillerError> {
        let relatives = self.tree.incompatible_mutant_ids(mutant)?;
        info!(
            "Consolidating kill of mutant {} by trying {} related mutants",
            mutant,
            relatives.len()
        );
        let mut miscompilations = Vec::new();
        if status == ExecutionStatus::MiscompilationKill {
            miscompilations.push(mutant);
        }

        let mut follow_on_kills = 0;
        for relative in relatives {
            if self.scheduler.is_killed(relative) {
                continue;
            }
            let result = self.harness.try_mutants(baseline, &[relative])?;
            if !result.is_kill() {
                self.scheduler.record_failed_attempt(&[relative]);
                continue;
            }
            self.scheduler.record_kill(relative, result);
            follow_on_kills += 1;
            if result == ExecutionStatus::MiscompilationKill {
                miscompilations.push(relative);
            }
        }
        info!(
            "Found {} follow-on kills, {} of which are miscompilations",
            follow_on_kills,
            miscompilations
                .iter()
                .filter(|&&m| m != mutant)
                .count()
        );

        if !miscompilations.is_empty() {
            let reduced = reduce::reduce_miscompilations(&mut self.reducer, miscompilations)?;
            if reduced.is_empty() {
                warn!("No miscompilation from this kill could be reduced");
            }
            self.reduced.extend(reduced);
        }
        Ok(())
    }

    pub fn report(&self) -> KillReport {
        KillReport {
            total: self.scheduler.total(),
            killed: self.scheduler.killed().len(),
            unkilled: self.scheduler.unkilled_count(),
            round: self.scheduler.round(),
            programs: self.programs,
            kills: self
                .scheduler
                .killed()
                .iter()
                .map(|(&id, &status)| KilledMutant { id, status })
                .collect(),
            reduced: self.reduced.clone(),
        }
    }
}
