use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::mutants::ProgramBaseline;

/// Limits on how hard a single generated program is worked before a new one is generated.
#[derive(Debug, Clone)]
pub struct KillerConfig {
    pub max_attempts_per_program: u32,
    pub max_consecutive_failed_attempts_per_program: u32,
    pub max_simultaneous_mutations: usize,
}

impl Default for KillerConfig {
    fn default() -> Self {
        KillerConfig {
            max_attempts_per_program: 100,
            max_consecutive_failed_attempts_per_program: 10,
            max_simultaneous_mutations: 64,
        }
    }
}

/// What a mutated program printing something different from the baseline counts as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMismatch {
    /// A miscompilation kill, queued for reduction.
    Kill,
    /// No effect; the mutant stays unkilled.
    Ignore,
}

#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    pub minimum: Duration,
    pub compile_multiplier: f64,
    pub run_multiplier: f64,
    /// Fixed bound for generating, compiling and running a fresh program without mutations.
    pub baseline: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        TimeoutPolicy {
            minimum: Duration::from_secs(5),
            compile_multiplier: 5.0,
            run_multiplier: 10.0,
            baseline: Duration::from_secs(10),
        }
    }
}

impl TimeoutPolicy {
    pub fn compile_timeout(&self, baseline: &ProgramBaseline) -> Duration {
        self.minimum
            .max(baseline.compile_time.mul_f64(self.compile_multiplier))
    }

    pub fn run_timeout(&self, baseline: &ProgramBaseline) -> Duration {
        self.minimum
            .max(baseline.execution_time.mul_f64(self.run_multiplier))
    }
}
