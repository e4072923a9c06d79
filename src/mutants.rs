use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Identifier of one mutant, densely packed from 0 across all source files.
pub type MutantId = u32;

/// Outcome of compiling and running a program with a set of mutants enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    NoEffect,
    DifferentBinariesSameResult,
    CompileFailKill,
    CompileTimeoutKill,
    RunFailKill,
    RunTimeoutKill,
    MiscompilationKill,
}

impl ExecutionStatus {
    pub fn is_kill(self) -> bool {
        !matches!(
            self,
            ExecutionStatus::NoEffect | ExecutionStatus::DifferentBinariesSameResult
        )
    }

    /// Weak, strong or very strong, matching how kills are reported.
    pub fn strength(self) -> Option<&'static str> {
        match self {
            ExecutionStatus::NoEffect | ExecutionStatus::DifferentBinariesSameResult => None,
            ExecutionStatus::CompileFailKill | ExecutionStatus::CompileTimeoutKill => Some("weak"),
            ExecutionStatus::RunFailKill | ExecutionStatus::RunTimeoutKill => Some("strong"),
            ExecutionStatus::MiscompilationKill => Some("very strong"),
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ExecutionStatus::NoEffect => "NO_EFFECT",
            ExecutionStatus::DifferentBinariesSameResult => "DIFFERENT_BINARIES_SAME_RESULT",
            ExecutionStatus::CompileFailKill => "COMPILE_FAIL_KILL",
            ExecutionStatus::CompileTimeoutKill => "COMPILE_TIMEOUT_KILL",
            ExecutionStatus::RunFailKill => "RUN_FAIL_KILL",
            ExecutionStatus::RunTimeoutKill => "RUN_TIMEOUT_KILL",
            ExecutionStatus::MiscompilationKill => "MISCOMPILATION_KILL",
        };
        f.write_str(name)
    }
}

/// Ground truth for one generated program, measured with the unmutated compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramBaseline {
    pub compile_time: Duration,
    pub execution_time: Duration,
    pub expected_output: Vec<u8>,
    /// Hex SHA-256 of the unmutated executable.
    pub fingerprint: String,
}
