//! Triage of miscompilation kills: minimize the failing program with an external reducer and
//! fold together mutants that the minimized program kills as well.

use std::path::{Path, PathBuf};
use std::process::Command;

use askama::Template;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::TimeoutPolicy;
use crate::error::KillerError;
use crate::mutants::MutantId;
use crate::runner::{self, ENABLED_MUTATION_ENV, PROGRAM_FILE};

const INTERESTINGNESS_TEST: &str = "__interesting.sh";
const REDUCTION_DIR: &str = "reduction";

/// One minimized program and every mutant it kills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReducedKill {
    pub mutants: Vec<MutantId>,
    pub path: PathBuf,
}

pub trait Reducer {
    /// Shrinks a fresh copy of the current failing program while it still kills `mutant`.
    /// Returns false if the reducer gave up.
    fn reduce(&mut self, mutant: MutantId) -> Result<bool, KillerError>;

    /// Whether the most recently reduced program also kills `mutant`.
    fn kills(&mut self, mutant: MutantId) -> Result<bool, KillerError>;

    /// Stores the most recently reduced program under a name derived from `mutants`.
    fn persist(&mut self, mutants: &[MutantId]) -> Result<PathBuf, KillerError>;
}

/// Reduces each queued miscompilation in turn. Candidates that the reduced program of an
/// earlier one also kills are merged into its group instead of being reduced themselves.
pub fn reduce_miscompilations<R: Reducer + ?Sized>(
    reducer: &mut R,
    mut queue: Vec<MutantId>,
) -> Result<Vec<ReducedKill>, KillerError> {
    let mut reduced = Vec::new();
    while let Some(mutant) = queue.pop() {
        if !reducer.reduce(mutant)? {
            // The mutant was just confirmed to miscompile, so this points at nondeterminism.
            warn!("Reduction failed for mutant {}", mutant);
            continue;
        }
        let mut killed_by_reduced = vec![mutant];
        let mut index = 0;
        while index < queue.len() {
            if reducer.kills(queue[index])? {
                info!("Reduced file kills mutant {}", queue[index]);
                killed_by_reduced.push(queue.remove(index));
            } else {
                index += 1;
            }
        }
        killed_by_reduced.sort_unstable();
        let path = reducer.persist(&killed_by_reduced)?;
        info!(
            "Found {} miscompilation kills from a reduced test case, saved to {}",
            killed_by_reduced.len(),
            path.display()
        );
        reduced.push(ReducedKill {
            mutants: killed_by_reduced,
            path,
        });
    }
    Ok(reduced)
}

/// `__kills_3_17.c` for mutants 3 and 17.
pub fn reduced_file_name(mutants: &[MutantId]) -> String {
    let ids: Vec<String> = mutants.iter().map(|m| m.to_string()).collect();
    format!("__kills_{}.c", ids.join("_"))
}

#[derive(Template)]
#[template(path = "interesting.sh", escape = "none")]
struct InterestingnessTest<'a> {
    compiler: String,
    runtime_include: String,
    build_runtime_include: String,
    program: &'a str,
    mutation_ids: String,
    env_var: &'a str,
    compile_timeout: u64,
    run_timeout: u64,
}

/// Drives a C-Reduce compatible tool: `<reducer> <interestingness test> <program>`.
pub struct CreduceReducer {
    command: String,
    compiler: PathBuf,
    csmith_root: PathBuf,
    work_dir: PathBuf,
    output_dir: PathBuf,
    timeouts: TimeoutPolicy,
}

impl CreduceReducer {
    pub fn new(
        command: &str,
        compiler: &Path,
        csmith_root: &Path,
        work_dir: &Path,
        output_dir: &Path,
        timeouts: TimeoutPolicy,
    ) -> Self {
        CreduceReducer {
            command: command.to_string(),
            compiler: compiler.to_path_buf(),
            csmith_root: csmith_root.to_path_buf(),
            work_dir: work_dir.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            timeouts,
        }
    }

    fn reduction_dir(&self) -> PathBuf {
        self.work_dir.join(REDUCTION_DIR)
    }

    pub fn render_test(&self, mutants: &[MutantId]) -> Result<String, KillerError> {
        let [runtime, build_runtime] = runner::include_dirs(&self.csmith_root);
        let ids: Vec<String> = mutants.iter().map(|m| m.to_string()).collect();
        let test = InterestingnessTest {
            compiler: self.compiler.display().to_string(),
            runtime_include: runtime.display().to_string(),
            build_runtime_include: build_runtime.display().to_string(),
            program: PROGRAM_FILE,
            mutation_ids: ids.join(","),
            env_var: ENABLED_MUTATION_ENV,
            compile_timeout: self.timeouts.baseline.as_secs().max(1),
            run_timeout: self.timeouts.baseline.as_secs().max(1),
        };
        Ok(test.render()?)
    }

    fn write_test(&self, mutant: MutantId) -> Result<PathBuf, KillerError> {
        let path = self.reduction_dir().join(INTERESTINGNESS_TEST);
        let script = self.render_test(&[mutant])?;
        std::fs::write(&path, script)
            .map_err(|e| KillerError::io(format!("failed to write {}", path.display()), e))?;
        runner::make_executable(&path)
            .map_err(|e| KillerError::io(format!("failed to chmod {}", path.display()), e))?;
        Ok(path)
    }
}

impl Reducer for CreduceReducer {
    fn reduce(&mut self, mutant: MutantId) -> Result<bool, KillerError> {
        let dir = self.reduction_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|e| KillerError::io(format!("failed to create {}", dir.display()), e))?;
        let source = self.work_dir.join(PROGRAM_FILE);
        std::fs::copy(&source, dir.join(PROGRAM_FILE))
            .map_err(|e| KillerError::io(format!("failed to copy {}", source.display()), e))?;
        let test = self.write_test(mutant)?;

        let [runtime, build_runtime] = runner::include_dirs(&self.csmith_root);
        let (program, args) = runner::parse_command(&self.command);
        info!("Reducing program for mutant {} with {}", mutant, program);
        let status = Command::new(&program)
            .args(&args)
            .arg(&test)
            .arg(PROGRAM_FILE)
            .current_dir(&dir)
            .env(
                "CREDUCE_INCLUDE_PATH",
                format!("{}:{}", runtime.display(), build_runtime.display()),
            )
            .status()
            .map_err(|e| KillerError::io(format!("failed to run {}", program), e))?;
        Ok(status.success())
    }

    fn kills(&mut self, mutant: MutantId) -> Result<bool, KillerError> {
        let test = self.write_test(mutant)?;
        let status = Command::new(&test)
            .current_dir(self.reduction_dir())
            .status()
            .map_err(|e| KillerError::io(format!("failed to run {}", test.display()), e))?;
        Ok(status.success())
    }

    fn persist(&mut self, mutants: &[MutantId]) -> Result<PathBuf, KillerError> {
        std::fs::create_dir_all(&self.output_dir).map_err(|e| {
            KillerError::io(format!("failed to create {}", self.output_dir.display()), e)
        })?;
        let destination = self.output_dir.join(reduced_file_name(mutants));
        let reduced = self.reduction_dir().join(PROGRAM_FILE);
        std::fs::copy(&reduced, &destination).map_err(|e| {
            KillerError::io(format!("failed to save {}", destination.display()), e)
        })?;
        Ok(destination)
    }
}
