use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{OutputMismatch, TimeoutPolicy};
use crate::error::KillerError;
use crate::killer::Harness;
use crate::mutants::{ExecutionStatus, MutantId, ProgramBaseline};

/// Comma-separated mutant IDs the compiler under test enables. Unset means none.
pub const ENABLED_MUTATION_ENV: &str = "DREDD_ENABLED_MUTATION";

pub const PROGRAM_FILE: &str = "__prog.c";
const BASELINE_EXECUTABLE: &str = "__prog";
const MUTATED_EXECUTABLE: &str = "__prog_mutated";

const POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Debug)]
pub enum ProcessOutcome {
    Completed {
        success: bool,
        stdout: Vec<u8>,
        elapsed: Duration,
    },
    TimedOut,
}

/// Runs `cmd` to completion or until `timeout` passes, killing it in the latter case.
/// Stdout is captured only when asked for; stderr is always discarded.
pub fn run_with_timeout(
    cmd: &mut Command,
    timeout: Duration,
    capture_stdout: bool,
) -> std::io::Result<ProcessOutcome> {
    let start = Instant::now();
    let mut child = cmd
        .stdin(Stdio::null())
        .stdout(if capture_stdout {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stderr(Stdio::null())
        .spawn()?;

    // Drained on a thread so a chatty child never blocks on a full pipe.
    let reader = child.stdout.take().map(|mut stdout| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            buf
        })
    });

    loop {
        let polled = match child.try_wait() {
            Ok(polled) => polled,
            Err(e) => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(e);
            }
        };
        match polled {
            Some(status) => {
                let elapsed = start.elapsed();
                let stdout = reader
                    .map(|handle| handle.join().unwrap_or_default())
                    .unwrap_or_default();
                return Ok(ProcessOutcome::Completed {
                    success: status.success(),
                    stdout,
                    elapsed,
                });
            }
            None => {
                if start.elapsed() > timeout {
                    let _ = child.kill();
                    let _ = child.wait();
                    // The reader is left detached: a grandchild may still hold the pipe open.
                    return Ok(ProcessOutcome::TimedOut);
                }
                std::thread::sleep(POLL_INTERVAL);
            }
        }
    }
}

pub fn parse_command(cmd: &str) -> (String, Vec<String>) {
    let parts: Vec<&str> = cmd.split_whitespace().collect();
    if parts.len() > 1 {
        (
            parts[0].to_string(),
            parts[1..].iter().map(|s| s.to_string()).collect(),
        )
    } else {
        (cmd.to_string(), vec![])
    }
}

/// Resolves `path` against the current directory, leaving absolute paths alone.
pub fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Csmith's runtime headers, in the order they are passed to the compiler.
pub fn include_dirs(csmith_root: &Path) -> [PathBuf; 2] {
    [
        csmith_root.join("runtime"),
        csmith_root.join("build").join("runtime"),
    ]
}

pub fn fingerprint_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(unix)]
pub fn make_executable(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    let mut permissions = std::fs::metadata(path)?.permissions();
    permissions.set_mode(permissions.mode() | 0o111);
    std::fs::set_permissions(path, permissions)
}

#[cfg(not(unix))]
pub fn make_executable(_path: &Path) -> std::io::Result<()> {
    Ok(())
}

/// Generates programs with Csmith and compiles them with the mutated compiler, staging
/// everything in one working directory that is overwritten between trials.
pub struct CsmithHarness {
    compiler: PathBuf,
    csmith_root: PathBuf,
    work_dir: PathBuf,
    timeouts: TimeoutPolicy,
    output_mismatch: OutputMismatch,
}

impl CsmithHarness {
    pub fn new(
        compiler: &Path,
        csmith_root: &Path,
        work_dir: &Path,
        timeouts: TimeoutPolicy,
        output_mismatch: OutputMismatch,
    ) -> Self {
        CsmithHarness {
            compiler: absolute(compiler),
            csmith_root: absolute(csmith_root),
            work_dir: absolute(work_dir),
            timeouts,
            output_mismatch,
        }
    }

    pub fn program_path(&self) -> PathBuf {
        self.work_dir.join(PROGRAM_FILE)
    }

    fn generator(&self) -> PathBuf {
        self.csmith_root.join("build").join("src").join("csmith")
    }

    /// The compiler invocation with no mutations enabled.
    fn compile_command(&self, output: &Path) -> Command {
        let [runtime, build_runtime] = include_dirs(&self.csmith_root);
        let mut cmd = Command::new(&self.compiler);
        cmd.arg("-O3")
            .arg("-I")
            .arg(runtime)
            .arg("-I")
            .arg(build_runtime)
            .arg(self.program_path())
            .arg("-o")
            .arg(output)
            .current_dir(&self.work_dir)
            .env_remove(ENABLED_MUTATION_ENV);
        cmd
    }

    fn run(
        &self,
        cmd: &mut Command,
        timeout: Duration,
        capture_stdout: bool,
    ) -> Result<ProcessOutcome, KillerError> {
        let program = cmd.get_program().to_string_lossy().to_string();
        run_with_timeout(cmd, timeout, capture_stdout)
            .map_err(|e| KillerError::io(format!("failed to run {}", program), e))
    }

    /// One attempt at establishing a baseline; `None` means try again with a new program.
    fn try_generate(&self) -> Result<Option<ProgramBaseline>, KillerError> {
        let program = self.program_path();
        let mut csmith = Command::new(self.generator());
        csmith.arg("-o").arg(&program).current_dir(&self.work_dir);
        match self.run(&mut csmith, self.timeouts.baseline, false)? {
            ProcessOutcome::Completed { success: true, .. } => {}
            ProcessOutcome::Completed { .. } => {
                warn!("csmith failed");
                return Ok(None);
            }
            ProcessOutcome::TimedOut => {
                warn!("csmith timed out");
                return Ok(None);
            }
        }

        let executable = self.work_dir.join(BASELINE_EXECUTABLE);
        let compile_time = match self.run(
            &mut self.compile_command(&executable),
            self.timeouts.baseline,
            false,
        )? {
            ProcessOutcome::Completed {
                success: true,
                elapsed,
                ..
            } => elapsed,
            ProcessOutcome::Completed { .. } => {
                warn!("compilation with non-mutated compiler failed");
                return Ok(None);
            }
            ProcessOutcome::TimedOut => {
                warn!("compilation with non-mutated compiler timed out");
                return Ok(None);
            }
        };

        let (expected_output, execution_time) =
            match self.run(&mut Command::new(&executable), self.timeouts.baseline, true)? {
                ProcessOutcome::Completed {
                    success: true,
                    stdout,
                    elapsed,
                } => (stdout, elapsed),
                ProcessOutcome::Completed { .. } => {
                    warn!("execution of generated program compiled with non-mutated compiler failed");
                    return Ok(None);
                }
                ProcessOutcome::TimedOut => {
                    warn!("execution of generated program compiled with non-mutated compiler timed out");
                    return Ok(None);
                }
            };

        let fingerprint = fingerprint_file(&executable).map_err(|e| {
            KillerError::io(format!("failed to read {}", executable.display()), e)
        })?;
        Ok(Some(ProgramBaseline {
            compile_time,
            execution_time,
            expected_output,
            fingerprint,
        }))
    }
}

impl Harness for CsmithHarness {
    fn generate_program(&mut self) -> Result<ProgramBaseline, KillerError> {
        loop {
            if let Some(baseline) = self.try_generate()? {
                return Ok(baseline);
            }
        }
    }

    fn try_mutants(
        &mut self,
        baseline: &ProgramBaseline,
        mutants: &[MutantId],
    ) -> Result<ExecutionStatus, KillerError> {
        let executable = self.work_dir.join(MUTATED_EXECUTABLE);
        // A stale executable must never be mistaken for this compile's output.
        if let Err(e) = std::fs::remove_file(&executable) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(KillerError::io(
                    format!("failed to remove {}", executable.display()),
                    e,
                ));
            }
        }

        let mut compile = self.compile_command(&executable);
        if !mutants.is_empty() {
            let ids: Vec<String> = mutants.iter().map(|m| m.to_string()).collect();
            compile.env(ENABLED_MUTATION_ENV, ids.join(","));
        }
        match self.run(&mut compile, self.timeouts.compile_timeout(baseline), false)? {
            ProcessOutcome::TimedOut => {
                info!("WEAK KILL: Compilation with mutated compiler timed out.");
                return Ok(ExecutionStatus::CompileTimeoutKill);
            }
            ProcessOutcome::Completed { success: false, .. } => {
                info!("WEAK KILL: Compilation with mutated compiler failed.");
                return Ok(ExecutionStatus::CompileFailKill);
            }
            ProcessOutcome::Completed { success: true, .. } => {}
        }

        let fingerprint = match fingerprint_file(&executable) {
            Ok(fingerprint) => fingerprint,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("WEAK KILL: Mutated compiler succeeded without producing an executable.");
                return Ok(ExecutionStatus::CompileFailKill);
            }
            Err(e) => {
                return Err(KillerError::io(
                    format!("failed to read {}", executable.display()),
                    e,
                ));
            }
        };
        if fingerprint == baseline.fingerprint {
            debug!("Binaries are the same - not interesting");
            return Ok(ExecutionStatus::NoEffect);
        }

        debug!("Different binaries!");
        let outcome = run_with_timeout(
            &mut Command::new(&executable),
            self.timeouts.run_timeout(baseline),
            true,
        );
        let stdout = match outcome {
            Err(e) => {
                info!("STRONG KILL: Program compiled with mutated compiler could not be started: {}", e);
                return Ok(ExecutionStatus::RunFailKill);
            }
            Ok(ProcessOutcome::TimedOut) => {
                info!("STRONG KILL: Execution of program compiled with mutated compiler timed out.");
                return Ok(ExecutionStatus::RunTimeoutKill);
            }
            Ok(ProcessOutcome::Completed { success: false, .. }) => {
                info!("STRONG KILL: Execution of program compiled with mutated compiler failed.");
                return Ok(ExecutionStatus::RunFailKill);
            }
            Ok(ProcessOutcome::Completed { stdout, .. }) => stdout,
        };

        if stdout != baseline.expected_output {
            info!("VERY STRONG KILL: Execution results from program compiled with mutated compiler are different!");
            return Ok(match self.output_mismatch {
                OutputMismatch::Kill => ExecutionStatus::MiscompilationKill,
                OutputMismatch::Ignore => ExecutionStatus::NoEffect,
            });
        }

        debug!("Same execution results - not interesting");
        Ok(ExecutionStatus::DifferentBinariesSameResult)
    }
}
