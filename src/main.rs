use mutant_killer::config::{KillerConfig, OutputMismatch, TimeoutPolicy};
use mutant_killer::output;
use mutant_killer::reduce::CreduceReducer;
use mutant_killer::runner::{self, CsmithHarness};
use mutant_killer::state::{self, KillReport};
use mutant_killer::{MutantKiller, MutationTree};

use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mutant-killer", version, about = "Kill compiler mutants with randomly generated programs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for kills until every mutant is killed
    Run(RunArgs),
    /// Summary of the last run's kill report
    Status {
        /// Directory the run wrote its report to
        #[arg(long, default_value = ".")]
        output_dir: PathBuf,
        /// Output JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args)]
struct RunArgs {
    /// File containing information about mutations
    #[arg(env = "MUTANT_KILLER_MUTATION_INFO")]
    mutation_info_file: PathBuf,
    /// Path to the executable of the mutated compiler
    #[arg(env = "MUTANT_KILLER_COMPILER")]
    compiler_executable: PathBuf,
    /// Path to a Csmith checkout, built under 'build' beneath it
    #[arg(env = "MUTANT_KILLER_CSMITH_ROOT")]
    csmith_root: PathBuf,
    /// Kill attempts in a row with nothing killed before a program is abandoned
    #[arg(long, default_value = "10")]
    max_consecutive_failed_attempts_per_program: u32,
    /// Kill attempts per program, excluding work spent investigating kills
    #[arg(long, default_value = "100")]
    max_attempts_per_program: u32,
    /// Mutations enabled simultaneously when looking for kills
    #[arg(long, default_value = "64")]
    num_simultaneous_mutations: usize,
    /// Whether differing program output counts as a miscompilation kill
    #[arg(long, value_enum, default_value = "kill")]
    output_mismatch: OutputMismatch,
    /// Program reducer command, called as `<reducer> <test> <program>`
    #[arg(long, default_value = "creduce")]
    reducer: String,
    /// Scratch directory for generated programs (default: fresh temp dir)
    #[arg(long)]
    work_dir: Option<PathBuf>,
    /// Where reduced programs and the kill report are written
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,
    /// Seed for batch selection
    #[arg(long)]
    seed: Option<u64>,
    /// Stop after this many generated programs
    #[arg(long)]
    max_programs: Option<u64>,
    /// Lower bound for compile and run timeouts of mutated trials
    #[arg(long, default_value = "5")]
    min_timeout_secs: f64,
    /// Log every trial
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let exit_code = match cli.command {
        Commands::Run(args) => {
            init_logging(args.verbose);
            cmd_run(args)
        }
        Commands::Status { output_dir, json } => cmd_status(&output_dir, json),
    };

    process::exit(exit_code);
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_run(args: RunArgs) -> i32 {
    for (path, what) in [
        (&args.mutation_info_file, "Mutation info file"),
        (&args.compiler_executable, "Compiler executable"),
        (&args.csmith_root, "Csmith root"),
    ] {
        if !path.exists() {
            output::print_error(&format!("{} not found: {}", what, path.display()));
            return 2;
        }
    }
    if !(args.min_timeout_secs > 0.0 && args.min_timeout_secs.is_finite()) {
        output::print_error("--min-timeout-secs must be a positive number of seconds");
        return 2;
    }

    tracing::info!("Building the mutation tree...");
    let tree = match MutationTree::load(&args.mutation_info_file) {
        Ok(tree) => tree,
        Err(e) => {
            output::print_error(&e.to_string());
            return 2;
        }
    };
    tracing::info!(
        "Built! {} mutants in {} nodes across {} files",
        tree.num_mutants(),
        tree.num_nodes(),
        tree.roots().len()
    );

    match run_search(tree, &args) {
        Ok(report) => {
            output::print_report(&report);
            0
        }
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            3
        }
    }
}

fn run_search(tree: MutationTree, args: &RunArgs) -> anyhow::Result<KillReport> {
    let session_dir;
    let work_dir = match &args.work_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
            runner::absolute(dir)
        }
        None => {
            session_dir = tempfile::Builder::new()
                .prefix(&format!("mutant-killer-{:08x}-", fastrand::u32(..)))
                .tempdir()
                .context("Failed to create temp directory")?;
            session_dir.path().to_path_buf()
        }
    };
    let output_dir = runner::absolute(&args.output_dir);
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create {}", output_dir.display()))?;

    let timeouts = TimeoutPolicy {
        minimum: Duration::from_secs_f64(args.min_timeout_secs),
        ..TimeoutPolicy::default()
    };
    let harness = CsmithHarness::new(
        &args.compiler_executable,
        &args.csmith_root,
        &work_dir,
        timeouts.clone(),
        args.output_mismatch,
    );
    let reducer = CreduceReducer::new(
        &args.reducer,
        &runner::absolute(&args.compiler_executable),
        &runner::absolute(&args.csmith_root),
        &work_dir,
        &output_dir,
        timeouts,
    );
    let config = KillerConfig {
        max_attempts_per_program: args.max_attempts_per_program,
        max_consecutive_failed_attempts_per_program: args
            .max_consecutive_failed_attempts_per_program,
        max_simultaneous_mutations: args.num_simultaneous_mutations.max(1),
    };
    let rng = match args.seed {
        Some(seed) => fastrand::Rng::with_seed(seed),
        None => fastrand::Rng::new(),
    };
    tracing::info!("Working in {}", work_dir.display());

    let mut killer = MutantKiller::new(tree, harness, reducer, config, rng);
    while !killer.all_killed() && !reached(args.max_programs, killer.programs()) {
        killer.hunt_with_new_program()?;
        save(&killer.report(), &output_dir);
    }
    let report = killer.report();
    save(&report, &output_dir);
    Ok(report)
}

fn reached(max_programs: Option<u64>, programs: u64) -> bool {
    max_programs.is_some_and(|max| programs >= max)
}

fn save(report: &KillReport, output_dir: &Path) {
    if let Err(e) = state::save_report(report, output_dir) {
        tracing::warn!("Failed to write kill report: {}", e);
    }
}

fn cmd_status(output_dir: &Path, json_mode: bool) -> i32 {
    match state::load_report(output_dir) {
        Some(report) => {
            if json_mode {
                match serde_json::to_string(&report) {
                    Ok(json) => println!("{}", json),
                    Err(e) => {
                        output::print_error(&format!("Failed to encode report: {}", e));
                        return 3;
                    }
                }
            } else {
                output::print_report(&report);
            }
            0
        }
        None => {
            output::print_error("No previous run found. Run `mutant-killer run` first.");
            2
        }
    }
}
