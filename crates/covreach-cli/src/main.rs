//! covreach runs a matrix of hybrid-fuzzing campaigns against instrumented
//! contracts and checks that every `test::coverage` target line is reached.
//!
//! Each case launches the engine in a fresh run directory, polls the newest
//! `covered.<timestamp>.txt` artifact, stops the engine once every target is
//! covered and reports one verdict per case.

use clap::{Parser, Subcommand, ValueEnum};
use covreach_adapters_artifacts::{check_run_dir, read_artifact};
use covreach_adapters_process::{JobOutput, ProcessLauncher};
use covreach_app::{RunSettings, SystemClock, ThreadSleeper, aborted_cases, run_matrix};
use covreach_config::{
    CliOverrides, Config, ConfigError, EffectiveConfig, JobOutputMode, discover_config,
    load_config, resolve_config, validate_effective,
};
use covreach_domain::{TargetTally, check_artifact, tally_targets};
use covreach_matrix::{MatrixError, Selection, TestCase, default_matrix, select};
use covreach_render::{DEFAULT_MAX_FAILURES, render_case_line, render_markdown, render_summary_line};
use covreach_types::{RunStatus, Verdict};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Coverage-reachability harness for hybrid smart-contract fuzzers.
#[derive(Parser)]
#[command(name = "covreach")]
#[command(
    about = "Runs fuzzing campaigns against instrumented contracts and checks that every test::coverage line is reached."
)]
#[command(version)]
struct Cli {
    /// Log debug output (overrides COVREACH_LOG)
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// CLI job output option
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliJobOutput {
    Inherit,
    Discard,
    File,
}

/// Options selecting and locating matrix cases.
#[derive(clap::Args)]
struct MatrixArgs {
    /// Path to config file (default: auto-discover covreach.toml)
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Directory containing the matrix contracts (overrides config file)
    #[arg(long)]
    contracts_dir: Option<PathBuf>,

    /// Glob matched against case names and contract names
    #[arg(long)]
    filter: Option<String>,

    /// Exact case name (`Contract/mode/seq_len`) or contract name (repeatable)
    #[arg(long = "case")]
    cases: Vec<String>,

    /// Also run cases that are disabled by default
    #[arg(long)]
    include_disabled: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the coverage matrix
    Run {
        #[command(flatten)]
        matrix: MatrixArgs,

        /// Engine executable (overrides config file)
        #[arg(long)]
        engine: Option<PathBuf>,

        /// Argument passed to the engine before the contract path (repeatable)
        #[arg(long = "engine-arg", allow_hyphen_values = true)]
        engine_args: Vec<String>,

        /// Engine seed (overrides config file)
        #[arg(long)]
        seed: Option<u64>,

        /// Engine iteration cap (overrides config file)
        #[arg(long)]
        max_iters: Option<u32>,

        /// Engine test limit (overrides config file)
        #[arg(long)]
        test_limit: Option<u32>,

        /// Seconds between coverage checks (overrides config file)
        #[arg(long)]
        poll_interval: Option<u64>,

        /// Parent directory for per-case run directories (overrides config file)
        #[arg(long)]
        work_dir: Option<PathBuf>,

        /// Where engine output goes (overrides config file)
        #[arg(long, value_enum)]
        job_output: Option<CliJobOutput>,

        /// Append engine output to this file (implies --job-output file)
        #[arg(long)]
        job_log: Option<PathBuf>,

        /// Output path for report JSON
        #[arg(long)]
        out: Option<String>,

        /// Output path for markdown summary
        #[arg(long)]
        md: Option<String>,
    },
    /// Judge the newest artifact of a run directory, or a single artifact
    Verify {
        /// Run directory to resolve the newest artifact in
        #[arg(long, conflicts_with = "artifact", required_unless_present = "artifact")]
        run_dir: Option<PathBuf>,

        /// Artifact file to judge directly
        #[arg(long)]
        artifact: Option<PathBuf>,
    },
    /// List the cases of the coverage matrix
    List {
        #[command(flatten)]
        matrix: MatrixArgs,
    },
}

/// CLI errors
#[derive(Debug, Error)]
enum CliError {
    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirCreate {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to load config: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Matrix(#[from] MatrixError),

    #[error("{0}")]
    Artifact(#[from] covreach_adapters_artifacts::ArtifactError),
}

/// Exit codes:
/// - 0: every case passed (or nothing was selected)
/// - 1: tool/runtime error, or a case that could not be run to a verdict
/// - 2: at least one case failed its coverage check
const EXIT_CODE_PASS: i32 = 0;
const EXIT_CODE_ERROR: i32 = 1;
const EXIT_CODE_FAIL: i32 = 2;

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            EXIT_CODE_ERROR
        }
    };
    std::process::exit(exit_code);
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("COVREACH_LOG").unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Result<i32, CliError> {
    match cli.command {
        Commands::Run {
            matrix,
            engine,
            engine_args,
            seed,
            max_iters,
            test_limit,
            poll_interval,
            work_dir,
            job_output,
            job_log,
            out,
            md,
        } => {
            let overrides = CliOverrides {
                program: engine,
                program_args: (!engine_args.is_empty()).then_some(engine_args),
                seed,
                max_iters,
                test_limit,
                poll_interval_secs: poll_interval,
                work_dir,
                contracts_dir: matrix.contracts_dir.clone(),
                job_output: job_output.map(|o| match o {
                    CliJobOutput::Inherit => JobOutputMode::Inherit,
                    CliJobOutput::Discard => JobOutputMode::Discard,
                    CliJobOutput::File => JobOutputMode::File,
                }),
                job_log,
            };
            run_cases(&matrix, &overrides, out, md)
        }
        Commands::Verify { run_dir, artifact } => run_verify(run_dir, artifact),
        Commands::List { matrix } => {
            let overrides = CliOverrides {
                contracts_dir: matrix.contracts_dir.clone(),
                ..Default::default()
            };
            run_list(&matrix, &overrides)
        }
    }
}

fn load_effective(
    config_path: Option<&str>,
    overrides: &CliOverrides,
) -> Result<EffectiveConfig, CliError> {
    let loaded: Option<Config> = match config_path {
        Some(path) => Some(load_config(Path::new(path))?),
        None => discover_config()?.map(|(path, config)| {
            debug!(path = %path.display(), "using discovered config");
            config
        }),
    };
    let effective = resolve_config(loaded.as_ref(), overrides);
    validate_effective(&effective)?;
    Ok(effective)
}

fn selected_cases(matrix: &MatrixArgs, contracts_dir: &Path) -> Result<Vec<TestCase>, CliError> {
    let selection = Selection {
        filter: matrix.filter.clone(),
        names: matrix.cases.clone(),
        include_disabled: matrix.include_disabled,
    };
    Ok(select(&default_matrix(contracts_dir), &selection)?)
}

fn job_output(effective: &EffectiveConfig) -> JobOutput {
    match (effective.job_output, &effective.job_log) {
        (JobOutputMode::Inherit, _) => JobOutput::Inherit,
        (JobOutputMode::Discard, _) => JobOutput::Discard,
        (JobOutputMode::File, Some(path)) => JobOutput::File(path.clone()),
        // Rejected by validate_effective.
        (JobOutputMode::File, None) => JobOutput::Discard,
    }
}

fn run_cases(
    matrix: &MatrixArgs,
    overrides: &CliOverrides,
    out: Option<String>,
    md: Option<String>,
) -> Result<i32, CliError> {
    let effective = load_effective(matrix.config.as_deref(), overrides)?;
    let cases = selected_cases(matrix, &effective.contracts_dir)?;

    let launcher = ProcessLauncher::new(job_output(&effective));
    let settings = RunSettings {
        engine: effective.engine.clone(),
        poll_interval: effective.poll_interval,
        work_dir: effective.work_dir.clone(),
    };
    let report = run_matrix(&launcher, &cases, &settings, &ThreadSleeper, &SystemClock);

    for result in &report.results {
        println!("{}", render_case_line(result));
        if !result.verdict.success {
            for line in result.verdict.message.lines() {
                println!("    {line}");
            }
        }
    }
    println!("{}", render_summary_line(&report));

    if let Some(out_path) = out {
        let json = serde_json::to_string_pretty(&report)?;
        write_output(&out_path, &json)?;
    }
    if let Some(md_path) = md {
        write_output(&md_path, &render_markdown(&report, DEFAULT_MAX_FAILURES))?;
    }

    let mut aborted = aborted_cases(&report).peekable();
    if aborted.peek().is_some() {
        for result in aborted {
            eprintln!("error: {}", result.verdict.message);
        }
        return Ok(EXIT_CODE_ERROR);
    }

    Ok(match report.summary.status {
        RunStatus::Fail => EXIT_CODE_FAIL,
        RunStatus::Pass | RunStatus::Skip => EXIT_CODE_PASS,
    })
}

fn run_verify(run_dir: Option<PathBuf>, artifact: Option<PathBuf>) -> Result<i32, CliError> {
    let (verdict, tally): (Verdict, TargetTally) = match (run_dir, artifact) {
        (_, Some(path)) => {
            let text = read_artifact(&path)?;
            (check_artifact(&text), tally_targets(&text))
        }
        (Some(dir), None) => {
            let check = check_run_dir(&dir)?;
            (check.verdict, check.tally)
        }
        // clap requires one of the two.
        (None, None) => (Verdict::no_artifact(), TargetTally::default()),
    };

    if verdict.success {
        println!(
            "pass: {} of {} marked lines satisfied",
            tally.satisfied(),
            tally.total()
        );
        Ok(EXIT_CODE_PASS)
    } else {
        println!("{}", verdict.message);
        Ok(EXIT_CODE_FAIL)
    }
}

fn run_list(matrix: &MatrixArgs, overrides: &CliOverrides) -> Result<i32, CliError> {
    let effective = load_effective(matrix.config.as_deref(), overrides)?;
    for case in selected_cases(matrix, &effective.contracts_dir)? {
        let marker = if case.enabled { "" } else { " [disabled]" };
        println!("{}\t{}{}", case.name(), case.contract_path.display(), marker);
    }
    Ok(EXIT_CODE_PASS)
}

fn write_output(path: &str, content: &str) -> Result<(), CliError> {
    ensure_parent_dir(path)?;
    fs::write(path, content).map_err(|e| CliError::FileWrite {
        path: path.to_string(),
        source: e,
    })
}

/// Ensure the parent directory of a path exists
fn ensure_parent_dir(path: &str) -> Result<(), CliError> {
    if let Some(parent) = Path::new(path).parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| CliError::DirCreate {
            path: parent.display().to_string(),
            source: e,
        })?;
    }
    Ok(())
}
