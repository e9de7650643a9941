//! Shared port traits and boundary DTOs for covreach's hexagonal architecture.

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use covreach_types::CoverageMode;

/// Seed handed to the engine so campaigns are reproducible.
pub const DEFAULT_SEED: u64 = 46541521;

/// Default cap on engine iterations.
pub const DEFAULT_MAX_ITERS: u32 = 10;

/// Default cap on the number of test executions.
pub const DEFAULT_TEST_LIMIT: u32 = 10_000;

/// Engine-wide launch settings shared by every case of a matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineOptions {
    /// Engine executable (looked up on `PATH` when relative).
    pub program: PathBuf,
    /// Arguments placed before the contract path, e.g. a wrapper script.
    pub program_args: Vec<String>,
    /// Engine test mode, `assertion` for this harness.
    pub test_mode: String,
    pub seed: u64,
    pub max_iters: u32,
    pub test_limit: u32,
    /// Pass `--debug` to the engine.
    pub debug: bool,
    /// Engine log destination (`--logs`).
    pub logs: String,
    /// Pass `--no-display` to the engine.
    pub no_display: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            program: PathBuf::from("hybrid-echidna"),
            program_args: Vec::new(),
            test_mode: "assertion".to_string(),
            seed: DEFAULT_SEED,
            max_iters: DEFAULT_MAX_ITERS,
            test_limit: DEFAULT_TEST_LIMIT,
            debug: true,
            logs: "stdout".to_string(),
            no_display: true,
        }
    }
}

/// Fully resolved launch parameters for one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchParams {
    pub program: PathBuf,
    pub program_args: Vec<String>,
    pub contract: PathBuf,
    pub contract_name: String,
    pub test_mode: String,
    /// Run directory, passed as the engine's corpus directory.
    pub corpus_dir: PathBuf,
    pub seq_len: u32,
    pub seed: u64,
    pub max_iters: u32,
    pub test_limit: u32,
    pub coverage_mode: CoverageMode,
    pub debug: bool,
    pub logs: String,
    pub no_display: bool,
}

impl LaunchParams {
    /// Engine arguments, in the order the engine documents them.
    pub fn args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = self.program_args.iter().map(OsString::from).collect();
        let engine_args: Vec<OsString> = vec![
            self.contract.clone().into(),
            "--contract".into(),
            self.contract_name.clone().into(),
            "--test-mode".into(),
            self.test_mode.clone().into(),
            "--corpus-dir".into(),
            self.corpus_dir.clone().into(),
            "--seq-len".into(),
            self.seq_len.to_string().into(),
            "--seed".into(),
            self.seed.to_string().into(),
            "--max-iters".into(),
            self.max_iters.to_string().into(),
            "--test-limit".into(),
            self.test_limit.to_string().into(),
            "--cov-mode".into(),
            self.coverage_mode.as_str().into(),
        ];
        args.extend(engine_args);
        if self.debug {
            args.push("--debug".into());
        }
        args.push("--logs".into());
        args.push(self.logs.clone().into());
        if self.no_display {
            args.push("--no-display".into());
        }
        args
    }

    /// Human-readable command line, for logs.
    pub fn command_line(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Port for a running fuzzing job.
///
/// Implementations own the underlying execution context. The supervisor calls
/// `terminate` at most once and always calls `wait` before judging artifacts.
pub trait CampaignJob {
    /// Returns `true` while the job has not exited.
    fn is_alive(&mut self) -> Result<bool, String>;

    /// Request the job to stop.
    fn terminate(&mut self) -> Result<(), String>;

    /// Block until the job has exited and describe how it exited.
    fn wait(&mut self) -> Result<String, String>;
}

/// Port for starting fuzzing jobs in an isolated execution context.
pub trait CampaignLauncher {
    type Job: CampaignJob;

    /// Start a job. Failure to start is fatal for the case.
    fn start(&self, params: &LaunchParams) -> Result<Self::Job, String>;
}

/// Port for suspending the polling loop between checks.
pub trait Sleeper {
    fn sleep(&self, interval: Duration);
}

/// Port for obtaining the current UTC time.
pub trait Clock {
    /// Returns the current time in UTC.
    fn now(&self) -> chrono::DateTime<chrono::Utc>;
}
