//! Application orchestration for covreach.
//!
//! This crate drives one supervised fuzzing campaign per test case:
//!
//! 1. Create a fresh run directory for the case
//! 2. Launch the engine through the `CampaignLauncher` port
//! 3. Poll the newest coverage artifact until full coverage or job exit
//! 4. Terminate the job on early success and always reap it
//! 5. Re-check the newest artifact once more for the authoritative verdict
//!
//! `run_matrix` repeats this for each selected case and assembles a
//! `covreach.report.v1` report.

use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use covreach_adapters_artifacts::{ArtifactError, check_run_dir};
use covreach_matrix::TestCase;
pub use covreach_ports::{CampaignJob, CampaignLauncher, Clock, EngineOptions, Sleeper};
use covreach_types::{
    CampaignEnd, CaseResult, REASON_ALL_TARGETS_COVERED, REASON_ARTIFACT_UNREADABLE,
    REASON_JOB_ERROR, REASON_LAUNCH_FAILED, REASON_NO_ARTIFACT, REASON_NO_CASES,
    REASON_RUN_DIR_ERROR, REASON_UNCOVERED_TARGET, Report, Run, RunStatus, Summary, Verdict,
};
use thiserror::Error;
use tracing::{debug, info, warn};

// ============================================================================
// System Ports
// ============================================================================

/// System clock implementation that returns the actual current time.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> chrono::DateTime<chrono::Utc> {
        chrono::Utc::now()
    }
}

/// Sleeper that blocks the current thread.
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, interval: Duration) {
        std::thread::sleep(interval);
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors that abort a case.
#[derive(Debug, Error)]
pub enum AppError {
    /// The engine could not be started.
    #[error("failed to launch campaign for {case}: {message}")]
    Launch { case: String, message: String },

    /// Checking, stopping or reaping the job failed.
    #[error("campaign job for {case} failed: {message}")]
    Job { case: String, message: String },

    /// The run directory could not be created.
    #[error("failed to create run directory '{path}': {source}")]
    RunDir {
        path: String,
        #[source]
        source: io::Error,
    },
}

impl AppError {
    /// Reason token recorded for a case aborted by this error.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::Launch { .. } => REASON_LAUNCH_FAILED,
            AppError::Job { .. } => REASON_JOB_ERROR,
            AppError::RunDir { .. } => REASON_RUN_DIR_ERROR,
        }
    }
}

// ============================================================================
// Campaign State
// ============================================================================

/// Lifecycle phases of a supervised campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CampaignPhase {
    Launching,
    Running,
    /// Full coverage was observed while the job was alive.
    EarlySucceeded,
    /// The job exited before full coverage was observed.
    NaturallyEnded,
    FinalChecking,
    Passed,
    Failed,
}

impl CampaignPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignPhase::Launching => "launching",
            CampaignPhase::Running => "running",
            CampaignPhase::EarlySucceeded => "early_succeeded",
            CampaignPhase::NaturallyEnded => "naturally_ended",
            CampaignPhase::FinalChecking => "final_checking",
            CampaignPhase::Passed => "passed",
            CampaignPhase::Failed => "failed",
        }
    }
}

impl fmt::Display for CampaignPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of supervising one campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CampaignOutcome {
    /// Verdict of the final check; authoritative for the case.
    pub verdict: Verdict,
    /// Reason token for the verdict.
    pub reason: &'static str,
    pub ended_by: CampaignEnd,
    /// Poll cycles performed while the job was alive.
    pub polls: u32,
    pub elapsed: Duration,
    /// Artifact judged by the final check.
    pub artifact: Option<PathBuf>,
    /// How the job exited, as reported by the job port.
    pub job_exit: String,
}

/// Settings shared by every case of a matrix run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub engine: EngineOptions,
    pub poll_interval: Duration,
    /// Parent directory of the per-case run directories.
    pub work_dir: PathBuf,
}

// ============================================================================
// Supervisor
// ============================================================================

fn enter(case: &str, phase: CampaignPhase) {
    info!(case, phase = %phase, "campaign phase");
}

/// Best-effort stop and reap after the job port reported an error.
fn abandon<J: CampaignJob>(job: &mut J) {
    if let Err(e) = job.terminate() {
        warn!(error = %e, "failed to terminate campaign job");
        return;
    }
    if let Err(e) = job.wait() {
        warn!(error = %e, "failed to reap campaign job");
    }
}

fn unreadable(path: String, message: &str) -> (Verdict, Option<PathBuf>, &'static str) {
    let verdict = Verdict::fail(format!(
        "coverage artifact '{path}' could not be read: {message}"
    ));
    (verdict, Some(PathBuf::from(path)), REASON_ARTIFACT_UNREADABLE)
}

/// Judge the newest artifact in `run_dir` for the final verdict.
fn final_check(run_dir: &Path) -> (Verdict, Option<PathBuf>, &'static str) {
    match check_run_dir(run_dir) {
        Ok(check) => {
            let reason = if check.verdict.success {
                REASON_ALL_TARGETS_COVERED
            } else if check.artifact.is_none() {
                REASON_NO_ARTIFACT
            } else {
                REASON_UNCOVERED_TARGET
            };
            (check.verdict, check.artifact, reason)
        }
        Err(ArtifactError::Read { path, message }) => {
            warn!(path = %path, error = %message, "final coverage artifact unreadable");
            unreadable(path, &message)
        }
    }
}

/// Run one campaign for `case` in `run_dir` and return its verdict.
///
/// The job is polled every `poll_interval`. As soon as the newest artifact
/// shows every marked line satisfied, the job is terminated. Whether it ended
/// early or on its own, the job is reaped and the newest artifact is judged
/// once more; that final verdict is the one returned.
pub fn supervise<L, S>(
    launcher: &L,
    case: &TestCase,
    run_dir: &Path,
    engine: &EngineOptions,
    poll_interval: Duration,
    sleeper: &S,
) -> Result<CampaignOutcome, AppError>
where
    L: CampaignLauncher + ?Sized,
    S: Sleeper + ?Sized,
{
    let name = case.name();
    let started = Instant::now();
    let job_error = |message: String| AppError::Job {
        case: name.clone(),
        message,
    };

    enter(&name, CampaignPhase::Launching);
    let params = case.launch_params(run_dir, engine);
    let mut job = launcher.start(&params).map_err(|message| AppError::Launch {
        case: name.clone(),
        message,
    })?;

    enter(&name, CampaignPhase::Running);
    let mut polls = 0u32;
    let ended_by = loop {
        let alive = match job.is_alive() {
            Ok(alive) => alive,
            Err(message) => {
                abandon(&mut job);
                return Err(job_error(message));
            }
        };
        if !alive {
            break CampaignEnd::JobExited;
        }

        sleeper.sleep(poll_interval);
        polls += 1;

        match check_run_dir(run_dir) {
            Ok(check) if check.verdict.success => {
                job.terminate().map_err(job_error)?;
                break CampaignEnd::EarlySuccess;
            }
            Ok(check) => debug!(
                case = %name,
                polls,
                satisfied = check.tally.satisfied(),
                targets = check.tally.total(),
                verdict = %check.verdict.message,
                "coverage incomplete"
            ),
            Err(e) => debug!(case = %name, polls, error = %e, "coverage artifact not readable yet"),
        }
    };

    enter(
        &name,
        if ended_by == CampaignEnd::EarlySuccess {
            CampaignPhase::EarlySucceeded
        } else {
            CampaignPhase::NaturallyEnded
        },
    );
    let job_exit = job.wait().map_err(job_error)?;
    debug!(case = %name, exit = %job_exit, "campaign job reaped");

    enter(&name, CampaignPhase::FinalChecking);
    let (verdict, artifact, reason) = final_check(run_dir);
    if verdict.success {
        enter(&name, CampaignPhase::Passed);
    } else {
        enter(&name, CampaignPhase::Failed);
        info!(case = %name, reason, message = %verdict.message, "coverage not reached");
    }

    Ok(CampaignOutcome {
        verdict,
        reason,
        ended_by,
        polls,
        elapsed: started.elapsed(),
        artifact,
        job_exit,
    })
}

// ============================================================================
// Run Directories
// ============================================================================

/// Create a new, empty run directory for `case` under `work_dir`.
///
/// The directory is named `<slug>-<n>` with the first free `n`. Creation with
/// `create_dir` fails on existing paths, so the returned directory is never
/// shared with an earlier or concurrent run.
pub fn fresh_run_dir(work_dir: &Path, case: &TestCase) -> Result<PathBuf, AppError> {
    let dir_error = |path: &Path, source| AppError::RunDir {
        path: path.display().to_string(),
        source,
    };
    fs::create_dir_all(work_dir).map_err(|e| dir_error(work_dir, e))?;

    let slug = case.slug();
    for n in 1..=u32::MAX {
        let candidate = work_dir.join(format!("{slug}-{n}"));
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(dir_error(&candidate, e)),
        }
    }
    Err(dir_error(
        work_dir,
        io::Error::new(io::ErrorKind::AlreadyExists, "no free run directory name"),
    ))
}

// ============================================================================
// Matrix Runs
// ============================================================================

fn millis(elapsed: Duration) -> u64 {
    u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX)
}

/// Identity fields of `case`; callers overwrite the outcome fields.
fn base_result(case: &TestCase, run_dir: &Path) -> CaseResult {
    CaseResult {
        name: case.name(),
        contract: case.contract_path.display().to_string(),
        contract_name: case.contract_name.clone(),
        coverage_mode: case.coverage_mode,
        seq_len: case.seq_len.get(),
        run_dir: run_dir.display().to_string(),
        verdict: Verdict::pass(),
        reason: REASON_ALL_TARGETS_COVERED.to_string(),
        ended_by: CampaignEnd::JobExited,
        polls: 0,
        duration_ms: 0,
        artifact: None,
        job_exit: None,
    }
}

/// Failed result for a case that could not be run to a verdict.
fn aborted(case: &TestCase, run_dir: &Path, error: &AppError, elapsed: Duration) -> CaseResult {
    warn!(case = %case.name(), reason = error.reason(), error = %error, "case aborted");
    CaseResult {
        verdict: Verdict::fail(error.to_string()),
        reason: error.reason().to_string(),
        ended_by: CampaignEnd::Aborted,
        duration_ms: millis(elapsed),
        ..base_result(case, run_dir)
    }
}

/// Run one case in a fresh run directory.
///
/// Errors that stop the case from reaching a verdict are recorded as an
/// aborted, failed result rather than returned.
pub fn run_case<L, S>(
    launcher: &L,
    case: &TestCase,
    settings: &RunSettings,
    sleeper: &S,
) -> CaseResult
where
    L: CampaignLauncher + ?Sized,
    S: Sleeper + ?Sized,
{
    let started = Instant::now();
    let run_dir = match fresh_run_dir(&settings.work_dir, case) {
        Ok(dir) => dir,
        Err(e) => return aborted(case, &settings.work_dir, &e, started.elapsed()),
    };

    match supervise(
        launcher,
        case,
        &run_dir,
        &settings.engine,
        settings.poll_interval,
        sleeper,
    ) {
        Ok(outcome) => CaseResult {
            verdict: outcome.verdict,
            reason: outcome.reason.to_string(),
            ended_by: outcome.ended_by,
            polls: outcome.polls,
            duration_ms: millis(outcome.elapsed),
            artifact: outcome.artifact.map(|p| p.display().to_string()),
            job_exit: Some(outcome.job_exit),
            ..base_result(case, &run_dir)
        },
        Err(e) => aborted(case, &run_dir, &e, started.elapsed()),
    }
}

/// Run every case in order and assemble the report.
///
/// Cases are independent: one that aborts is recorded as failed and the
/// remaining cases still run.
pub fn run_matrix<L, S, C>(
    launcher: &L,
    cases: &[TestCase],
    settings: &RunSettings,
    sleeper: &S,
    clock: &C,
) -> Report
where
    L: CampaignLauncher + ?Sized,
    S: Sleeper + ?Sized,
    C: Clock + ?Sized,
{
    let started_at = clock.now();
    info!(cases = cases.len(), work_dir = %settings.work_dir.display(), "starting matrix run");

    let results: Vec<CaseResult> = cases
        .iter()
        .map(|case| run_case(launcher, case, settings, sleeper))
        .collect();

    let report = build_report(results, started_at, clock.now());
    info!(
        passed = report.summary.passed,
        failed = report.summary.failed,
        "matrix run finished"
    );
    report
}

/// Cases in `report` that were aborted before reaching a verdict.
pub fn aborted_cases(report: &Report) -> impl Iterator<Item = &CaseResult> {
    report
        .results
        .iter()
        .filter(|r| r.ended_by == CampaignEnd::Aborted)
}

/// Aggregate case results into a summary.
pub fn summarize(results: &[CaseResult]) -> Summary {
    if results.is_empty() {
        return Summary::default();
    }

    let passed = results.iter().filter(|r| r.verdict.success).count() as u32;
    let failed = results.len() as u32 - passed;
    let (status, reasons) = if failed == 0 {
        (RunStatus::Pass, vec![REASON_ALL_TARGETS_COVERED.to_string()])
    } else {
        let reasons: BTreeSet<&str> = results
            .iter()
            .filter(|r| !r.verdict.success)
            .map(|r| r.reason.as_str())
            .collect();
        (
            RunStatus::Fail,
            reasons.into_iter().map(str::to_string).collect(),
        )
    };

    Summary {
        status,
        total: results.len() as u32,
        passed,
        failed,
        reasons,
    }
}

/// Build a report from finished case results.
pub fn build_report(
    results: Vec<CaseResult>,
    started_at: chrono::DateTime<chrono::Utc>,
    ended_at: chrono::DateTime<chrono::Utc>,
) -> Report {
    let duration_ms = (ended_at - started_at).num_milliseconds().max(0) as u64;
    Report {
        run: Run {
            started_at: started_at.to_rfc3339(),
            ended_at: Some(ended_at.to_rfc3339()),
            duration_ms: Some(duration_ms),
        },
        summary: summarize(&results),
        results,
        ..Report::default()
    }
}

/// Whether `summary` reflects a run where nothing was selected.
pub fn is_empty_run(summary: &Summary) -> bool {
    summary.status == RunStatus::Skip && summary.reasons.iter().any(|r| r == REASON_NO_CASES)
}

// ============================================================================
// Tests
// ============================================================================
