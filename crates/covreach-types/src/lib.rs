//! Core types and DTOs for covreach.
//!
//! This crate defines the data transfer objects shared by every covreach
//! crate: coverage modes, verdicts, per-case results and the report schema.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Schema and Marker Constants
// ============================================================================

/// Schema identifier for the covreach matrix report format.
pub const SCHEMA_ID: &str = "covreach.report.v1";

/// Substring that marks an instrumented source line as a coverage target.
pub const TARGET_MARKER: &str = "test::coverage";

/// Status character for a line reached by execution.
pub const STATUS_COVERED: char = '*';

/// Status character for a line explicitly excluded from coverage.
pub const STATUS_EXCLUDED: char = 'e';

/// File name prefix of coverage artifacts written by the engine.
pub const ARTIFACT_PREFIX: &str = "covered.";

/// File name suffix of coverage artifacts written by the engine.
pub const ARTIFACT_SUFFIX: &str = ".txt";

/// Verdict message used while no artifact has been produced.
pub const NO_ARTIFACT_MESSAGE: &str = "no coverage artifact available yet";

// ============================================================================
// Reason Tokens
// ============================================================================

/// Reason: every marked target line was reached.
pub const REASON_ALL_TARGETS_COVERED: &str = "all_targets_covered";

/// Reason: at least one marked target line was not reached.
pub const REASON_UNCOVERED_TARGET: &str = "uncovered_target";

/// Reason: the run directory never received a coverage artifact.
pub const REASON_NO_ARTIFACT: &str = "no_artifact";

/// Reason: the newest artifact could not be read at final check time.
pub const REASON_ARTIFACT_UNREADABLE: &str = "artifact_unreadable";

/// Reason: the engine could not be started for the case.
pub const REASON_LAUNCH_FAILED: &str = "launch_failed";

/// Reason: checking, stopping or reaping the job failed.
pub const REASON_JOB_ERROR: &str = "job_error";

/// Reason: the case's run directory could not be created.
pub const REASON_RUN_DIR_ERROR: &str = "run_dir_error";

/// Reason: the matrix selection was empty.
pub const REASON_NO_CASES: &str = "no_cases";

// ============================================================================
// Coverage Mode
// ============================================================================

/// Strategy tag controlling how the engine credits coverage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CoverageMode {
    /// Instruction-level coverage.
    Inst,
    /// Instruction-level coverage tracked across a transaction sequence.
    InstTxSeq,
    /// Path-sensitive coverage with relaxed matching.
    PathRelaxed,
}

impl CoverageMode {
    /// All modes understood by the engine.
    pub const ALL: [CoverageMode; 3] = [
        CoverageMode::Inst,
        CoverageMode::InstTxSeq,
        CoverageMode::PathRelaxed,
    ];

    /// Engine command-line tag for this mode.
    pub fn as_str(&self) -> &'static str {
        match self {
            CoverageMode::Inst => "inst",
            CoverageMode::InstTxSeq => "inst-tx-seq",
            CoverageMode::PathRelaxed => "path-relaxed",
        }
    }
}

impl fmt::Display for CoverageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a coverage mode tag is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown coverage mode '{0}' (expected inst, inst-tx-seq or path-relaxed)")]
pub struct UnknownCoverageMode(pub String);

impl FromStr for CoverageMode {
    type Err = UnknownCoverageMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CoverageMode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| UnknownCoverageMode(s.to_string()))
    }
}

// ============================================================================
// Verdict
// ============================================================================

/// Success/failure judgment for one coverage check.
///
/// `message` is empty on success and otherwise explains the first problem found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    pub success: bool,
    pub message: String,
}

impl Verdict {
    /// A passing verdict with an empty message.
    pub fn pass() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    /// A failing verdict carrying a diagnostic message.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }

    /// The interim verdict used before any artifact exists.
    pub fn no_artifact() -> Self {
        Self::fail(NO_ARTIFACT_MESSAGE)
    }
}

// ============================================================================
// Campaign Results
// ============================================================================

/// How the supervised job came to an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignEnd {
    /// The harness observed full coverage and terminated the job.
    EarlySuccess,
    /// The job exited on its own before full coverage was observed.
    JobExited,
    /// The case was abandoned after a launch, job or run-directory error.
    Aborted,
}

impl CampaignEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            CampaignEnd::EarlySuccess => "early_success",
            CampaignEnd::JobExited => "job_exited",
            CampaignEnd::Aborted => "aborted",
        }
    }
}

/// Overall status of a matrix run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pass,
    Fail,
    Skip,
}

/// Outcome of a single test case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    /// Stable case name (`<ContractName>/<mode>/<seq_len>`).
    pub name: String,
    /// Contract source path handed to the engine.
    pub contract: String,
    /// Contract name within the source.
    pub contract_name: String,
    pub coverage_mode: CoverageMode,
    pub seq_len: u32,
    /// Run directory the engine wrote its artifacts into.
    pub run_dir: String,
    /// The authoritative final verdict.
    pub verdict: Verdict,
    /// Reason token for the verdict.
    pub reason: String,
    pub ended_by: CampaignEnd,
    /// Number of poll cycles performed while the job was alive.
    pub polls: u32,
    pub duration_ms: u64,
    /// Artifact judged by the final check, if any existed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    /// Exit description reported by the job, if known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_exit: Option<String>,
}

// ============================================================================
// Report
// ============================================================================

/// Information about the tool that generated the report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
}

impl Default for Tool {
    fn default() -> Self {
        Self {
            name: "covreach".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            commit: None,
        }
    }
}

/// Timing of a matrix run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Run {
    /// RFC 3339 start timestamp.
    pub started_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

/// Aggregated counts over all case results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub status: RunStatus,
    pub total: u32,
    pub passed: u32,
    pub failed: u32,
    /// Reason tokens explaining the status.
    pub reasons: Vec<String>,
}

impl Default for Summary {
    fn default() -> Self {
        Self {
            status: RunStatus::Skip,
            total: 0,
            passed: 0,
            failed: 0,
            reasons: vec![REASON_NO_CASES.to_string()],
        }
    }
}

/// The complete matrix report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub schema: String,
    pub tool: Tool,
    pub run: Run,
    pub summary: Summary,
    pub results: Vec<CaseResult>,
}

impl Default for Report {
    fn default() -> Self {
        Self {
            schema: SCHEMA_ID.to_string(),
            tool: Tool::default(),
            run: Run::default(),
            summary: Summary::default(),
            results: Vec::new(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
