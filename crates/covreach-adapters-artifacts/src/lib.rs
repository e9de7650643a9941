//! Coverage artifact adapter for covreach.
//!
//! The fuzzing engine drops timestamped snapshots named `covered.<timestamp>.txt`
//! into its run directory. This crate finds the newest snapshot and judges it
//! with the pure rules from `covreach-domain`. It never writes or deletes files.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use covreach_domain::{TargetTally, check_artifact, tally_targets};
use covreach_types::{ARTIFACT_PREFIX, ARTIFACT_SUFFIX, Verdict};
use thiserror::Error;
use tracing::trace;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while reading an artifact.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArtifactError {
    /// The artifact vanished or could not be read.
    #[error("failed to read coverage artifact '{path}': {message}")]
    Read { path: String, message: String },
}

// ============================================================================
// Resolution
// ============================================================================

/// Timestamp of an artifact, ordered numerically at any width.
///
/// Only the significant digits are kept, so `007` and `7` are equal and
/// stamps too wide for any integer type still order correctly.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactStamp(String);

impl ArtifactStamp {
    /// Significant digits of the stamp (`"0"` for zero).
    pub fn digits(&self) -> &str {
        &self.0
    }
}

impl Ord for ArtifactStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0
            .len()
            .cmp(&other.0.len())
            .then_with(|| self.0.cmp(&other.0))
    }
}

impl PartialOrd for ArtifactStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Extract the timestamp from an artifact file name.
///
/// Returns `None` for names that do not follow `covered.<digits>.txt`.
///
/// # Examples
///
/// ```
/// use covreach_adapters_artifacts::artifact_timestamp;
///
/// let stamp = artifact_timestamp("covered.1700000000.txt").unwrap();
/// assert_eq!(stamp.digits(), "1700000000");
/// assert!(artifact_timestamp("covered.10.txt") > artifact_timestamp("covered.9.txt"));
/// assert_eq!(artifact_timestamp("covered.1700000000.lcov"), None);
/// assert_eq!(artifact_timestamp("covered.latest.txt"), None);
/// assert_eq!(artifact_timestamp("corpus.txt"), None);
/// ```
pub fn artifact_timestamp(file_name: &str) -> Option<ArtifactStamp> {
    let digits = file_name
        .strip_prefix(ARTIFACT_PREFIX)?
        .strip_suffix(ARTIFACT_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let significant = digits.trim_start_matches('0');
    let significant = if significant.is_empty() { "0" } else { significant };
    Some(ArtifactStamp(significant.to_string()))
}

/// List every artifact in `dir`, oldest first.
///
/// A missing or unreadable directory yields an empty list. Entries that vanish
/// mid-scan are skipped; the next poll will see the directory as it is then.
pub fn list_artifacts(dir: &Path) -> Vec<(ArtifactStamp, PathBuf)> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };

    let mut artifacts: Vec<(ArtifactStamp, PathBuf)> = entries
        .filter_map(Result::ok)
        .filter_map(|entry| {
            let name = entry.file_name();
            let timestamp = artifact_timestamp(name.to_str()?)?;
            let path = entry.path();
            path.is_file().then_some((timestamp, path))
        })
        .collect();

    // Equal timestamps (e.g. zero-padded names) fall back to name order.
    artifacts.sort();
    artifacts
}

/// Resolve the most recent artifact in `dir`, if any.
pub fn latest_artifact(dir: &Path) -> Option<PathBuf> {
    let latest = list_artifacts(dir).pop().map(|(_, path)| path);
    trace!(dir = %dir.display(), latest = ?latest, "resolved latest artifact");
    latest
}

// ============================================================================
// Verification
// ============================================================================

/// Read an artifact as text.
///
/// Bytes that are not valid UTF-8 are replaced rather than rejected.
pub fn read_artifact(path: &Path) -> Result<String, ArtifactError> {
    let bytes = fs::read(path).map_err(|e| ArtifactError::Read {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Judge an artifact, or report that none exists yet.
pub fn verify_artifact(path: Option<&Path>) -> Result<Verdict, ArtifactError> {
    match path {
        None => Ok(Verdict::no_artifact()),
        Some(path) => read_artifact(path).map(|text| check_artifact(&text)),
    }
}

/// Result of one resolve-and-verify pass over a run directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageCheck {
    /// Artifact that was judged, if one existed.
    pub artifact: Option<PathBuf>,
    pub verdict: Verdict,
    /// Marked-line counts of the judged artifact.
    pub tally: TargetTally,
}

/// Resolve the newest artifact in `dir` and judge it.
pub fn check_run_dir(dir: &Path) -> Result<CoverageCheck, ArtifactError> {
    let Some(artifact) = latest_artifact(dir) else {
        return Ok(CoverageCheck {
            artifact: None,
            verdict: Verdict::no_artifact(),
            tally: TargetTally::default(),
        });
    };

    let text = read_artifact(&artifact)?;
    Ok(CoverageCheck {
        verdict: check_artifact(&text),
        tally: tally_targets(&text),
        artifact: Some(artifact),
    })
}

// ============================================================================
// Tests
// ============================================================================
