//! Pure domain evaluation logic for covreach.
//!
//! This crate judges the content of a coverage artifact with no side effects.
//! Every line carrying the target marker must start with an accepted status
//! character; the first line that does not decides the failure message.

use covreach_types::{STATUS_COVERED, STATUS_EXCLUDED, TARGET_MARKER, Verdict};

// ============================================================================
// Line Classification
// ============================================================================

/// Coverage state of a single artifact line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStatus {
    /// The line does not carry the target marker.
    Untargeted,
    /// Marked line reached by execution (`*`).
    Covered,
    /// Marked line explicitly excluded (`e`).
    Excluded,
    /// Marked line with any other leading character.
    Uncovered,
}

impl LineStatus {
    /// Whether this line satisfies its coverage target.
    pub fn is_satisfied(&self) -> bool {
        !matches!(self, LineStatus::Uncovered)
    }
}

/// Classify one artifact line.
///
/// # Examples
///
/// ```
/// use covreach_domain::{LineStatus, classify_line};
///
/// assert_eq!(classify_line("*r |  x = 1; // test::coverage"), LineStatus::Covered);
/// assert_eq!(classify_line("e  |  revert(); // test::coverage"), LineStatus::Excluded);
/// assert_eq!(classify_line("   |  y = 2; // test::coverage"), LineStatus::Uncovered);
/// assert_eq!(classify_line("   |  z = 3;"), LineStatus::Untargeted);
/// ```
pub fn classify_line(line: &str) -> LineStatus {
    if !line.contains(TARGET_MARKER) {
        return LineStatus::Untargeted;
    }
    match line.chars().next() {
        Some(STATUS_COVERED) => LineStatus::Covered,
        Some(STATUS_EXCLUDED) => LineStatus::Excluded,
        _ => LineStatus::Uncovered,
    }
}

/// Source excerpt of an artifact line: everything after the first `|`.
///
/// Lines without a delimiter have an empty excerpt.
pub fn source_excerpt(line: &str) -> &str {
    line.split_once('|').map(|(_, rest)| rest).unwrap_or("")
}

/// Diagnostic for an uncovered marked line (`line_no` is 1-based).
pub fn failure_message(line_no: usize, line: &str) -> String {
    format!("failed to cover line {}:\n|{}", line_no, source_excerpt(line))
}

// ============================================================================
// Artifact Evaluation
// ============================================================================

/// Judge a whole artifact. The first uncovered marked line wins.
///
/// An artifact without any marked line passes.
///
/// # Examples
///
/// ```
/// use covreach_domain::check_artifact;
///
/// assert!(check_artifact("*|test::coverage|require(x>0)").success);
///
/// let verdict = check_artifact("f|test::coverage|require(x>0)");
/// assert!(!verdict.success);
/// assert_eq!(verdict.message, "failed to cover line 1:\n|test::coverage|require(x>0)");
/// ```
pub fn check_artifact(text: &str) -> Verdict {
    first_uncovered(text)
        .map(|(line_no, line)| Verdict::fail(failure_message(line_no, line)))
        .unwrap_or_else(Verdict::pass)
}

/// Locate the first uncovered marked line, returning its 1-based number.
pub fn first_uncovered(text: &str) -> Option<(usize, &str)> {
    text.lines()
        .enumerate()
        .find(|(_, line)| !classify_line(line).is_satisfied())
        .map(|(idx, line)| (idx + 1, line))
}

/// Counts of marked lines by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TargetTally {
    pub covered: u32,
    pub excluded: u32,
    pub uncovered: u32,
}

impl TargetTally {
    /// Total number of marked lines.
    pub fn total(&self) -> u32 {
        self.covered + self.excluded + self.uncovered
    }

    /// Marked lines that satisfy their target.
    pub fn satisfied(&self) -> u32 {
        self.covered + self.excluded
    }
}

/// Tally every marked line of an artifact.
pub fn tally_targets(text: &str) -> TargetTally {
    let mut tally = TargetTally::default();
    for line in text.lines() {
        match classify_line(line) {
            LineStatus::Untargeted => {}
            LineStatus::Covered => tally.covered += 1,
            LineStatus::Excluded => tally.excluded += 1,
            LineStatus::Uncovered => tally.uncovered += 1,
        }
    }
    tally
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covered_single_line_passes() {
        let verdict = check_artifact("*0: test::coverage|require(x>0)");
        assert_eq!(verdict, Verdict::pass());
    }

    #[test]
    fn test_uncovered_single_line_reports_excerpt_after_first_pipe() {
        let verdict = check_artifact("f|test::coverage|require(x>0)");
        assert!(!verdict.success);
        assert_eq!(
            verdict.message,
            "failed to cover line 1:\n|test::coverage|require(x>0)"
        );
    }

    #[test]
    fn test_first_uncovered_line_wins() {
        let text = "\
*   |  if (x > 0) { // test::coverage
    |  y = 1; // test::coverage
    |  z = 2; // test::coverage
";
        let verdict = check_artifact(text);
        assert_eq!(
            verdict.message,
            "failed to cover line 2:\n|  y = 1; // test::coverage"
        );
    }

    #[test]
    fn test_excluded_lines_are_accepted() {
        let text = "e   |  revert(); // test::coverage\n*   |  ok(); // test::coverage\n";
        assert!(check_artifact(text).success);
    }

    #[test]
    fn test_unmarked_lines_are_ignored_whatever_their_status() {
        let text = "    |  uint x;\nr   |  x = 2;\n*   |  hit(); // test::coverage\n";
        assert!(check_artifact(text).success);
    }

    #[test]
    fn test_empty_artifact_passes() {
        assert_eq!(check_artifact(""), Verdict::pass());
    }

    #[test]
    fn test_other_status_characters_fail() {
        for status in ['r', 'o', 'E', '+', ' ', '#'] {
            let line = format!("{status}   |  a(); // test::coverage");
            assert_eq!(classify_line(&line), LineStatus::Uncovered, "status {status:?}");
        }
    }

    #[test]
    fn test_only_uncovered_lines_are_unsatisfied() {
        assert!(LineStatus::Untargeted.is_satisfied());
        assert!(LineStatus::Covered.is_satisfied());
        assert!(LineStatus::Excluded.is_satisfied());
        assert!(!LineStatus::Uncovered.is_satisfied());
        let text = "    |  x;\n*   |  a(); // test::coverage\n-   |  b(); // test::coverage";
        assert_eq!(
            first_uncovered(text),
            Some((3, "-   |  b(); // test::coverage"))
        );
    }

    #[test]
    fn test_marked_line_without_delimiter_has_empty_excerpt() {
        let verdict = check_artifact("x test::coverage");
        assert_eq!(verdict.message, "failed to cover line 1:\n|");
    }

    #[test]
    fn test_crlf_line_endings_are_handled() {
        let text = "*   |  a(); // test::coverage\r\n    |  b(); // test::coverage\r\n";
        assert_eq!(
            check_artifact(text).message,
            "failed to cover line 2:\n|  b(); // test::coverage"
        );
    }

    #[test]
    fn test_tally_counts_marked_lines_only() {
        let text = "\
*   |  a(); // test::coverage
e   |  b(); // test::coverage
    |  c(); // test::coverage
*   |  d();
";
        let tally = tally_targets(text);
        assert_eq!(
            tally,
            TargetTally {
                covered: 1,
                excluded: 1,
                uncovered: 1
            }
        );
        assert_eq!(tally.total(), 3);
        assert_eq!(tally.satisfied(), 2);
    }
}
