//! Integration tests for the covreach CLI.
//!
//! These tests run the binary as a subprocess. Campaigns use a shell script
//! standing in for the fuzzing engine, so they only run on unix.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// Get a Command for the covreach binary.
fn covreach() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_covreach"));
    cmd.env_remove("COVREACH_LOG");
    cmd
}

const FULL: &str = "*   |  a(); // test::coverage\ne   |  revert(); // test::coverage\n";
const PARTIAL: &str = "*   |  a(); // test::coverage\n    |  b(); // test::coverage\n";

fn write(dir: &Path, name: &str, content: &str) {
    fs::write(dir.join(name), content).unwrap();
}

// ============================================================================
// Help and Version Tests
// ============================================================================

#[test]
fn test_help_displays_usage() {
    covreach()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("covreach"))
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("verify"))
        .stdout(predicate::str::contains("list"));
}

#[test]
fn test_version_displays_version() {
    covreach()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("covreach"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_run_help_displays_options() {
    covreach()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--engine"))
        .stdout(predicate::str::contains("--poll-interval"))
        .stdout(predicate::str::contains("--filter"))
        .stdout(predicate::str::contains("--case"))
        .stdout(predicate::str::contains("--out"))
        .stdout(predicate::str::contains("--md"));
}

// ============================================================================
// Verify Tests
// ============================================================================

#[test]
fn test_verify_covered_artifact_passes() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "covered.100.txt", FULL);

    covreach()
        .args(["verify", "--run-dir"])
        .arg(temp.path())
        .assert()
        .code(0)
        .stdout(predicate::str::contains("pass: 2 of 2 marked lines satisfied"));
}

#[test]
fn test_verify_uses_newest_artifact() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "covered.9.txt", FULL);
    write(temp.path(), "covered.10.txt", PARTIAL);

    covreach()
        .args(["verify", "--run-dir"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains(
            "failed to cover line 2:\n|  b(); // test::coverage",
        ));
}

#[test]
fn test_verify_empty_run_dir_fails() {
    let temp = TempDir::new().unwrap();

    covreach()
        .args(["verify", "--run-dir"])
        .arg(temp.path())
        .assert()
        .code(2)
        .stdout(predicate::str::contains("no coverage artifact available yet"));
}

#[test]
fn test_verify_single_artifact() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "snapshot.txt", "f|test::coverage|require(x>0)\n");

    covreach()
        .args(["verify", "--artifact"])
        .arg(temp.path().join("snapshot.txt"))
        .assert()
        .code(2)
        .stdout(predicate::str::contains(
            "failed to cover line 1:\n|test::coverage|require(x>0)",
        ));
}

#[test]
fn test_verify_missing_artifact_is_error() {
    let temp = TempDir::new().unwrap();

    covreach()
        .args(["verify", "--artifact"])
        .arg(temp.path().join("covered.1.txt"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("failed to read coverage artifact"));
}

// ============================================================================
// List Tests
// ============================================================================

#[test]
fn test_list_shows_enabled_matrix() {
    let temp = TempDir::new().unwrap();

    let output = covreach()
        .current_dir(temp.path())
        .args(["list", "--contracts-dir", "contracts"])
        .output()
        .unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 22);
    assert!(stdout.contains("ExploreMe/inst/40\tcontracts/ExploreMe.sol"));
    assert!(!stdout.contains("[disabled]"));
}

#[test]
fn test_list_with_disabled_and_filter() {
    let temp = TempDir::new().unwrap();

    covreach()
        .current_dir(temp.path())
        .args(["list", "--include-disabled", "--filter", "Coverage*Tuple*"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "CoverageStaticTuple/inst-tx-seq/5",
        ))
        .stdout(predicate::str::contains("[disabled]"))
        .stdout(predicate::str::contains("ExploreMe").not());
}

#[test]
fn test_list_unknown_case_is_error() {
    let temp = TempDir::new().unwrap();

    covreach()
        .current_dir(temp.path())
        .args(["list", "--case", "Nope/inst/1"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown test case 'Nope/inst/1'"));
}

#[test]
fn test_invalid_config_is_error() {
    let temp = TempDir::new().unwrap();
    write(temp.path(), "covreach.toml", "[harness]\npoll_interval_secs = 0\n");

    covreach()
        .current_dir(temp.path())
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("poll_interval_secs must be positive"));
}

// ============================================================================
// Run Tests
// ============================================================================

#[cfg(unix)]
mod campaigns {
    use super::*;

    /// Fake engine: writes `content` into the corpus dir, then runs `tail`.
    fn engine_script(dir: &Path, content: &str, tail: &str) -> String {
        let script = format!(
            r#"while [ $# -gt 0 ]; do
  case "$1" in
    --corpus-dir) dir="$2"; shift ;;
  esac
  shift
done
printf '%s' '{content}' > "$dir/covered.100.txt"
{tail}
"#
        );
        let path = dir.join("engine.sh");
        fs::write(&path, script).unwrap();
        path.display().to_string()
    }

    fn run_cmd(temp: &TempDir, script: &str) -> Command {
        let mut cmd = covreach();
        cmd.current_dir(temp.path()).args([
            "run",
            "--engine",
            "/bin/sh",
            "--engine-arg",
            script,
            "--poll-interval",
            "1",
            "--job-output",
            "discard",
            "--case",
            "Time/inst/10",
        ]);
        cmd.arg("--work-dir").arg(temp.path().join("runs"));
        cmd
    }

    #[test]
    fn test_run_early_success_stops_engine() {
        let temp = TempDir::new().unwrap();
        let script = engine_script(temp.path(), FULL, "exec sleep 30");
        let out = temp.path().join("out").join("report.json");

        run_cmd(&temp, &script)
            .arg("--out")
            .arg(&out)
            .timeout(std::time::Duration::from_secs(20))
            .assert()
            .code(0)
            .stdout(predicate::str::contains("PASS Time/inst/10 (early_success"))
            .stdout(predicate::str::contains("covreach: pass (1/1 cases covered)"));

        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(report["schema"], "covreach.report.v1");
        assert_eq!(report["summary"]["status"], "pass");
        assert_eq!(report["results"][0]["ended_by"], "early_success");
        assert_eq!(report["results"][0]["polls"], 1);
        assert!(temp.path().join("runs").join("Time-inst-10-1").join("covered.100.txt").is_file());
    }

    #[test]
    fn test_run_uncovered_target_fails() {
        let temp = TempDir::new().unwrap();
        let script = engine_script(temp.path(), PARTIAL, "exit 0");
        let md = temp.path().join("summary.md");

        run_cmd(&temp, &script)
            .arg("--md")
            .arg(&md)
            .timeout(std::time::Duration::from_secs(20))
            .assert()
            .code(2)
            .stdout(predicate::str::contains("FAIL Time/inst/10 (job_exited"))
            .stdout(predicate::str::contains("failed to cover line 2:"));

        let markdown = fs::read_to_string(&md).unwrap();
        assert!(markdown.contains("#### Time/inst/10"));
        assert!(markdown.contains("covreach run \\\n  --case Time/inst/10"));
    }

    #[test]
    fn test_run_missing_engine_is_error() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("report.json");

        covreach()
            .current_dir(temp.path())
            .args(["run", "--case", "Time/inst/10", "--case", "Payable/inst/10", "--engine"])
            .arg(temp.path().join("no-such-engine"))
            .arg("--work-dir")
            .arg(temp.path().join("runs"))
            .arg("--out")
            .arg(&out)
            .assert()
            .code(1)
            .stdout(predicate::str::contains("FAIL Payable/inst/10 (aborted"))
            .stderr(predicate::str::contains("failed to launch campaign for Time/inst/10"))
            .stderr(predicate::str::contains("failed to launch campaign for Payable/inst/10"));

        // Every case is still reported.
        let report: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(report["summary"]["total"], 2);
        assert_eq!(report["summary"]["reasons"], serde_json::json!(["launch_failed"]));
        assert_eq!(report["results"][1]["ended_by"], "aborted");
    }

    #[test]
    fn test_run_job_log_captures_engine_arguments() {
        let temp = TempDir::new().unwrap();
        let script = engine_script(temp.path(), FULL, "echo \"engine finished\"");
        let log = temp.path().join("logs").join("jobs.log");

        covreach()
            .current_dir(temp.path())
            .args([
                "run",
                "--engine",
                "/bin/sh",
                "--engine-arg",
                &script,
                "--poll-interval",
                "1",
                "--case",
                "Time/inst/10",
                "--seed",
                "7",
            ])
            .arg("--work-dir")
            .arg(temp.path().join("runs"))
            .arg("--job-log")
            .arg(&log)
            .timeout(std::time::Duration::from_secs(20))
            .assert()
            .code(0);

        assert!(fs::read_to_string(&log).unwrap().contains("engine finished"));
    }

    #[test]
    fn test_run_with_nothing_selected_passes() {
        let temp = TempDir::new().unwrap();

        covreach()
            .current_dir(temp.path())
            .args(["run", "--filter", "NoSuchContract*"])
            .arg("--work-dir")
            .arg(temp.path().join("runs"))
            .assert()
            .code(0)
            .stdout(predicate::str::contains("covreach: skip (no cases selected)"));
    }
}
