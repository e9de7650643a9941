//! xtask - Development tasks for covreach
//!
//! This crate provides utilities for:
//! - Schema validation
//! - Report validation against the JSON schema
//! - Checking that matrix contracts carry coverage markers

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use jsonschema::Validator;
use std::fs;
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::Mutex;

use covreach_matrix::{DEFAULT_MATRIX, build_matrix};
use covreach_types::{SCHEMA_ID, TARGET_MARKER};

#[cfg(test)]
static TEST_LOCK: Mutex<()> = Mutex::new(());

fn exit_validation_failure() -> Result<()> {
    bail!("validation failure")
}

/// Development tasks for covreach
#[derive(Parser)]
#[command(name = "xtask")]
#[command(about = "Development tasks for covreach", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate JSON schemas in the contracts/schemas/ directory
    Schema {
        /// Only report failures
        #[arg(long)]
        check: bool,
    },

    /// Validate a report.json file against the schema
    Validate {
        /// Path to the report.json file to validate
        report_path: PathBuf,

        /// Path to custom schema file (defaults to contracts/schemas/covreach.report.v1.json)
        #[arg(long)]
        schema: Option<PathBuf>,
    },

    /// Check that every matrix contract exists and carries a coverage marker
    Markers {
        /// Directory containing the matrix contracts
        contracts_dir: PathBuf,

        /// Also check contracts of disabled cases
        #[arg(long)]
        include_disabled: bool,
    },
}

fn main() -> std::process::ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let code = main_impl(args);
    std::process::ExitCode::from(u8::try_from(code).unwrap_or(1))
}

fn main_impl(args: Vec<String>) -> i32 {
    match run_cli_with_args(args) {
        Ok(_) => 0,
        Err(e) => {
            if e.to_string().contains("validation failure") {
                return 2;
            }
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_cli_with_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::try_parse_from(&args)?;
    run_cli(cli)
}

fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Schema { check } => cmd_schema(check),
        Commands::Validate {
            report_path,
            schema,
        } => cmd_validate(&report_path, schema.as_deref()),
        Commands::Markers {
            contracts_dir,
            include_disabled,
        } => cmd_markers(&contracts_dir, include_disabled),
    }
}

// ============================================================================
// Schema Command
// ============================================================================

fn cmd_schema(check: bool) -> Result<()> {
    let project_root = find_project_root()?;
    let schemas_dir = project_root.join("contracts").join("schemas");

    if !schemas_dir.exists() {
        bail!("schemas directory not found at {}", schemas_dir.display());
    }

    let mut errors = Vec::new();
    let mut validated = 0;

    for entry in fs::read_dir(&schemas_dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().is_none_or(|e| e != "json") {
            continue;
        }
        match validate_schema_file(&path) {
            Ok(()) => {
                validated += 1;
                if !check {
                    println!("  ok: {}", entry.file_name().to_string_lossy());
                }
            }
            Err(e) => {
                errors.push(format!("{}: {:#}", path.display(), e));
            }
        }
    }

    if errors.is_empty() {
        println!("Validated {validated} schema(s) successfully.");
        Ok(())
    } else {
        for error in &errors {
            eprintln!("error: {error}");
        }
        exit_validation_failure()
    }
}

fn validate_schema_file(path: &Path) -> Result<()> {
    let content =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("invalid JSON in {}", path.display()))?;

    let obj = value.as_object().context("schema must be a JSON object")?;
    if !obj.contains_key("$schema") {
        bail!("missing $schema property - not a valid JSON Schema");
    }

    match Validator::new(&value) {
        Ok(_) => Ok(()),
        Err(e) => bail!("invalid JSON Schema: {e}"),
    }
}

// ============================================================================
// Validate Command
// ============================================================================

fn cmd_validate(report_path: &Path, schema_path: Option<&Path>) -> Result<()> {
    let schema_path = match schema_path {
        Some(p) => p.to_path_buf(),
        None => find_project_root()?
            .join("contracts")
            .join("schemas")
            .join(format!("{SCHEMA_ID}.json")),
    };

    if !schema_path.exists() {
        bail!("schema not found at {}", schema_path.display());
    }
    if !report_path.exists() {
        bail!("report not found at {}", report_path.display());
    }

    let schema_content = fs::read_to_string(&schema_path)
        .with_context(|| format!("failed to read schema {}", schema_path.display()))?;
    let schema_value: serde_json::Value = serde_json::from_str(&schema_content)
        .with_context(|| format!("invalid JSON in schema {}", schema_path.display()))?;
    let validator = Validator::new(&schema_value).context("failed to compile schema")?;

    let report_content = fs::read_to_string(report_path)
        .with_context(|| format!("failed to read report {}", report_path.display()))?;
    let report_value: serde_json::Value = serde_json::from_str(&report_content)
        .with_context(|| format!("invalid JSON in report {}", report_path.display()))?;

    let mut errors: Vec<String> = validator
        .iter_errors(&report_value)
        .map(|error| format!("{}: {}", error.instance_path, error))
        .collect();
    errors.extend(lint_summary_counts(&report_value));

    if errors.is_empty() {
        println!("Valid: {} conforms to schema", report_path.display());
        Ok(())
    } else {
        eprintln!("Validation errors in {}:", report_path.display());
        for error in &errors {
            eprintln!("  - {error}");
        }
        exit_validation_failure()
    }
}

/// Cross-field checks the schema cannot express.
fn lint_summary_counts(report: &serde_json::Value) -> Vec<String> {
    let mut errors = Vec::new();
    let summary = &report["summary"];
    let results = report["results"].as_array().map(Vec::as_slice).unwrap_or_default();

    let passed = results
        .iter()
        .filter(|r| r["verdict"]["success"].as_bool() == Some(true))
        .count() as u64;
    let total = results.len() as u64;

    if summary["total"].as_u64() != Some(total) {
        errors.push(format!(
            "/summary/total: expected {total}, found {}",
            summary["total"]
        ));
    }
    if summary["passed"].as_u64() != Some(passed) {
        errors.push(format!(
            "/summary/passed: expected {passed}, found {}",
            summary["passed"]
        ));
    }
    if summary["failed"].as_u64() != Some(total - passed) {
        errors.push(format!(
            "/summary/failed: expected {}, found {}",
            total - passed,
            summary["failed"]
        ));
    }
    for (idx, result) in results.iter().enumerate() {
        let success = result["verdict"]["success"].as_bool();
        let message = result["verdict"]["message"].as_str();
        if success == Some(true) && message.is_some_and(|m| !m.is_empty()) {
            errors.push(format!(
                "/results/{idx}/verdict/message: must be empty on success"
            ));
        }
    }
    errors
}

// ============================================================================
// Markers Command
// ============================================================================

fn cmd_markers(contracts_dir: &Path, include_disabled: bool) -> Result<()> {
    let cases = build_matrix(DEFAULT_MATRIX, contracts_dir)?;

    let mut errors = Vec::new();
    let mut checked = 0;
    let mut seen = std::collections::BTreeSet::new();

    for case in cases.iter().filter(|c| c.enabled || include_disabled) {
        if !seen.insert(case.contract_path.clone()) {
            continue;
        }
        match count_markers(&case.contract_path) {
            Ok(0) => errors.push(format!(
                "{}: no `{TARGET_MARKER}` marker",
                case.contract_path.display()
            )),
            Ok(markers) => {
                checked += 1;
                println!("  ok: {} ({markers} marker(s))", case.contract_path.display());
            }
            Err(e) => errors.push(format!("{e:#}")),
        }
    }

    if errors.is_empty() {
        println!("Checked {checked} contract(s) successfully.");
        Ok(())
    } else {
        for error in &errors {
            eprintln!("error: {error}");
        }
        exit_validation_failure()
    }
}

fn count_markers(path: &Path) -> Result<usize> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read contract {}", path.display()))?;
    Ok(content
        .lines()
        .filter(|line| line.contains(TARGET_MARKER))
        .count())
}

// ============================================================================
// Utilities
// ============================================================================

/// Find the project root by looking for Cargo.toml with [workspace]
fn find_project_root() -> Result<PathBuf> {
    let mut current = std::env::current_dir()?;

    loop {
        let cargo_toml = current.join("Cargo.toml");
        if cargo_toml.exists() {
            let content = fs::read_to_string(&cargo_toml)?;
            if content.contains("[workspace]") {
                return Ok(current);
            }
        }

        if !current.pop() {
            bail!("could not find workspace root (no Cargo.toml with [workspace] found)");
        }
    }
}
