//! Configuration parsing and management for covreach.
//!
//! This crate provides:
//! - Configuration types (`Config`, `EngineConfig`, etc.)
//! - TOML parsing and validation
//! - Discovery of `covreach.toml` in the working directory or its parents
//! - Precedence handling (CLI > config file > defaults)

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use covreach_ports::EngineOptions;
use thiserror::Error;
use tracing::debug;

/// File name searched for by [`discover_config`].
pub const CONFIG_FILE_NAME: &str = "covreach.toml";

/// Seconds between coverage checks when nothing else is configured.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Invalid configuration value.
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

// ============================================================================
// Configuration Types
// ============================================================================

/// Where a campaign's stdout and stderr go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobOutputMode {
    /// Share the harness's own streams.
    #[default]
    Inherit,
    /// Drop the output.
    Discard,
    /// Append to `output.job_log`.
    File,
}

/// `[engine]` section: how the fuzzing engine is invoked.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub program: Option<PathBuf>,
    #[serde(default)]
    pub program_args: Option<Vec<String>>,
    #[serde(default)]
    pub test_mode: Option<String>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub max_iters: Option<u32>,
    #[serde(default)]
    pub test_limit: Option<u32>,
    #[serde(default)]
    pub debug: Option<bool>,
    #[serde(default)]
    pub logs: Option<String>,
    #[serde(default)]
    pub no_display: Option<bool>,
}

/// `[harness]` section: polling and directory layout.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HarnessConfig {
    /// Seconds slept between coverage checks.
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,
    /// Parent of the per-case run directories.
    #[serde(default)]
    pub work_dir: Option<PathBuf>,
    /// Directory the matrix's contract paths are relative to.
    #[serde(default)]
    pub contracts_dir: Option<PathBuf>,
}

/// `[output]` section: job output routing.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub job_output: Option<JobOutputMode>,
    #[serde(default)]
    pub job_log: Option<PathBuf>,
}

/// Full configuration for covreach.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub harness: HarnessConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

// ============================================================================
// Effective Configuration
// ============================================================================

/// Effective configuration with all values resolved.
///
/// This represents the final configuration after applying:
/// 1. Built-in defaults
/// 2. Config file values
/// 3. CLI overrides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveConfig {
    pub engine: EngineOptions,
    pub poll_interval: Duration,
    pub work_dir: PathBuf,
    pub contracts_dir: PathBuf,
    pub job_output: JobOutputMode,
    pub job_log: Option<PathBuf>,
}

impl Default for EffectiveConfig {
    fn default() -> Self {
        Self {
            engine: EngineOptions::default(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            work_dir: std::env::temp_dir().join("covreach"),
            contracts_dir: PathBuf::from("contracts"),
            job_output: JobOutputMode::Inherit,
            job_log: None,
        }
    }
}

// ============================================================================
// Configuration Loading
// ============================================================================

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load configuration from a TOML string.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::InvalidValue(message.to_string())
}

/// Validate configuration file values.
fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.harness.poll_interval_secs == Some(0) {
        return Err(invalid("harness.poll_interval_secs must be positive"));
    }
    if config.engine.max_iters == Some(0) {
        return Err(invalid("engine.max_iters must be positive"));
    }
    if config.engine.test_limit == Some(0) {
        return Err(invalid("engine.test_limit must be positive"));
    }
    if config.output.job_output == Some(JobOutputMode::File) && config.output.job_log.is_none() {
        return Err(invalid("output.job_output = \"file\" requires output.job_log"));
    }
    Ok(())
}

/// Validate a fully resolved configuration.
///
/// CLI overrides bypass file validation, so the same rules are checked again
/// after precedence has been applied.
pub fn validate_effective(config: &EffectiveConfig) -> Result<(), ConfigError> {
    if config.poll_interval.is_zero() {
        return Err(invalid("poll interval must be positive"));
    }
    if config.engine.max_iters == 0 {
        return Err(invalid("max_iters must be positive"));
    }
    if config.engine.test_limit == 0 {
        return Err(invalid("test_limit must be positive"));
    }
    if config.job_output == JobOutputMode::File && config.job_log.is_none() {
        return Err(invalid("job output 'file' requires a job log path"));
    }
    Ok(())
}

/// Search `start` and its parent directories for `covreach.toml`.
///
/// A file that exists but fails to load is an error, not a miss.
pub fn discover_config_from(start: &Path) -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            debug!(path = %config_path.display(), "discovered config file");
            let config = load_config(&config_path)?;
            return Ok(Some((config_path, config)));
        }

        if !current.pop() {
            break;
        }
    }

    Ok(None)
}

/// Try to find and load configuration from the standard location.
///
/// Searches for `covreach.toml` in the current directory and parent directories.
pub fn discover_config() -> Result<Option<(PathBuf, Config)>, ConfigError> {
    let current = std::env::current_dir()?;
    discover_config_from(&current)
}

// ============================================================================
// Precedence Resolution
// ============================================================================

/// CLI override options.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub program: Option<PathBuf>,
    pub program_args: Option<Vec<String>>,
    pub seed: Option<u64>,
    pub max_iters: Option<u32>,
    pub test_limit: Option<u32>,
    pub poll_interval_secs: Option<u64>,
    pub work_dir: Option<PathBuf>,
    pub contracts_dir: Option<PathBuf>,
    pub job_output: Option<JobOutputMode>,
    pub job_log: Option<PathBuf>,
}

/// Resolve effective configuration from the config file and CLI overrides.
///
/// Precedence: CLI > config file > defaults
pub fn resolve_config(config: Option<&Config>, cli: &CliOverrides) -> EffectiveConfig {
    let mut effective = EffectiveConfig::default();

    // Apply config file values
    if let Some(config) = config {
        let engine = &config.engine;
        if let Some(program) = &engine.program {
            effective.engine.program = program.clone();
        }
        if let Some(args) = &engine.program_args {
            effective.engine.program_args = args.clone();
        }
        if let Some(mode) = &engine.test_mode {
            effective.engine.test_mode = mode.clone();
        }
        if let Some(seed) = engine.seed {
            effective.engine.seed = seed;
        }
        if let Some(max) = engine.max_iters {
            effective.engine.max_iters = max;
        }
        if let Some(limit) = engine.test_limit {
            effective.engine.test_limit = limit;
        }
        if let Some(debug) = engine.debug {
            effective.engine.debug = debug;
        }
        if let Some(logs) = &engine.logs {
            effective.engine.logs = logs.clone();
        }
        if let Some(no_display) = engine.no_display {
            effective.engine.no_display = no_display;
        }

        if let Some(secs) = config.harness.poll_interval_secs {
            effective.poll_interval = Duration::from_secs(secs);
        }
        if let Some(dir) = &config.harness.work_dir {
            effective.work_dir = dir.clone();
        }
        if let Some(dir) = &config.harness.contracts_dir {
            effective.contracts_dir = dir.clone();
        }

        if let Some(mode) = config.output.job_output {
            effective.job_output = mode;
        }
        if let Some(log) = &config.output.job_log {
            effective.job_log = Some(log.clone());
        }
    }

    // Apply CLI overrides
    if let Some(program) = &cli.program {
        effective.engine.program = program.clone();
    }
    if let Some(args) = &cli.program_args {
        effective.engine.program_args = args.clone();
    }
    if let Some(seed) = cli.seed {
        effective.engine.seed = seed;
    }
    if let Some(max) = cli.max_iters {
        effective.engine.max_iters = max;
    }
    if let Some(limit) = cli.test_limit {
        effective.engine.test_limit = limit;
    }
    if let Some(secs) = cli.poll_interval_secs {
        effective.poll_interval = Duration::from_secs(secs);
    }
    if let Some(dir) = &cli.work_dir {
        effective.work_dir = dir.clone();
    }
    if let Some(dir) = &cli.contracts_dir {
        effective.contracts_dir = dir.clone();
    }
    if let Some(mode) = cli.job_output {
        effective.job_output = mode;
    }
    if let Some(log) = &cli.job_log {
        effective.job_log = Some(log.clone());
        // A log path on the command line implies file output.
        if cli.job_output.is_none() {
            effective.job_output = JobOutputMode::File;
        }
    }

    effective
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use covreach_ports::{DEFAULT_MAX_ITERS, DEFAULT_SEED};
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let config = parse_config("").unwrap();
        assert!(config.engine.program.is_none());
        assert!(config.harness.poll_interval_secs.is_none());
        assert!(config.output.job_output.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
[engine]
program = "python3"
program_args = ["-m", "optik"]
test_mode = "assertion"
seed = 7
max_iters = 3
test_limit = 500
debug = false
logs = "engine.log"
no_display = false

[harness]
poll_interval_secs = 2
work_dir = "/tmp/covreach-runs"
contracts_dir = "tests/coverage/contracts"

[output]
job_output = "file"
job_log = "logs/jobs.log"
"#;
        let config = parse_config(toml).unwrap();

        assert_eq!(config.engine.program, Some(PathBuf::from("python3")));
        assert_eq!(
            config.engine.program_args,
            Some(vec!["-m".to_string(), "optik".to_string()])
        );
        assert_eq!(config.engine.seed, Some(7));
        assert_eq!(config.engine.max_iters, Some(3));
        assert_eq!(config.engine.test_limit, Some(500));
        assert_eq!(config.engine.debug, Some(false));
        assert_eq!(config.engine.logs.as_deref(), Some("engine.log"));
        assert_eq!(config.engine.no_display, Some(false));
        assert_eq!(config.harness.poll_interval_secs, Some(2));
        assert_eq!(
            config.harness.contracts_dir,
            Some(PathBuf::from("tests/coverage/contracts"))
        );
        assert_eq!(config.output.job_output, Some(JobOutputMode::File));
        assert_eq!(config.output.job_log, Some(PathBuf::from("logs/jobs.log")));
    }

    #[test]
    fn test_zero_values_are_rejected() {
        for toml in [
            "[harness]\npoll_interval_secs = 0",
            "[engine]\nmax_iters = 0",
            "[engine]\ntest_limit = 0",
        ] {
            let err = parse_config(toml).unwrap_err();
            assert!(matches!(err, ConfigError::InvalidValue(_)), "{toml}");
        }
    }

    #[test]
    fn test_file_output_requires_log_path() {
        let err = parse_config("[output]\njob_output = \"file\"").unwrap_err();
        assert!(err.to_string().contains("job_log"));
    }

    #[test]
    fn test_unknown_job_output_is_parse_error() {
        let err = parse_config("[output]\njob_output = \"syslog\"").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_resolve_config_no_config() {
        let effective = resolve_config(None, &CliOverrides::default());

        assert_eq!(effective, EffectiveConfig::default());
        assert_eq!(effective.engine.seed, DEFAULT_SEED);
        assert_eq!(effective.engine.max_iters, DEFAULT_MAX_ITERS);
        assert_eq!(effective.poll_interval, Duration::from_secs(5));
        assert_eq!(effective.engine.program, PathBuf::from("hybrid-echidna"));
    }

    #[test]
    fn test_resolve_config_file_over_defaults() {
        let config = parse_config("[engine]\nseed = 1\n[harness]\npoll_interval_secs = 9").unwrap();
        let effective = resolve_config(Some(&config), &CliOverrides::default());

        assert_eq!(effective.engine.seed, 1);
        assert_eq!(effective.poll_interval, Duration::from_secs(9));
        assert_eq!(effective.engine.test_limit, 10_000);
    }

    #[test]
    fn test_resolve_config_cli_overrides() {
        let config = parse_config("[engine]\nseed = 1\nmax_iters = 4").unwrap();
        let cli = CliOverrides {
            seed: Some(2),
            ..Default::default()
        };

        let effective = resolve_config(Some(&config), &cli);

        // CLI should override config
        assert_eq!(effective.engine.seed, 2);
        assert_eq!(effective.engine.max_iters, 4);
    }

    #[test]
    fn test_cli_job_log_implies_file_output() {
        let cli = CliOverrides {
            job_log: Some(PathBuf::from("jobs.log")),
            ..Default::default()
        };
        let effective = resolve_config(None, &cli);

        assert_eq!(effective.job_output, JobOutputMode::File);
        assert!(validate_effective(&effective).is_ok());
    }

    #[test]
    fn test_validate_effective_catches_cli_zeroes() {
        let cli = CliOverrides {
            poll_interval_secs: Some(0),
            ..Default::default()
        };
        assert!(validate_effective(&resolve_config(None, &cli)).is_err());

        let cli = CliOverrides {
            job_output: Some(JobOutputMode::File),
            ..Default::default()
        };
        assert!(validate_effective(&resolve_config(None, &cli)).is_err());
    }

    #[test]
    fn test_discover_config_walks_parents() {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join(CONFIG_FILE_NAME),
            "[harness]\npoll_interval_secs = 3",
        )
        .unwrap();
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        let (path, config) = discover_config_from(&nested).unwrap().unwrap();
        assert_eq!(path, temp.path().join(CONFIG_FILE_NAME));
        assert_eq!(config.harness.poll_interval_secs, Some(3));
    }

    #[test]
    fn test_discover_config_surfaces_invalid_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(CONFIG_FILE_NAME), "[engine]\nmax_iters = 0").unwrap();

        assert!(discover_config_from(temp.path()).is_err());
    }
}
