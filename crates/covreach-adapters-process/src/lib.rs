//! Child-process adapter for covreach's campaign ports.
//!
//! Each campaign runs as its own OS process. The harness observes it only
//! through `try_wait`, `kill` and `wait`; nothing is shared in memory.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};

use covreach_ports::{CampaignJob, CampaignLauncher, LaunchParams};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised while starting a job.
#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to start engine '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("failed to open job log '{path}': {source}")]
    LogFile {
        path: String,
        #[source]
        source: io::Error,
    },
}

/// Where the job's stdout and stderr go.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum JobOutput {
    /// Share the harness's own stdout/stderr.
    #[default]
    Inherit,
    /// Drop all job output.
    Discard,
    /// Append both streams to a log file.
    File(PathBuf),
}

/// Launches engine campaigns as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher {
    output: JobOutput,
}

impl ProcessLauncher {
    pub fn new(output: JobOutput) -> Self {
        Self { output }
    }

    fn stdio(&self) -> Result<(Stdio, Stdio), LaunchError> {
        match &self.output {
            JobOutput::Inherit => Ok((Stdio::inherit(), Stdio::inherit())),
            JobOutput::Discard => Ok((Stdio::null(), Stdio::null())),
            JobOutput::File(path) => {
                let log_err = |source| LaunchError::LogFile {
                    path: path.display().to_string(),
                    source,
                };
                let stdout = open_log(path).map_err(log_err)?;
                let stderr = stdout.try_clone().map_err(log_err)?;
                Ok((Stdio::from(stdout), Stdio::from(stderr)))
            }
        }
    }

    /// Spawn the engine described by `params`.
    pub fn spawn(&self, params: &LaunchParams) -> Result<ProcessJob, LaunchError> {
        let (stdout, stderr) = self.stdio()?;
        let program = params.program.display().to_string();

        let child = Command::new(&params.program)
            .args(params.args())
            .stdin(Stdio::null())
            .stdout(stdout)
            .stderr(stderr)
            .spawn()
            .map_err(|source| LaunchError::Spawn {
                program: program.clone(),
                source,
            })?;

        info!(pid = child.id(), command = %params.command_line(), "started campaign job");
        Ok(ProcessJob {
            child,
            program,
            exit: None,
            kill_sent: false,
        })
    }
}

fn open_log(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

impl CampaignLauncher for ProcessLauncher {
    type Job = ProcessJob;

    fn start(&self, params: &LaunchParams) -> Result<ProcessJob, String> {
        self.spawn(params).map_err(|e| e.to_string())
    }
}

/// A running engine process.
#[derive(Debug)]
pub struct ProcessJob {
    child: Child,
    program: String,
    exit: Option<ExitStatus>,
    kill_sent: bool,
}

impl ProcessJob {
    /// OS process id of the job.
    pub fn pid(&self) -> u32 {
        self.child.id()
    }

    /// Exit status, once the job has been observed to exit.
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit
    }

    fn poll_exit(&mut self) -> io::Result<Option<ExitStatus>> {
        if self.exit.is_none() {
            self.exit = self.child.try_wait()?;
        }
        Ok(self.exit)
    }
}

impl CampaignJob for ProcessJob {
    fn is_alive(&mut self) -> Result<bool, String> {
        self.poll_exit()
            .map(|status| status.is_none())
            .map_err(|e| format!("failed to check '{}' status: {e}", self.program))
    }

    /// Kills the job with `Child::kill` (SIGKILL on unix).
    ///
    /// Only the direct child is signalled and it gets no chance to clean up.
    /// Engines that fork their own workers must stop them when their parent
    /// disappears, or those workers outlive `wait` and may keep writing
    /// artifacts into the run directory.
    fn terminate(&mut self) -> Result<(), String> {
        if self.kill_sent || self.exit.is_some() {
            return Ok(());
        }
        self.kill_sent = true;
        debug!(pid = self.pid(), "terminating campaign job");
        match self.child.kill() {
            Ok(()) => Ok(()),
            // The job exited between the liveness check and the kill.
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(format!("failed to terminate '{}': {e}", self.program)),
        }
    }

    fn wait(&mut self) -> Result<String, String> {
        let status = match self.exit {
            Some(status) => status,
            None => {
                let status = self
                    .child
                    .wait()
                    .map_err(|e| format!("failed to wait for '{}': {e}", self.program))?;
                self.exit = Some(status);
                status
            }
        };
        Ok(status.to_string())
    }
}

impl Drop for ProcessJob {
    fn drop(&mut self) {
        if matches!(self.poll_exit(), Ok(Some(_))) {
            return;
        }
        warn!(pid = self.pid(), "campaign job still running on drop, killing it");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use covreach_ports::EngineOptions;
    use covreach_types::CoverageMode;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    /// Params that run `script` through `/bin/sh`, followed by the engine args.
    fn sh_params(dir: &Path, script: &str) -> LaunchParams {
        let script_path = dir.join("engine.sh");
        std::fs::write(&script_path, script).expect("write script");
        let engine = EngineOptions::default();
        LaunchParams {
            program: PathBuf::from("/bin/sh"),
            program_args: vec![script_path.display().to_string()],
            contract: PathBuf::from("Contract.sol"),
            contract_name: "Contract".to_string(),
            test_mode: engine.test_mode,
            corpus_dir: dir.to_path_buf(),
            seq_len: 1,
            seed: engine.seed,
            max_iters: engine.max_iters,
            test_limit: engine.test_limit,
            coverage_mode: CoverageMode::Inst,
            debug: engine.debug,
            logs: engine.logs,
            no_display: engine.no_display,
        }
    }

    fn wait_until_dead(job: &mut ProcessJob) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while job.is_alive().unwrap() {
            assert!(Instant::now() < deadline, "job did not exit");
            std::thread::sleep(Duration::from_millis(20));
        }
    }

    #[test]
    fn test_job_exit_is_observed_and_reported() {
        let temp = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(JobOutput::Discard);
        let mut job = launcher.start(&sh_params(temp.path(), "exit 3\n")).unwrap();

        wait_until_dead(&mut job);
        assert_eq!(job.exit_status().and_then(|s| s.code()), Some(3));
        assert_eq!(job.wait().unwrap(), "exit status: 3");
    }

    #[test]
    fn test_terminate_stops_a_running_job() {
        let temp = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(JobOutput::Discard);
        let mut job = launcher.start(&sh_params(temp.path(), "exec sleep 30\n")).unwrap();

        assert!(job.is_alive().unwrap());
        assert!(job.pid() > 0);
        job.terminate().unwrap();
        // A second request is a no-op.
        job.terminate().unwrap();
        let exit = job.wait().unwrap();

        assert!(!job.is_alive().unwrap());
        assert!(exit.contains("signal: 9"), "unexpected exit: {exit}");
    }

    #[test]
    fn test_terminate_after_exit_is_harmless() {
        let temp = TempDir::new().unwrap();
        let launcher = ProcessLauncher::new(JobOutput::Discard);
        let mut job = launcher.start(&sh_params(temp.path(), "exit 0\n")).unwrap();

        wait_until_dead(&mut job);
        job.terminate().unwrap();
        assert_eq!(job.wait().unwrap(), "exit status: 0");
    }

    #[test]
    fn test_missing_program_is_a_launch_error() {
        let temp = TempDir::new().unwrap();
        let mut params = sh_params(temp.path(), "");
        params.program = temp.path().join("no-such-engine");

        let err = ProcessLauncher::default().spawn(&params).unwrap_err();
        assert!(matches!(err, LaunchError::Spawn { .. }));
        assert!(err.to_string().contains("no-such-engine"));
    }

    #[test]
    fn test_file_output_captures_engine_arguments() {
        let temp = TempDir::new().unwrap();
        let log = temp.path().join("logs").join("job.log");
        let launcher = ProcessLauncher::new(JobOutput::File(log.clone()));
        let mut job = launcher
            .start(&sh_params(temp.path(), "echo \"$@\"\necho oops >&2\n"))
            .unwrap();

        job.wait().unwrap();
        let content = std::fs::read_to_string(&log).unwrap();
        assert!(content.contains("Contract.sol --contract Contract --test-mode assertion"));
        assert!(content.contains("--cov-mode inst"));
        assert!(content.contains("oops"));
    }
}
