//! Command Runner
//!
//! Runs each trial as a child process. The child receives
//! `--task T --variant V --scale S --trial N` after the configured arguments,
//! task parameters as `VERSUS_PARAM_<NAME>` environment variables, and must
//! print one JSON object as its last stdout line:
//!
//! ```text
//! {"success": true, "executionTime": 12.5, "memoryUsed": 1048576, "resultHash": 2166136261}
//! ```

use futures::future::BoxFuture;
use serde::Deserialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Mutex, MutexGuard};
use tokio::process::Command;
use tracing::debug;
use versus_core::{Runner, RunnerError, TrialOutcome, TrialRequest};

/// JSON line printed by a trial harness
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HarnessReport {
    success: bool,
    #[serde(default)]
    execution_time: f64,
    #[serde(default)]
    memory_used: u64,
    #[serde(default)]
    result_hash: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

impl From<HarnessReport> for TrialOutcome {
    fn from(report: HarnessReport) -> Self {
        TrialOutcome {
            success: report.success,
            execution_time_ms: report.execution_time,
            memory_used_bytes: report.memory_used,
            result_digest: report.result_hash,
            message: report.error,
        }
    }
}

/// Send SIGTERM to a process. Returns `Err` if the signal could not be delivered.
fn send_sigterm(pid: u32) -> Result<(), std::io::Error> {
    let ret = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if ret == -1 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Parse the last non-empty stdout line as a harness report
fn parse_report(stdout: &str) -> Result<HarnessReport, RunnerError> {
    let line = stdout
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| RunnerError::Execution("harness printed no result".to_string()))?;
    serde_json::from_str(line)
        .map_err(|e| RunnerError::Execution(format!("unreadable harness result: {}", e)))
}

fn param_env_name(key: &str) -> String {
    let sanitized: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("VERSUS_PARAM_{}", sanitized)
}

/// Clears the running pid when the trial ends, including when its future is dropped
struct RunningGuard<'a> {
    runner: &'a CommandRunner,
    pid: Option<u32>,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        let mut running = self.runner.lock_running();
        if *running == self.pid {
            *running = None;
        }
    }
}

/// Runner context that spawns one child process per trial
#[derive(Debug)]
pub struct CommandRunner {
    name: String,
    program: PathBuf,
    args: Vec<String>,
    running: Mutex<Option<u32>>,
}

impl CommandRunner {
    /// Runner spawning `program args...`
    pub fn new(name: impl Into<String>, program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args,
            running: Mutex::new(None),
        }
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<u32>> {
        self.running
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn command(&self, request: &TrialRequest) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .arg("--task")
            .arg(&request.cell.task)
            .arg("--variant")
            .arg(request.cell.variant.as_str())
            .arg("--scale")
            .arg(request.cell.scale.as_str())
            .arg("--trial")
            .arg(request.trial.to_string())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &request.params {
            command.env(param_env_name(key), value);
        }
        command
    }

    async fn run_trial(&self, request: &TrialRequest) -> Result<TrialOutcome, RunnerError> {
        let child = self.command(request).spawn().map_err(|e| {
            RunnerError::Connection(format!("failed to spawn {}: {}", self.program.display(), e))
        })?;
        *self.lock_running() = child.id();
        let guard = RunningGuard {
            runner: self,
            pid: child.id(),
        };
        debug!(runner = %self.name, cell = %request.cell, trial = request.trial, pid = ?child.id(), "spawned trial");

        let output = child.wait_with_output().await;
        drop(guard);
        let output = output.map_err(|e| RunnerError::Execution(e.to_string()))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        match parse_report(&stdout) {
            Ok(report) => Ok(report.into()),
            Err(_) if !output.status.success() => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let tail = stderr.lines().last().unwrap_or("").trim();
                Err(RunnerError::Execution(format!(
                    "harness exited with {}: {}",
                    output.status, tail
                )))
            }
            Err(e) => Err(e),
        }
    }
}

impl Runner for CommandRunner {
    fn name(&self) -> &str {
        &self.name
    }

    fn connect(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
        Box::pin(async move {
            if self.program.as_os_str().is_empty() {
                return Err(RunnerError::InvalidInput(
                    "runner.program is not configured".to_string(),
                ));
            }
            Ok(())
        })
    }

    fn execute<'a>(
        &'a self,
        request: &'a TrialRequest,
    ) -> BoxFuture<'a, Result<TrialOutcome, RunnerError>> {
        Box::pin(self.run_trial(request))
    }

    fn abort(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
        Box::pin(async move {
            let pid = self.lock_running().take();
            match pid {
                Some(pid) => send_sigterm(pid)
                    .map_err(|e| RunnerError::Execution(format!("SIGTERM to {}: {}", pid, e))),
                None => Ok(()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;
    use versus_core::{CancellationToken, Cell, Scale};

    fn request() -> TrialRequest {
        let mut params = BTreeMap::new();
        params.insert("seed".to_string(), "42".to_string());
        TrialRequest {
            cell: Cell::new("sort", "rust", Scale::Small),
            trial: 3,
            attempt: 1,
            params,
            timeout: Duration::from_secs(10),
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn test_parse_report_uses_last_line() {
        let stdout = "warming up\n{\"success\": true, \"executionTime\": 12.5, \"memoryUsed\": 2048, \"resultHash\": 7}\n\n";
        let outcome: TrialOutcome = parse_report(stdout).unwrap().into();
        assert_eq!(outcome, TrialOutcome::measured(12.5, 2048, Some(7)));
    }

    #[test]
    fn test_parse_report_failure_carries_message() {
        let outcome: TrialOutcome =
            parse_report(r#"{"success": false, "error": "stack overflow"}"#)
                .unwrap()
                .into();
        assert!(!outcome.success);
        assert_eq!(outcome.message.as_deref(), Some("stack overflow"));
    }

    #[test]
    fn test_parse_report_rejects_garbage() {
        assert!(matches!(parse_report(""), Err(RunnerError::Execution(_))));
        assert!(matches!(
            parse_report("not json"),
            Err(RunnerError::Execution(_))
        ));
    }

    #[test]
    fn test_param_env_name() {
        assert_eq!(param_env_name("seed"), "VERSUS_PARAM_SEED");
        assert_eq!(param_env_name("max-depth"), "VERSUS_PARAM_MAX_DEPTH");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_executes_shell_harness() {
        let script = r#"echo "{\"success\": true, \"executionTime\": 1.5, \"memoryUsed\": $VERSUS_PARAM_SEED, \"resultHash\": 9}""#;
        let runner = CommandRunner::new(
            "sh",
            "sh",
            vec!["-c".to_string(), script.to_string(), "harness".to_string()],
        );
        runner.connect().await.unwrap();
        let outcome = runner.execute(&request()).await.unwrap();
        assert_eq!(outcome, TrialOutcome::measured(1.5, 42, Some(9)));
        runner.abort().await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_without_result_is_failure() {
        let runner = CommandRunner::new(
            "sh",
            "sh",
            vec![
                "-c".to_string(),
                "echo boom >&2; exit 3".to_string(),
                "harness".to_string(),
            ],
        );
        let err = runner.execute(&request()).await.unwrap_err();
        match err {
            RunnerError::Execution(msg) => assert!(msg.contains("boom")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_dropped_trial_clears_running_pid() {
        let runner = CommandRunner::new(
            "sh",
            "sh",
            vec!["-c".to_string(), "sleep 5".to_string(), "harness".to_string()],
        );
        let req = request();
        let timed_out =
            tokio::time::timeout(Duration::from_millis(200), runner.execute(&req)).await;
        assert!(timed_out.is_err());
        assert_eq!(*runner.lock_running(), None);
        // Nothing left to signal
        runner.abort().await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_program_fails_to_spawn() {
        let runner = CommandRunner::new("ghost", "/nonexistent/versus-harness", Vec::new());
        assert!(matches!(
            runner.execute(&request()).await,
            Err(RunnerError::Connection(_))
        ));
    }
}
