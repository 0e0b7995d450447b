//! Runner Contract
//!
//! A `Runner` is one execution context able to run trials of any cell. The
//! orchestrator owns a pool of them and never assumes anything about how a
//! trial is carried out: a child process, a browser tab, or an in-memory test
//! double all fit behind the same four calls.

use crate::cancel::CancellationToken;
use crate::model::{Cell, FailureReason};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Everything a runner needs to execute one trial attempt
#[derive(Debug, Clone)]
pub struct TrialRequest {
    /// Cell being measured
    pub cell: Cell,
    /// Zero-based trial index
    pub trial: u32,
    /// 1-based attempt number for this trial
    pub attempt: u32,
    /// Task parameters from the plan
    pub params: BTreeMap<String, String>,
    /// Time budget the orchestrator will enforce
    pub timeout: Duration,
    /// Run-wide cancellation signal
    pub cancel: CancellationToken,
}

/// Result reported by a runner for a finished trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialOutcome {
    /// Whether the trial produced a valid result
    pub success: bool,
    /// Execution time in milliseconds
    pub execution_time_ms: f64,
    /// Memory used in bytes
    pub memory_used_bytes: u64,
    /// Digest of the result bytes
    #[serde(default)]
    pub result_digest: Option<u32>,
    /// Failure message when `success` is false
    #[serde(default)]
    pub message: Option<String>,
}

impl TrialOutcome {
    /// A successful outcome
    pub fn measured(execution_time_ms: f64, memory_used_bytes: u64, digest: Option<u32>) -> Self {
        Self {
            success: true,
            execution_time_ms,
            memory_used_bytes,
            result_digest: digest,
            message: None,
        }
    }
}

/// Error raised by a runner instead of an outcome
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunnerError {
    /// The trial ran and failed
    #[error("execution failed: {0}")]
    Execution(String),
    /// The request was malformed
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// The handshake with the execution environment failed
    #[error("connection failed: {0}")]
    Connection(String),
    /// The environment ran out of resources
    #[error("resources exhausted: {0}")]
    Exhausted(String),
    /// The trial was aborted on request
    #[error("aborted")]
    Aborted,
}

impl RunnerError {
    /// Failure reason recorded on the sample
    pub fn failure_reason(&self) -> FailureReason {
        match self {
            RunnerError::Execution(msg) => FailureReason::ExecutionFailure(msg.clone()),
            RunnerError::InvalidInput(msg) => FailureReason::InvalidInput(msg.clone()),
            RunnerError::Connection(msg) => FailureReason::ConnectionFailure(msg.clone()),
            RunnerError::Exhausted(_) => FailureReason::ResourceExhaustion,
            RunnerError::Aborted => FailureReason::Cancelled,
        }
    }
}

/// One execution context capable of running trials
pub trait Runner: Send + Sync {
    /// Short name used in logs and cleanup diagnostics
    fn name(&self) -> &str {
        "runner"
    }

    /// Handshake performed when a cell checks out this context
    fn connect(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
        Box::pin(async { Ok(()) })
    }

    /// Execute one trial attempt
    fn execute<'a>(
        &'a self,
        request: &'a TrialRequest,
    ) -> BoxFuture<'a, Result<TrialOutcome, RunnerError>>;

    /// Best-effort interruption of the trial currently in flight
    fn abort(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
        Box::pin(async { Ok(()) })
    }

    /// Release every resource held by the context. Called once, at the end of a run.
    fn release(&self) -> BoxFuture<'_, Result<(), RunnerError>> {
        Box::pin(async { Ok(()) })
    }
}
